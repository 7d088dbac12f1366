//! Thermal erosion: slope-driven material transfer with layer hardness.

use crate::brush::CircleBrush;
use crate::core::types::Result;
use crate::edit::accessors::clamp_height;
use crate::edit::{FullWeightCache, FullWeightmapAccessor, HeightCache, HeightmapAccessor};
use crate::terrain::Terrain;

use super::noise::{NoiseMode, NoiseParameter};

const DIRS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Moves material down slopes steeper than `threshold`, dragging layer
/// weights along with it. Hard layers (weight x hardness) resist.
pub struct ErosionTool {
    heights: HeightCache,
    weights: Option<FullWeightCache>,
    hardness: Vec<f32>,
    pub strength: f32,
    /// Minimum height difference (in height units) before material moves.
    pub threshold: f32,
    pub iterations: u32,
    /// Reverses the transfer, sharpening ridges instead of relaxing them.
    pub invert: bool,
    /// Roughness added after the transfer settles.
    pub noise: Option<(NoiseParameter, NoiseMode)>,
}

impl ErosionTool {
    pub fn new(terrain: &Terrain, strength: f32, threshold: f32, iterations: u32) -> Self {
        let weights = if terrain.layers.is_empty() {
            None
        } else {
            Some(FullWeightCache::new(FullWeightmapAccessor::new(terrain)))
        };
        Self {
            heights: HeightCache::new(HeightmapAccessor::new(true)),
            weights,
            hardness: terrain.layers.iter().map(|l| l.hardness).collect(),
            strength,
            threshold,
            iterations,
            invert: false,
            noise: None,
        }
    }

    pub fn apply(&mut self, terrain: &mut Terrain, brush: &CircleBrush, pressure: f32) -> Result<()> {
        let (stamp, bounds) = brush.stamp();
        if stamp.is_empty() {
            return Ok(());
        }
        self.heights.cache_region(terrain, bounds);
        let mut h: Vec<f32> = self
            .heights
            .get_cached(bounds)
            .into_iter()
            .map(f32::from)
            .collect();
        let layer_count = self.hardness.len();
        let mut w: Option<Vec<Vec<u8>>> = self.weights.as_mut().map(|cache| {
            cache.cache_region(terrain, bounds);
            let mut data = cache.get_cached(bounds);
            for sample in &mut data {
                sample.resize(layer_count, 0);
            }
            data
        });

        let sign = if self.invert { -1.0 } else { 1.0 };
        for _ in 0..self.iterations {
            let mut delta = vec![0.0f32; h.len()];
            let mut moved_any = false;
            for (&(x, y), &infl) in &stamp {
                let ci = bounds.index_of(x, y);
                let softness = match &w {
                    Some(w) => {
                        1.0 - w[ci]
                            .iter()
                            .zip(&self.hardness)
                            .map(|(&v, &hd)| v as f32 / 255.0 * hd)
                            .sum::<f32>()
                    }
                    None => 1.0,
                };
                if softness <= 0.0 {
                    continue;
                }

                let mut slopes = [0.0f32; 4];
                let mut total = 0.0;
                for (k, &(dx, dy)) in DIRS.iter().enumerate() {
                    if !bounds.contains(x + dx, y + dy) {
                        continue;
                    }
                    let s = (h[ci] - h[bounds.index_of(x + dx, y + dy)]) * sign;
                    if s > self.threshold {
                        slopes[k] = s;
                        total += s;
                    }
                }
                if total <= 0.0 {
                    continue;
                }
                let move_total = total * 0.25 * softness * self.strength * pressure * infl;
                if move_total < 1e-3 {
                    continue;
                }
                moved_any = true;
                delta[ci] -= move_total;

                // weights only follow transfers that carry real material
                let weight_gate = (move_total * 0.25).max(self.threshold).min(move_total * 0.5);
                for (k, &(dx, dy)) in DIRS.iter().enumerate() {
                    if slopes[k] <= 0.0 {
                        continue;
                    }
                    let ni = bounds.index_of(x + dx, y + dy);
                    let part = move_total * slopes[k] / total;
                    delta[ni] += part;
                    if part >= weight_gate {
                        if let Some(w) = w.as_mut() {
                            let src = w[ci].clone();
                            let frac = (part / move_total * 0.5).min(0.5);
                            blend_weights(&mut w[ni], &src, frac);
                        }
                    }
                }
            }
            if !moved_any {
                break;
            }
            for (hv, d) in h.iter_mut().zip(&delta) {
                *hv += d;
            }
        }

        if let Some((param, mode)) = &self.noise {
            for (&(x, y), &infl) in &stamp {
                let v = mode.conversion(param.amount, param.sample(x as f32, y as f32));
                h[bounds.index_of(x, y)] += v * infl * self.strength * pressure;
            }
        }

        let quantized: Vec<u16> = h.iter().map(|&v| clamp_height(v)).collect();
        self.heights.set_cached(terrain, bounds, &quantized)?;
        if let (Some(cache), Some(w)) = (self.weights.as_mut(), w) {
            cache.set_cached(terrain, bounds, &w)?;
        }
        self.heights.flush(terrain);
        if let Some(cache) = self.weights.as_mut() {
            cache.flush(terrain);
        }
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.heights.flush(terrain);
        if let Some(cache) = self.weights.as_mut() {
            cache.flush(terrain);
        }
    }
}

/// Pull `dst` toward `src` by `frac`, then rescale so the sum stays 255.
fn blend_weights(dst: &mut [u8], src: &[u8], frac: f32) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = (*d as f32 + (s as f32 - *d as f32) * frac).round().clamp(0.0, 255.0) as u8;
    }
    let sum: u32 = dst.iter().map(|&v| v as u32).sum();
    if sum == 0 || sum == 255 {
        return;
    }
    for d in dst.iter_mut() {
        *d = ((*d as u32 * 255 + sum / 2) / sum).min(255) as u8;
    }
    let total: i32 = dst.iter().map(|&v| v as i32).sum();
    let diff = 255 - total;
    if diff != 0 {
        if let Some(d) = dst.iter_mut().find(|d| (0..=255).contains(&(**d as i32 + diff))) {
            *d = (*d as i32 + diff) as u8;
        }
    }
}
