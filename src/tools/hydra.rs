//! Hydraulic erosion: rainfall, sediment transport, evaporation.

use crate::brush::CircleBrush;
use crate::core::types::Result;
use crate::edit::accessors::clamp_height;
use crate::edit::{HeightCache, HeightmapAccessor};
use crate::terrain::Terrain;

use super::filter;
use super::noise::NoiseParameter;

const DIRS: [(i32, i32); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0), (1, 0),
    (-1, 1), (0, 1), (1, 1),
];

/// Fraction of standing water converted to dissolved material per step.
const DISSOLVE_RATE: f32 = 0.07;
/// Water kept after each evaporation step.
const EVAPORATION: f32 = 0.5;
/// Sediment a unit of water can hold in suspension.
const CAPACITY: f32 = 0.1;

/// Rain-driven erosion. Each application rains once over the footprint and
/// iterates until the water evaporates or `iterations` runs out; material is
/// conserved, ending up deposited downhill.
pub struct HydraulicTool {
    heights: HeightCache,
    pub strength: f32,
    pub iterations: u32,
    /// Rainfall distribution in water-height units; negative samples are dry.
    pub rain: NoiseParameter,
    /// Optional frequency-domain finishing pass.
    pub detail_scale: Option<f32>,
}

impl HydraulicTool {
    pub fn new(strength: f32, iterations: u32, rain: NoiseParameter) -> Self {
        Self {
            heights: HeightCache::new(HeightmapAccessor::new(true)),
            strength,
            iterations,
            rain,
            detail_scale: None,
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
        let n = h.len();

        let mut water = vec![0.0f32; n];
        for (&(x, y), &infl) in &stamp {
            water[bounds.index_of(x, y)] = self.rain.sample(x as f32, y as f32).max(0.0) * infl;
        }
        let mut sediment = vec![0.0f32; n];
        let dissolve = DISSOLVE_RATE * self.strength * pressure;

        for _ in 0..self.iterations {
            if water.iter().sum::<f32>() < 1e-2 {
                break;
            }

            for (&(x, y), &infl) in &stamp {
                let i = bounds.index_of(x, y);
                let d = dissolve * water[i] * infl;
                h[i] -= d;
                sediment[i] += d;
            }

            // route water (and the sediment it carries) toward lower ground
            let alt: Vec<f32> = h.iter().zip(&water).map(|(a, b)| a + b).collect();
            let mut dw = vec![0.0f32; n];
            let mut ds = vec![0.0f32; n];
            for (&(x, y), &infl) in &stamp {
                let ci = bounds.index_of(x, y);
                if water[ci] <= 0.0 {
                    continue;
                }
                let mut sum_alt = 0.0;
                let mut total_diff = 0.0;
                let mut count = 0;
                for &(dx, dy) in &DIRS {
                    if !bounds.contains(x + dx, y + dy) {
                        continue;
                    }
                    let ni = bounds.index_of(x + dx, y + dy);
                    if alt[ni] < alt[ci] {
                        sum_alt += alt[ni];
                        total_diff += alt[ci] - alt[ni];
                        count += 1;
                    }
                }
                if count == 0 || total_diff <= 0.0 {
                    continue;
                }
                let avg = sum_alt / count as f32;
                let transfer = (alt[ci] - avg).min(water[ci]) * infl;
                if transfer <= 0.0 {
                    continue;
                }
                let carried = sediment[ci] / water[ci];
                for &(dx, dy) in &DIRS {
                    if !bounds.contains(x + dx, y + dy) {
                        continue;
                    }
                    let ni = bounds.index_of(x + dx, y + dy);
                    if alt[ni] >= alt[ci] {
                        continue;
                    }
                    let wq = transfer * (alt[ci] - alt[ni]) / total_diff;
                    dw[ci] -= wq;
                    dw[ni] += wq;
                    ds[ci] -= wq * carried;
                    ds[ni] += wq * carried;
                }
            }
            for i in 0..n {
                water[i] = (water[i] + dw[i]).max(0.0);
                sediment[i] = (sediment[i] + ds[i]).max(0.0);
            }

            // evaporate, then drop whatever the thinner water cannot hold
            for i in 0..n {
                water[i] *= EVAPORATION;
                let cap = CAPACITY * water[i];
                if sediment[i] > cap {
                    h[i] += sediment[i] - cap;
                    sediment[i] = cap;
                }
            }
        }

        // settle anything still suspended
        for i in 0..n {
            h[i] += sediment[i];
        }

        if let Some(detail) = self.detail_scale {
            let mut filtered = h.clone();
            filter::low_pass(
                bounds.width() as usize,
                bounds.height() as usize,
                &mut filtered,
                detail,
                1.0,
            );
            for (&(x, y), &infl) in &stamp {
                let i = bounds.index_of(x, y);
                let t = (infl * self.strength * pressure).clamp(0.0, 1.0);
                h[i] += (filtered[i] - h[i]) * t;
            }
        }

        let quantized: Vec<u16> = h.iter().map(|&v| clamp_height(v)).collect();
        self.heights.set_cached(terrain, bounds, &quantized)?;
        self.heights.flush(terrain);
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.heights.flush(terrain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::Falloff;
    use crate::core::types::{Vec2, Vec3};
    use crate::edit::EditInterface;
    use crate::math::GridRect;
    use crate::terrain::TerrainDescriptor;

    fn terrain() -> Terrain {
        let mut t = Terrain::new(&TerrainDescriptor {
            component_size_quads: 14,
            num_subsections: 2,
            subsection_size_quads: 7,
            draw_scale: Vec3::new(1.0, 1.0, 128.0),
        })
        .unwrap();
        t.add_component(0, 0).unwrap();
        t
    }

    fn brush() -> CircleBrush {
        CircleBrush::new(Vec2::new(7.0, 7.0), 5.0, 0.0, Falloff::Smooth)
    }

    fn rain() -> NoiseParameter {
        NoiseParameter::new(11, 50.0, 9.0, 10.0)
    }

    #[test]
    fn test_flat_ground_nearly_settles_back() {
        let mut t = terrain();
        let mut tool = HydraulicTool::new(1.0, 8, rain());
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);

        // no slope to exploit: material redeposits close to where it
        // dissolved, and nothing is created or destroyed
        let region = GridRect::new(2, 2, 12, 12);
        let out = t.export_height(region).unwrap();
        assert!(out.iter().all(|&h| (h as i32 - 32768).abs() < 32));
        let sum: i64 = out.iter().map(|&v| v as i64).sum();
        let flat = 32768i64 * out.len() as i64;
        assert!((sum - flat).abs() < out.len() as i64, "drift {}", sum - flat);
    }

    #[test]
    fn test_peak_erodes_downhill_and_conserves() {
        let mut t = terrain();
        let full = GridRect::new(0, 0, 14, 14);
        let data: Vec<u16> = full
            .iter()
            .map(|(x, y)| {
                let d = ((x - 7).abs()).max((y - 7).abs());
                (40000 - d * 800).max(30000) as u16
            })
            .collect();
        EditInterface::new(&mut t).set_height_data(full, &data, false).unwrap();

        let bounds = brush().bounds();
        let before = t.export_height(bounds).unwrap();
        let mut tool = HydraulicTool::new(1.0, 8, rain());
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);
        let after = t.export_height(bounds).unwrap();

        assert!(after[bounds.index_of(7, 7)] < before[bounds.index_of(7, 7)]);
        let sum_b: i64 = before.iter().map(|&v| v as i64).sum();
        let sum_a: i64 = after.iter().map(|&v| v as i64).sum();
        assert!((sum_a - sum_b).abs() < after.len() as i64, "drift {}", sum_a - sum_b);
    }

    #[test]
    fn test_water_terminates() {
        let mut t = terrain();
        // far more iterations than the water can survive
        let mut tool = HydraulicTool::new(1.0, 10_000, rain());
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);
    }

    #[test]
    fn test_detail_filter_smooths_result() {
        let mut t = terrain();
        let full = GridRect::new(0, 0, 14, 14);
        let data: Vec<u16> = full
            .iter()
            .map(|(x, y)| if (x + y) % 2 == 0 { 33500 } else { 32000 })
            .collect();
        EditInterface::new(&mut t).set_height_data(full, &data, false).unwrap();

        let mut tool = HydraulicTool::new(1.0, 2, NoiseParameter::new(1, 0.0, 9.0, 0.0));
        tool.detail_scale = Some(0.8);
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);

        // the sawtooth flattens toward its local mean under the brush
        let center = t.export_height(GridRect::point(7, 7)).unwrap()[0] as i32;
        assert!((center - 32750).abs() < 600, "center {}", center);
    }
}
