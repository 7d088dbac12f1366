//! Smoothing, as a 3x3 box blend or a frequency-domain low-pass.

use crate::brush::CircleBrush;
use crate::core::types::Result;
use crate::math::GridRect;
use crate::terrain::Terrain;

use super::filter;
use super::target::ScalarCache;

pub struct SmoothTool<C: ScalarCache> {
    cache: C,
    pub strength: f32,
    /// When set, smooth through the low-pass filter instead of the box
    /// blend. Higher values (0..1) remove more detail.
    pub detail_scale: Option<f32>,
}

impl<C: ScalarCache> SmoothTool<C> {
    pub fn new(cache: C, strength: f32) -> Self {
        Self { cache, strength, detail_scale: None }
    }

    pub fn with_detail_preserving(mut self, detail_scale: f32) -> Self {
        self.detail_scale = Some(detail_scale);
        self
    }

    pub fn apply(&mut self, terrain: &mut Terrain, brush: &CircleBrush, pressure: f32) -> Result<()> {
        let (stamp, bounds) = brush.stamp();
        if stamp.is_empty() {
            return Ok(());
        }
        // one vertex of margin so border stamp vertices see full windows
        let grown = GridRect::new(bounds.x1 - 1, bounds.y1 - 1, bounds.x2 + 1, bounds.y2 + 1);
        self.cache.cache_region(terrain, grown);
        let src = self.cache.read(grown);
        let mut out = self.cache.read(bounds);

        if let Some(detail) = self.detail_scale {
            let mut filtered = src.clone();
            filter::low_pass(
                grown.width() as usize,
                grown.height() as usize,
                &mut filtered,
                detail,
                1.0,
            );
            for (&(x, y), &infl) in &stamp {
                let i = bounds.index_of(x, y);
                let t = (infl * self.strength * pressure).clamp(0.0, 1.0);
                out[i] += (filtered[grown.index_of(x, y)] - out[i]) * t;
            }
        } else {
            for (&(x, y), &infl) in &stamp {
                let mut sum = 0.0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        sum += src[grown.index_of(x + dx, y + dy)];
                    }
                }
                let i = bounds.index_of(x, y);
                let t = (infl * self.strength * pressure).clamp(0.0, 1.0);
                out[i] += (sum / 9.0 - out[i]) * t;
            }
        }

        self.cache.write(terrain, bounds, &out)?;
        self.cache.flush(terrain);
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
    }
}
