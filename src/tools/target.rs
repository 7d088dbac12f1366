//! A single scalar view over height or layer weight data.
//!
//! Tools are written once against [`ScalarCache`]; the two targets map the
//! same f32 interface onto the u16 height cache and the u8 weight cache.

use crate::core::types::Result;
use crate::edit::accessors::{clamp_height, clamp_weight};
use crate::edit::{AlphaCache, AlphamapAccessor, HeightCache, HeightmapAccessor};
use crate::math::GridRect;
use crate::terrain::Terrain;

/// Stroke-scoped cache of one scalar channel of the terrain.
pub trait ScalarCache {
    fn cache_region(&mut self, terrain: &Terrain, rect: GridRect);

    /// Dense row-major copy; vertices never fetched read as 0.
    fn read(&self, rect: GridRect) -> Vec<f32>;

    /// Write a dense rect back, clamping into the channel's range.
    fn write(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[f32]) -> Result<()>;

    /// Push pending dirty state (collision rebuilds) to the terrain.
    /// Called after every apply and again at end of stroke.
    fn flush(&mut self, terrain: &mut Terrain);

    /// Units moved by one full-influence application at strength 1.
    fn value_scale(&self) -> f32;
}

/// Heights, with normal recomputation and collision rebuilds on flush.
pub struct HeightTarget {
    cache: HeightCache,
    value_scale: f32,
}

impl HeightTarget {
    pub fn new(terrain: &Terrain) -> Self {
        Self {
            cache: HeightCache::new(HeightmapAccessor::new(true)),
            value_scale: 10.0 * terrain.draw_scale.x / (terrain.draw_scale.z / 128.0),
        }
    }
}

impl ScalarCache for HeightTarget {
    fn cache_region(&mut self, terrain: &Terrain, rect: GridRect) {
        self.cache.cache_region(terrain, rect);
    }

    fn read(&self, rect: GridRect) -> Vec<f32> {
        self.cache.get_cached(rect).into_iter().map(f32::from).collect()
    }

    fn write(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[f32]) -> Result<()> {
        let quantized: Vec<u16> = data.iter().map(|&v| clamp_height(v)).collect();
        self.cache.set_cached(terrain, rect, &quantized)
    }

    fn flush(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
    }

    fn value_scale(&self) -> f32 {
        self.value_scale
    }
}

/// One layer's blend weights.
pub struct WeightTarget {
    cache: AlphaCache,
}

impl WeightTarget {
    pub fn new(terrain: &Terrain, layer: impl Into<String>) -> Self {
        Self { cache: AlphaCache::new(AlphamapAccessor::new(terrain, layer)) }
    }
}

impl ScalarCache for WeightTarget {
    fn cache_region(&mut self, terrain: &Terrain, rect: GridRect) {
        self.cache.cache_region(terrain, rect);
    }

    fn read(&self, rect: GridRect) -> Vec<f32> {
        self.cache.get_cached(rect).into_iter().map(f32::from).collect()
    }

    fn write(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[f32]) -> Result<()> {
        let quantized: Vec<u8> = data.iter().map(|&v| clamp_weight(v)).collect();
        self.cache.set_cached(terrain, rect, &quantized)
    }

    fn flush(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
    }

    fn value_scale(&self) -> f32 {
        255.0
    }
}

/// What a tool edits.
#[derive(Debug, Clone)]
pub enum ToolTarget {
    Height,
    Weight(String),
}

impl ToolTarget {
    /// Open a fresh stroke cache for this target.
    pub fn open(&self, terrain: &Terrain) -> Box<dyn ScalarCache> {
        match self {
            ToolTarget::Height => Box::new(HeightTarget::new(terrain)),
            ToolTarget::Weight(layer) => Box::new(WeightTarget::new(terrain, layer.clone())),
        }
    }
}

impl ScalarCache for Box<dyn ScalarCache> {
    fn cache_region(&mut self, terrain: &Terrain, rect: GridRect) {
        (**self).cache_region(terrain, rect);
    }

    fn read(&self, rect: GridRect) -> Vec<f32> {
        (**self).read(rect)
    }

    fn write(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[f32]) -> Result<()> {
        (**self).write(terrain, rect, data)
    }

    fn flush(&mut self, terrain: &mut Terrain) {
        (**self).flush(terrain);
    }

    fn value_scale(&self) -> f32 {
        (**self).value_scale()
    }
}
