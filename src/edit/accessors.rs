//! Concrete cache accessors for heights, one layer's weights, and all
//! layers' weights.

use std::collections::{HashMap, HashSet};

use crate::core::types::Result;
use crate::math::GridRect;
use crate::terrain::{ComponentId, Terrain};

use super::cache::{EditCache, RegionAccessor};
use super::interface::EditInterface;

/// Height data, with optional normal recomputation on write. Components
/// written during the stroke get their collision fields rebuilt on flush.
pub struct HeightmapAccessor {
    calc_normals: bool,
    changed: HashSet<ComponentId>,
}

impl HeightmapAccessor {
    pub fn new(calc_normals: bool) -> Self {
        Self { calc_normals, changed: HashSet::new() }
    }
}

impl RegionAccessor for HeightmapAccessor {
    type Sample = u16;

    fn get_region(
        &mut self,
        terrain: &Terrain,
        rect: GridRect,
        out: &mut HashMap<(i32, i32), u16>,
    ) {
        terrain.get_height_data_sparse(rect, out);
    }

    fn set_region(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[u16]) -> Result<()> {
        let touched =
            EditInterface::new(terrain).set_height_data(rect, data, self.calc_normals)?;
        self.changed.extend(touched);
        Ok(())
    }

    fn flush(&mut self, terrain: &mut Terrain) {
        for id in self.changed.drain() {
            terrain.rebuild_collision(id);
        }
    }
}

/// One layer's weight data. `blend` is derived from the layer definition at
/// construction: no-weight-blend layers write raw values.
pub struct AlphamapAccessor {
    layer: String,
    blend: bool,
}

impl AlphamapAccessor {
    pub fn new(terrain: &Terrain, layer: impl Into<String>) -> Self {
        let layer = layer.into();
        let blend = terrain
            .layer_index(&layer)
            .map(|i| !terrain.layers[i].no_weight_blend)
            .unwrap_or(true);
        Self { layer, blend }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }
}

impl RegionAccessor for AlphamapAccessor {
    type Sample = u8;

    fn get_region(
        &mut self,
        terrain: &Terrain,
        rect: GridRect,
        out: &mut HashMap<(i32, i32), u8>,
    ) {
        terrain.get_weight_data_sparse(&self.layer, rect, out);
    }

    fn set_region(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[u8]) -> Result<()> {
        EditInterface::new(terrain).set_weight_data(&self.layer, rect, data, self.blend)?;
        Ok(())
    }

    fn flush(&mut self, _terrain: &mut Terrain) {}
}

/// All layers' weights as layer-count-strided vectors, written back raw.
/// Used by tools that move weight between vertices rather than painting.
pub struct FullWeightmapAccessor {
    layer_count: usize,
}

impl FullWeightmapAccessor {
    pub fn new(terrain: &Terrain) -> Self {
        Self { layer_count: terrain.layers.len() }
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }
}

impl RegionAccessor for FullWeightmapAccessor {
    type Sample = Vec<u8>;

    fn get_region(
        &mut self,
        terrain: &Terrain,
        rect: GridRect,
        out: &mut HashMap<(i32, i32), Vec<u8>>,
    ) {
        terrain.get_all_weights_sparse(rect, out);
    }

    fn set_region(
        &mut self,
        terrain: &mut Terrain,
        rect: GridRect,
        data: &[Vec<u8>],
    ) -> Result<()> {
        let mut flat = Vec::with_capacity(data.len() * self.layer_count);
        for sample in data {
            debug_assert_eq!(sample.len(), self.layer_count);
            flat.extend_from_slice(sample);
        }
        EditInterface::new(terrain).set_all_weights_data(rect, &flat, self.layer_count)?;
        Ok(())
    }

    fn flush(&mut self, _terrain: &mut Terrain) {}
}

pub type HeightCache = EditCache<HeightmapAccessor>;
pub type AlphaCache = EditCache<AlphamapAccessor>;
pub type FullWeightCache = EditCache<FullWeightmapAccessor>;

/// Clamp an edited height into storable range.
pub fn clamp_height(v: f32) -> u16 {
    v.round().clamp(0.0, 65535.0) as u16
}

/// Clamp an edited weight into storable range.
pub fn clamp_weight(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
