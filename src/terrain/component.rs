//! Terrain components and weightmap channel allocation.
//!
//! A component is one tile of the terrain. Its height data lives in a
//! sub-rectangle of a shared height atlas; its blend weights live in channels
//! of one or more shared weight atlases. All cross-references are ids into
//! the terrain's arenas.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::atlas::{AtlasId, AtlasKind, AtlasTexture};
use crate::core::types::Result;
use crate::core::Error;
use crate::math::GridRect;

use super::mips;
use super::terrain::Terrain;

/// Stable handle to a component within a [`Terrain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

/// Marker for an allocation that has not been given a channel yet.
pub const UNALLOCATED: u8 = 255;

/// One layer's home within a component's weight atlases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerAllocation {
    pub layer: String,
    /// Index into the component's `weight_atlases`, or [`UNALLOCATED`].
    pub atlas_index: u8,
    pub channel: u8,
}

impl LayerAllocation {
    pub fn unallocated(layer: impl Into<String>) -> Self {
        Self { layer: layer.into(), atlas_index: UNALLOCATED, channel: 0 }
    }

    pub fn is_allocated(&self) -> bool {
        self.atlas_index != UNALLOCATED
    }
}

/// One terrain tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Base vertex coordinate, a multiple of the component size in quads.
    pub base_x: i32,
    pub base_y: i32,
    pub height_atlas: AtlasId,
    /// Texel offset of this component's block within the height atlas.
    pub height_offset_x: i32,
    pub height_offset_y: i32,
    /// Weight atlases referenced by `allocations[..].atlas_index`.
    pub weight_atlases: Vec<AtlasId>,
    pub allocations: Vec<LayerAllocation>,
    /// Cached min/max height over the component, for renderer culling.
    pub height_range: (u16, u16),
}

impl Component {
    /// Component index on the component grid.
    pub fn grid_pos(&self, component_size_quads: i32) -> (i32, i32) {
        (self.base_x / component_size_quads, self.base_y / component_size_quads)
    }

    /// Vertex region covered by this component, inclusive of shared borders.
    pub fn vertex_region(&self, component_size_quads: i32) -> GridRect {
        GridRect::new(
            self.base_x,
            self.base_y,
            self.base_x + component_size_quads,
            self.base_y + component_size_quads,
        )
    }

    pub fn allocation(&self, layer: &str) -> Option<&LayerAllocation> {
        self.allocations.iter().find(|a| a.layer == layer)
    }

    pub fn allocation_mut(&mut self, layer: &str) -> Option<&mut LayerAllocation> {
        self.allocations.iter_mut().find(|a| a.layer == layer)
    }

    /// (atlas, channel) of an allocated layer.
    pub fn resolve(&self, layer: &str) -> Option<(AtlasId, usize)> {
        self.allocation(layer).filter(|a| a.is_allocated()).map(|a| {
            (self.weight_atlases[a.atlas_index as usize], a.channel as usize)
        })
    }

    pub fn expand_height_range(&mut self, h: u16) {
        if h < self.height_range.0 {
            self.height_range.0 = h;
        }
        if h > self.height_range.1 {
            self.height_range.1 = h;
        }
    }
}

impl Terrain {
    /// Give every unallocated layer of a component a weight atlas channel.
    ///
    /// Three phases: spare channels in the component's own atlases first,
    /// then consolidation into the nearest shared atlas with room for all of
    /// the component's layers, then fresh atlases. Moving a channel copies
    /// its texels before zeroing the source, so no data is lost.
    pub fn reallocate_weightmaps(&mut self, id: ComponentId) -> Result<()> {
        let needed = self
            .component(id)
            .allocations
            .iter()
            .filter(|a| !a.is_allocated())
            .count();
        if needed == 0 {
            return Ok(());
        }

        self.claim_spare_channels(id);

        let comp = self.component(id);
        let total = comp.allocations.len();
        let still_needed = comp.allocations.iter().filter(|a| !a.is_allocated()).count();
        if still_needed > 0 && total <= 4 {
            self.consolidate_into_shared_atlas(id)?;
        }
        self.allocate_fresh_atlases(id)?;

        self.compact_weight_atlases(id);
        self.regenerate_component_weight_mips(id);
        Ok(())
    }

    /// Phase 1: claim free channels in atlases the component already uses.
    fn claim_spare_channels(&mut self, id: ComponentId) {
        let atlas_ids = self.component(id).weight_atlases.clone();
        for i in 0..self.component(id).allocations.len() {
            if self.component(id).allocations[i].is_allocated() {
                continue;
            }
            for (ai, &atlas) in atlas_ids.iter().enumerate() {
                if let Some(channel) = self.atlases.usage(atlas).find_free() {
                    self.atlases.usage_mut(atlas).claim(channel, id);
                    self.zero_component_channel(id, atlas, channel);
                    let alloc = &mut self.component_mut(id).allocations[i];
                    alloc.atlas_index = ai as u8;
                    alloc.channel = channel as u8;
                    debug!(
                        "component {:?}: claimed spare channel {} of atlas {:?} for '{}'",
                        id,
                        channel,
                        atlas,
                        self.component(id).allocations[i].layer
                    );
                    break;
                }
            }
        }
    }

    /// Phase 2: move every allocation into one existing atlas with enough
    /// free channels, picking the nearest by squared component distance.
    fn consolidate_into_shared_atlas(&mut self, id: ComponentId) -> Result<()> {
        let total = self.component(id).allocations.len();
        let own_atlases = self.component(id).weight_atlases.clone();
        let (bx, by) = {
            let c = self.component(id);
            c.grid_pos(self.component_size_quads)
        };

        let mut best: Option<(AtlasId, i64)> = None;
        for atlas in self.atlases.ids_of_kind(AtlasKind::Weight) {
            if own_atlases.contains(&atlas) {
                continue;
            }
            let usage = self.atlases.usage(atlas);
            if usage.free_channel_count() < total {
                continue;
            }
            let mut dist = i64::MAX;
            for ch in 0..4 {
                if let Some(owner) = usage.owner(ch) {
                    let (ox, oy) = {
                        let c = self.component(owner);
                        c.grid_pos(self.component_size_quads)
                    };
                    let d = ((ox - bx) as i64).pow(2) + ((oy - by) as i64).pow(2);
                    dist = dist.min(d);
                }
            }
            if dist == i64::MAX {
                dist = 0;
            }
            match best {
                Some((_, bd)) if bd <= dist => {}
                _ => best = Some((atlas, dist)),
            }
        }

        let Some((target, dist)) = best else {
            return Ok(());
        };
        debug!(
            "component {:?}: consolidating {} layers into atlas {:?} (distance {})",
            id, total, target, dist
        );

        for i in 0..total {
            let alloc = self.component(id).allocations[i].clone();
            let channel = match self.atlases.usage(target).find_free() {
                Some(c) => c,
                None => {
                    return Err(Error::Allocation(format!(
                        "atlas {:?} ran out of channels during consolidation",
                        target
                    )));
                }
            };
            if alloc.is_allocated() {
                let from = self.component(id).weight_atlases[alloc.atlas_index as usize];
                self.atlases.move_channel(from, alloc.channel as usize, target, channel, id);
            } else {
                self.atlases.usage_mut(target).claim(channel, id);
                self.zero_component_channel(id, target, channel);
            }
            let comp = self.component_mut(id);
            comp.allocations[i].atlas_index = 0;
            comp.allocations[i].channel = channel as u8;
        }

        let old_atlases = std::mem::replace(&mut self.component_mut(id).weight_atlases, vec![target]);
        for atlas in old_atlases {
            self.drop_weight_atlas_if_empty(atlas);
        }
        Ok(())
    }

    /// Phase 3: fresh atlases for whatever is still unallocated.
    fn allocate_fresh_atlases(&mut self, id: ComponentId) -> Result<()> {
        loop {
            let Some(i) = self
                .component(id)
                .allocations
                .iter()
                .position(|a| !a.is_allocated())
            else {
                return Ok(());
            };

            // reuse room opened up by earlier phases before creating more
            let atlas_ids = self.component(id).weight_atlases.clone();
            if let Some((ai, atlas, channel)) = atlas_ids
                .iter()
                .enumerate()
                .find_map(|(ai, &a)| self.atlases.usage(a).find_free().map(|c| (ai, a, c)))
            {
                self.atlases.usage_mut(atlas).claim(channel, id);
                self.zero_component_channel(id, atlas, channel);
                let alloc = &mut self.component_mut(id).allocations[i];
                alloc.atlas_index = ai as u8;
                alloc.channel = channel as u8;
                continue;
            }

            if self.component(id).weight_atlases.len() >= MAX_WEIGHT_ATLASES_PER_COMPONENT {
                return Err(Error::Allocation(format!(
                    "component {:?} exceeds {} weight atlases",
                    id, MAX_WEIGHT_ATLASES_PER_COMPONENT
                )));
            }

            let size = self.weight_atlas_size();
            let atlas = self
                .atlases
                .insert(AtlasTexture::new(size, size), AtlasKind::Weight);
            debug!("component {:?}: created weight atlas {:?} ({}x{})", id, atlas, size, size);
            self.component_mut(id).weight_atlases.push(atlas);
        }
    }

    /// Drop unreferenced atlas indices and renumber surviving allocations.
    fn compact_weight_atlases(&mut self, id: ComponentId) {
        let comp = self.component(id);
        let old_atlases = comp.weight_atlases.clone();
        let mut kept: Vec<AtlasId> = Vec::new();
        let mut remap: Vec<Option<u8>> = vec![None; old_atlases.len()];
        for a in &comp.allocations {
            if a.is_allocated() {
                let old = a.atlas_index as usize;
                if remap[old].is_none() {
                    remap[old] = Some(kept.len() as u8);
                    kept.push(old_atlases[old]);
                }
            }
        }
        let comp = self.component_mut(id);
        for a in &mut comp.allocations {
            if a.is_allocated() {
                a.atlas_index = remap[a.atlas_index as usize]
                    .unwrap_or(a.atlas_index);
            }
        }
        comp.weight_atlases = kept;
        for atlas in old_atlases {
            if !self.component(id).weight_atlases.contains(&atlas) {
                self.drop_weight_atlas_if_empty(atlas);
            }
        }
    }

    /// Zero one channel across the component's block of an atlas.
    pub(crate) fn zero_component_channel(&mut self, _id: ComponentId, atlas: AtlasId, channel: usize) {
        // weight atlases hold one component block at offset zero, so zeroing
        // the whole channel is exact
        self.atlases.texture_mut(atlas).zero_channel(channel);
    }

    /// Remove a layer's allocation from one component, releasing its channel
    /// and dropping the atlas when it becomes fully free.
    pub(crate) fn remove_component_allocation(&mut self, id: ComponentId, layer: &str) {
        let Some(pos) = self
            .component(id)
            .allocations
            .iter()
            .position(|a| a.layer == layer)
        else {
            return;
        };
        let alloc = self.component_mut(id).allocations.remove(pos);
        if alloc.is_allocated() {
            let atlas = self.component(id).weight_atlases[alloc.atlas_index as usize];
            self.atlases.texture_mut(atlas).zero_channel(alloc.channel as usize);
            self.atlases.usage_mut(atlas).release(alloc.channel as usize);
            debug!("component {:?}: released channel {} of atlas {:?} ('{}')", id, alloc.channel, atlas, layer);
        }
        self.compact_weight_atlases(id);
    }

    pub(crate) fn drop_weight_atlas_if_empty(&mut self, atlas: AtlasId) {
        if self.atlases.contains(atlas) && self.atlases.usage(atlas).is_empty() {
            self.atlases.remove(atlas);
            self.uploads.retire_atlas(atlas);
            debug!("dropped empty weight atlas {:?}", atlas);
        }
    }

    /// Regenerate full weight mip chains for every atlas a component uses.
    pub(crate) fn regenerate_component_weight_mips(&mut self, id: ComponentId) {
        let atlases = self.component(id).weight_atlases.clone();
        let num_subsections = self.num_subsections;
        let ssq = self.subsection_size_quads;
        let csq = self.component_size_quads;
        for atlas in atlases {
            let dirty = GridRect::new(0, 0, csq, csq);
            let tex = self.atlases.texture_mut(atlas);
            mips::update_mips::<mips::WeightFilter>(
                tex,
                &mut self.uploads,
                atlas,
                (0, 0),
                num_subsections,
                ssq,
                dirty,
            );
            let (sx, sy) = self.atlases.texture(atlas).size();
            self.uploads.add_mip_region(
                atlas,
                0,
                GridRect::new(0, 0, sx as i32 - 1, sy as i32 - 1),
            );
        }
    }

    /// Delete a layer terrain-wide: remove its allocations, renormalize the
    /// surviving blended layers at every texel, and drop the layer entry.
    pub fn delete_layer(&mut self, name: &str) -> Result<()> {
        let Some(layer_idx) = self.layer_index(name) else {
            warn!("delete_layer: no layer named '{}'", name);
            return Ok(());
        };

        for id in self.component_ids() {
            if self.component(id).allocation(name).is_none() {
                continue;
            }
            self.remove_component_allocation(id, name);
            self.renormalize_component_weights(id);
            self.regenerate_component_weight_mips(id);
        }

        self.layers.remove(layer_idx);
        Ok(())
    }

    /// Rescale every texel of a component's blended layers so they sum to
    /// exactly 255. Texels where no blended layer has any weight are left
    /// untouched.
    pub(crate) fn renormalize_component_weights(&mut self, id: ComponentId) {
        let blended: Vec<(AtlasId, usize)> = {
            let comp = self.component(id);
            comp.allocations
                .iter()
                .filter(|a| a.is_allocated())
                .filter(|a| {
                    self.layers
                        .iter()
                        .find(|l| l.name == a.layer)
                        .map(|l| !l.no_weight_blend)
                        .unwrap_or(true)
                })
                .map(|a| (comp.weight_atlases[a.atlas_index as usize], a.channel as usize))
                .collect()
        };
        if blended.is_empty() {
            return;
        }

        let size = self.weight_atlas_size();
        for ti in 0..size * size {
            let mut values: Vec<u32> = blended
                .iter()
                .map(|&(a, c)| self.atlases.texture(a).base_data()[ti].0[c] as u32)
                .collect();
            let sum: u32 = values.iter().sum();
            if sum == 0 || sum == 255 {
                continue;
            }
            for v in values.iter_mut() {
                *v = ((*v * 255 + sum / 2) / sum).min(255);
            }
            let total: u32 = values.iter().sum();
            let diff = 255i32 - total as i32;
            if diff != 0 {
                if diff.unsigned_abs() > super::terrain::WEIGHT_NORMALIZE_THRESHOLD {
                    warn!("component {:?}: weight renormalization residual {}", id, diff);
                }
                if let Some(v) = values.iter_mut().find(|v| {
                    let n = **v as i32 + diff;
                    (0..=255).contains(&n)
                }) {
                    *v = (*v as i32 + diff) as u32;
                }
            }
            for (&(a, c), &v) in blended.iter().zip(values.iter()) {
                self.atlases.texture_mut(a).base_data_mut()[ti].0[c] = v as u8;
            }
        }
    }
}

/// Hard cap on weight atlases per component, 4 channels each.
pub const MAX_WEIGHT_ATLASES_PER_COMPONENT: usize = 8;
