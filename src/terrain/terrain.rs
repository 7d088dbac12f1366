//! The terrain registry: components, layers, atlases, upload queue.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::atlas::{AtlasKind, AtlasSet, AtlasTexture, Texel, UploadQueue};
use crate::collision::CollisionField;
use crate::core::types::{Result, Vec3};
use crate::core::Error;
use crate::math::GridRect;
use crate::terrain::component::{Component, ComponentId};
use crate::terrain::layer::LayerInfo;

/// Residual magnitude tolerated when snapping weight sums to 255. Anything
/// larger indicates a logic error and is logged.
pub(crate) const WEIGHT_NORMALIZE_THRESHOLD: u32 = 3;

/// Default mip level sampled for collision fields.
pub const DEFAULT_COLLISION_MIP: u8 = 0;

/// Static shape of a terrain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainDescriptor {
    pub component_size_quads: i32,
    pub num_subsections: i32,
    pub subsection_size_quads: i32,
    pub draw_scale: Vec3,
}

/// A tiled heightfield terrain.
///
/// Components are arena-allocated; [`ComponentId`]s stay valid until the
/// component is removed. World vertex coordinates are global; a vertex on a
/// component border is present in both neighbors' atlas blocks.
pub struct Terrain {
    pub component_size_quads: i32,
    pub num_subsections: i32,
    pub subsection_size_quads: i32,
    pub draw_scale: Vec3,
    pub layers: Vec<LayerInfo>,
    pub atlases: AtlasSet,
    pub uploads: UploadQueue,
    pub collision: HashMap<ComponentId, CollisionField>,
    pub collision_mip: u8,
    components: Vec<Option<Component>>,
    component_map: HashMap<(i32, i32), ComponentId>,
}

impl Terrain {
    pub fn new(desc: &TerrainDescriptor) -> Result<Self> {
        if desc.num_subsections < 1 || desc.num_subsections > 3 {
            return Err(Error::DegenerateGeometry(format!(
                "num_subsections must be 1..=3, got {}",
                desc.num_subsections
            )));
        }
        if desc.subsection_size_quads < 1 {
            return Err(Error::DegenerateGeometry(format!(
                "subsection_size_quads must be positive, got {}",
                desc.subsection_size_quads
            )));
        }
        if desc.component_size_quads != desc.num_subsections * desc.subsection_size_quads {
            return Err(Error::DegenerateGeometry(format!(
                "component_size_quads {} != {} subsections of {} quads",
                desc.component_size_quads, desc.num_subsections, desc.subsection_size_quads
            )));
        }
        if desc.draw_scale.x <= 0.0 || desc.draw_scale.y <= 0.0 || desc.draw_scale.z <= 0.0 {
            return Err(Error::DegenerateGeometry(format!(
                "draw_scale must be positive, got {}",
                desc.draw_scale
            )));
        }
        if !((desc.subsection_size_quads + 1) as u32).is_power_of_two() {
            warn!(
                "subsection size {} quads is not 2^n-1; deep mips will use box filtering only",
                desc.subsection_size_quads
            );
        }
        Ok(Self {
            component_size_quads: desc.component_size_quads,
            num_subsections: desc.num_subsections,
            subsection_size_quads: desc.subsection_size_quads,
            draw_scale: desc.draw_scale,
            layers: Vec::new(),
            atlases: AtlasSet::new(),
            uploads: UploadQueue::new(),
            collision: HashMap::new(),
            collision_mip: DEFAULT_COLLISION_MIP,
            components: Vec::new(),
            component_map: HashMap::new(),
        })
    }

    pub fn descriptor(&self) -> TerrainDescriptor {
        TerrainDescriptor {
            component_size_quads: self.component_size_quads,
            num_subsections: self.num_subsections,
            subsection_size_quads: self.subsection_size_quads,
            draw_scale: self.draw_scale,
        }
    }

    /// Edge of a component's data block in texels, subsection borders
    /// duplicated.
    pub fn component_size_verts(&self) -> i32 {
        self.num_subsections * (self.subsection_size_quads + 1)
    }

    /// Edge of a weight atlas in texels: one component block, rounded up to
    /// a power of two for the mip chain.
    pub fn weight_atlas_size(&self) -> usize {
        (self.component_size_verts() as usize).next_power_of_two()
    }

    /// Create a flat component at a component grid position, with its own
    /// height atlas.
    pub fn add_component(&mut self, cx: i32, cy: i32) -> Result<ComponentId> {
        if self.component_map.contains_key(&(cx, cy)) {
            return Err(Error::Allocation(format!(
                "component ({}, {}) already exists",
                cx, cy
            )));
        }
        let size = self.weight_atlas_size();
        let mut tex = AtlasTexture::new(size, size);
        // flat ground at mid height, straight-up normal
        let flat = Texel::from_height(32768, 128, 128);
        for m in 0..tex.num_mips() {
            let (mx, my) = tex.mip_size(m);
            for y in 0..my {
                for x in 0..mx {
                    *tex.texel_mut(m, x, y) = flat;
                }
            }
        }
        let atlas = self.atlases.insert(tex, AtlasKind::Height);

        let id = self.insert_component(Component {
            base_x: cx * self.component_size_quads,
            base_y: cy * self.component_size_quads,
            height_atlas: atlas,
            height_offset_x: 0,
            height_offset_y: 0,
            weight_atlases: Vec::new(),
            allocations: Vec::new(),
            height_range: (32768, 32768),
        });
        self.component_map.insert((cx, cy), id);
        Ok(id)
    }

    pub(crate) fn insert_component(&mut self, comp: Component) -> ComponentId {
        for (i, slot) in self.components.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(comp);
                return ComponentId(i as u32);
            }
        }
        self.components.push(Some(comp));
        ComponentId((self.components.len() - 1) as u32)
    }

    pub(crate) fn register_component_pos(&mut self, cx: i32, cy: i32, id: ComponentId) {
        self.component_map.insert((cx, cy), id);
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        match &self.components[id.0 as usize] {
            Some(c) => c,
            None => panic!("stale component id {:?}", id),
        }
    }

    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        match &mut self.components[id.0 as usize] {
            Some(c) => c,
            None => panic!("stale component id {:?}", id),
        }
    }

    /// Component at a component grid position.
    pub fn component_at(&self, cx: i32, cy: i32) -> Option<ComponentId> {
        self.component_map.get(&(cx, cy)).copied()
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| ComponentId(i as u32)))
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.components.iter().filter(|c| c.is_some()).count()
    }

    /// Vertex extent covered by all components, if any exist.
    pub fn extent(&self) -> Option<GridRect> {
        let mut it = self.components.iter().flatten();
        let first = it.next()?;
        let mut rect = first.vertex_region(self.component_size_quads);
        for c in it {
            rect = rect.union(&c.vertex_region(self.component_size_quads));
        }
        Some(rect)
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    pub fn add_layer(&mut self, layer: LayerInfo) {
        if self.layer_index(&layer.name).is_some() {
            warn!("layer '{}' already exists", layer.name);
            return;
        }
        self.layers.push(layer);
    }

    /// Remove a component, releasing its atlas claims.
    pub fn remove_component(&mut self, id: ComponentId) {
        let comp = match self.components[id.0 as usize].take() {
            Some(c) => c,
            None => return,
        };
        for atlas in &comp.weight_atlases {
            if self.atlases.contains(*atlas) {
                for ch in self.atlases.usage(*atlas).channels_of(id) {
                    self.atlases.texture_mut(*atlas).zero_channel(ch);
                    self.atlases.usage_mut(*atlas).release(ch);
                }
                self.drop_weight_atlas_if_empty(*atlas);
            }
        }
        let height_shared = self
            .components
            .iter()
            .flatten()
            .any(|c| c.height_atlas == comp.height_atlas);
        if !height_shared {
            self.atlases.remove(comp.height_atlas);
            self.uploads.retire_atlas(comp.height_atlas);
        }
        self.component_map
            .remove(&comp.grid_pos(self.component_size_quads));
        self.collision.remove(&id);
    }

    /// Re-derive every weight atlas's channel ownership table from component
    /// allocation lists. Differences are repaired and logged; two components
    /// claiming the same channel cannot be repaired.
    pub fn rebuild_channel_usage(&mut self) -> Result<()> {
        let weight_atlases = self.atlases.ids_of_kind(AtlasKind::Weight);
        let old: HashMap<_, _> = weight_atlases
            .iter()
            .map(|&a| (a, self.atlases.usage(a).clone()))
            .collect();
        for &a in &weight_atlases {
            self.atlases.usage_mut(a).clear();
        }

        for id in self.component_ids() {
            let claims: Vec<_> = self
                .component(id)
                .allocations
                .iter()
                .filter(|al| al.is_allocated())
                .map(|al| {
                    (
                        self.component(id).weight_atlases[al.atlas_index as usize],
                        al.channel as usize,
                        al.layer.clone(),
                    )
                })
                .collect();
            for (atlas, channel, layer) in claims {
                if let Some(other) = self.atlases.usage(atlas).owner(channel) {
                    if other != id {
                        return Err(Error::InconsistentLayerState(format!(
                            "components {:?} and {:?} both claim channel {} of atlas {:?} ('{}')",
                            other, id, channel, atlas, layer
                        )));
                    }
                }
                self.atlases.usage_mut(atlas).claim(channel, id);
            }
        }

        for &a in &weight_atlases {
            if old.get(&a) != Some(self.atlases.usage(a)) {
                warn!("channel usage of atlas {:?} disagreed with allocations; repaired", a);
            }
        }
        Ok(())
    }
}
