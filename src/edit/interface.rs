//! Region get/set over the atlas layout.
//!
//! All operations take world vertex regions and fan out over the components
//! they touch. A vertex on a component or subsection border exists as
//! several texel copies; writes update every copy, reads may return any
//! (they are kept identical).

use std::collections::HashMap;

use log::debug;

use crate::core::types::{Result, Vec3};
use crate::core::Error;
use crate::math::{coords, GridRect};
use crate::terrain::component::ComponentId;
use crate::terrain::mips::{self, HeightFilter, WeightFilter};
use crate::terrain::Terrain;

/// Receiver for region reads. Dense and sparse implementations below.
pub trait TerrainStore<T> {
    fn store(&mut self, x: i32, y: i32, value: T);
}

/// Writes into a row-major slice covering `rect`.
pub struct DenseStore<'a, T> {
    pub rect: GridRect,
    pub data: &'a mut [T],
}

impl<T> TerrainStore<T> for DenseStore<'_, T> {
    fn store(&mut self, x: i32, y: i32, value: T) {
        let i = self.rect.index_of(x, y);
        self.data[i] = value;
    }
}

/// Inserts into a map; vertices over missing components are simply absent.
pub struct SparseStore<'a, T>(pub &'a mut HashMap<(i32, i32), T>);

impl<T> TerrainStore<T> for SparseStore<'_, T> {
    fn store(&mut self, x: i32, y: i32, value: T) {
        self.0.insert((x, y), value);
    }
}

/// Visit every texel copy of every vertex of `clip` within one component.
/// The callback gets world vertex coords and absolute atlas texel coords.
pub(crate) fn for_each_texel(
    base: (i32, i32),
    clip: GridRect,
    subsection_size_quads: i32,
    num_subsections: i32,
    offset: (i32, i32),
    mut f: impl FnMut(i32, i32, i32, i32),
) {
    let ssq = subsection_size_quads;
    let (lx1, ly1) = (clip.x1 - base.0, clip.y1 - base.1);
    let (lx2, ly2) = (clip.x2 - base.0, clip.y2 - base.1);
    let (sx1, sx2) = coords::subsection_range(lx1, lx2, ssq, num_subsections);
    let (sy1, sy2) = coords::subsection_range(ly1, ly2, ssq, num_subsections);
    for sy in sy1..=sy2 {
        let Some((cy1, cy2)) = coords::subsection_local_range(sy, ssq, ly1, ly2) else {
            continue;
        };
        for sx in sx1..=sx2 {
            let Some((cx1, cx2)) = coords::subsection_local_range(sx, ssq, lx1, lx2) else {
                continue;
            };
            for ly in cy1..=cy2 {
                let ty = coords::subsection_texel(offset.1, sy, ssq, ly - sy * ssq);
                for lx in cx1..=cx2 {
                    let tx = coords::subsection_texel(offset.0, sx, ssq, lx - sx * ssq);
                    f(base.0 + lx, base.1 + ly, tx, ty);
                }
            }
        }
    }
}

impl Terrain {
    /// Components overlapping a vertex region, with the clipped world rect
    /// each one covers.
    pub(crate) fn component_clips(&self, region: GridRect) -> Vec<(ComponentId, GridRect)> {
        let csq = self.component_size_quads;
        let range = coords::component_range(&region, csq);
        let mut out = Vec::new();
        for cy in range.y1..=range.y2 {
            for cx in range.x1..=range.x2 {
                if let Some(id) = self.component_at(cx, cy) {
                    let comp_rect = self.component(id).vertex_region(csq);
                    if let Some(clip) = comp_rect.intersect(&region) {
                        out.push((id, clip));
                    }
                }
            }
        }
        out
    }

    fn read_region_templ<T>(
        &self,
        region: GridRect,
        store: &mut impl TerrainStore<T>,
        read: impl Fn(&Terrain, ComponentId, i32, i32) -> T,
    ) {
        for (id, clip) in self.component_clips(region) {
            let comp = self.component(id);
            let base = (comp.base_x, comp.base_y);
            let offset = (comp.height_offset_x, comp.height_offset_y);
            let mut samples = Vec::with_capacity(clip.area());
            for_each_texel(
                base,
                clip,
                self.subsection_size_quads,
                self.num_subsections,
                offset,
                |wx, wy, tx, ty| samples.push((wx, wy, tx, ty)),
            );
            for (wx, wy, tx, ty) in samples {
                store.store(wx, wy, read(self, id, tx, ty));
            }
        }
    }

    /// Read heights into a row-major slice covering `region`. Vertices over
    /// missing components are left untouched, so callers zero-fill first.
    pub fn get_height_data(&self, region: GridRect, out: &mut [u16]) -> Result<()> {
        if out.len() != region.area() {
            return Err(Error::MalformedImport {
                expected: format!("{} samples", region.area()),
                actual: format!("{}", out.len()),
            });
        }
        let mut store = DenseStore { rect: region, data: out };
        self.read_region_templ(region, &mut store, |t, id, tx, ty| {
            t.atlases
                .texture(t.component(id).height_atlas)
                .texel(0, tx as usize, ty as usize)
                .height()
        });
        Ok(())
    }

    /// Read heights into a map; missing components contribute nothing.
    pub fn get_height_data_sparse(&self, region: GridRect, out: &mut HashMap<(i32, i32), u16>) {
        let mut store = SparseStore(out);
        self.read_region_templ(region, &mut store, |t, id, tx, ty| {
            t.atlases
                .texture(t.component(id).height_atlas)
                .texel(0, tx as usize, ty as usize)
                .height()
        });
    }

    /// Read one layer's weights; vertices on components without the layer
    /// read as zero.
    pub fn get_weight_data(&self, layer: &str, region: GridRect, out: &mut [u8]) -> Result<()> {
        if out.len() != region.area() {
            return Err(Error::MalformedImport {
                expected: format!("{} samples", region.area()),
                actual: format!("{}", out.len()),
            });
        }
        let mut store = DenseStore { rect: region, data: out };
        self.read_region_templ(region, &mut store, |t, id, tx, ty| {
            match t.component(id).resolve(layer) {
                Some((atlas, ch)) => t.atlases.texture(atlas).texel(0, tx as usize, ty as usize).0[ch],
                None => 0,
            }
        });
        Ok(())
    }

    pub fn get_weight_data_sparse(
        &self,
        layer: &str,
        region: GridRect,
        out: &mut HashMap<(i32, i32), u8>,
    ) {
        let mut store = SparseStore(out);
        self.read_region_templ(region, &mut store, |t, id, tx, ty| {
            match t.component(id).resolve(layer) {
                Some((atlas, ch)) => t.atlases.texture(atlas).texel(0, tx as usize, ty as usize).0[ch],
                None => 0,
            }
        });
    }

    /// Read all layers' weights as layer-count-strided vectors.
    pub fn get_all_weights_sparse(
        &self,
        region: GridRect,
        out: &mut HashMap<(i32, i32), Vec<u8>>,
    ) {
        let layer_names: Vec<String> = self.layers.iter().map(|l| l.name.clone()).collect();
        let mut store = SparseStore(out);
        self.read_region_templ(region, &mut store, |t, id, tx, ty| {
            layer_names
                .iter()
                .map(|name| match t.component(id).resolve(name) {
                    Some((atlas, ch)) => {
                        t.atlases.texture(atlas).texel(0, tx as usize, ty as usize).0[ch]
                    }
                    None => 0,
                })
                .collect()
        });
    }
}

/// Mutating edit operations over a borrowed terrain.
pub struct EditInterface<'a> {
    terrain: &'a mut Terrain,
}

impl<'a> EditInterface<'a> {
    pub fn new(terrain: &'a mut Terrain) -> Self {
        Self { terrain }
    }

    pub fn terrain(&mut self) -> &mut Terrain {
        self.terrain
    }

    /// Write heights over a region, optionally recomputing packed vertex
    /// normals from the written data. Returns the touched components.
    ///
    /// Normals need both neighboring quads, so vertices on the region border
    /// keep their previous normals.
    pub fn set_height_data(
        &mut self,
        region: GridRect,
        data: &[u16],
        calc_normals: bool,
    ) -> Result<Vec<ComponentId>> {
        if data.len() != region.area() {
            return Err(Error::MalformedImport {
                expected: format!("{} samples", region.area()),
                actual: format!("{}", data.len()),
            });
        }
        let normals = if calc_normals {
            Some(compute_vertex_normals(region, data, self.terrain.draw_scale))
        } else {
            None
        };

        let mut touched = Vec::new();
        let clips = self.terrain.component_clips(region);
        let ssq = self.terrain.subsection_size_quads;
        let num_sub = self.terrain.num_subsections;
        for (id, clip) in clips {
            let (base, offset, atlas) = {
                let c = self.terrain.component(id);
                (
                    (c.base_x, c.base_y),
                    (c.height_offset_x, c.height_offset_y),
                    c.height_atlas,
                )
            };

            let mut range = self.terrain.component(id).height_range;
            let mut tex_rect: Option<GridRect> = None;
            {
                let t = &mut *self.terrain;
                let tex = t.atlases.texture_mut(atlas);
                for_each_texel(base, clip, ssq, num_sub, offset, |wx, wy, tx, ty| {
                    let h = data[region.index_of(wx, wy)];
                    let texel = tex.texel_mut(0, tx as usize, ty as usize);
                    texel.set_height(h);
                    if let Some(n) = &normals {
                        let interior = wx > region.x1
                            && wx < region.x2
                            && wy > region.y1
                            && wy < region.y2;
                        if interior {
                            let v = n[region.index_of(wx, wy)].normalize_or_zero();
                            texel.set_normal(
                                crate::atlas::texture::pack_normal(v.x),
                                crate::atlas::texture::pack_normal(v.y),
                            );
                        }
                    }
                    if h < range.0 {
                        range.0 = h;
                    }
                    if h > range.1 {
                        range.1 = h;
                    }
                    let p = GridRect::point(tx, ty);
                    tex_rect = Some(match tex_rect {
                        Some(r) => r.union(&p),
                        None => p,
                    });
                });
            }
            self.terrain.component_mut(id).height_range = range;

            if let Some(r) = tex_rect {
                self.terrain.uploads.add_mip_region(atlas, 0, r);
            }
            let local_dirty = GridRect::new(
                clip.x1 - base.0,
                clip.y1 - base.1,
                clip.x2 - base.0,
                clip.y2 - base.1,
            );
            {
                let t = &mut *self.terrain;
                let tex = t.atlases.texture_mut(atlas);
                mips::update_mips::<HeightFilter>(
                    tex,
                    &mut t.uploads,
                    atlas,
                    (offset.0, offset.1),
                    num_sub,
                    ssq,
                    local_dirty,
                );
            }
            touched.push(id);
        }
        Ok(touched)
    }

    /// Paint one layer's weights over a region. With `blend` set, the other
    /// blended layers are rescaled so every texel still sums to exactly 255,
    /// and layers painted away entirely lose their channel.
    pub fn set_weight_data(
        &mut self,
        layer: &str,
        region: GridRect,
        data: &[u8],
        blend: bool,
    ) -> Result<Vec<ComponentId>> {
        if data.len() != region.area() {
            return Err(Error::MalformedImport {
                expected: format!("{} samples", region.area()),
                actual: format!("{}", data.len()),
            });
        }
        if self.terrain.layer_index(layer).is_none() {
            return Err(Error::InconsistentLayerState(format!(
                "painting unknown layer '{}'",
                layer
            )));
        }

        let mut touched = Vec::new();
        let clips = self.terrain.component_clips(region);
        let ssq = self.terrain.subsection_size_quads;
        let num_sub = self.terrain.num_subsections;
        for (id, clip) in clips {
            // first touch of this layer on the component allocates a channel
            if self.terrain.component(id).allocation(layer).is_none() {
                self.terrain
                    .component_mut(id)
                    .allocations
                    .push(crate::terrain::LayerAllocation::unallocated(layer));
                self.terrain.reallocate_weightmaps(id)?;
                debug!("component {:?}: allocated '{}' on first paint", id, layer);
            }
            let (painted_atlas, painted_ch) = match self.terrain.component(id).resolve(layer) {
                Some(r) => r,
                None => {
                    return Err(Error::InconsistentLayerState(format!(
                        "layer '{}' still unallocated on component {:?}",
                        layer, id
                    )));
                }
            };

            // other blended layers participating in renormalization
            let others: Vec<(String, crate::atlas::AtlasId, usize)> = self
                .terrain
                .component(id)
                .allocations
                .iter()
                .filter(|a| a.is_allocated() && a.layer != layer)
                .filter(|a| {
                    self.terrain
                        .layer_index(&a.layer)
                        .map(|i| !self.terrain.layers[i].no_weight_blend)
                        .unwrap_or(false)
                })
                .map(|a| {
                    (
                        a.layer.clone(),
                        self.terrain.component(id).weight_atlases[a.atlas_index as usize],
                        a.channel as usize,
                    )
                })
                .collect();

            let base = {
                let c = self.terrain.component(id);
                (c.base_x, c.base_y)
            };
            let mut writes: Vec<(i32, i32, i32, i32)> = Vec::with_capacity(clip.area());
            for_each_texel(base, clip, ssq, num_sub, (0, 0), |wx, wy, tx, ty| {
                writes.push((wx, wy, tx, ty));
            });

            for (wx, wy, tx, ty) in writes {
                let mut new = data[region.index_of(wx, wy)] as u32;
                let (txu, tyu) = (tx as usize, ty as usize);
                if blend {
                    let mut vals: Vec<u32> = others
                        .iter()
                        .map(|&(_, a, c)| self.terrain.atlases.texture(a).texel(0, txu, tyu).0[c] as u32)
                        .collect();
                    let other_sum: u32 = vals.iter().sum();
                    if other_sum > 0 {
                        for v in vals.iter_mut() {
                            *v = (((255 - new) * *v + other_sum / 2) / other_sum).min(255);
                        }
                        let total = new + vals.iter().sum::<u32>();
                        let diff = 255i32 - total as i32;
                        if diff != 0 {
                            if diff.unsigned_abs() > 3 {
                                log::warn!("weight blend residual {} at ({}, {})", diff, wx, wy);
                            }
                            let slot = vals
                                .iter_mut()
                                .find(|v| (0..=255).contains(&(**v as i32 + diff)));
                            if let Some(v) = slot {
                                *v = (*v as i32 + diff) as u32;
                            } else {
                                new = (new as i32 + diff).clamp(0, 255) as u32;
                            }
                        }
                    } else {
                        // painting the only weighted layer forces full weight
                        new = 255;
                    }
                    for (&(_, a, c), &v) in others.iter().zip(vals.iter()) {
                        let w = self.terrain.atlases.texture(a).size().0;
                        self.terrain.atlases.texture_mut(a).base_data_mut()[tyu * w + txu].0[c] =
                            v as u8;
                    }
                }
                let w = self.terrain.atlases.texture(painted_atlas).size().0;
                self.terrain
                    .atlases
                    .texture_mut(painted_atlas)
                    .base_data_mut()[tyu * w + txu]
                    .0[painted_ch] = new as u8;
            }

            // a blended layer whose whole channel went to zero is gone
            if blend {
                let mut removed = Vec::new();
                for (name, a, c) in &others {
                    let all_zero = self
                        .terrain
                        .atlases
                        .texture(*a)
                        .base_data()
                        .iter()
                        .all(|t| t.0[*c] == 0);
                    if all_zero {
                        removed.push(name.clone());
                    }
                }
                for name in removed {
                    debug!("component {:?}: layer '{}' painted away", id, name);
                    self.terrain.remove_component_allocation(id, &name);
                }
            }

            self.update_component_weight_region(id, base, clip);
            touched.push(id);
        }
        Ok(touched)
    }

    /// Write all layers at once from layer-count-strided data, with no
    /// blending adjustment. Layers receiving weight on a component that has
    /// no channel for them are allocated first.
    pub fn set_all_weights_data(
        &mut self,
        region: GridRect,
        data: &[u8],
        stride: usize,
    ) -> Result<Vec<ComponentId>> {
        if stride != self.terrain.layers.len() || data.len() != region.area() * stride {
            return Err(Error::MalformedImport {
                expected: format!("{} layers x {} samples", self.terrain.layers.len(), region.area()),
                actual: format!("stride {} len {}", stride, data.len()),
            });
        }
        let layer_names: Vec<String> =
            self.terrain.layers.iter().map(|l| l.name.clone()).collect();

        let mut touched = Vec::new();
        let clips = self.terrain.component_clips(region);
        let ssq = self.terrain.subsection_size_quads;
        let num_sub = self.terrain.num_subsections;
        for (id, clip) in clips {
            let base = {
                let c = self.terrain.component(id);
                (c.base_x, c.base_y)
            };

            // allocate any layer that receives weight here for the first time
            let mut added = false;
            for (li, name) in layer_names.iter().enumerate() {
                if self.terrain.component(id).allocation(name).is_some() {
                    continue;
                }
                let receives = clip
                    .iter()
                    .any(|(x, y)| data[region.index_of(x, y) * stride + li] != 0);
                if receives {
                    self.terrain
                        .component_mut(id)
                        .allocations
                        .push(crate::terrain::LayerAllocation::unallocated(name));
                    added = true;
                }
            }
            if added {
                self.terrain.reallocate_weightmaps(id)?;
            }

            let channels: Vec<Option<(crate::atlas::AtlasId, usize)>> = layer_names
                .iter()
                .map(|name| self.terrain.component(id).resolve(name))
                .collect();

            let mut writes: Vec<(i32, i32, i32, i32)> = Vec::with_capacity(clip.area());
            for_each_texel(base, clip, ssq, num_sub, (0, 0), |wx, wy, tx, ty| {
                writes.push((wx, wy, tx, ty));
            });
            for (wx, wy, tx, ty) in writes {
                let di = region.index_of(wx, wy) * stride;
                for (li, ch) in channels.iter().enumerate() {
                    if let Some((atlas, c)) = *ch {
                        let w = self.terrain.atlases.texture(atlas).size().0;
                        self.terrain.atlases.texture_mut(atlas).base_data_mut()
                            [ty as usize * w + tx as usize]
                            .0[c] = data[di + li];
                    }
                }
            }

            self.update_component_weight_region(id, base, clip);
            touched.push(id);
        }
        Ok(touched)
    }

    /// Remove a layer everywhere. See [`Terrain::delete_layer`].
    pub fn delete_layer(&mut self, name: &str) -> Result<()> {
        self.terrain.delete_layer(name)
    }

    /// Refresh weight mips and mip-0 upload regions for a component after
    /// its weight texels changed inside `clip` (world coords).
    fn update_component_weight_region(&mut self, id: ComponentId, base: (i32, i32), clip: GridRect) {
        let ssq = self.terrain.subsection_size_quads;
        let num_sub = self.terrain.num_subsections;
        let local_dirty = GridRect::new(
            clip.x1 - base.0,
            clip.y1 - base.1,
            clip.x2 - base.0,
            clip.y2 - base.1,
        );
        let atlases = self.terrain.component(id).weight_atlases.clone();
        for atlas in atlases {
            // texel span of the dirty rect, low and high subsection copies
            let (sx1, sx2) = coords::subsection_range(local_dirty.x1, local_dirty.x2, ssq, num_sub);
            let (sy1, sy2) = coords::subsection_range(local_dirty.y1, local_dirty.y2, ssq, num_sub);
            let tx1 = coords::subsection_texel(0, sx1, ssq, local_dirty.x1 - sx1 * ssq);
            let ty1 = coords::subsection_texel(0, sy1, ssq, local_dirty.y1 - sy1 * ssq);
            let tx2 = coords::subsection_texel(0, sx2, ssq, local_dirty.x2 - sx2 * ssq);
            let ty2 = coords::subsection_texel(0, sy2, ssq, local_dirty.y2 - sy2 * ssq);
            self.terrain
                .uploads
                .add_mip_region(atlas, 0, GridRect::new(tx1, ty1, tx2, ty2));

            let t = &mut *self.terrain;
            let tex = t.atlases.texture_mut(atlas);
            mips::update_mips::<WeightFilter>(
                tex,
                &mut t.uploads,
                atlas,
                (0, 0),
                num_sub,
                ssq,
                local_dirty,
            );
        }
    }
}

/// Accumulate per-vertex normals from the two face normals of every quad in
/// the data block. Returned vectors are unnormalized sums.
pub(crate) fn compute_vertex_normals(region: GridRect, data: &[u16], draw_scale: Vec3) -> Vec<Vec3> {
    let w = region.width() as usize;
    let h = region.height() as usize;
    let mut normals = vec![Vec3::ZERO; w * h];
    let z_scale = draw_scale.z / 128.0;
    let vert = |x: usize, y: usize| {
        let height = data[y * w + x] as f32 - 32768.0;
        Vec3::new(
            x as f32 * draw_scale.x,
            y as f32 * draw_scale.y,
            height * z_scale,
        )
    };
    for y in 0..h.saturating_sub(1) {
        for x in 0..w.saturating_sub(1) {
            let v00 = vert(x, y);
            let v10 = vert(x + 1, y);
            let v01 = vert(x, y + 1);
            let v11 = vert(x + 1, y + 1);
            let n1 = (v10 - v00).cross(v01 - v00);
            let n2 = (v01 - v11).cross(v10 - v11);
            normals[y * w + x] += n1;
            normals[y * w + x + 1] += n1 + n2;
            normals[(y + 1) * w + x] += n1 + n2;
            normals[(y + 1) * w + x + 1] += n2;
        }
    }
    normals
}
