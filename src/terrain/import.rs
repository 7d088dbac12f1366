//! Bulk import of heightmap and layer weight data into a new terrain.
//!
//! Import owns the initial atlas packing: height atlases are shared between
//! neighboring components up to [`MAX_ATLAS_SIZE`], layer weights are
//! consolidated into a normalized blend before channels are allocated.

use log::{info, warn};
use rayon::prelude::*;

use crate::atlas::{AtlasKind, AtlasTexture, MAX_ATLAS_SIZE};
use crate::atlas::texture::pack_normal;
use crate::core::types::Result;
use crate::core::Error;
use crate::edit::interface::{compute_vertex_normals, for_each_texel};
use crate::math::GridRect;
use crate::terrain::component::{Component, ComponentId, LayerAllocation};
use crate::terrain::layer::LayerInfo;
use crate::terrain::mips::{self, HeightFilter};
use crate::terrain::terrain::WEIGHT_NORMALIZE_THRESHOLD;
use crate::terrain::{Terrain, TerrainDescriptor};

impl Terrain {
    /// Build a terrain from a dense heightmap and per-layer weight maps.
    ///
    /// `heights` and each layer's weights are row-major `verts_x` by
    /// `verts_y` grids whose quad counts must be whole multiples of the
    /// component size. Blended layers are consolidated so every vertex sums
    /// to 255, with earlier layers taking precedence; layers that end up
    /// with no weight on a component get no channel there.
    pub fn import(
        desc: &TerrainDescriptor,
        verts_x: i32,
        verts_y: i32,
        heights: &[u16],
        layers: Vec<(LayerInfo, Vec<u8>)>,
    ) -> Result<Terrain> {
        let csq = desc.component_size_quads;
        if verts_x < 2 || verts_y < 2 || (verts_x - 1) % csq != 0 || (verts_y - 1) % csq != 0 {
            return Err(Error::MalformedImport {
                expected: format!("a whole number of {}-quad components per axis", csq),
                actual: format!("{}x{} vertices", verts_x, verts_y),
            });
        }
        let num_verts = (verts_x * verts_y) as usize;
        if heights.len() != num_verts {
            return Err(Error::MalformedImport {
                expected: format!("{} height samples", num_verts),
                actual: format!("{}", heights.len()),
            });
        }
        for (layer, data) in &layers {
            if data.len() != num_verts {
                return Err(Error::MalformedImport {
                    expected: format!("{} weight samples for layer '{}'", num_verts, layer.name),
                    actual: format!("{}", data.len()),
                });
            }
        }

        let mut terrain = Terrain::new(desc)?;
        let comps_x = (verts_x - 1) / csq;
        let comps_y = (verts_y - 1) / csq;
        info!(
            "importing {}x{} vertices as {}x{} components, {} layers",
            verts_x,
            verts_y,
            comps_x,
            comps_y,
            layers.len()
        );
        for (layer, _) in &layers {
            terrain.add_layer(layer.clone());
        }

        terrain.create_imported_components(comps_x, comps_y);

        let full = GridRect::new(0, 0, verts_x - 1, verts_y - 1);
        terrain.write_imported_heights(full, heights);
        terrain.write_imported_weights(full, &layers)?;

        for id in terrain.component_ids() {
            terrain.regenerate_component_height_mips(id);
        }

        // collision is derived per component and parallelizes cleanly
        let ids = terrain.component_ids();
        let fields: Vec<_> = ids
            .par_iter()
            .map(|&id| (id, terrain.build_collision_field(id)))
            .collect();
        for (id, field) in fields {
            terrain.collision.insert(id, field);
        }

        Ok(terrain)
    }

    /// Lay out the component grid over shared height atlases.
    fn create_imported_components(&mut self, comps_x: i32, comps_y: i32) {
        let csq = self.component_size_quads;
        let csv = self.component_size_verts();
        let per_atlas = ((MAX_ATLAS_SIZE / csv as usize) as i32).max(1);

        let groups_x = (comps_x + per_atlas - 1) / per_atlas;
        let groups_y = (comps_y + per_atlas - 1) / per_atlas;
        for gy in 0..groups_y {
            for gx in 0..groups_x {
                let gw = (comps_x - gx * per_atlas).min(per_atlas);
                let gh = (comps_y - gy * per_atlas).min(per_atlas);
                let size_x = ((gw * csv) as usize).next_power_of_two();
                let size_y = ((gh * csv) as usize).next_power_of_two();
                let atlas = self
                    .atlases
                    .insert(AtlasTexture::new(size_x, size_y), AtlasKind::Height);
                for ly in 0..gh {
                    for lx in 0..gw {
                        let cx = gx * per_atlas + lx;
                        let cy = gy * per_atlas + ly;
                        let id = self.insert_component(Component {
                            base_x: cx * csq,
                            base_y: cy * csq,
                            height_atlas: atlas,
                            height_offset_x: lx * csv,
                            height_offset_y: ly * csv,
                            weight_atlases: Vec::new(),
                            allocations: Vec::new(),
                            height_range: (u16::MAX, u16::MIN),
                        });
                        self.register_component_pos(cx, cy, id);
                    }
                }
            }
        }
    }

    /// Write heights and globally-derived normals into every component block.
    fn write_imported_heights(&mut self, full: GridRect, heights: &[u16]) {
        let normals = compute_vertex_normals(full, heights, self.draw_scale);
        let ssq = self.subsection_size_quads;
        let num_sub = self.num_subsections;
        let csq = self.component_size_quads;
        for id in self.component_ids() {
            let (base, offset, atlas) = {
                let c = self.component(id);
                ((c.base_x, c.base_y), (c.height_offset_x, c.height_offset_y), c.height_atlas)
            };
            let region = self.component(id).vertex_region(csq);
            let mut range = (u16::MAX, u16::MIN);
            let tex = self.atlases.texture_mut(atlas);
            for_each_texel(base, region, ssq, num_sub, offset, |wx, wy, tx, ty| {
                let i = full.index_of(wx, wy);
                let h = heights[i];
                let n = normals[i].normalize_or_zero();
                *tex.texel_mut(0, tx as usize, ty as usize) =
                    crate::atlas::Texel::from_height(h, pack_normal(n.x), pack_normal(n.y));
                range.0 = range.0.min(h);
                range.1 = range.1.max(h);
            });
            self.component_mut(id).height_range = range;
        }
    }

    /// Consolidate, allocate, and write layer weights component by component.
    fn write_imported_weights(
        &mut self,
        full: GridRect,
        layers: &[(LayerInfo, Vec<u8>)],
    ) -> Result<()> {
        let ssq = self.subsection_size_quads;
        let num_sub = self.num_subsections;
        let csq = self.component_size_quads;
        for id in self.component_ids() {
            let region = self.component(id).vertex_region(csq);

            // local copies per layer, blended ones consolidated in place
            let mut local: Vec<Vec<u8>> = layers
                .iter()
                .map(|(_, data)| region.iter().map(|(x, y)| data[full.index_of(x, y)]).collect())
                .collect();
            let blended: Vec<usize> = layers
                .iter()
                .enumerate()
                .filter(|(_, (l, _))| !l.no_weight_blend)
                .map(|(i, _)| i)
                .collect();
            consolidate_blended_weights(id, &mut local, &blended, region.area());

            // layers with no weight anywhere on this component get no channel
            let surviving: Vec<usize> = (0..layers.len())
                .filter(|&i| local[i].iter().any(|&v| v != 0))
                .collect();
            for &i in &surviving {
                self.component_mut(id)
                    .allocations
                    .push(LayerAllocation::unallocated(&layers[i].0.name));
            }
            self.reallocate_weightmaps(id)?;

            let base = {
                let c = self.component(id);
                (c.base_x, c.base_y)
            };
            for &i in &surviving {
                let Some((atlas, ch)) = self.component(id).resolve(&layers[i].0.name) else {
                    return Err(Error::InconsistentLayerState(format!(
                        "layer '{}' unallocated after import on component {:?}",
                        layers[i].0.name, id
                    )));
                };
                let w = self.atlases.texture(atlas).size().0;
                let data = &local[i];
                let tex = self.atlases.texture_mut(atlas);
                for_each_texel(base, region, ssq, num_sub, (0, 0), |wx, wy, tx, ty| {
                    tex.base_data_mut()[ty as usize * w + tx as usize].0[ch] =
                        data[region.index_of(wx, wy)];
                });
            }
            self.regenerate_component_weight_mips(id);
        }
        Ok(())
    }

    /// Full height mip chain for one component's block, with every level
    /// queued for upload.
    pub(crate) fn regenerate_component_height_mips(&mut self, id: ComponentId) {
        let csq = self.component_size_quads;
        let (offset, atlas) = {
            let c = self.component(id);
            ((c.height_offset_x, c.height_offset_y), c.height_atlas)
        };
        let num_sub = self.num_subsections;
        let ssq = self.subsection_size_quads;
        let tex = self.atlases.texture_mut(atlas);
        mips::update_mips::<HeightFilter>(
            tex,
            &mut self.uploads,
            atlas,
            offset,
            num_sub,
            ssq,
            GridRect::new(0, 0, csq, csq),
        );
        let (sx, sy) = self.atlases.texture(atlas).size();
        self.uploads
            .add_mip_region(atlas, 0, GridRect::new(0, 0, sx as i32 - 1, sy as i32 - 1));
    }

    /// Read a region of heights, zero-filled over missing components.
    pub fn export_height(&self, region: GridRect) -> Result<Vec<u16>> {
        let mut out = vec![0u16; region.area()];
        self.get_height_data(region, &mut out)?;
        Ok(out)
    }

    /// Read a region of one layer's weights, zero-filled where absent.
    pub fn export_weights(&self, layer: &str, region: GridRect) -> Result<Vec<u8>> {
        let mut out = vec![0u8; region.area()];
        self.get_weight_data(layer, region, &mut out)?;
        Ok(out)
    }
}

/// Give earlier layers precedence: each layer scales the ones below it by
/// the fraction of weight it leaves, then every vertex is normalized to a
/// 255 sum.
fn consolidate_blended_weights(
    id: ComponentId,
    local: &mut [Vec<u8>],
    blended: &[usize],
    area: usize,
) {
    if blended.is_empty() {
        return;
    }
    for vi in 0..area {
        let mut vals: Vec<u32> = blended.iter().map(|&i| local[i][vi] as u32).collect();
        for i in 0..vals.len() {
            let cur = vals[i];
            for below in vals.iter_mut().skip(i + 1) {
                *below = *below * (255 - cur) / 255;
            }
        }
        let sum: u32 = vals.iter().sum();
        if sum > 0 && sum != 255 {
            for v in vals.iter_mut() {
                *v = ((*v * 255 + sum / 2) / sum).min(255);
            }
            let diff = 255i32 - vals.iter().sum::<u32>() as i32;
            if diff != 0 {
                if diff.unsigned_abs() > WEIGHT_NORMALIZE_THRESHOLD {
                    warn!("component {:?}: import weight residual {}", id, diff);
                }
                if let Some(v) = vals
                    .iter_mut()
                    .find(|v| (0..=255).contains(&(**v as i32 + diff)))
                {
                    *v = (*v as i32 + diff) as u32;
                }
            }
        }
        for (&i, &v) in blended.iter().zip(vals.iter()) {
            local[i][vi] = v as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn desc() -> TerrainDescriptor {
        TerrainDescriptor {
            component_size_quads: 14,
            num_subsections: 2,
            subsection_size_quads: 7,
            draw_scale: Vec3::new(1.0, 1.0, 128.0),
        }
    }

    fn flat(verts: i32, h: u16) -> Vec<u16> {
        vec![h; (verts * verts) as usize]
    }

    #[test]
    fn test_import_validates_dimensions() {
        // 30 verts is not a whole number of 14-quad components
        let err = Terrain::import(&desc(), 30, 30, &flat(30, 0), Vec::new());
        assert!(matches!(err, Err(Error::MalformedImport { .. })));

        let err = Terrain::import(&desc(), 29, 29, &[0u16; 10], Vec::new());
        assert!(matches!(err, Err(Error::MalformedImport { .. })));

        let err = Terrain::import(
            &desc(),
            29,
            29,
            &flat(29, 0),
            vec![(LayerInfo::new("grass"), vec![255u8; 3])],
        );
        assert!(matches!(err, Err(Error::MalformedImport { .. })));
    }

    #[test]
    fn test_import_height_round_trip() {
        let full = GridRect::new(0, 0, 28, 28);
        let heights: Vec<u16> = full.iter().map(|(x, y)| (20000 + x * 100 + y * 3) as u16).collect();
        let t = Terrain::import(&desc(), 29, 29, &heights, Vec::new()).unwrap();

        assert_eq!(t.component_count(), 4);
        assert_eq!(t.export_height(full).unwrap(), heights);
    }

    #[test]
    fn test_import_packs_components_into_one_atlas() {
        let t = Terrain::import(&desc(), 29, 29, &flat(29, 32768), Vec::new()).unwrap();
        assert_eq!(t.atlases.ids_of_kind(AtlasKind::Height).len(), 1);

        let a = t.component(t.component_at(0, 0).unwrap());
        let b = t.component(t.component_at(1, 0).unwrap());
        let c = t.component(t.component_at(0, 1).unwrap());
        assert_eq!(a.height_atlas, b.height_atlas);
        assert_eq!((a.height_offset_x, a.height_offset_y), (0, 0));
        assert_eq!((b.height_offset_x, b.height_offset_y), (16, 0));
        assert_eq!((c.height_offset_x, c.height_offset_y), (0, 16));
    }

    #[test]
    fn test_import_writes_normals() {
        let full = GridRect::new(0, 0, 28, 28);
        // a plane rising along x tilts normals away from +x
        let heights: Vec<u16> = full.iter().map(|(x, _)| (20000 + x * 1000) as u16).collect();
        let t = Terrain::import(&desc(), 29, 29, &heights, Vec::new()).unwrap();

        let id = t.component_at(0, 0).unwrap();
        let comp = t.component(id);
        let tex = t.atlases.texture(comp.height_atlas);
        assert!(tex.texel(0, 4, 4).0[2] < 128);
        assert_eq!(comp.height_range, (20000, 20000 + 14 * 1000));
    }

    #[test]
    fn test_import_consolidates_blended_layers() {
        let n = (29 * 29) as usize;
        let layers = vec![
            (LayerInfo::new("grass"), vec![128u8; n]),
            (LayerInfo::new("rock"), vec![255u8; n]),
        ];
        let t = Terrain::import(&desc(), 29, 29, &flat(29, 32768), layers).unwrap();

        let full = GridRect::new(0, 0, 28, 28);
        let grass = t.export_weights("grass", full).unwrap();
        let rock = t.export_weights("rock", full).unwrap();
        // grass keeps 128, rock is scaled by the remaining half
        assert!(grass.iter().all(|&v| v == 128));
        assert!(rock.iter().all(|&v| v == 127));
    }

    #[test]
    fn test_import_drops_fully_covered_layer() {
        let n = (29 * 29) as usize;
        let layers = vec![
            (LayerInfo::new("grass"), vec![255u8; n]),
            (LayerInfo::new("rock"), vec![100u8; n]),
        ];
        let t = Terrain::import(&desc(), 29, 29, &flat(29, 32768), layers).unwrap();

        for id in t.component_ids() {
            assert!(t.component(id).resolve("grass").is_some());
            assert!(t.component(id).resolve("rock").is_none());
        }
        let full = GridRect::new(0, 0, 28, 28);
        assert!(t.export_weights("grass", full).unwrap().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_import_builds_collision_and_uploads() {
        let t = Terrain::import(&desc(), 29, 29, &flat(29, 40000), Vec::new()).unwrap();
        for id in t.component_ids() {
            let field = &t.collision[&id];
            assert_eq!(field.height_at(3, 3), 40000);
        }
        assert!(t.uploads.has_pending());
    }

    #[test]
    fn test_no_weight_blend_layer_imported_raw() {
        let n = (29 * 29) as usize;
        let layers = vec![
            (LayerInfo::new("grass"), vec![200u8; n]),
            (LayerInfo::new("path").with_no_weight_blend(), vec![60u8; n]),
        ];
        let t = Terrain::import(&desc(), 29, 29, &flat(29, 32768), layers).unwrap();

        let full = GridRect::new(0, 0, 28, 28);
        // grass is the only blended layer so it normalizes to full weight
        assert!(t.export_weights("grass", full).unwrap().iter().all(|&v| v == 255));
        assert!(t.export_weights("path", full).unwrap().iter().all(|&v| v == 60));
    }
}
