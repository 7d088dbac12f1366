//! Per-component collision height fields.
//!
//! Collision samples the height atlas at a configurable mip and collapses
//! the duplicated subsection borders into one uniform grid. The padded
//! variant adds a one-texel apron stitched from the 8 compass neighbors so
//! derivatives at component seams see real data.

use log::debug;

use crate::math::coords;
use crate::terrain::{ComponentId, Terrain};

/// Decimated heights for one component, `size` x `size` vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionField {
    pub size: usize,
    pub mip: u8,
    pub heights: Vec<u16>,
}

impl CollisionField {
    pub fn height_at(&self, x: usize, y: usize) -> u16 {
        self.heights[y * self.size + x]
    }

    /// Bilinear height at a fractional position in field coordinates.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let max = (self.size - 1) as f32;
        let x = x.clamp(0.0, max);
        let y = y.clamp(0.0, max);
        let ix = (x.floor() as usize).min(self.size - 2);
        let iy = (y.floor() as usize).min(self.size - 2);
        let fx = x - ix as f32;
        let fy = y - iy as f32;
        let h = |dx: usize, dy: usize| self.height_at(ix + dx, iy + dy) as f32;
        let a = h(0, 0) + (h(1, 0) - h(0, 0)) * fx;
        let b = h(0, 1) + (h(1, 1) - h(0, 1)) * fx;
        a + (b - a) * fy
    }
}

/// A collision field with a one-vertex apron on every side. `get(-1, -1)`
/// through `get(size, size)` are valid.
#[derive(Debug, Clone)]
pub struct PaddedHeightField {
    pub size: usize,
    heights: Vec<u16>,
}

impl PaddedHeightField {
    pub fn get(&self, x: i32, y: i32) -> u16 {
        debug_assert!(x >= -1 && y >= -1 && x <= self.size as i32 && y <= self.size as i32);
        let stride = self.size + 2;
        self.heights[((y + 1) as usize) * stride + (x + 1) as usize]
    }
}

impl Terrain {
    /// Mip level actually used for collision: clamped to the last mip whose
    /// subsections still have quads.
    fn effective_collision_mip(&self) -> usize {
        let mut mip = self.collision_mip as usize;
        while mip > 0 && ((self.subsection_size_quads + 1) >> mip) < 2 {
            mip -= 1;
        }
        mip
    }

    /// Rebuild one component's collision field from its height atlas.
    pub fn rebuild_collision(&mut self, id: ComponentId) {
        let field = self.build_collision_field(id);
        debug!("component {:?}: collision field {}x{} (mip {})", id, field.size, field.size, field.mip);
        self.collision.insert(id, field);
    }

    /// Sample a component's collision field without storing it.
    pub fn build_collision_field(&self, id: ComponentId) -> CollisionField {
        let mip = self.effective_collision_mip();
        let sub_verts = ((self.subsection_size_quads + 1) >> mip).max(1);
        let sub_quads = (sub_verts - 1).max(1);
        let size = (self.num_subsections * sub_quads + 1) as usize;

        let comp = self.component(id);
        let tex = self.atlases.texture(comp.height_atlas);
        let ox = comp.height_offset_x >> mip;
        let oy = comp.height_offset_y >> mip;

        let mut heights = vec![0u16; size * size];
        for sy in 0..self.num_subsections {
            for sx in 0..self.num_subsections {
                for ly in 0..sub_verts {
                    for lx in 0..sub_verts {
                        let tx = coords::subsection_texel(ox, sx, sub_quads, lx);
                        let ty = coords::subsection_texel(oy, sy, sub_quads, ly);
                        let h = tex.texel(mip, tx as usize, ty as usize).height();
                        let gx = (sx * sub_quads + lx) as usize;
                        let gy = (sy * sub_quads + ly) as usize;
                        heights[gy * size + gx] = h;
                    }
                }
            }
        }
        CollisionField { size, mip: mip as u8, heights }
    }

    /// Build a padded field for a component, stitching the apron from the 8
    /// compass neighbors' collision data. A missing neighbor falls back to
    /// mirroring this component's own row or column just inside that edge.
    pub fn padded_collision_field(&self, id: ComponentId) -> PaddedHeightField {
        let center = match self.collision.get(&id) {
            Some(f) => f.clone(),
            None => self.build_collision_field(id),
        };
        let s = center.size;
        let si = s as i32;
        let stride = s + 2;
        let mut heights = vec![0u16; stride * stride];

        for y in 0..s {
            for x in 0..s {
                heights[(y + 1) * stride + x + 1] = center.height_at(x, y);
            }
        }

        let (cx, cy) = self
            .component(id)
            .grid_pos(self.component_size_quads);
        let neighbor = |dx: i32, dy: i32| -> Option<CollisionField> {
            let nid = self.component_at(cx + dx, cy + dy)?;
            Some(match self.collision.get(&nid) {
                Some(f) => f.clone(),
                None => self.build_collision_field(nid),
            })
        };

        // neighbor fields share their border row with ours, so the texel one
        // step past our edge is their index 1 (or s - 2 from the far side)
        let mirror = |v: i32| -> i32 {
            if v < 0 { 1 } else if v >= si { si - 2 } else { v }
        };
        let from_neighbor = |v: i32| -> usize {
            if v < 0 { s - 2 } else if v >= si { 1 } else { v as usize }
        };

        for py in -1..=si {
            for px in -1..=si {
                let inside_x = px >= 0 && px < si;
                let inside_y = py >= 0 && py < si;
                if inside_x && inside_y {
                    continue;
                }
                let dx = if px < 0 { -1 } else if px >= si { 1 } else { 0 };
                let dy = if py < 0 { -1 } else if py >= si { 1 } else { 0 };
                let h = match neighbor(dx, dy) {
                    Some(f) => {
                        let nx = if dx == 0 { px as usize } else { from_neighbor(px) };
                        let ny = if dy == 0 { py as usize } else { from_neighbor(py) };
                        f.height_at(nx, ny)
                    }
                    None => center.height_at(mirror(px) as usize, mirror(py) as usize),
                };
                heights[((py + 1) as usize) * stride + (px + 1) as usize] = h;
            }
        }

        PaddedHeightField { size: s, heights }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;
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
        t.add_component(1, 0).unwrap();
        t
    }

    #[test]
    fn test_field_matches_heights_at_mip0() {
        let mut t = terrain();
        let region = GridRect::new(0, 0, 14, 14);
        let data: Vec<u16> = region.iter().map(|(x, y)| (30000 + x * 50 + y) as u16).collect();
        EditInterface::new(&mut t)
            .set_height_data(region, &data, false)
            .unwrap();
        let id = t.component_at(0, 0).unwrap();
        let field = t.build_collision_field(id);
        assert_eq!(field.size, 15);
        assert_eq!(field.height_at(0, 0), 30000);
        assert_eq!(field.height_at(14, 0), 30000 + 14 * 50);
        // duplicated subsection border collapsed to one sample
        assert_eq!(field.height_at(7, 7), 30000 + 7 * 50 + 7);
    }

    #[test]
    fn test_decimated_field_size() {
        let mut t = terrain();
        t.collision_mip = 1;
        let id = t.component_at(0, 0).unwrap();
        let field = t.build_collision_field(id);
        assert_eq!(field.mip, 1);
        // (7+1)>>1 = 4 verts per subsection, 3 quads, 2 subsections
        assert_eq!(field.size, 7);
    }

    #[test]
    fn test_padded_field_uses_neighbor() {
        let mut t = terrain();
        // raise the east component uniformly
        let east = GridRect::new(14, 0, 28, 14);
        EditInterface::new(&mut t)
            .set_height_data(east, &vec![50000u16; east.area()], false)
            .unwrap();

        let west_id = t.component_at(0, 0).unwrap();
        let padded = t.padded_collision_field(west_id);
        // apron column just past the shared border reads the east component
        assert_eq!(padded.get(15, 5), 50000);
        // the shared border itself was written by the east edit too
        assert_eq!(padded.get(14, 5), 50000);
    }

    #[test]
    fn test_padded_field_mirrors_missing_neighbor() {
        let mut t = terrain();
        let region = GridRect::new(0, 0, 14, 14);
        let data: Vec<u16> = region.iter().map(|(x, _)| (30000 + x * 100) as u16).collect();
        EditInterface::new(&mut t)
            .set_height_data(region, &data, false)
            .unwrap();

        let id = t.component_at(0, 0).unwrap();
        let padded = t.padded_collision_field(id);
        // no west neighbor: apron mirrors the column just inside the edge
        assert_eq!(padded.get(-1, 3), padded.get(1, 3));
        // no corner neighbor either
        assert_eq!(padded.get(-1, -1), padded.get(1, 1));
    }

    #[test]
    fn test_bilinear_sample() {
        let f = CollisionField { size: 2, mip: 0, heights: vec![0, 100, 0, 100] };
        assert_eq!(f.sample(0.5, 0.5), 50.0);
        assert_eq!(f.sample(1.0, 0.0), 100.0);
    }
}
