//! Incremental mip synthesis for atlas component blocks.
//!
//! Subsection borders are duplicated in the base level, so each subsection is
//! filtered independently: a mip texel is the bilinear sample of the previous
//! mip at its fractional position within the same subsection. Once a whole
//! subsection fits in a single texel, filtering degrades to a plain 2x2 box
//! down to the deepest level. Every touched rect is recorded in the upload
//! queue at its exact mip.

use log::warn;

use crate::atlas::{AtlasId, AtlasTexture, Texel, UploadQueue};
use crate::math::coords;
use crate::math::GridRect;

/// How one texel kind is interpolated when building mips.
pub trait TexelFilter {
    fn bilerp(p00: Texel, p10: Texel, p01: Texel, p11: Texel, fx: f32, fy: f32) -> Texel;
    fn average(p: [Texel; 4]) -> Texel;
}

fn lerp_byte(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

fn bilerp_f32(v00: f32, v10: f32, v01: f32, v11: f32, fx: f32, fy: f32) -> f32 {
    let a = v00 + (v10 - v00) * fx;
    let b = v01 + (v11 - v01) * fx;
    a + (b - a) * fy
}

/// Height texels: R/G recombine into a 16-bit height which is interpolated
/// as one value; the encoded normal bytes in B/A are interpolated directly.
pub struct HeightFilter;

impl TexelFilter for HeightFilter {
    fn bilerp(p00: Texel, p10: Texel, p01: Texel, p11: Texel, fx: f32, fy: f32) -> Texel {
        let h = bilerp_f32(
            p00.height() as f32,
            p10.height() as f32,
            p01.height() as f32,
            p11.height() as f32,
            fx,
            fy,
        )
        .round()
        .clamp(0.0, 65535.0) as u16;
        let nx = lerp_byte(lerp_byte(p00.0[2], p10.0[2], fx), lerp_byte(p01.0[2], p11.0[2], fx), fy);
        let ny = lerp_byte(lerp_byte(p00.0[3], p10.0[3], fx), lerp_byte(p01.0[3], p11.0[3], fx), fy);
        Texel::from_height(h, nx, ny)
    }

    fn average(p: [Texel; 4]) -> Texel {
        let h = ((p[0].height() as u32 + p[1].height() as u32 + p[2].height() as u32 + p[3].height() as u32) >> 2) as u16;
        let nx = ((p[0].0[2] as u32 + p[1].0[2] as u32 + p[2].0[2] as u32 + p[3].0[2] as u32) >> 2) as u8;
        let ny = ((p[0].0[3] as u32 + p[1].0[3] as u32 + p[2].0[3] as u32 + p[3].0[3] as u32) >> 2) as u8;
        Texel::from_height(h, nx, ny)
    }
}

/// Weight texels: four independent byte channels.
pub struct WeightFilter;

impl TexelFilter for WeightFilter {
    fn bilerp(p00: Texel, p10: Texel, p01: Texel, p11: Texel, fx: f32, fy: f32) -> Texel {
        let mut out = Texel::default();
        for c in 0..4 {
            out.0[c] = lerp_byte(
                lerp_byte(p00.0[c], p10.0[c], fx),
                lerp_byte(p01.0[c], p11.0[c], fx),
                fy,
            );
        }
        out
    }

    fn average(p: [Texel; 4]) -> Texel {
        let mut out = Texel::default();
        for c in 0..4 {
            out.0[c] = ((p[0].0[c] as u32 + p[1].0[c] as u32 + p[2].0[c] as u32 + p[3].0[c] as u32) >> 2) as u8;
        }
        out
    }
}

/// Update the mip chain of one component block after its base level changed
/// inside `dirty` (component-local vertex coordinates, inclusive).
pub fn update_mips<F: TexelFilter>(
    texture: &mut AtlasTexture,
    uploads: &mut UploadQueue,
    atlas: AtlasId,
    block_offset: (i32, i32),
    num_subsections: i32,
    subsection_size_quads: i32,
    dirty: GridRect,
) {
    let ssq = subsection_size_quads;
    let csq = num_subsections * ssq;
    let dirty = match dirty.intersect(&GridRect::new(0, 0, csq, csq)) {
        Some(r) => r,
        None => return,
    };

    let (sx1, sx2) = coords::subsection_range(dirty.x1, dirty.x2, ssq, num_subsections);
    let (sy1, sy2) = coords::subsection_range(dirty.y1, dirty.y2, ssq, num_subsections);

    for sy in sy1..=sy2 {
        for sx in sx1..=sx2 {
            let Some((lx1, lx2)) = coords::subsection_local_range(sx, ssq, dirty.x1, dirty.x2)
            else {
                continue;
            };
            let Some((ly1, ly2)) = coords::subsection_local_range(sy, ssq, dirty.y1, dirty.y2)
            else {
                continue;
            };
            update_subsection_mips::<F>(
                texture,
                uploads,
                atlas,
                block_offset,
                ssq,
                (sx, sy),
                GridRect::new(lx1 - sx * ssq, ly1 - sy * ssq, lx2 - sx * ssq, ly2 - sy * ssq),
            );
        }
    }

    update_box_tail::<F>(texture, uploads, atlas, block_offset, num_subsections, ssq);
}

/// Walk the whole-subsection mips of one subsection, projecting the dirty
/// rect down level by level.
fn update_subsection_mips<F: TexelFilter>(
    texture: &mut AtlasTexture,
    uploads: &mut UploadQueue,
    atlas: AtlasId,
    block_offset: (i32, i32),
    ssq: i32,
    (sx, sy): (i32, i32),
    sub_dirty: GridRect,
) {
    let mut prev_quads = ssq;
    let mut prev = sub_dirty;
    let mut mip = 1usize;
    loop {
        let mip_verts = (ssq + 1) >> mip;
        let quads = mip_verts - 1;
        if quads <= 0 {
            break;
        }
        if mip >= texture.num_mips() {
            warn!("mip chain exhausted before subsection collapsed; atlas {:?}", atlas);
            break;
        }

        // project the previous level's dirty rect through the size ratio
        let mx1 = (quads * prev.x1) / prev_quads;
        let my1 = (quads * prev.y1) / prev_quads;
        let mx2 = ((quads * prev.x2 + prev_quads - 1) / prev_quads).min(quads);
        let my2 = ((quads * prev.y2 + prev_quads - 1) / prev_quads).min(quads);

        let prev_origin_x = (block_offset.0 >> (mip - 1)) + sx * ((ssq + 1) >> (mip - 1));
        let prev_origin_y = (block_offset.1 >> (mip - 1)) + sy * ((ssq + 1) >> (mip - 1));
        let cur_origin_x = (block_offset.0 >> mip) + sx * mip_verts;
        let cur_origin_y = (block_offset.1 >> mip) + sy * mip_verts;

        let (prev_data, cur_data, prev_w, cur_w) = texture.mip_pair_mut(mip);
        for y in my1..=my2 {
            for x in mx1..=mx2 {
                let fx = (prev_quads * x) as f32 / quads as f32;
                let fy = (prev_quads * y) as f32 / quads as f32;
                let ix = (fx.floor() as i32).min(prev_quads - 1).max(0);
                let iy = (fy.floor() as i32).min(prev_quads - 1).max(0);
                let tx = fx - ix as f32;
                let ty = fy - iy as f32;
                let at = |px: i32, py: i32| {
                    prev_data[((prev_origin_y + py) as usize) * prev_w + (prev_origin_x + px) as usize]
                };
                let out = F::bilerp(
                    at(ix, iy),
                    at(ix + 1, iy),
                    at(ix, iy + 1),
                    at(ix + 1, iy + 1),
                    tx,
                    ty,
                );
                cur_data[((cur_origin_y + y) as usize) * cur_w + (cur_origin_x + x) as usize] = out;
            }
        }

        uploads.add_mip_region(
            atlas,
            mip as u8,
            GridRect::new(
                cur_origin_x + mx1,
                cur_origin_y + my1,
                cur_origin_x + mx2,
                cur_origin_y + my2,
            ),
        );

        prev_quads = quads;
        prev = GridRect::new(mx1, my1, mx2, my2);
        mip += 1;
    }
}

/// Box-filter the levels past the last whole-subsection mip. Blocks are at
/// most `num_subsections` texels wide here, so the whole block is refreshed.
fn update_box_tail<F: TexelFilter>(
    texture: &mut AtlasTexture,
    uploads: &mut UploadQueue,
    atlas: AtlasId,
    block_offset: (i32, i32),
    num_subsections: i32,
    ssq: i32,
) {
    let csv = num_subsections * (ssq + 1);
    let mut tail_mip = 1usize;
    while ((ssq + 1) >> tail_mip) - 1 > 0 {
        tail_mip += 1;
    }

    for mip in tail_mip..texture.num_mips() {
        let bx1 = block_offset.0 >> mip;
        let by1 = block_offset.1 >> mip;
        let bx2 = (block_offset.0 + csv - 1) >> mip;
        let by2 = (block_offset.1 + csv - 1) >> mip;

        let (prev_data, cur_data, prev_w, cur_w) = texture.mip_pair_mut(mip);
        let prev_h = prev_data.len() / prev_w;
        for y in by1..=by2 {
            for x in bx1..=bx2 {
                let sample = |px: usize, py: usize| {
                    prev_data[py.min(prev_h - 1) * prev_w + px.min(prev_w - 1)]
                };
                let (px, py) = ((x as usize) * 2, (y as usize) * 2);
                let out = F::average([
                    sample(px, py),
                    sample(px + 1, py),
                    sample(px, py + 1),
                    sample(px + 1, py + 1),
                ]);
                cur_data[(y as usize) * cur_w + x as usize] = out;
            }
        }
        uploads.add_mip_region(atlas, mip as u8, GridRect::new(bx1, by1, bx2, by2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasKind, AtlasSet};

    const NUM_SUB: i32 = 2;
    const SSQ: i32 = 7;
    const CSQ: i32 = NUM_SUB * SSQ;
    const CSV: usize = (NUM_SUB * (SSQ + 1)) as usize; // 16

    fn height_atlas(height: impl Fn(usize, usize) -> u16) -> (AtlasSet, AtlasId) {
        let mut set = AtlasSet::new();
        let mut tex = AtlasTexture::new(CSV, CSV);
        for y in 0..CSV {
            for x in 0..CSV {
                *tex.texel_mut(0, x, y) = Texel::from_height(height(x, y), 128, 128);
            }
        }
        let id = set.insert(tex, AtlasKind::Height);
        (set, id)
    }

    fn full_update(set: &mut AtlasSet, id: AtlasId, uploads: &mut UploadQueue) {
        update_mips::<HeightFilter>(
            set.texture_mut(id),
            uploads,
            id,
            (0, 0),
            NUM_SUB,
            SSQ,
            GridRect::new(0, 0, CSQ, CSQ),
        );
    }

    #[test]
    fn test_constant_field_stays_constant() {
        let (mut set, id) = height_atlas(|_, _| 12345);
        let mut uploads = UploadQueue::new();
        full_update(&mut set, id, &mut uploads);

        let tex = set.texture(id);
        for mip in 1..tex.num_mips() {
            let (mw, mh) = tex.mip_size(mip);
            for y in 0..mh {
                for x in 0..mw {
                    assert_eq!(tex.texel(mip, x, y).height(), 12345, "mip {} ({},{})", mip, x, y);
                }
            }
        }
    }

    #[test]
    fn test_mip1_endpoints_match_base() {
        // bilinear filtering keeps subsection corner samples exact
        let (mut set, id) = height_atlas(|x, _| (x as u16) * 100);
        let mut uploads = UploadQueue::new();
        full_update(&mut set, id, &mut uploads);

        let tex = set.texture(id);
        // subsection 0 spans base texels 0..=7; its mip1 block spans 0..=3
        assert_eq!(tex.texel(1, 0, 0).height(), tex.texel(0, 0, 0).height());
        assert_eq!(tex.texel(1, 3, 0).height(), tex.texel(0, 7, 0).height());
        // subsection 1 spans base texels 8..=15; its mip1 block spans 4..=7
        assert_eq!(tex.texel(1, 4, 0).height(), tex.texel(0, 8, 0).height());
        assert_eq!(tex.texel(1, 7, 0).height(), tex.texel(0, 15, 0).height());
    }

    #[test]
    fn test_partial_update_matches_full_regeneration() {
        let (mut set, id) = height_atlas(|x, y| ((x * 37 + y * 111) % 4000) as u16 + 30000);
        let mut uploads = UploadQueue::new();
        full_update(&mut set, id, &mut uploads);

        // poke one base texel, then update with a tight dirty rect
        set.texture_mut(id).texel_mut(0, 5, 5).set_height(60000);
        update_mips::<HeightFilter>(
            set.texture_mut(id),
            &mut uploads,
            id,
            (0, 0),
            NUM_SUB,
            SSQ,
            GridRect::point(5, 5),
        );

        // rebuild a copy from scratch and compare every mip texel
        let mut reference = set.texture(id).clone();
        let mut scratch = UploadQueue::new();
        update_mips::<HeightFilter>(
            &mut reference,
            &mut scratch,
            id,
            (0, 0),
            NUM_SUB,
            SSQ,
            GridRect::new(0, 0, CSQ, CSQ),
        );
        let tex = set.texture(id);
        for mip in 1..tex.num_mips() {
            assert_eq!(tex.mip_data(mip), reference.mip_data(mip), "mip {}", mip);
        }
    }

    #[test]
    fn test_regeneration_is_idempotent() {
        let (mut set, id) = height_atlas(|x, y| ((x * 57 + y * 13) % 9000) as u16);
        let mut uploads = UploadQueue::new();
        full_update(&mut set, id, &mut uploads);
        let snapshot = set.texture(id).clone();
        full_update(&mut set, id, &mut uploads);
        for mip in 0..snapshot.num_mips() {
            assert_eq!(set.texture(id).mip_data(mip), snapshot.mip_data(mip));
        }
    }

    #[test]
    fn test_upload_regions_recorded_per_mip() {
        let (mut set, id) = height_atlas(|_, _| 100);
        let mut uploads = UploadQueue::new();
        update_mips::<HeightFilter>(
            set.texture_mut(id),
            &mut uploads,
            id,
            (0, 0),
            NUM_SUB,
            SSQ,
            GridRect::point(2, 2),
        );
        let (regions, _) = uploads.drain();
        // mips 1..=2 get a projected rect; mips 3 and 4 are box-tail blocks
        let mips: Vec<u8> = regions.iter().map(|r| r.mip).collect();
        assert!(mips.contains(&1));
        assert!(mips.contains(&(set.texture(id).num_mips() as u8 - 1)));
        // the mip 1 region is a projection of the point, not the whole level
        let r1 = regions.iter().find(|r| r.mip == 1).unwrap();
        assert!(r1.rect.width() <= 2 && r1.rect.height() <= 2);
    }

    #[test]
    fn test_weight_filter_channels_independent() {
        let mut set = AtlasSet::new();
        let mut tex = AtlasTexture::new(CSV, CSV);
        for y in 0..CSV {
            for x in 0..CSV {
                *tex.texel_mut(0, x, y) = Texel([200, 55, 0, 0]);
            }
        }
        let id = set.insert(tex, AtlasKind::Weight);
        let mut uploads = UploadQueue::new();
        update_mips::<WeightFilter>(
            set.texture_mut(id),
            &mut uploads,
            id,
            (0, 0),
            NUM_SUB,
            SSQ,
            GridRect::new(0, 0, CSQ, CSQ),
        );
        let tex = set.texture(id);
        for mip in 1..tex.num_mips() {
            let (mw, mh) = tex.mip_size(mip);
            for y in 0..mh {
                for x in 0..mw {
                    assert_eq!(tex.texel(mip, x, y), Texel([200, 55, 0, 0]));
                }
            }
        }
    }
}
