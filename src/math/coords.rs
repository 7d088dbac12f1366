//! Vertex / component / subsection / texel coordinate arithmetic.
//!
//! Components tile the world in steps of `component_size_quads` and adjacent
//! components share their boundary vertex row. A vertex at an exact component
//! boundary therefore belongs to both neighbors; range computations account
//! for that by pulling the low edge back by one quad. All arithmetic is exact
//! integer math.

use crate::math::GridRect;

/// First component index whose data includes vertex `v` (low side of a range).
///
/// The boundary vertex of a component is shared with the previous one, so the
/// low index steps back by one quad before dividing.
pub fn component_index_lo(v: i32, component_size_quads: i32) -> i32 {
    (v - 1) / component_size_quads
}

/// Last component index whose data includes vertex `v` (high side of a range).
pub fn component_index_hi(v: i32, component_size_quads: i32) -> i32 {
    v / component_size_quads
}

/// Inclusive component index range covering a vertex region.
pub fn component_range(region: &GridRect, component_size_quads: i32) -> GridRect {
    GridRect {
        x1: component_index_lo(region.x1, component_size_quads),
        y1: component_index_lo(region.y1, component_size_quads),
        x2: component_index_hi(region.x2, component_size_quads),
        y2: component_index_hi(region.y2, component_size_quads),
    }
}

/// Subsection index range within one component for a component-local vertex
/// range, using the same shared-boundary rule, clamped to valid subsections.
pub fn subsection_range(
    local_lo: i32,
    local_hi: i32,
    subsection_size_quads: i32,
    num_subsections: i32,
) -> (i32, i32) {
    let lo = ((local_lo - 1) / subsection_size_quads).clamp(0, num_subsections - 1);
    let hi = (local_hi / subsection_size_quads).clamp(0, num_subsections - 1);
    (lo, hi)
}

/// Vertex range of one subsection in component-local coordinates, clipped to
/// the given local range. Returns None when the clip is empty.
pub fn subsection_local_range(
    sub_index: i32,
    subsection_size_quads: i32,
    local_lo: i32,
    local_hi: i32,
) -> Option<(i32, i32)> {
    let lo = local_lo.max(sub_index * subsection_size_quads);
    let hi = local_hi.min((sub_index + 1) * subsection_size_quads);
    if lo > hi { None } else { Some((lo, hi)) }
}

/// Texel coordinate of a subsection-local vertex within a component's data
/// block. Subsections are stored side by side, each `size + 1` texels wide
/// because both boundary rows are present.
pub fn subsection_texel(
    block_offset: i32,
    sub_index: i32,
    subsection_size_quads: i32,
    sub_local: i32,
) -> i32 {
    block_offset + (subsection_size_quads + 1) * sub_index + sub_local
}
