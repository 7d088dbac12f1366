//! Raise/lower painting with per-stroke accumulation.

use std::collections::HashMap;

use crate::brush::CircleBrush;
use crate::core::types::{Result, Vec2};
use crate::terrain::Terrain;

use super::target::ScalarCache;

/// Where a vertex stood when the stroke first (or last) crossed it.
struct VertexAnchor {
    /// Stroke travel distance when the anchor was taken.
    distance: f32,
    /// Value the applied amount is measured from.
    original: f32,
    /// Largest amount applied since the anchor was taken.
    amount: f32,
}

/// Additive paint. Holding the brush still does not stack; dragging it away
/// and back re-anchors gradually so looping strokes keep building.
pub struct PaintTool<C: ScalarCache> {
    cache: C,
    pub strength: f32,
    pub invert: bool,
    anchors: HashMap<(i32, i32), VertexAnchor>,
    stroke_distance: f32,
    last_center: Option<Vec2>,
}

impl<C: ScalarCache> PaintTool<C> {
    pub fn new(cache: C, strength: f32) -> Self {
        Self {
            cache,
            strength,
            invert: false,
            anchors: HashMap::new(),
            stroke_distance: 0.0,
            last_center: None,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn apply(&mut self, terrain: &mut Terrain, brush: &CircleBrush, pressure: f32) -> Result<()> {
        let (stamp, bounds) = brush.stamp();
        if stamp.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.last_center {
            self.stroke_distance += (brush.center - last).length();
        }
        self.last_center = Some(brush.center);

        self.cache.cache_region(terrain, bounds);
        let mut vals = self.cache.read(bounds);
        let extent = brush.extent().max(1.0);
        let sign = if self.invert { -1.0 } else { 1.0 };
        let scale = self.cache.value_scale();

        for (&(x, y), &infl) in &stamp {
            let i = bounds.index_of(x, y);
            let amount = infl * self.strength * pressure * scale;
            let anchor = self.anchors.entry((x, y)).or_insert(VertexAnchor {
                distance: self.stroke_distance,
                original: vals[i],
                amount: 0.0,
            });

            // re-entry after travelling past the brush footprint blends the
            // anchor toward the current value over [extent, 5*extent]
            let traveled = self.stroke_distance - anchor.distance;
            let alpha = ((traveled - extent) / (4.0 * extent)).clamp(0.0, 1.0);
            if alpha > 0.0 {
                anchor.original += (vals[i] - anchor.original) * alpha;
                anchor.amount *= 1.0 - alpha;
                anchor.distance = self.stroke_distance;
            }
            anchor.amount = anchor.amount.max(amount);
            vals[i] = anchor.original + sign * anchor.amount;
        }

        self.cache.write(terrain, bounds, &vals)?;
        self.cache.flush(terrain);
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
        self.anchors.clear();
        self.stroke_distance = 0.0;
        self.last_center = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::Falloff;
    use crate::core::types::Vec3;
    use crate::math::GridRect;
    use crate::terrain::{LayerInfo, TerrainDescriptor};
    use crate::tools::target::{HeightTarget, WeightTarget};

    fn terrain() -> Terrain {
        let mut t = Terrain::new(&TerrainDescriptor {
            component_size_quads: 14,
            num_subsections: 2,
            subsection_size_quads: 7,
            draw_scale: Vec3::new(1.0, 1.0, 128.0),
        })
        .unwrap();
        t.add_component(0, 0).unwrap();
        t
    }

    fn brush_at(x: f32, y: f32) -> CircleBrush {
        CircleBrush::new(Vec2::new(x, y), 2.0, 1.0, Falloff::Linear)
    }

    #[test]
    fn test_paint_raises_center() {
        let mut t = terrain();
        let mut tool = PaintTool::new(HeightTarget::new(&t), 5.0);
        tool.apply(&mut t, &brush_at(7.0, 7.0), 1.0).unwrap();
        tool.end_stroke(&mut t);

        // full influence, strength 5, value scale 10
        let h = t.export_height(GridRect::point(7, 7)).unwrap()[0];
        assert_eq!(h, 32768 + 50);
        // falloff band moved less
        let edge = t.export_height(GridRect::point(9, 7)).unwrap()[0];
        assert!(edge > 32768 && edge < h);
    }

    #[test]
    fn test_stationary_brush_does_not_stack() {
        let mut t = terrain();
        let mut tool = PaintTool::new(HeightTarget::new(&t), 5.0);
        for _ in 0..4 {
            tool.apply(&mut t, &brush_at(7.0, 7.0), 1.0).unwrap();
        }
        tool.end_stroke(&mut t);
        assert_eq!(t.export_height(GridRect::point(7, 7)).unwrap()[0], 32768 + 50);
    }

    #[test]
    fn test_invert_lowers() {
        let mut t = terrain();
        let mut tool = PaintTool::new(HeightTarget::new(&t), 5.0).inverted();
        tool.apply(&mut t, &brush_at(7.0, 7.0), 1.0).unwrap();
        tool.end_stroke(&mut t);
        assert_eq!(t.export_height(GridRect::point(7, 7)).unwrap()[0], 32768 - 50);
    }

    #[test]
    fn test_long_stroke_keeps_building() {
        let mut t = terrain();
        let mut tool = PaintTool::new(HeightTarget::new(&t), 5.0);
        // drag far away and back: travel well past 5x the footprint
        tool.apply(&mut t, &brush_at(4.0, 4.0), 1.0).unwrap();
        for i in 0..20 {
            let x = 4.0 + i as f32 * 4.0;
            tool.apply(&mut t, &brush_at(x % 24.0, 4.0 + (i / 6) as f32 * 8.0), 1.0).unwrap();
        }
        tool.apply(&mut t, &brush_at(4.0, 4.0), 1.0).unwrap();
        tool.end_stroke(&mut t);

        let h = t.export_height(GridRect::point(4, 4)).unwrap()[0];
        assert!(h > 32768 + 50, "revisited vertex should stack, got {}", h);
    }

    #[test]
    fn test_weight_paint_blends() {
        let mut t = terrain();
        t.add_layer(LayerInfo::new("grass"));
        t.add_layer(LayerInfo::new("rock"));
        let full = GridRect::new(0, 0, 14, 14);
        crate::edit::EditInterface::new(&mut t)
            .set_weight_data("rock", full, &vec![255u8; full.area()], true)
            .unwrap();

        let mut tool = PaintTool::new(WeightTarget::new(&t, "grass"), 0.5);
        tool.apply(&mut t, &brush_at(7.0, 7.0), 1.0).unwrap();
        tool.end_stroke(&mut t);

        let g = t.export_weights("grass", GridRect::point(7, 7)).unwrap()[0];
        let r = t.export_weights("rock", GridRect::point(7, 7)).unwrap()[0];
        assert!(g > 0);
        assert_eq!(g as u32 + r as u32, 255);
    }

    #[test]
    fn test_collision_tracks_each_apply() {
        let mut t = terrain();
        let id = t.component_at(0, 0).unwrap();
        let mut tool = PaintTool::new(HeightTarget::new(&t), 5.0);

        // collision must follow the stroke, not wait for end_stroke
        tool.apply(&mut t, &brush_at(7.0, 7.0), 1.0).unwrap();
        assert!(t.collision.contains_key(&id));
    }
}
