//! Circular brush producing sparse influence stamps.

use std::collections::HashMap;

use crate::core::types::Vec2;
use crate::math::GridRect;

use super::falloff::Falloff;

/// A circular brush footprint in vertex-grid space.
#[derive(Debug, Clone)]
pub struct CircleBrush {
    pub center: Vec2,
    /// Full-strength radius.
    pub radius: f32,
    /// Width of the fade band beyond `radius`.
    pub falloff: f32,
    pub shape: Falloff,
}

impl CircleBrush {
    pub fn new(center: Vec2, radius: f32, falloff: f32, shape: Falloff) -> Self {
        Self { center, radius, falloff, shape }
    }

    /// Build from UI parameters: a total world-space radius, the fraction of
    /// it given to falloff, and the grid scale converting to vertex units.
    pub fn from_ui(
        center: Vec2,
        total_radius: f32,
        falloff_fraction: f32,
        shape: Falloff,
        grid_scale: f32,
    ) -> Self {
        let frac = falloff_fraction.clamp(0.0, 1.0);
        let total = total_radius / grid_scale;
        Self {
            center,
            radius: (1.0 - frac) * total,
            falloff: frac * total,
            shape,
        }
    }

    /// Total footprint diameter, used for stroke history spacing.
    pub fn extent(&self) -> f32 {
        2.0 * (self.radius + self.falloff)
    }

    /// Vertex rect covering the footprint.
    pub fn bounds(&self) -> GridRect {
        let r = self.radius + self.falloff;
        GridRect::new(
            (self.center.x - r).floor() as i32,
            (self.center.y - r).floor() as i32,
            (self.center.x + r).ceil() as i32,
            (self.center.y + r).ceil() as i32,
        )
    }

    /// Influence per vertex within the footprint. Vertices with zero
    /// influence are omitted.
    pub fn stamp(&self) -> (HashMap<(i32, i32), f32>, GridRect) {
        let rect = self.bounds();
        let mut stamp = HashMap::new();
        for (x, y) in rect.iter() {
            let d = (Vec2::new(x as f32, y as f32) - self.center).length();
            let infl = self.shape.evaluate(d, self.radius, self.falloff);
            if infl > 0.0 {
                stamp.insert((x, y), infl);
            }
        }
        (stamp, rect)
    }
}
