//! Flattening toward an anchor value sampled at stroke start.

use crate::brush::CircleBrush;
use crate::core::types::{Result, Vec2};
use crate::math::GridRect;
use crate::terrain::Terrain;

use super::target::ScalarCache;

pub struct FlattenTool<C: ScalarCache> {
    cache: C,
    pub strength: f32,
    anchor: Option<f32>,
}

impl<C: ScalarCache> FlattenTool<C> {
    pub fn new(cache: C, strength: f32) -> Self {
        Self { cache, strength, anchor: None }
    }

    /// Sample the anchor under the cursor. Without this (or
    /// [`set_anchor`](Self::set_anchor)) the first `apply` anchors at the
    /// brush center.
    pub fn begin_stroke(&mut self, terrain: &Terrain, pos: Vec2) {
        let p = GridRect::point(pos.x.round() as i32, pos.y.round() as i32);
        self.cache.cache_region(terrain, p);
        self.anchor = Some(self.cache.read(p)[0]);
    }

    /// Flatten toward a fixed value instead of a sampled one. Weight
    /// flattening anchors at full weight this way.
    pub fn set_anchor(&mut self, value: f32) {
        self.anchor = Some(value);
    }

    pub fn apply(&mut self, terrain: &mut Terrain, brush: &CircleBrush, pressure: f32) -> Result<()> {
        if self.anchor.is_none() {
            self.begin_stroke(terrain, brush.center);
        }
        let anchor = match self.anchor {
            Some(a) => a,
            None => return Ok(()),
        };

        let (stamp, bounds) = brush.stamp();
        if stamp.is_empty() {
            return Ok(());
        }
        self.cache.cache_region(terrain, bounds);
        let mut vals = self.cache.read(bounds);
        for (&(x, y), &infl) in &stamp {
            let i = bounds.index_of(x, y);
            let t = (infl * self.strength * pressure).clamp(0.0, 1.0);
            vals[i] += (anchor - vals[i]) * t;
        }
        self.cache.write(terrain, bounds, &vals)?;
        self.cache.flush(terrain);
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
        self.anchor = None;
    }
}
