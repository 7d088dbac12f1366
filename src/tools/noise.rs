//! Coherent-noise displacement.

use noise::{Fbm, NoiseFn, Perlin};

use crate::brush::CircleBrush;
use crate::core::types::Result;
use crate::terrain::Terrain;

use super::target::ScalarCache;

/// How raw noise maps onto a displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseMode {
    /// Bias upward: only builds material.
    Add,
    /// Bias downward: only carves.
    Sub,
    /// Signed, raises and lowers.
    Both,
}

impl NoiseMode {
    /// Shift a sampled value by the noise amplitude so `Add`/`Sub` stay on
    /// one side of zero.
    pub fn conversion(&self, amount: f32, value: f32) -> f32 {
        match self {
            NoiseMode::Add => (value + amount) / 2.0,
            NoiseMode::Sub => (value - amount) / 2.0,
            NoiseMode::Both => value,
        }
    }
}

/// Seeded fractal noise field sampled in vertex space.
pub struct NoiseParameter {
    pub base: f32,
    /// Feature size in vertices.
    pub scale: f32,
    pub amount: f32,
    fbm: Fbm<Perlin>,
}

impl NoiseParameter {
    pub fn new(seed: u32, base: f32, scale: f32, amount: f32) -> Self {
        Self { base, scale: scale.max(1e-3), amount, fbm: Fbm::new(seed) }
    }

    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let n = self
            .fbm
            .get([(x / self.scale) as f64, (y / self.scale) as f64]) as f32;
        self.base + n * self.amount
    }
}

pub struct NoiseTool<C: ScalarCache> {
    cache: C,
    pub strength: f32,
    pub mode: NoiseMode,
    pub noise: NoiseParameter,
}

impl<C: ScalarCache> NoiseTool<C> {
    pub fn new(cache: C, strength: f32, mode: NoiseMode, noise: NoiseParameter) -> Self {
        Self { cache, strength, mode, noise }
    }

    pub fn apply(&mut self, terrain: &mut Terrain, brush: &CircleBrush, pressure: f32) -> Result<()> {
        let (stamp, bounds) = brush.stamp();
        if stamp.is_empty() {
            return Ok(());
        }
        self.cache.cache_region(terrain, bounds);
        let mut vals = self.cache.read(bounds);
        for (&(x, y), &infl) in &stamp {
            let v = self
                .mode
                .conversion(self.noise.amount, self.noise.sample(x as f32, y as f32));
            vals[bounds.index_of(x, y)] += v * infl * self.strength * pressure;
        }
        self.cache.write(terrain, bounds, &vals)?;
        self.cache.flush(terrain);
        Ok(())
    }

    pub fn end_stroke(&mut self, terrain: &mut Terrain) {
        self.cache.flush(terrain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::Falloff;
    use crate::core::types::{Vec2, Vec3};
    use crate::math::GridRect;
    use crate::terrain::TerrainDescriptor;
    use crate::tools::target::HeightTarget;

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

    fn brush() -> CircleBrush {
        CircleBrush::new(Vec2::new(7.0, 7.0), 4.0, 0.0, Falloff::Smooth)
    }

    #[test]
    fn test_conversion_modes() {
        assert_eq!(NoiseMode::Add.conversion(100.0, 40.0), 70.0);
        assert_eq!(NoiseMode::Sub.conversion(100.0, 40.0), -30.0);
        assert_eq!(NoiseMode::Both.conversion(100.0, 40.0), 40.0);
    }

    #[test]
    fn test_add_mode_only_raises() {
        let mut t = terrain();
        // base well above the amplitude keeps every sample positive
        let noise = NoiseParameter::new(7, 500.0, 10.0, 100.0);
        let mut tool = NoiseTool::new(HeightTarget::new(&t), 1.0, NoiseMode::Add, noise);
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);

        let region = GridRect::new(5, 5, 9, 9);
        let out = t.export_height(region).unwrap();
        assert!(out.iter().all(|&h| h > 32768));
        // not uniform: it is noise, not a constant offset
        assert!(out.iter().any(|&h| h != out[0]));
    }

    #[test]
    fn test_sub_mode_only_carves() {
        let mut t = terrain();
        let noise = NoiseParameter::new(7, -500.0, 10.0, 100.0);
        let mut tool = NoiseTool::new(HeightTarget::new(&t), 1.0, NoiseMode::Sub, noise);
        tool.apply(&mut t, &brush(), 1.0).unwrap();
        tool.end_stroke(&mut t);

        let region = GridRect::new(5, 5, 9, 9);
        assert!(t.export_height(region).unwrap().iter().all(|&h| h < 32768));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let mut a = terrain();
        let mut b = terrain();
        for t in [&mut a, &mut b] {
            let noise = NoiseParameter::new(42, 0.0, 8.0, 300.0);
            let mut tool = NoiseTool::new(HeightTarget::new(t), 1.0, NoiseMode::Both, noise);
            tool.apply(t, &brush(), 1.0).unwrap();
            tool.end_stroke(t);
        }
        let region = GridRect::new(3, 3, 11, 11);
        assert_eq!(a.export_height(region).unwrap(), b.export_height(region).unwrap());
    }
}
