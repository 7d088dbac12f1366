//! Brush falloff profiles.

/// How influence fades between the brush's full-strength radius and its
/// outer edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Falloff {
    /// Straight ramp.
    Linear,
    /// Smoothstep ramp, zero slope at both ends.
    #[default]
    Smooth,
    /// Quarter-circle bulging outward, like a dome's silhouette.
    Spherical,
    /// Quarter-circle curving inward, a sharp tip easing into the plateau.
    Tip,
}

impl Falloff {
    /// Influence at `distance` from the brush center, 1 inside `radius`,
    /// fading to 0 over `falloff`.
    pub fn evaluate(&self, distance: f32, radius: f32, falloff: f32) -> f32 {
        if distance < radius {
            return 1.0;
        }
        if falloff <= 0.0 || distance >= radius + falloff {
            return 0.0;
        }
        let ramp = 1.0 - (distance - radius) / falloff;
        match self {
            Falloff::Linear => ramp,
            Falloff::Smooth => ramp * ramp * (3.0 - 2.0 * ramp),
            Falloff::Spherical => {
                let y = (distance - radius) / falloff;
                (1.0 - y * y).max(0.0).sqrt()
            }
            Falloff::Tip => {
                let y = (falloff + radius - distance) / falloff;
                1.0 - (1.0 - y * y).max(0.0).sqrt()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPES: [Falloff; 4] =
        [Falloff::Linear, Falloff::Smooth, Falloff::Spherical, Falloff::Tip];

    #[test]
    fn test_plateau_and_edge() {
        for shape in SHAPES {
            assert_eq!(shape.evaluate(0.0, 2.0, 3.0), 1.0, "{:?}", shape);
            assert_eq!(shape.evaluate(1.9, 2.0, 3.0), 1.0, "{:?}", shape);
            assert_eq!(shape.evaluate(5.0, 2.0, 3.0), 0.0, "{:?}", shape);
            assert_eq!(shape.evaluate(10.0, 2.0, 3.0), 0.0, "{:?}", shape);
        }
    }

    #[test]
    fn test_monotonic_decrease() {
        for shape in SHAPES {
            let mut prev = 1.0f32;
            for i in 0..=30 {
                let d = 2.0 + 3.0 * i as f32 / 30.0;
                let v = shape.evaluate(d, 2.0, 3.0);
                assert!(v <= prev + 1e-6, "{:?} not monotonic at {}", shape, d);
                assert!((0.0..=1.0).contains(&v));
                prev = v;
            }
        }
    }

    #[test]
    fn test_shapes_differ_at_midpoint() {
        // halfway down the ramp: linear is 0.5, smooth is 0.5, spherical
        // bulges above, tip dips below
        let d = 3.5;
        assert!((Falloff::Linear.evaluate(d, 2.0, 3.0) - 0.5).abs() < 1e-6);
        assert!(Falloff::Spherical.evaluate(d, 2.0, 3.0) > 0.8);
        assert!(Falloff::Tip.evaluate(d, 2.0, 3.0) < 0.2);
    }

    #[test]
    fn test_zero_falloff_is_hard_edge() {
        assert_eq!(Falloff::Smooth.evaluate(1.99, 2.0, 0.0), 1.0);
        assert_eq!(Falloff::Smooth.evaluate(2.0, 2.0, 0.0), 0.0);
    }
}
