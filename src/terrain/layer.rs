//! Blend layer definitions.

use serde::{Deserialize, Serialize};

/// A named blend layer. Weight painting distributes 255 across all blended
/// layers at each vertex; layers marked `no_weight_blend` are excluded from
/// that normalization and keep their painted values verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    /// Resistance to erosion, 0 (loose) to 1 (solid rock).
    pub hardness: f32,
    pub no_weight_blend: bool,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), hardness: 0.5, no_weight_blend: false }
    }

    pub fn with_hardness(mut self, hardness: f32) -> Self {
        self.hardness = hardness.clamp(0.0, 1.0);
        self
    }

    pub fn with_no_weight_blend(mut self) -> Self {
        self.no_weight_blend = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let l = LayerInfo::new("rock").with_hardness(0.9).with_no_weight_blend();
        assert_eq!(l.name, "rock");
        assert_eq!(l.hardness, 0.9);
        assert!(l.no_weight_blend);
    }

    #[test]
    fn test_hardness_clamped() {
        let l = LayerInfo::new("mud").with_hardness(2.0);
        assert_eq!(l.hardness, 1.0);
    }
}
