//! Interactive sculpting and painting tools

pub mod target;
pub mod paint;
pub mod smooth;
pub mod flatten;
pub mod noise;
pub mod erosion;
pub mod hydra;
pub mod filter;

pub use erosion::ErosionTool;
pub use flatten::FlattenTool;
pub use hydra::HydraulicTool;
pub use noise::{NoiseMode, NoiseParameter, NoiseTool};
pub use paint::PaintTool;
pub use smooth::SmoothTool;
pub use target::{HeightTarget, ScalarCache, ToolTarget, WeightTarget};
