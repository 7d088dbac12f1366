//! Terrain registry: components, layers, atlas allocation, mips, import

pub mod layer;
pub mod component;
pub mod terrain;
pub mod mips;
pub mod import;
pub mod persist;

pub use component::{Component, ComponentId, LayerAllocation};
pub use layer::LayerInfo;
pub use terrain::{Terrain, TerrainDescriptor};
