//! Editing layer: region data interface, write-back caches, accessors

pub mod interface;
pub mod cache;
pub mod accessors;

pub use accessors::{
    AlphaCache, AlphamapAccessor, FullWeightCache, FullWeightmapAccessor, HeightCache,
    HeightmapAccessor,
};
pub use cache::{EditCache, RegionAccessor};
pub use interface::EditInterface;
