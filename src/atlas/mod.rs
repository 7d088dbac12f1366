//! Shared atlas textures for height and weight data

pub mod texture;
pub mod usage;
pub mod upload;

pub use texture::{AtlasId, AtlasKind, AtlasSet, AtlasTexture, Texel, MAX_ATLAS_SIZE};
pub use usage::ChannelUsage;
pub use upload::{UploadQueue, UploadRegion};
