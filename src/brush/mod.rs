//! Circular brushes with falloff profiles

pub mod falloff;
pub mod circle;

pub use circle::CircleBrush;
pub use falloff::Falloff;
