//! Loam - a tiled editable heightfield terrain engine

pub mod core;
pub mod math;
pub mod atlas;
pub mod terrain;
pub mod edit;
pub mod brush;
pub mod tools;
pub mod collision;
