//! Math utilities for grid-space terrain addressing

pub mod region;
pub mod coords;

pub use region::GridRect;
