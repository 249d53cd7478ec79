//! Verdure - hierarchical patch LOD grass for terrain renderers

pub mod core;
pub mod math;
pub mod terrain;
pub mod gpu;
pub mod grass;
