//! Terrain collaborators consumed by the grass system.
//!
//! The grass core never owns terrain data; it samples it through these two
//! traits while building patches. [`HeightmapTerrain`] is a raster-backed
//! implementation of both, used by the demo binary and tests.

pub mod generator;
pub mod heightmap;

pub use generator::{TerrainGenerator, TerrainParams};
pub use heightmap::HeightmapTerrain;

use glam::Vec3;

/// Continuous terrain queries in normalized terrain space.
pub trait TerrainSampler: Send + Sync {
    /// Normalized height in [0, 1] at terrain UV (u along X, v along Z).
    fn height_at(&self, u: f32, v: f32) -> f32;

    /// Unit surface normal in world space at terrain UV.
    fn normal_at(&self, u: f32, v: f32) -> Vec3;

    /// World size: x = width, y = vertical extent, z = depth.
    fn size(&self) -> Vec3;

    /// World position of the terrain's min corner.
    fn origin(&self) -> Vec3;
}

/// Pre-rasterized height samples, same contract as [`TerrainSampler::height_at`].
pub trait Heightmap: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Normalized height of pixel (x, y); y runs along terrain Z.
    fn pixel_at(&self, x: u32, y: u32) -> f32;
}
