//! Noise-based procedural heightmaps

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::heightmap::HeightmapTerrain;

/// Parameters controlling heightmap generation
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale in world units (larger = smoother)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Procedural heightmap generator using fractal Brownian motion (FBM)
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    /// Get terrain parameters
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Normalized height in [0, 1] at world position (x, z)
    pub fn normalized_height(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;
        let noise_value = self.noise.get([nx, nz]);
        (((noise_value + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
    }

    /// Rasterize a `resolution`² heightmap covering `size.x` × `size.z` at `origin`.
    pub fn generate(&self, resolution: u32, size: Vec3, origin: Vec3) -> HeightmapTerrain {
        let step = |extent: f32| extent / resolution.max(2).saturating_sub(1) as f32;
        let (step_x, step_z) = (step(size.x), step(size.z));
        log::debug!(
            "Generating {}x{} heightmap (seed {}, {}x{} world units)",
            resolution, resolution, self.params.seed, size.x, size.z
        );
        HeightmapTerrain::from_fn(resolution, resolution, size, origin, |x, y| {
            self.normalized_height(origin.x + x as f32 * step_x, origin.z + y as f32 * step_z)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{Heightmap, TerrainSampler};

    #[test]
    fn test_terrain_params_default() {
        let params = TerrainParams::default();
        assert_eq!(params.seed, 12345);
        assert_eq!(params.octaves, 4);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let generator = TerrainGenerator::new(TerrainParams::default());
        let size = Vec3::new(64.0, 20.0, 64.0);
        let a = generator.generate(17, size, Vec3::ZERO);
        let b = generator.generate(17, size, Vec3::ZERO);
        for y in 0..17 {
            for x in 0..17 {
                assert_eq!(a.pixel_at(x, y), b.pixel_at(x, y));
            }
        }
        assert_eq!(a.size(), size);
    }

    #[test]
    fn test_heights_normalized() {
        let generator = TerrainGenerator::new(TerrainParams { scale: 7.0, ..Default::default() });
        let terrain = generator.generate(9, Vec3::new(50.0, 10.0, 50.0), Vec3::ZERO);
        for y in 0..9 {
            for x in 0..9 {
                let h = terrain.pixel_at(x, y);
                assert!((0.0..=1.0).contains(&h));
            }
        }
    }
}
