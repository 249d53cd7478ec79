//! Raster heightmap terrain

use glam::Vec3;

use super::{Heightmap, TerrainSampler};

/// Terrain backed by a row-major grid of normalized height samples.
#[derive(Clone, Debug)]
pub struct HeightmapTerrain {
    width: u32,
    height: u32,
    samples: Vec<f32>,
    size: Vec3,
    origin: Vec3,
}

impl HeightmapTerrain {
    /// Build from a per-pixel function; values are clamped to [0, 1].
    pub fn from_fn(
        width: u32,
        height: u32,
        size: Vec3,
        origin: Vec3,
        f: impl Fn(u32, u32) -> f32,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut samples = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                samples.push(f(x, y).clamp(0.0, 1.0));
            }
        }
        Self { width, height, samples, size, origin }
    }

    /// Terrain with every sample at `level`.
    pub fn flat(resolution: u32, level: f32, size: Vec3, origin: Vec3) -> Self {
        Self::from_fn(resolution, resolution, size, origin, |_, _| level)
    }

    fn sample_clamped(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.samples[(y * self.width + x) as usize]
    }
}

impl Heightmap for HeightmapTerrain {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_at(&self, x: u32, y: u32) -> f32 {
        debug_assert!(x < self.width && y < self.height, "heightmap pixel ({x}, {y}) out of range");
        self.sample_clamped(x as i64, y as i64)
    }
}

impl TerrainSampler for HeightmapTerrain {
    /// Height of the pixel containing (u, v). Pixel `x` covers
    /// `[x / width, (x + 1) / width)`, the same cells the patch bounds scan.
    fn height_at(&self, u: f32, v: f32) -> f32 {
        let x = (u.clamp(0.0, 1.0) * self.width as f32).floor() as i64;
        let y = (v.clamp(0.0, 1.0) * self.height as f32).floor() as i64;
        self.sample_clamped(x, y)
    }

    fn normal_at(&self, u: f32, v: f32) -> Vec3 {
        let du = 1.0 / self.width.max(2) as f32;
        let dv = 1.0 / self.height.max(2) as f32;

        // Slopes in world units per world unit
        let dh_dx = (self.height_at(u + du, v) - self.height_at(u - du, v)) * self.size.y
            / (2.0 * du * self.size.x.max(f32::EPSILON));
        let dh_dz = (self.height_at(u, v + dv) - self.height_at(u, v - dv)) * self.size.y
            / (2.0 * dv * self.size.z.max(f32::EPSILON));

        Vec3::new(-dh_dx, 1.0, -dh_dz).normalize()
    }

    fn size(&self) -> Vec3 {
        self.size
    }

    fn origin(&self) -> Vec3 {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_terrain() {
        let terrain = HeightmapTerrain::flat(16, 0.25, Vec3::new(100.0, 40.0, 100.0), Vec3::ZERO);
        assert_eq!(terrain.pixel_at(3, 7), 0.25);
        assert!((terrain.height_at(0.37, 0.81) - 0.25).abs() < 1e-6);
        assert!((terrain.normal_at(0.5, 0.5) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_height_reads_containing_pixel() {
        // Ramp along x from 0 to 1 over 11 pixels
        let terrain = HeightmapTerrain::from_fn(
            11, 2, Vec3::new(10.0, 10.0, 10.0), Vec3::ZERO,
            |x, _| x as f32 / 10.0,
        );
        // 0.55 * 11 = 6.05 lies in pixel 6
        assert!((terrain.height_at(0.55, 0.5) - 0.6).abs() < 1e-6);
        // Just below a pixel edge stays in the lower pixel
        assert!((terrain.height_at(2.0 / 11.0 - 1e-4, 0.5) - 0.1).abs() < 1e-6);
        assert!((terrain.height_at(1.0, 0.5) - 1.0).abs() < 1e-6);
        assert!((terrain.height_at(1.5, 0.5) - 1.0).abs() < 1e-6);
        assert_eq!(terrain.height_at(-0.5, 0.5), 0.0);
    }

    #[test]
    fn test_slope_normal_faces_downhill() {
        // 45 degree ramp rising along +x
        let terrain = HeightmapTerrain::from_fn(
            33, 33, Vec3::new(10.0, 10.0, 10.0), Vec3::ZERO,
            |x, _| x as f32 / 32.0,
        );
        let n = terrain.normal_at(0.5, 0.5);
        assert!(n.x < -0.6 && n.y > 0.6);
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_samples_clamped() {
        let terrain = HeightmapTerrain::from_fn(2, 2, Vec3::ONE, Vec3::ZERO, |_, _| 3.0);
        assert_eq!(terrain.pixel_at(1, 1), 1.0);
    }
}
