//! Blade attribute generation.
//!
//! Every blade is described by three float4 vectors, uploaded as three
//! parallel storage arrays:
//!
//! - A: `(up.xyz, world_y)` terrain normal and base height of the blade
//! - B: `(up * h / 2, h)` control point of the blade curve
//! - C: `(up * h, angle)` tip, with the facing angle in radians
//!
//! Horizontal blade positions are not stored per patch. All patches slice
//! into one shared table of normalized positions, starting at their own
//! start index.

use std::f64::consts::TAU;

use glam::{Vec2, Vec3, Vec4};
use rand::Rng;

use crate::terrain::TerrainSampler;

/// Float4 vector as laid out in the blade storage buffers
pub type BladeVec = [f32; 4];

/// Patch footprint in normalized terrain coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TexRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TexRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Map a patch-local position in [0, 1)² to terrain UV.
    pub fn to_terrain_uv(&self, local: Vec2) -> Vec2 {
        Vec2::new(self.x + local.x * self.width, self.y + local.y * self.height)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }
}

/// Table of normalized blade positions shared by every patch.
#[derive(Clone, Debug, Default)]
pub struct SharedBladePositions {
    positions: Vec<[f32; 2]>,
}

impl SharedBladePositions {
    /// Draw `count` positions uniformly in [0, 1)².
    pub fn generate<R: Rng + ?Sized>(count: u32, rng: &mut R) -> Self {
        let positions = (0..count)
            .map(|_| [rng.gen_range(0.0..1.0f32), rng.gen_range(0.0..1.0f32)])
            .collect();
        Self { positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Vec2> {
        self.positions.get(index).map(|&p| Vec2::from_array(p))
    }

    /// The `count` positions starting at `start`.
    ///
    /// Panics if the range leaves the table.
    pub fn window(&self, start: u32, count: u32) -> &[[f32; 2]] {
        let start = start as usize;
        &self.positions[start..start + count as usize]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }
}

/// Per-blade attribute arrays of one patch, CPU side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BladeAttributes {
    pub data_a: Vec<BladeVec>,
    pub data_b: Vec<BladeVec>,
    pub data_c: Vec<BladeVec>,
}

impl BladeAttributes {
    pub fn with_capacity(count: usize) -> Self {
        Self {
            data_a: Vec::with_capacity(count),
            data_b: Vec::with_capacity(count),
            data_c: Vec::with_capacity(count),
        }
    }

    pub fn len(&self) -> usize {
        self.data_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_a.is_empty()
    }

    pub fn push(&mut self, up: Vec3, world_y: f32, height: f32, angle: f32) {
        self.data_a.push(up.extend(world_y).to_array());
        self.data_b.push((up * height * 0.5).extend(height).to_array());
        self.data_c.push((up * height).extend(angle).to_array());
    }

    pub fn up(&self, index: usize) -> Vec3 {
        Vec4::from_array(self.data_a[index]).truncate()
    }

    pub fn world_y(&self, index: usize) -> f32 {
        self.data_a[index][3]
    }

    pub fn height(&self, index: usize) -> f32 {
        self.data_b[index][3]
    }

    pub fn angle(&self, index: usize) -> f32 {
        self.data_c[index][3]
    }
}

/// Pick a start index so that `[start, start + blades)` stays inside the
/// shared table. `max_start` is inclusive.
pub fn choose_start_index<R: Rng + ?Sized>(max_start: u32, rng: &mut R) -> u32 {
    rng.gen_range(0..=max_start)
}

/// Samples terrain to fill in blade attributes.
pub struct BladeGenerator<'a> {
    terrain: &'a dyn TerrainSampler,
    shared: &'a SharedBladePositions,
    min_height: f32,
    max_height: f32,
}

impl<'a> BladeGenerator<'a> {
    pub fn new(
        terrain: &'a dyn TerrainSampler,
        shared: &'a SharedBladePositions,
        min_height: f32,
        max_height: f32,
    ) -> Self {
        Self { terrain, shared, min_height, max_height }
    }

    /// Generate `count` blades for the patch covering `rect`, reading the
    /// shared positions from `start_index` on.
    ///
    /// Each blade draws its height then its angle from `rng`, so the output
    /// depends only on the RNG state and the terrain.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rect: &TexRect,
        start_index: u32,
        count: u32,
        rng: &mut R,
    ) -> BladeAttributes {
        let origin_y = self.terrain.origin().y;
        let size_y = self.terrain.size().y;
        let span = f64::from(self.max_height - self.min_height);

        let mut blades = BladeAttributes::with_capacity(count as usize);
        for &local in self.shared.window(start_index, count) {
            let uv = rect.to_terrain_uv(Vec2::from_array(local));
            let up = self.terrain.normal_at(uv.x, uv.y);
            let world_y = origin_y + self.terrain.height_at(uv.x, uv.y) * size_y;

            let height = self.min_height + (rng.gen_range(0.0..1.0f64) * span) as f32;
            let angle = (rng.gen_range(0.0..1.0f64) * TAU) as f32;

            blades.push(up, world_y, height, angle);
        }
        blades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::HeightmapTerrain;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flat_terrain() -> HeightmapTerrain {
        HeightmapTerrain::flat(33, 0.25, Vec3::new(100.0, 40.0, 100.0), Vec3::new(0.0, 5.0, 0.0))
    }

    #[test]
    fn test_shared_positions_in_unit_square() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let shared = SharedBladePositions::generate(1000, &mut rng);
        assert_eq!(shared.len(), 1000);
        assert_eq!(shared.as_bytes().len(), 1000 * 8);
        for i in 0..shared.len() {
            let p = shared.get(i).unwrap();
            assert!((0.0..1.0).contains(&p.x) && (0.0..1.0).contains(&p.y));
        }
    }

    #[test]
    fn test_flat_terrain_attributes() {
        let terrain = flat_terrain();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let shared = SharedBladePositions::generate(256, &mut rng);
        let generator = BladeGenerator::new(&terrain, &shared, 0.5, 1.5);

        let rect = TexRect::new(0.25, 0.5, 0.25, 0.25);
        let blades = generator.generate(&rect, 10, 64, &mut rng);
        assert_eq!(blades.len(), 64);

        for i in 0..blades.len() {
            let up = blades.up(i);
            let h = blades.height(i);
            assert!((up - Vec3::Y).length() < 1e-4);
            assert!((blades.world_y(i) - 15.0).abs() < 1e-4);
            assert!((0.5..=1.5).contains(&h));
            assert!((0.0..std::f32::consts::TAU + 1e-4).contains(&blades.angle(i)));

            let b = Vec4::from_array(blades.data_b[i]);
            let c = Vec4::from_array(blades.data_c[i]);
            assert!((b.truncate() - up * h * 0.5).length() < 1e-5);
            assert_eq!(b.w, h);
            assert!((c.truncate() - up * h).length() < 1e-5);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let terrain = crate::terrain::TerrainGenerator::new(Default::default()).generate(
            65,
            Vec3::new(64.0, 20.0, 64.0),
            Vec3::ZERO,
        );
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(99);
            let shared = SharedBladePositions::generate(512, &mut rng);
            let generator = BladeGenerator::new(&terrain, &shared, 0.2, 0.8);
            let start = choose_start_index(512 - 128, &mut rng);
            generator.generate(&TexRect::new(0.0, 0.0, 0.5, 0.5), start, 128, &mut rng)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_equal_height_bounds() {
        let terrain = flat_terrain();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let shared = SharedBladePositions::generate(16, &mut rng);
        let blades = BladeGenerator::new(&terrain, &shared, 0.7, 0.7).generate(
            &TexRect::new(0.0, 0.0, 1.0, 1.0),
            0,
            16,
            &mut rng,
        );
        assert!((0..16).all(|i| blades.height(i) == 0.7));
    }

    #[test]
    fn test_start_index_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..200 {
            let blades = rng.gen_range(1..=512u32);
            let table = blades + rng.gen_range(0..=512u32);
            let start = choose_start_index(table - blades, &mut rng);
            assert!(start + blades <= table);
        }
        assert_eq!(choose_start_index(0, &mut rng), 0);
    }
}
