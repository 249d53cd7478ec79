//! Bounding hierarchy over the leaf patch grid.
//!
//! Leaves are laid out on a `columns × rows` grid covering the terrain.
//! The grid is folded 2×2 at a time into internal nodes until a single root
//! remains; on odd edges the missing inputs become empty child slots. Nodes
//! live in one arena and refer to each other by index.

use std::time::Instant;

use glam::Vec3;
use rand::Rng;
use rayon::prelude::*;

use crate::core::error::{ConfigIssue, ConfigIssues, Error};
use crate::core::types::Result;
use crate::gpu::GpuDevice;
use crate::math::{Aabb, Frustum};
use crate::terrain::{Heightmap, TerrainSampler};

use super::blade::{BladeGenerator, SharedBladePositions, TexRect, choose_start_index};
use super::config::{DebugSettings, GrassSettings};
use super::culling::PatchCuller;
use super::debug::{self, DebugLine};
use super::patch::LeafPatch;

/// Index of a node in the hierarchy arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of a leaf patch, row-major over the grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    Leaf(LeafId),
    /// Children in fold order: (2x, 2y), (2x+1, 2y), (2x, 2y+1), (2x+1, 2y+1)
    Internal([Option<NodeId>; 4]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchNode {
    pub bounds: Aabb,
    pub kind: NodeKind,
}

/// Leaf grid dimensions for a terrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u32,
    pub rows: u32,
}

impl GridLayout {
    /// Whole patches that fit along X (columns) and Z (rows).
    pub fn for_terrain(terrain_size: Vec3, patch_size: f32) -> Self {
        let fit = |extent: f32| {
            if patch_size > 0.0 {
                (extent / patch_size).floor().max(0.0) as u32
            } else {
                0
            }
        };
        Self {
            columns: fit(terrain_size.x),
            rows: fit(terrain_size.z),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    pub fn leaf_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Normalized footprint of cell (x, y).
    pub fn tex_rect(&self, x: u32, y: u32) -> TexRect {
        let (cols, rows) = (self.columns as f32, self.rows as f32);
        TexRect::new(x as f32 / cols, y as f32 / rows, 1.0 / cols, 1.0 / rows)
    }

    /// Number of 2×2 folds needed to reach a single node.
    pub fn fold_levels(&self) -> u32 {
        let longest = self.columns.max(self.rows).max(1);
        longest.next_power_of_two().trailing_zeros()
    }
}

/// World-space bounds of the terrain under `rect`, from the min and max
/// heightmap samples inside it.
pub fn scan_bounds(
    heightmap: &dyn Heightmap,
    terrain_size: Vec3,
    terrain_origin: Vec3,
    rect: &TexRect,
) -> Aabb {
    let (w, h) = (heightmap.width(), heightmap.height());
    let (mut min_h, mut max_h) = (1.0f32, 0.0f32);
    let span = |start: f32, extent: f32, pixels: u32| {
        let first = ((start * pixels as f32).floor() as u32).min(pixels.saturating_sub(1));
        let end = (((start + extent) * pixels as f32).ceil() as u32).clamp(first + 1, pixels);
        first..end
    };

    if w > 0 && h > 0 {
        for y in span(rect.y, rect.height, h) {
            for x in span(rect.x, rect.width, w) {
                let sample = heightmap.pixel_at(x, y);
                min_h = min_h.min(sample);
                max_h = max_h.max(sample);
            }
        }
    }
    if min_h > max_h {
        (min_h, max_h) = (0.0, 0.0);
    }

    let center = Vec3::new(
        terrain_origin.x + (rect.x + rect.width * 0.5) * terrain_size.x,
        terrain_origin.y + (min_h + (max_h - min_h) * 0.5) * terrain_size.y,
        terrain_origin.z + (rect.y + rect.height * 0.5) * terrain_size.z,
    );
    let size = Vec3::new(
        rect.width * terrain_size.x,
        (max_h - min_h) * terrain_size.y,
        rect.height * terrain_size.z,
    );
    Aabb::from_center_size(center, size)
}

/// Inputs needed to build a hierarchy.
pub struct HierarchyBuilder<'a> {
    pub terrain: &'a dyn TerrainSampler,
    pub heightmap: &'a dyn Heightmap,
    pub shared: &'a SharedBladePositions,
    pub settings: &'a GrassSettings,
}

impl HierarchyBuilder<'_> {
    /// Build leaves and fold them into a tree.
    ///
    /// Leaves are generated in row-major order from `rng`: per leaf, the
    /// start index first, then every blade. Invalid settings, a shared
    /// table shorter than `precomputed_blades` and an empty grid are
    /// reported together as a configuration error before anything is
    /// allocated. If a leaf's buffers cannot be allocated, the leaves
    /// already created are released and the error is returned.
    pub fn build<R: Rng + ?Sized>(
        &self,
        device: &mut dyn GpuDevice,
        rng: &mut R,
    ) -> Result<PatchHierarchy> {
        let mut issues = self.settings.validate();
        if self.shared.len() < self.settings.precomputed_blades as usize {
            issues.push(ConfigIssue::InvalidSetting {
                name: "precomputed_blades",
                reason: format!(
                    "{} exceeds the {} shared positions",
                    self.settings.precomputed_blades,
                    self.shared.len()
                ),
            });
        }
        let layout = GridLayout::for_terrain(self.terrain.size(), self.settings.patch_size);
        if layout.is_empty() {
            issues.push(ConfigIssue::EmptyPatchGrid {
                columns: layout.columns,
                rows: layout.rows,
            });
        }
        if !issues.is_empty() {
            return Err(Error::Configuration(ConfigIssues(issues)));
        }

        let cells: Vec<(u32, u32)> = (0..layout.rows)
            .flat_map(|y| (0..layout.columns).map(move |x| (x, y)))
            .collect();

        // Phase 1: bounds are independent per cell
        let start = Instant::now();
        let (size, origin) = (self.terrain.size(), self.terrain.origin());
        let bounds: Vec<Aabb> = cells
            .par_iter()
            .map(|&(x, y)| scan_bounds(self.heightmap, size, origin, &layout.tex_rect(x, y)))
            .collect();
        log::debug!(
            "Scanned bounds of {} patches in {:.2}ms",
            bounds.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        // Phase 2: blades and buffers, sequential so the RNG order is fixed
        let generator = BladeGenerator::new(
            self.terrain,
            self.shared,
            self.settings.blade_min_height,
            self.settings.blade_max_height,
        );
        let max_start = self.settings.max_start_index();
        let mut leaves = Vec::with_capacity(cells.len());
        for (&(x, y), &leaf_bounds) in cells.iter().zip(&bounds) {
            let rect = layout.tex_rect(x, y);
            let start_index = choose_start_index(max_start, rng);
            let blades = generator.generate(&rect, start_index, self.settings.blades_per_patch, rng);
            let label = format!("grass.patch[{x},{y}]");

            match LeafPatch::new(device, &label, rect, leaf_bounds, start_index, blades, self.settings) {
                Ok(leaf) => leaves.push(leaf),
                Err(err) => {
                    log::warn!("Patch {label} failed, releasing {} built patches", leaves.len());
                    for leaf in &mut leaves {
                        leaf.destroy(device);
                    }
                    return Err(err);
                }
            }
        }

        let hierarchy = PatchHierarchy::fold(leaves, layout)?;
        log::info!(
            "Built grass hierarchy: {}x{} patches, {} levels, {} nodes",
            layout.columns,
            layout.rows,
            hierarchy.levels(),
            hierarchy.nodes.len()
        );
        Ok(hierarchy)
    }
}

/// The fixed patch tree. Built once, read-only until destroyed.
#[derive(Debug)]
pub struct PatchHierarchy {
    nodes: Vec<PatchNode>,
    leaves: Vec<LeafPatch>,
    root: NodeId,
    levels: u32,
    layout: GridLayout,
}

impl PatchHierarchy {
    /// Fold row-major `leaves` into a tree.
    fn fold(leaves: Vec<LeafPatch>, layout: GridLayout) -> Result<Self> {
        let mut nodes: Vec<PatchNode> = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| PatchNode {
                bounds: *leaf.bounds(),
                kind: NodeKind::Leaf(LeafId(i as u32)),
            })
            .collect();

        let mut grid: Vec<Option<NodeId>> = (0..nodes.len() as u32).map(|i| Some(NodeId(i))).collect();
        let (mut width, mut height) = (layout.columns as usize, layout.rows as usize);
        let mut levels = 0;

        while width > 1 || height > 1 {
            let (next_w, next_h) = (width.div_ceil(2), height.div_ceil(2));
            let mut next = Vec::with_capacity(next_w * next_h);
            for y in 0..next_h {
                for x in 0..next_w {
                    let mut children = [None; 4];
                    for k in 0..2 {
                        for j in 0..2 {
                            let (cx, cy) = (2 * x + j, 2 * y + k);
                            if cx < width && cy < height {
                                children[k * 2 + j] = grid[cy * width + cx];
                            }
                        }
                    }
                    let merged = Aabb::union_all(
                        children.iter().flatten().map(|id| &nodes[id.0 as usize].bounds),
                    );
                    next.push(merged.map(|bounds| {
                        nodes.push(PatchNode { bounds, kind: NodeKind::Internal(children) });
                        NodeId(nodes.len() as u32 - 1)
                    }));
                }
            }
            grid = next;
            width = next_w;
            height = next_h;
            levels += 1;
        }

        let Some(root) = grid.first().copied().flatten() else {
            return Err(Error::Configuration(ConfigIssues(vec![ConfigIssue::EmptyPatchGrid {
                columns: layout.columns,
                rows: layout.rows,
            }])));
        };

        Ok(Self { nodes, leaves, root, levels, layout })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_bounds(&self) -> Aabb {
        self.nodes[self.root.0 as usize].bounds
    }

    /// Folds between the leaf grid and the root
    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn node(&self, id: NodeId) -> Option<&PatchNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[PatchNode] {
        &self.nodes
    }

    pub fn leaf(&self, id: LeafId) -> Option<&LeafPatch> {
        self.leaves.get(id.0 as usize)
    }

    /// Leaf at grid cell (x, y)
    pub fn leaf_at(&self, x: u32, y: u32) -> Option<&LeafPatch> {
        if x >= self.layout.columns || y >= self.layout.rows {
            return None;
        }
        self.leaf(LeafId(y * self.layout.columns + x))
    }

    pub fn leaves(&self) -> &[LeafPatch] {
        &self.leaves
    }

    /// Leaves intersecting `frustum`, in depth-first build order.
    pub fn cull<'c>(&self, frustum: &Frustum, culler: &'c mut PatchCuller) -> &'c [LeafId] {
        culler.cull(frustum, self)
    }

    /// Wire boxes of the internal nodes.
    pub fn debug_overlay(&self, overlay: &DebugSettings, out: &mut Vec<DebugLine>) {
        if !overlay.draw_hierarchy_bounds {
            return;
        }
        for node in &self.nodes {
            if let NodeKind::Internal(_) = node.kind {
                debug::push_wire_box(out, &node.bounds, debug::NODE_BOUNDS_COLOR);
            }
        }
    }

    /// Release every leaf's buffers. Safe to call more than once.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for leaf in &mut self.leaves {
            leaf.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;
    use crate::terrain::HeightmapTerrain;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn settings(patch_size: f32) -> GrassSettings {
        GrassSettings {
            patch_size,
            blades_per_patch: 16,
            precomputed_blades: 64,
            ..Default::default()
        }
    }

    fn build(
        terrain: &HeightmapTerrain,
        settings: &GrassSettings,
        gpu: &mut RecordingBackend,
        seed: u64,
    ) -> Result<PatchHierarchy> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let shared = SharedBladePositions::generate(settings.precomputed_blades, &mut rng);
        HierarchyBuilder { terrain, heightmap: terrain, shared: &shared, settings }
            .build(gpu, &mut rng)
    }

    fn noise_terrain(extent: f32) -> HeightmapTerrain {
        crate::terrain::TerrainGenerator::new(Default::default()).generate(
            33,
            Vec3::new(extent, 20.0, extent),
            Vec3::new(-10.0, 2.0, 5.0),
        )
    }

    fn check_containment(h: &PatchHierarchy, id: NodeId) {
        let node = h.node(id).unwrap();
        if let NodeKind::Internal(children) = node.kind {
            for child in children.into_iter().flatten() {
                assert!(node.bounds.contains_aabb(&h.node(child).unwrap().bounds));
                check_containment(h, child);
            }
        }
    }

    #[test]
    fn test_grid_layout() {
        let layout = GridLayout::for_terrain(Vec3::new(100.0, 10.0, 60.0), 25.0);
        assert_eq!(layout, GridLayout { columns: 4, rows: 2 });
        assert_eq!(layout.tex_rect(1, 1), TexRect::new(0.25, 0.5, 0.25, 0.5));
        assert!(GridLayout::for_terrain(Vec3::new(10.0, 1.0, 10.0), 25.0).is_empty());
        assert_eq!(GridLayout { columns: 1, rows: 1 }.fold_levels(), 0);
        assert_eq!(GridLayout { columns: 3, rows: 3 }.fold_levels(), 2);
        assert_eq!(GridLayout { columns: 5, rows: 2 }.fold_levels(), 3);
    }

    #[test]
    fn test_scan_bounds_follows_heightmap() {
        let terrain = HeightmapTerrain::from_fn(
            8,
            8,
            Vec3::new(80.0, 7.0, 80.0),
            Vec3::ZERO,
            |x, _| x as f32 / 7.0,
        );
        let left = scan_bounds(&terrain, Vec3::new(80.0, 7.0, 80.0), Vec3::ZERO, &TexRect::new(0.0, 0.0, 0.5, 0.5));
        let right = scan_bounds(&terrain, Vec3::new(80.0, 7.0, 80.0), Vec3::ZERO, &TexRect::new(0.5, 0.5, 0.5, 0.5));

        assert!((left.min - Vec3::new(0.0, 0.0, 0.0)).length() < 1e-4);
        assert!((left.max - Vec3::new(40.0, 3.0, 40.0)).length() < 1e-4);
        assert!((right.min - Vec3::new(40.0, 4.0, 40.0)).length() < 1e-4);
        assert!((right.max - Vec3::new(80.0, 7.0, 80.0)).length() < 1e-4);
    }

    #[test]
    fn test_blade_bases_stay_inside_leaf_bounds() {
        // Ramp along x, one pixel per 10 world units
        let terrain = HeightmapTerrain::from_fn(
            8,
            8,
            Vec3::new(80.0, 7.0, 80.0),
            Vec3::ZERO,
            |x, _| x as f32 / 7.0,
        );
        let settings = GrassSettings {
            patch_size: 40.0,
            blades_per_patch: 256,
            precomputed_blades: 1024,
            ..Default::default()
        };
        let h = build(&terrain, &settings, &mut RecordingBackend::new(), 9).unwrap();
        assert_eq!(h.leaves().len(), 4);
        assert!((h.leaf_at(0, 0).unwrap().bounds().max.y - 3.0).abs() < 1e-4);

        for leaf in h.leaves() {
            let bounds = leaf.bounds();
            for i in 0..leaf.blades().len() {
                let y = leaf.blades().world_y(i);
                assert!(
                    y >= bounds.min.y - 1e-4 && y <= bounds.max.y + 1e-4,
                    "blade base {y} outside [{}, {}]",
                    bounds.min.y,
                    bounds.max.y
                );
            }
        }
    }

    #[test]
    fn test_transform_covers_footprint_on_uneven_terrain() {
        // 110 / 25 leaves 4 columns, each 27.5 wide
        let terrain = HeightmapTerrain::flat(9, 0.5, Vec3::new(110.0, 5.0, 110.0), Vec3::ZERO);
        let h = build(&terrain, &settings(25.0), &mut RecordingBackend::new(), 2).unwrap();
        assert_eq!(h.layout(), GridLayout { columns: 4, rows: 4 });

        for leaf in h.leaves() {
            let b = leaf.bounds();
            assert!((b.size().x - 27.5).abs() < 1e-4);
            let t = leaf.transform();
            let lo = t.transform_point3(Vec3::ZERO);
            let hi = t.transform_point3(Vec3::new(1.0, 0.0, 1.0));
            assert!((lo.x - b.min.x).abs() < 1e-4 && (lo.z - b.min.z).abs() < 1e-4);
            assert!((hi.x - b.max.x).abs() < 1e-4 && (hi.z - b.max.z).abs() < 1e-4);
        }
    }

    #[test]
    fn test_invalid_settings_rejected_before_allocation() {
        let terrain = noise_terrain(100.0);
        let mut gpu = RecordingBackend::new();
        let bad = GrassSettings {
            blades_per_patch: 64,
            precomputed_blades: 16,
            ..settings(25.0)
        };
        let err = build(&terrain, &bad, &mut gpu, 1).unwrap_err();
        match err {
            Error::Configuration(issues) => assert!(issues.iter().any(|i| matches!(
                i,
                ConfigIssue::InvalidSetting { name: "precomputed_blades", .. }
            ))),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(gpu.live_buffers(), 0);
    }

    #[test]
    fn test_short_shared_table_rejected() {
        let terrain = noise_terrain(100.0);
        let settings = settings(25.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let shared = SharedBladePositions::generate(8, &mut rng);
        let err = HierarchyBuilder { terrain: &terrain, heightmap: &terrain, shared: &shared, settings: &settings }
            .build(&mut RecordingBackend::new(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_four_by_four_grid() {
        let terrain = noise_terrain(100.0);
        let mut gpu = RecordingBackend::new();
        let h = build(&terrain, &settings(25.0), &mut gpu, 1).unwrap();

        assert_eq!(h.layout(), GridLayout { columns: 4, rows: 4 });
        assert_eq!(h.leaves().len(), 16);
        assert_eq!(h.levels(), 2);
        assert_eq!(h.nodes().len(), 16 + 4 + 1);

        let union = Aabb::union_all(h.leaves().iter().map(|l| l.bounds())).unwrap();
        assert_eq!(h.root_bounds(), union);
        check_containment(&h, h.root());
    }

    #[test]
    fn test_fold_child_order() {
        let terrain = noise_terrain(100.0);
        let mut gpu = RecordingBackend::new();
        let h = build(&terrain, &settings(50.0), &mut gpu, 1).unwrap();
        let root = h.node(h.root()).unwrap();
        assert_eq!(
            root.kind,
            NodeKind::Internal([Some(NodeId(0)), Some(NodeId(1)), Some(NodeId(2)), Some(NodeId(3))])
        );
        assert_eq!(h.leaf_at(1, 0).unwrap().tex_rect(), &TexRect::new(0.5, 0.0, 0.5, 0.5));
    }

    #[test]
    fn test_odd_grid_pads_with_empty_slots() {
        let terrain = noise_terrain(90.0);
        let mut gpu = RecordingBackend::new();
        let h = build(&terrain, &settings(30.0), &mut gpu, 3).unwrap();

        assert_eq!(h.layout(), GridLayout { columns: 3, rows: 3 });
        assert_eq!(h.levels(), 2);
        let empty_slots: usize = h
            .nodes()
            .iter()
            .map(|n| match n.kind {
                NodeKind::Internal(children) => children.iter().filter(|c| c.is_none()).count(),
                NodeKind::Leaf(_) => 0,
            })
            .sum();
        assert_eq!(empty_slots, 7);
        check_containment(&h, h.root());
    }

    #[test]
    fn test_single_patch_is_root() {
        let terrain = noise_terrain(40.0);
        let mut gpu = RecordingBackend::new();
        let h = build(&terrain, &settings(30.0), &mut gpu, 3).unwrap();
        assert_eq!(h.levels(), 0);
        assert_eq!(h.node(h.root()).unwrap().kind, NodeKind::Leaf(LeafId(0)));
    }

    #[test]
    fn test_levels_match_grid_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..12 {
            let columns = rng.gen_range(1..=9u32);
            let rows = rng.gen_range(1..=9u32);
            let terrain = HeightmapTerrain::flat(
                9,
                0.3,
                Vec3::new(columns as f32 * 10.0, 5.0, rows as f32 * 10.0),
                Vec3::ZERO,
            );
            let mut gpu = RecordingBackend::new();
            let h = build(&terrain, &settings(10.0), &mut gpu, 5).unwrap();
            let expected = (columns.max(rows) as f32).log2().ceil() as u32;
            assert_eq!(h.levels(), expected, "{columns}x{rows}");
            assert_eq!(h.leaves().len(), (columns * rows) as usize);
            for leaf in h.leaves() {
                assert!(leaf.start_index() + leaf.blade_count() <= 64);
            }
        }
    }

    #[test]
    fn test_same_seed_same_patches() {
        let terrain = noise_terrain(100.0);
        let a = build(&terrain, &settings(25.0), &mut RecordingBackend::new(), 42).unwrap();
        let b = build(&terrain, &settings(25.0), &mut RecordingBackend::new(), 42).unwrap();
        for (la, lb) in a.leaves().iter().zip(b.leaves()) {
            assert_eq!(la.start_index(), lb.start_index());
            assert_eq!(la.blades(), lb.blades());
            assert_eq!(la.bounds(), lb.bounds());
        }
    }

    #[test]
    fn test_allocation_failure_releases_built_leaves() {
        let terrain = noise_terrain(100.0);
        // Room for two full patches and half of a third
        let mut gpu = RecordingBackend::with_buffer_budget(10);
        let err = build(&terrain, &settings(25.0), &mut gpu, 1).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.double_releases(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let terrain = noise_terrain(100.0);
        let mut gpu = RecordingBackend::new();
        let mut h = build(&terrain, &settings(25.0), &mut gpu, 1).unwrap();
        assert_eq!(gpu.live_buffers(), 16 * 4);
        h.destroy(&mut gpu);
        h.destroy(&mut gpu);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.double_releases(), 0);
    }

    #[test]
    fn test_hierarchy_overlay_draws_internal_nodes() {
        let terrain = noise_terrain(100.0);
        let mut gpu = RecordingBackend::new();
        let h = build(&terrain, &settings(25.0), &mut gpu, 1).unwrap();
        let mut lines = Vec::new();
        h.debug_overlay(&DebugSettings::default(), &mut lines);
        assert!(lines.is_empty());
        h.debug_overlay(
            &DebugSettings { draw_hierarchy_bounds: true, ..Default::default() },
            &mut lines,
        );
        assert_eq!(lines.len(), 5 * 12);
    }
}
