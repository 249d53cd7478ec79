//! Hierarchical frustum culling of leaf patches.

use crate::math::Frustum;

use super::hierarchy::{LeafId, NodeId, NodeKind, PatchHierarchy};

/// Counters from the most recent cull
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    pub nodes_tested: u32,
    pub nodes_rejected: u32,
    pub leaves_visible: u32,
}

/// Reusable depth-first culler. The visible list is rebuilt on every call.
#[derive(Debug, Default)]
pub struct PatchCuller {
    visible: Vec<LeafId>,
    stats: CullStats,
}

impl PatchCuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves whose bounds intersect `frustum`, in depth-first build order.
    ///
    /// A node outside any plane prunes its whole subtree.
    pub fn cull(&mut self, frustum: &Frustum, hierarchy: &PatchHierarchy) -> &[LeafId] {
        self.visible.clear();
        self.stats = CullStats::default();
        self.visit(frustum, hierarchy, hierarchy.root());
        self.stats.leaves_visible = self.visible.len() as u32;

        log::trace!(
            "Cull: {} visible, {} of {} tested nodes rejected",
            self.stats.leaves_visible,
            self.stats.nodes_rejected,
            self.stats.nodes_tested
        );
        &self.visible
    }

    fn visit(&mut self, frustum: &Frustum, hierarchy: &PatchHierarchy, id: NodeId) {
        let Some(node) = hierarchy.node(id) else {
            return;
        };
        self.stats.nodes_tested += 1;
        if !frustum.intersects_aabb(&node.bounds) {
            self.stats.nodes_rejected += 1;
            return;
        }
        match node.kind {
            NodeKind::Leaf(leaf) => self.visible.push(leaf),
            NodeKind::Internal(children) => {
                for child in children.into_iter().flatten() {
                    self.visit(frustum, hierarchy, child);
                }
            }
        }
    }

    /// Result of the most recent cull
    pub fn visible(&self) -> &[LeafId] {
        &self.visible
    }

    pub fn stats(&self) -> CullStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;
    use crate::grass::blade::SharedBladePositions;
    use crate::grass::config::GrassSettings;
    use crate::grass::hierarchy::HierarchyBuilder;
    use crate::math::Plane;
    use crate::terrain::HeightmapTerrain;
    use glam::Vec3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hierarchy(extent: f32, patch_size: f32) -> PatchHierarchy {
        let terrain =
            HeightmapTerrain::flat(9, 0.5, Vec3::new(extent, 10.0, extent), Vec3::ZERO);
        let settings = GrassSettings {
            patch_size,
            blades_per_patch: 4,
            precomputed_blades: 16,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let shared = SharedBladePositions::generate(16, &mut rng);
        HierarchyBuilder { terrain: &terrain, heightmap: &terrain, shared: &shared, settings: &settings }
            .build(&mut RecordingBackend::new(), &mut rng)
            .unwrap()
    }

    /// Box frustum covering [min, max]
    fn box_frustum(min: Vec3, max: Vec3) -> Frustum {
        Frustum::from_planes([
            Plane::from_point_normal(min, Vec3::X),
            Plane::from_point_normal(max, Vec3::NEG_X),
            Plane::from_point_normal(min, Vec3::Y),
            Plane::from_point_normal(max, Vec3::NEG_Y),
            Plane::from_point_normal(min, Vec3::Z),
            Plane::from_point_normal(max, Vec3::NEG_Z),
        ])
    }

    #[test]
    fn test_everything_visible() {
        let h = hierarchy(100.0, 25.0);
        let mut culler = PatchCuller::new();
        let visible = culler.cull(&box_frustum(Vec3::splat(-1.0), Vec3::splat(200.0)), &h);
        assert_eq!(visible.len(), 16);
        // Depth-first: first 2x2 block is leaves 0, 1, 4, 5
        assert_eq!(&visible[..4], &[LeafId(0), LeafId(1), LeafId(4), LeafId(5)]);
        assert_eq!(culler.stats().nodes_rejected, 0);
        assert_eq!(culler.stats().nodes_tested, 21);
    }

    #[test]
    fn test_rejected_root_prunes_everything() {
        let h = hierarchy(100.0, 25.0);
        let mut culler = PatchCuller::new();
        let visible = culler.cull(&box_frustum(Vec3::splat(500.0), Vec3::splat(600.0)), &h);
        assert!(visible.is_empty());
        assert_eq!(culler.stats(), CullStats { nodes_tested: 1, nodes_rejected: 1, leaves_visible: 0 });
    }

    #[test]
    fn test_quadrant_culls_subtrees() {
        let h = hierarchy(100.0, 25.0);
        let mut culler = PatchCuller::new();
        let frustum = box_frustum(Vec3::new(1.0, -10.0, 1.0), Vec3::new(49.0, 20.0, 49.0));
        let visible = h.cull(&frustum, &mut culler).to_vec();
        assert_eq!(visible, vec![LeafId(0), LeafId(1), LeafId(4), LeafId(5)]);
        // root, 4 level-one nodes, 4 leaves under the first
        assert_eq!(culler.stats().nodes_tested, 9);
        assert_eq!(culler.stats().nodes_rejected, 3);
    }

    #[test]
    fn test_list_is_rebuilt_each_call() {
        let h = hierarchy(90.0, 30.0);
        let mut culler = PatchCuller::new();
        let all = culler.cull(&box_frustum(Vec3::splat(-1.0), Vec3::splat(100.0)), &h).len();
        assert_eq!(all, 9);
        let none = culler.cull(&box_frustum(Vec3::splat(500.0), Vec3::splat(600.0)), &h).len();
        assert_eq!(none, 0);
        assert!(culler.visible().is_empty());
    }
}
