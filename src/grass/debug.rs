//! Line primitives for the optional debug overlay.

use glam::{Vec3, Vec4};

use crate::math::Aabb;

pub const PATCH_BOUNDS_COLOR: Vec4 = Vec4::new(0.2, 1.0, 0.2, 1.0);
pub const NODE_BOUNDS_COLOR: Vec4 = Vec4::new(1.0, 0.8, 0.1, 1.0);
pub const BLADE_VECTOR_COLOR: Vec4 = Vec4::new(0.2, 0.4, 1.0, 1.0);
pub const LOD_FULL_DETAIL_COLOR: Vec4 = Vec4::new(1.0, 0.3, 0.3, 1.0);
pub const LOD_BILLBOARD_COLOR: Vec4 = Vec4::new(0.8, 0.3, 1.0, 1.0);

/// Segments per overlay circle
pub const CIRCLE_SEGMENTS: usize = 32;

/// World-space line segment
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec4,
}

impl DebugLine {
    pub fn new(start: Vec3, end: Vec3, color: Vec4) -> Self {
        Self { start, end, color }
    }
}

// Corner index pairs of a box, corners ordered as in `Aabb::corners`
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 3), (3, 2), (2, 0),
    (4, 5), (5, 7), (7, 6), (6, 4),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

/// Append the 12 edges of `aabb`.
pub fn push_wire_box(out: &mut Vec<DebugLine>, aabb: &Aabb, color: Vec4) {
    let corners = aabb.corners();
    out.extend(
        BOX_EDGES
            .iter()
            .map(|&(a, b)| DebugLine::new(corners[a], corners[b], color)),
    );
}

/// Append a closed circle of `radius` around `center` in the XZ plane.
pub fn push_circle(out: &mut Vec<DebugLine>, center: Vec3, radius: f32, color: Vec4) {
    let point = |i: usize| {
        let angle = i as f32 / CIRCLE_SEGMENTS as f32 * std::f32::consts::TAU;
        center + Vec3::new(angle.cos(), 0.0, angle.sin()) * radius
    };
    out.extend((0..CIRCLE_SEGMENTS).map(|i| DebugLine::new(point(i), point(i + 1), color)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_box_edges_are_axis_aligned() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let mut lines = Vec::new();
        push_wire_box(&mut lines, &aabb, PATCH_BOUNDS_COLOR);
        assert_eq!(lines.len(), 12);
        for line in &lines {
            let d = (line.end - line.start).abs();
            let nonzero = [d.x, d.y, d.z].iter().filter(|v| **v > 0.0).count();
            assert_eq!(nonzero, 1);
        }
    }

    #[test]
    fn test_circle_is_closed_at_radius() {
        let center = Vec3::new(5.0, 2.0, -3.0);
        let mut lines = Vec::new();
        push_circle(&mut lines, center, 10.0, LOD_BILLBOARD_COLOR);
        assert_eq!(lines.len(), CIRCLE_SEGMENTS);
        for pair in lines.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!((lines[CIRCLE_SEGMENTS - 1].end - lines[0].start).length() < 1e-4);
        for line in &lines {
            assert!(((line.start - center).length() - 10.0).abs() < 1e-4);
            assert_eq!(line.start.y, 2.0);
        }
    }
}
