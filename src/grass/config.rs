//! Grass configuration (read-only to the simulation once built).

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigIssue;

/// User-facing grass simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrassSettings {
    /// Edge length of a leaf patch in world units.
    pub patch_size: f32,
    /// Blades owned by each leaf patch; also the point mesh vertex count.
    pub blades_per_patch: u32,
    /// Length of the shared blade-position table all patches slice into.
    pub precomputed_blades: u32,
    /// Instance count written into each patch's indirect draw arguments.
    pub grass_density: u32,
    /// Blade height range in world units.
    pub blade_min_height: f32,
    pub blade_max_height: f32,
    /// Seed of the single generation RNG.
    pub random_seed: u64,
    /// Threads per compute workgroup of the per-patch kernels.
    pub thread_group_size: u32,
    /// Distance up to which blades render as full geometry.
    pub lod_full_detail_distance: f32,
    /// Distance beyond which blades fall back to billboards.
    pub lod_billboard_distance: f32,
    pub lod_tessellation_min: f32,
    pub lod_tessellation_max: f32,
    /// Distance at which tessellation starts dropping from max.
    pub lod_distance_tessellation_min: f32,
    /// Distance at which tessellation reaches min.
    pub lod_distance_tessellation_max: f32,
    /// Blades shorter than this are culled by the visibility pass.
    pub blade_height_culling_threshold: f32,
    /// How fast bent blades return to rest (0..1 per second).
    pub recovery_factor: f32,
    /// xyz: gravity direction, w: magnitude.
    pub gravity: Vec4,
    /// Run the physics kernel before the visibility pass.
    pub enable_physics: bool,
}

impl Default for GrassSettings {
    fn default() -> Self {
        Self {
            patch_size: 16.0,
            blades_per_patch: 4096,
            precomputed_blades: 65536,
            grass_density: 1,
            blade_min_height: 0.4,
            blade_max_height: 1.2,
            random_seed: 12345,
            thread_group_size: 64,
            lod_full_detail_distance: 40.0,
            lod_billboard_distance: 150.0,
            lod_tessellation_min: 1.0,
            lod_tessellation_max: 6.0,
            lod_distance_tessellation_min: 5.0,
            lod_distance_tessellation_max: 40.0,
            blade_height_culling_threshold: 0.01,
            recovery_factor: 0.2,
            gravity: Vec4::new(0.0, -1.0, 0.0, 9.81),
            enable_physics: true,
        }
    }
}

impl GrassSettings {
    /// Largest valid start index into the shared position table.
    pub fn max_start_index(&self) -> u32 {
        self.precomputed_blades.saturating_sub(self.blades_per_patch)
    }

    /// Workgroups needed to cover one patch's blades.
    pub fn dispatch_groups(&self) -> u32 {
        self.blades_per_patch.div_ceil(self.thread_group_size.max(1))
    }

    /// Check every setting and report all violations at once.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut invalid = |name: &'static str, reason: String| {
            issues.push(ConfigIssue::InvalidSetting { name, reason });
        };

        if !(self.patch_size > 0.0 && self.patch_size.is_finite()) {
            invalid("patch_size", format!("must be positive, got {}", self.patch_size));
        }
        if self.blades_per_patch == 0 {
            invalid("blades_per_patch", "must be at least 1".into());
        }
        if self.precomputed_blades < self.blades_per_patch {
            invalid(
                "precomputed_blades",
                format!(
                    "{} is smaller than blades_per_patch ({})",
                    self.precomputed_blades, self.blades_per_patch
                ),
            );
        }
        if self.grass_density == 0 {
            invalid("grass_density", "must be at least 1".into());
        }
        if self.blade_min_height < 0.0 || self.blade_min_height > self.blade_max_height {
            invalid(
                "blade_min_height",
                format!(
                    "range [{}, {}] is empty or negative",
                    self.blade_min_height, self.blade_max_height
                ),
            );
        }
        if self.thread_group_size == 0 {
            invalid("thread_group_size", "must be at least 1".into());
        }
        if self.lod_full_detail_distance > self.lod_billboard_distance {
            invalid(
                "lod_full_detail_distance",
                "must not exceed lod_billboard_distance".into(),
            );
        }
        if self.lod_distance_tessellation_min > self.lod_distance_tessellation_max {
            invalid(
                "lod_distance_tessellation_min",
                "must not exceed lod_distance_tessellation_max".into(),
            );
        }
        issues
    }
}

/// Toggles for the optional debug overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Wire boxes around visible leaf patches
    pub draw_patch_bounds: bool,
    /// Wire boxes around internal hierarchy nodes
    pub draw_hierarchy_bounds: bool,
    /// One line per blade along its half-height vector
    pub draw_blade_vectors: bool,
    /// Circles around the camera at the full-detail and billboard LOD distances
    pub draw_lod_distances: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let settings = GrassSettings::default();
        assert!(settings.validate().is_empty());
        assert!(settings.blade_max_height > settings.blade_min_height);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let settings = GrassSettings {
            patch_size: 0.0,
            blades_per_patch: 100,
            precomputed_blades: 50,
            blade_min_height: 2.0,
            blade_max_height: 1.0,
            thread_group_size: 0,
            ..Default::default()
        };
        let names: Vec<_> = settings
            .validate()
            .into_iter()
            .map(|issue| match issue {
                ConfigIssue::InvalidSetting { name, .. } => name,
                other => panic!("unexpected issue {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec!["patch_size", "precomputed_blades", "blade_min_height", "thread_group_size"]
        );
    }

    #[test]
    fn test_dispatch_groups_round_up() {
        let settings = GrassSettings {
            blades_per_patch: 100,
            thread_group_size: 64,
            ..Default::default()
        };
        assert_eq!(settings.dispatch_groups(), 2);
        assert_eq!(settings.max_start_index(), settings.precomputed_blades - 100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: GrassSettings =
            serde_json::from_str(r#"{ "patch_size": 25.0, "random_seed": 7 }"#).unwrap();
        assert_eq!(settings.patch_size, 25.0);
        assert_eq!(settings.random_seed, 7);
        assert_eq!(settings.blades_per_patch, GrassSettings::default().blades_per_patch);
    }
}
