//! Shader parameter names and the per-frame uniform block.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::core::camera::Camera;
use crate::gpu::{GpuCommandSink, ParamScope};

use super::config::GrassSettings;

/// Names under which the grass passes bind their inputs.
pub mod names {
    pub const START_INDEX: &str = "startIndex";
    pub const PATCH_MATRIX: &str = "patchMatrix";
    pub const CURRENT_AMOUNT_BLADES: &str = "currentAmountBlades";
    pub const SHARED_GRASS_DATA: &str = "SharedGrassData";
    pub const GRASS_DATA_A: &str = "grassDataA";
    pub const GRASS_DATA_B: &str = "grassDataB";
    pub const GRASS_DATA_C: &str = "grassDataC";
    pub const INDIRECT_ARGS: &str = "indirectArgs";

    pub const DELTA_TIME: &str = "DeltaTime";
    pub const TIME: &str = "Time";
    pub const VIEW_PROJ_MATRIX: &str = "ViewProjMatrix";
    pub const CAM_POS: &str = "CamPos";
    pub const VIEW_DIR: &str = "ViewDir";
    pub const GRAVITY_VEC: &str = "GravityVec";
    pub const GRASS_DENSITY: &str = "GrassDensity";
    pub const LOD_FULL_DETAIL_DISTANCE: &str = "LodFullDetailDistance";
    pub const LOD_BILLBOARD_DISTANCE: &str = "LodBillboardDistance";
    pub const LOD_TESSELLATION_MIN: &str = "LodTessellationMin";
    pub const LOD_TESSELLATION_MAX: &str = "LodTessellationMax";
    pub const LOD_DISTANCE_TESSELLATION_MIN: &str = "LodDistanceTessellationMin";
    pub const LOD_DISTANCE_TESSELLATION_MAX: &str = "LodDistanceTessellationMax";
    pub const BLADE_HEIGHT_CULLING_THRESHOLD: &str = "BladeHeightCullingThreshold";
    pub const RECOVERY_FACTOR: &str = "RecoveryFactor";
}

/// Frame timing fed to the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame
    pub delta: f32,
    /// Seconds since the simulation started
    pub elapsed: f32,
}

/// Per-frame uniform block (160 bytes, 16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameParams {
    pub view_proj: [[f32; 4]; 4],
    // -- 64 bytes --
    pub camera_position: [f32; 3],
    pub delta_time: f32,
    // -- 16 bytes --
    pub view_dir: [f32; 3],
    pub _pad0: f32,
    // -- 16 bytes --
    pub gravity: [f32; 4],
    // -- 16 bytes --
    pub time: f32,
    pub lod_full_detail_distance: f32,
    pub lod_billboard_distance: f32,
    pub grass_density: u32,
    // -- 16 bytes --
    pub lod_tessellation_min: f32,
    pub lod_tessellation_max: f32,
    pub lod_distance_tessellation_min: f32,
    pub lod_distance_tessellation_max: f32,
    // -- 16 bytes --
    pub blade_height_culling_threshold: f32,
    pub recovery_factor: f32,
    pub _pad1: [f32; 2],
    // -- 16 bytes --
    // Total: 160 bytes
}

impl FrameParams {
    pub fn new(settings: &GrassSettings, camera: &Camera, time: FrameTime) -> Self {
        Self {
            view_proj: camera.view_projection().to_cols_array_2d(),
            camera_position: camera.position.to_array(),
            delta_time: time.delta,
            view_dir: camera.forward().to_array(),
            _pad0: 0.0,
            gravity: settings.gravity.to_array(),
            time: time.elapsed,
            lod_full_detail_distance: settings.lod_full_detail_distance,
            lod_billboard_distance: settings.lod_billboard_distance,
            grass_density: settings.grass_density,
            lod_tessellation_min: settings.lod_tessellation_min,
            lod_tessellation_max: settings.lod_tessellation_max,
            lod_distance_tessellation_min: settings.lod_distance_tessellation_min,
            lod_distance_tessellation_max: settings.lod_distance_tessellation_max,
            blade_height_culling_threshold: settings.blade_height_culling_threshold,
            recovery_factor: settings.recovery_factor,
            _pad1: [0.0; 2],
        }
    }

    /// Publish every field as a global named parameter.
    pub fn apply(&self, sink: &mut dyn GpuCommandSink) {
        let g = ParamScope::Global;
        let [x, y, z] = self.camera_position;
        sink.set_matrix(g, names::VIEW_PROJ_MATRIX, glam::Mat4::from_cols_array_2d(&self.view_proj));
        sink.set_vector(g, names::CAM_POS, Vec4::new(x, y, z, 1.0));
        sink.set_vector(g, names::VIEW_DIR, Vec3::from_array(self.view_dir).extend(0.0));
        sink.set_float(g, names::DELTA_TIME, self.delta_time);
        sink.set_float(g, names::TIME, self.time);
        sink.set_vector(g, names::GRAVITY_VEC, Vec4::from_array(self.gravity));
        sink.set_int(g, names::GRASS_DENSITY, self.grass_density as i32);
        sink.set_float(g, names::LOD_FULL_DETAIL_DISTANCE, self.lod_full_detail_distance);
        sink.set_float(g, names::LOD_BILLBOARD_DISTANCE, self.lod_billboard_distance);
        sink.set_float(g, names::LOD_TESSELLATION_MIN, self.lod_tessellation_min);
        sink.set_float(g, names::LOD_TESSELLATION_MAX, self.lod_tessellation_max);
        sink.set_float(g, names::LOD_DISTANCE_TESSELLATION_MIN, self.lod_distance_tessellation_min);
        sink.set_float(g, names::LOD_DISTANCE_TESSELLATION_MAX, self.lod_distance_tessellation_max);
        sink.set_float(g, names::BLADE_HEIGHT_CULLING_THRESHOLD, self.blade_height_culling_threshold);
        sink.set_float(g, names::RECOVERY_FACTOR, self.recovery_factor);
    }
}
