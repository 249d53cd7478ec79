//! Simulation context: owns the grass hierarchy and drives each frame.
//!
//! A context is built once from its collaborators. Missing collaborators
//! and invalid settings are all collected in one pass; if there are any,
//! the context is returned in a not-ready state that refuses every
//! operation. GPU allocation failures during the build are returned as
//! errors after releasing whatever was already created.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::camera::Camera;
use crate::core::error::{ConfigIssue, ConfigIssues, Error};
use crate::core::types::Result;
use crate::gpu::{
    BufferHandle, BufferKind, GpuCommandSink, GpuDevice, KernelId, KernelSet, MaterialId,
    MeshHandle,
};
use crate::math::Frustum;
use crate::terrain::{Heightmap, TerrainSampler};

use super::blade::SharedBladePositions;
use super::config::{DebugSettings, GrassSettings};
use super::culling::{CullStats, PatchCuller};
use super::debug::{self, DebugLine};
use super::hierarchy::{GridLayout, HierarchyBuilder, PatchHierarchy};
use super::params::{FrameParams, FrameTime};
use super::patch::DrawResources;

/// What one `draw_frame` call submitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub visible_patches: u32,
    pub total_patches: u32,
    /// Blade slots handed to the visibility pass (before GPU culling)
    pub blades_submitted: u64,
    pub cull: CullStats,
}

/// Collects the collaborators a [`SimulationContext`] needs.
#[derive(Default)]
pub struct SimulationBuilder<'a> {
    terrain: Option<&'a dyn TerrainSampler>,
    heightmap: Option<&'a dyn Heightmap>,
    camera: Option<Camera>,
    visibility_kernel: Option<KernelId>,
    physics_kernel: Option<KernelId>,
    material: Option<MaterialId>,
    settings: GrassSettings,
    debug: DebugSettings,
}

impl<'a> SimulationBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terrain(mut self, terrain: &'a dyn TerrainSampler) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn heightmap(mut self, heightmap: &'a dyn Heightmap) -> Self {
        self.heightmap = Some(heightmap);
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn kernels(mut self, kernels: KernelSet) -> Self {
        self.visibility_kernel = Some(kernels.visibility);
        self.physics_kernel = kernels.physics;
        self
    }

    pub fn material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn settings(mut self, settings: GrassSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn debug(mut self, debug: DebugSettings) -> Self {
        self.debug = debug;
        self
    }

    /// Every problem that prevents a build, in a stable order.
    pub fn check(&self) -> ConfigIssues {
        let mut issues = Vec::new();
        if self.terrain.is_none() {
            issues.push(ConfigIssue::MissingTerrain);
        }
        if self.heightmap.is_none() {
            issues.push(ConfigIssue::MissingHeightmap);
        }
        if self.camera.is_none() {
            issues.push(ConfigIssue::MissingCamera);
        }
        if self.visibility_kernel.is_none() {
            issues.push(ConfigIssue::MissingVisibilityKernel);
        }
        if self.material.is_none() {
            issues.push(ConfigIssue::MissingMaterial);
        }

        let setting_issues = self.settings.validate();
        let patch_size_ok = !setting_issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::InvalidSetting { name: "patch_size", .. }));
        issues.extend(setting_issues);

        if let Some(terrain) = self.terrain.filter(|_| patch_size_ok) {
            let layout = GridLayout::for_terrain(terrain.size(), self.settings.patch_size);
            if layout.is_empty() {
                issues.push(ConfigIssue::EmptyPatchGrid {
                    columns: layout.columns,
                    rows: layout.rows,
                });
            }
        }
        ConfigIssues(issues)
    }

    /// Build the context, generating and uploading all patches.
    pub fn build(self, device: &mut dyn GpuDevice) -> Result<SimulationContext> {
        let issues = self.check();
        let (Some(terrain), Some(heightmap), Some(camera), Some(visibility), Some(material)) = (
            self.terrain,
            self.heightmap,
            self.camera.clone(),
            self.visibility_kernel,
            self.material,
        ) else {
            return Ok(SimulationContext::not_ready(self.settings, self.debug, issues));
        };
        if !issues.is_empty() {
            return Ok(SimulationContext::not_ready(self.settings, self.debug, issues));
        }

        let settings = self.settings;
        let mut rng = ChaCha8Rng::seed_from_u64(settings.random_seed);
        let shared = SharedBladePositions::generate(settings.precomputed_blades, &mut rng);

        let shared_buffer = device.create_buffer(
            "grass.shared_positions",
            BufferKind::Storage,
            shared.as_bytes(),
        )?;
        let mesh = match device.create_point_mesh("grass.points", settings.blades_per_patch) {
            Ok(mesh) => mesh,
            Err(err) => {
                device.release_buffer(shared_buffer);
                return Err(err);
            }
        };

        let builder = HierarchyBuilder {
            terrain,
            heightmap,
            shared: &shared,
            settings: &settings,
        };
        let hierarchy = match builder.build(device, &mut rng) {
            Ok(hierarchy) => hierarchy,
            Err(err) => {
                log::error!("Grass hierarchy build failed: {err}");
                device.release_mesh(mesh);
                device.release_buffer(shared_buffer);
                return Err(err);
            }
        };

        log::info!(
            "Grass simulation ready: {} patches x {} blades (seed {})",
            hierarchy.leaves().len(),
            settings.blades_per_patch,
            settings.random_seed
        );

        Ok(SimulationContext {
            settings,
            debug: self.debug,
            issues: ConfigIssues::default(),
            state: ContextState::Ready(Box::new(ReadyState {
                hierarchy,
                shared,
                shared_buffer,
                mesh,
                kernels: KernelSet { visibility, physics: self.physics_kernel },
                material,
                camera,
                culler: PatchCuller::new(),
            })),
        })
    }
}

struct ReadyState {
    hierarchy: PatchHierarchy,
    shared: SharedBladePositions,
    shared_buffer: BufferHandle,
    mesh: MeshHandle,
    kernels: KernelSet,
    material: MaterialId,
    camera: Camera,
    culler: PatchCuller,
}

enum ContextState {
    NotReady,
    Ready(Box<ReadyState>),
    Destroyed,
}

/// The running grass simulation.
pub struct SimulationContext {
    settings: GrassSettings,
    debug: DebugSettings,
    issues: ConfigIssues,
    state: ContextState,
}

impl SimulationContext {
    fn not_ready(settings: GrassSettings, debug: DebugSettings, issues: ConfigIssues) -> Self {
        for issue in issues.iter() {
            log::warn!("Grass configuration: {issue}");
        }
        log::warn!("Grass simulation disabled, {} configuration issue(s)", issues.len());
        Self {
            settings,
            debug,
            issues,
            state: ContextState::NotReady,
        }
    }

    fn ready(&self) -> Result<&ReadyState> {
        match &self.state {
            ContextState::Ready(state) => Ok(&**state),
            ContextState::NotReady => Err(Error::NotReady),
            ContextState::Destroyed => Err(Error::Destroyed),
        }
    }

    fn ready_mut(&mut self) -> Result<&mut ReadyState> {
        match &mut self.state {
            ContextState::Ready(state) => Ok(&mut **state),
            ContextState::NotReady => Err(Error::NotReady),
            ContextState::Destroyed => Err(Error::Destroyed),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ContextState::Ready(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, ContextState::Destroyed)
    }

    /// Configuration problems found at build time (empty when ready)
    pub fn issues(&self) -> &ConfigIssues {
        &self.issues
    }

    pub fn settings(&self) -> &GrassSettings {
        &self.settings
    }

    pub fn debug_settings(&self) -> &DebugSettings {
        &self.debug
    }

    pub fn set_debug_settings(&mut self, debug: DebugSettings) {
        self.debug = debug;
    }

    pub fn camera(&self) -> Result<&Camera> {
        Ok(&self.ready()?.camera)
    }

    pub fn set_camera(&mut self, camera: Camera) -> Result<()> {
        self.ready_mut()?.camera = camera;
        Ok(())
    }

    pub fn hierarchy(&self) -> Result<&PatchHierarchy> {
        Ok(&self.ready()?.hierarchy)
    }

    pub fn shared_positions(&self) -> Result<&SharedBladePositions> {
        Ok(&self.ready()?.shared)
    }

    /// Run one frame against the camera's frustum.
    pub fn draw_frame(&mut self, sink: &mut dyn GpuCommandSink, time: FrameTime) -> Result<FrameStats> {
        let frustum = self.ready()?.camera.frustum();
        self.draw_frame_with_frustum(sink, time, &frustum)
    }

    /// Run one frame: publish the per-frame parameters, cull, then draw
    /// the visible patches in cull order.
    pub fn draw_frame_with_frustum(
        &mut self,
        sink: &mut dyn GpuCommandSink,
        time: FrameTime,
        frustum: &Frustum,
    ) -> Result<FrameStats> {
        let settings = &self.settings;
        let state = match &mut self.state {
            ContextState::Ready(state) => &mut **state,
            ContextState::NotReady => return Err(Error::NotReady),
            ContextState::Destroyed => return Err(Error::Destroyed),
        };

        FrameParams::new(settings, &state.camera, time).apply(sink);

        let visible = state.culler.cull(frustum, &state.hierarchy);
        let resources = DrawResources {
            shared_positions: state.shared_buffer,
            kernels: state.kernels,
            material: state.material,
            mesh: state.mesh,
            settings,
        };
        for &id in visible {
            let leaf = state
                .hierarchy
                .leaf(id)
                .ok_or_else(|| Error::Gpu(format!("culled unknown leaf {id:?}")))?;
            leaf.draw(sink, &resources)?;
        }

        let cull = state.culler.stats();
        Ok(FrameStats {
            visible_patches: cull.leaves_visible,
            total_patches: state.hierarchy.leaves().len() as u32,
            blades_submitted: u64::from(cull.leaves_visible) * u64::from(settings.blades_per_patch),
            cull,
        })
    }

    /// Overlay lines for the patches visible in the last frame and, if
    /// enabled, the internal hierarchy nodes and the LOD distance rings
    /// around the camera.
    pub fn debug_overlay(&self) -> Result<Vec<DebugLine>> {
        let state = self.ready()?;
        let mut lines = Vec::new();
        for &id in state.culler.visible() {
            if let Some(leaf) = state.hierarchy.leaf(id) {
                leaf.debug_overlay(&state.shared, &self.debug, &mut lines);
            }
        }
        state.hierarchy.debug_overlay(&self.debug, &mut lines);

        if self.debug.draw_lod_distances {
            let eye = state.camera.position;
            debug::push_circle(
                &mut lines,
                eye,
                self.settings.lod_full_detail_distance,
                debug::LOD_FULL_DETAIL_COLOR,
            );
            debug::push_circle(
                &mut lines,
                eye,
                self.settings.lod_billboard_distance,
                debug::LOD_BILLBOARD_COLOR,
            );
        }
        Ok(lines)
    }

    /// Release every device resource. Safe to call more than once.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        match std::mem::replace(&mut self.state, ContextState::Destroyed) {
            ContextState::Ready(mut state) => {
                state.hierarchy.destroy(device);
                device.release_mesh(state.mesh);
                device.release_buffer(state.shared_buffer);
                log::info!("Grass simulation destroyed");
            }
            ContextState::NotReady | ContextState::Destroyed => {}
        }
    }
}
