//! Leaf patches: terrain tiles that own blade data and issue the per-frame
//! compute passes and indirect draw.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::gpu::{
    BufferHandle, GpuCommandSink, GpuDevice, KernelSet, MaterialId, MeshHandle, ParamScope,
};
use crate::math::Aabb;

use super::blade::{BladeAttributes, SharedBladePositions, TexRect};
use super::buffers::{DrawArgs, PatchBuffers};
use super::config::{DebugSettings, GrassSettings};
use super::debug::{self, DebugLine};
use super::params::names;

/// Shared resources every leaf binds when drawing.
#[derive(Clone, Copy, Debug)]
pub struct DrawResources<'a> {
    /// Buffer holding the shared blade-position table
    pub shared_positions: BufferHandle,
    pub kernels: KernelSet,
    pub material: MaterialId,
    /// Point mesh with one vertex per blade
    pub mesh: MeshHandle,
    pub settings: &'a GrassSettings,
}

/// A terrain-aligned tile of grass.
#[derive(Debug)]
pub struct LeafPatch {
    tex_rect: TexRect,
    bounds: Aabb,
    transform: Mat4,
    start_index: u32,
    blades: BladeAttributes,
    buffers: PatchBuffers,
}

impl LeafPatch {
    /// Upload `blades` and wrap them into a patch.
    pub fn new(
        device: &mut dyn GpuDevice,
        label: &str,
        tex_rect: TexRect,
        bounds: Aabb,
        start_index: u32,
        blades: BladeAttributes,
        settings: &GrassSettings,
    ) -> Result<Self> {
        let args = DrawArgs::new(settings.blades_per_patch, settings.grass_density);
        let buffers = PatchBuffers::create(device, label, &blades, args)?;
        // Scale to the footprint actually covered, which is wider than
        // patch_size when the terrain is not a whole number of patches.
        let footprint = bounds.size();
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(footprint.x, 1.0, footprint.z),
            Quat::IDENTITY,
            Vec3::new(bounds.min.x, 0.0, bounds.min.z),
        );

        Ok(Self {
            tex_rect,
            bounds,
            transform,
            start_index,
            blades,
            buffers,
        })
    }

    pub fn tex_rect(&self) -> &TexRect {
        &self.tex_rect
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Patch-local (x, z in [0, 1)) to world transform
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    pub fn blades(&self) -> &BladeAttributes {
        &self.blades
    }

    pub fn blade_count(&self) -> u32 {
        self.blades.len() as u32
    }

    pub fn buffers(&self) -> &PatchBuffers {
        &self.buffers
    }

    pub fn is_destroyed(&self) -> bool {
        self.buffers.is_released()
    }

    /// Enqueue this patch's compute passes and its indirect draw.
    ///
    /// Order: physics (when configured and enabled), visibility, draw.
    pub fn draw(&self, sink: &mut dyn GpuCommandSink, res: &DrawResources<'_>) -> Result<()> {
        let (_, _, _, args) = self.buffers.handles().ok_or(Error::Destroyed)?;
        let groups = [res.settings.dispatch_groups(), 1, 1];

        if let Some(physics) = res.kernels.physics.filter(|_| res.settings.enable_physics) {
            let scope = ParamScope::Kernel(physics);
            self.bind_inputs(sink, scope, res.shared_positions)?;
            sink.set_int(scope, names::CURRENT_AMOUNT_BLADES, self.blade_count() as i32);
            sink.dispatch(physics, groups)?;
        }

        let visibility = res.kernels.visibility;
        let scope = ParamScope::Kernel(visibility);
        self.bind_inputs(sink, scope, res.shared_positions)?;
        sink.set_int(scope, names::CURRENT_AMOUNT_BLADES, self.blade_count() as i32);
        sink.set_buffer(scope, names::INDIRECT_ARGS, args);
        sink.dispatch(visibility, groups)?;

        self.bind_inputs(sink, ParamScope::Material(res.material), res.shared_positions)?;
        sink.draw_indirect(res.mesh, res.material, &self.bounds, args)
    }

    fn bind_inputs(
        &self,
        sink: &mut dyn GpuCommandSink,
        scope: ParamScope,
        shared_positions: BufferHandle,
    ) -> Result<()> {
        let (a, b, c, _) = self.buffers.handles().ok_or(Error::Destroyed)?;
        sink.set_matrix(scope, names::PATCH_MATRIX, self.transform);
        sink.set_int(scope, names::START_INDEX, self.start_index as i32);
        sink.set_buffer(scope, names::SHARED_GRASS_DATA, shared_positions);
        sink.set_buffer(scope, names::GRASS_DATA_A, a);
        sink.set_buffer(scope, names::GRASS_DATA_B, b);
        sink.set_buffer(scope, names::GRASS_DATA_C, c);
        Ok(())
    }

    /// Append overlay lines: the bounds box and one half-height vector per
    /// blade, as enabled in `overlay`.
    pub fn debug_overlay(
        &self,
        shared: &SharedBladePositions,
        overlay: &DebugSettings,
        out: &mut Vec<DebugLine>,
    ) {
        if overlay.draw_patch_bounds {
            debug::push_wire_box(out, &self.bounds, debug::PATCH_BOUNDS_COLOR);
        }
        if overlay.draw_blade_vectors {
            let locals = shared.window(self.start_index, self.blade_count());
            for (i, local) in locals.iter().enumerate() {
                let local = Vec2::from_array(*local);
                let mut base = self.transform.transform_point3(Vec3::new(local.x, 0.0, local.y));
                base.y = self.blades.world_y(i);
                let half = self.blades.up(i) * self.blades.height(i) * 0.5;
                out.push(DebugLine::new(base, base + half, debug::BLADE_VECTOR_COLOR));
            }
        }
    }

    /// Release the patch's device buffers. Safe to call more than once.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.buffers.release(device);
    }
}
