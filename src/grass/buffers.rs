//! Device buffers owned by a leaf patch.

use bytemuck::{Pod, Zeroable};

use crate::core::types::Result;
use crate::gpu::{BufferHandle, BufferKind, GpuDevice};

use super::blade::BladeAttributes;
use super::params::names;

/// Indexed indirect draw arguments (20 bytes).
///
/// The visibility kernel rewrites `index_count` with the number of blades
/// that survived culling; the host only writes the initial values.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub first_instance: u32,
}

impl DrawArgs {
    /// Draw every point of a `vertex_count`-point mesh `instances` times.
    pub fn new(vertex_count: u32, instances: u32) -> Self {
        Self {
            index_count: vertex_count,
            instance_count: instances,
            ..Default::default()
        }
    }
}

/// Blade attribute storage plus indirect arguments of one leaf patch.
///
/// Handles are `None` once released, so releasing twice is a no-op.
#[derive(Debug, Default)]
pub struct PatchBuffers {
    data_a: Option<BufferHandle>,
    data_b: Option<BufferHandle>,
    data_c: Option<BufferHandle>,
    args: Option<BufferHandle>,
}

impl PatchBuffers {
    /// Create and fill all four buffers.
    ///
    /// If any allocation fails the ones already made are released before
    /// the error is returned.
    pub fn create(
        device: &mut dyn GpuDevice,
        label: &str,
        blades: &BladeAttributes,
        args: DrawArgs,
    ) -> Result<Self> {
        let mut buffers = Self::default();
        let result = buffers.allocate(device, label, blades, args);
        if let Err(err) = result {
            log::warn!("Allocation of `{label}` buffers failed, releasing partial set: {err}");
            buffers.release(device);
            return Err(err);
        }
        Ok(buffers)
    }

    fn allocate(
        &mut self,
        device: &mut dyn GpuDevice,
        label: &str,
        blades: &BladeAttributes,
        args: DrawArgs,
    ) -> Result<()> {
        let storage = |name: &str| format!("{label}.{name}");
        self.data_a = Some(device.create_buffer(
            &storage(names::GRASS_DATA_A),
            BufferKind::Storage,
            bytemuck::cast_slice(&blades.data_a),
        )?);
        self.data_b = Some(device.create_buffer(
            &storage(names::GRASS_DATA_B),
            BufferKind::Storage,
            bytemuck::cast_slice(&blades.data_b),
        )?);
        self.data_c = Some(device.create_buffer(
            &storage(names::GRASS_DATA_C),
            BufferKind::Storage,
            bytemuck::cast_slice(&blades.data_c),
        )?);
        self.args = Some(device.create_buffer(
            &storage("args"),
            BufferKind::IndirectArgs,
            bytemuck::bytes_of(&args),
        )?);
        Ok(())
    }

    /// Overwrite all attribute data and the arguments.
    ///
    /// Blade count must match the one the buffers were created with.
    pub fn upload(
        &self,
        device: &mut dyn GpuDevice,
        blades: &BladeAttributes,
        args: DrawArgs,
    ) -> Result<()> {
        let (a, b, c, arg) = self.handles().ok_or(crate::core::Error::Destroyed)?;
        device.write_buffer(a, 0, bytemuck::cast_slice(&blades.data_a))?;
        device.write_buffer(b, 0, bytemuck::cast_slice(&blades.data_b))?;
        device.write_buffer(c, 0, bytemuck::cast_slice(&blades.data_c))?;
        device.write_buffer(arg, 0, bytemuck::bytes_of(&args))
    }

    /// `(data_a, data_b, data_c, args)` while all four are alive.
    pub fn handles(&self) -> Option<(BufferHandle, BufferHandle, BufferHandle, BufferHandle)> {
        Some((self.data_a?, self.data_b?, self.data_c?, self.args?))
    }

    pub fn args(&self) -> Option<BufferHandle> {
        self.args
    }

    pub fn is_released(&self) -> bool {
        self.data_a.is_none() && self.data_b.is_none() && self.data_c.is_none() && self.args.is_none()
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for slot in [&mut self.data_a, &mut self.data_b, &mut self.data_c, &mut self.args] {
            if let Some(handle) = slot.take() {
                device.release_buffer(handle);
            }
        }
    }
}
