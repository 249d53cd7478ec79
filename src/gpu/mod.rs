//! GPU capability interfaces.
//!
//! Grass code never talks to a graphics API directly. Resource lifetime goes
//! through [`GpuDevice`], per-frame parameter binding, compute dispatch and
//! indirect draws go through [`GpuCommandSink`]. Two backends are provided:
//! [`wgpu_backend::WgpuBackend`] for real devices and
//! [`recording::RecordingBackend`], which records everything in memory.

pub mod recording;
pub mod wgpu_backend;

pub use recording::{Command, RecordingBackend};
pub use wgpu_backend::{BindingTable, FrameTarget, WgpuBackend};

use glam::{Mat4, Vec4};

use crate::core::types::Result;
use crate::math::Aabb;

/// Handle to a device buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Handle to a point mesh used as instanced draw geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// Compute kernel registered with the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

/// Material (render pipeline + parameters) registered with the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// What a buffer is used for on the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Read/write storage for compute and vertex stages
    Storage,
    /// Indirect draw arguments, also writable from compute
    IndirectArgs,
}

/// Where a named parameter is bound
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamScope {
    /// Every kernel and material that declares the name
    Global,
    Kernel(KernelId),
    Material(MaterialId),
}

/// The compute kernels each visible patch dispatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelSet {
    pub visibility: KernelId,
    /// Wind/gravity integration; skipped when absent
    pub physics: Option<KernelId>,
}

/// Device resource creation and release.
pub trait GpuDevice {
    /// Create a buffer initialized with `contents`.
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle>;

    /// Overwrite part of a buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    /// Create a point-list mesh of `vertex_count` vertices at the origin.
    fn create_point_mesh(&mut self, label: &str, vertex_count: u32) -> Result<MeshHandle>;

    fn release_mesh(&mut self, mesh: MeshHandle);
}

/// Opaque per-frame command sink.
///
/// Parameter setters are fire-and-forget; names unknown to the target are
/// ignored by the backend. `dispatch` and `draw_indirect` fail only on
/// programming errors (unknown handles, unbound inputs).
pub trait GpuCommandSink {
    fn set_buffer(&mut self, scope: ParamScope, name: &str, buffer: BufferHandle);

    fn set_matrix(&mut self, scope: ParamScope, name: &str, value: Mat4);

    fn set_int(&mut self, scope: ParamScope, name: &str, value: i32);

    fn set_float(&mut self, scope: ParamScope, name: &str, value: f32);

    fn set_vector(&mut self, scope: ParamScope, name: &str, value: Vec4);

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<()>;

    /// Instanced indirect draw of `mesh`; `bounds` is the world-space
    /// extent of everything the draw may produce.
    fn draw_indirect(
        &mut self,
        mesh: MeshHandle,
        material: MaterialId,
        bounds: &Aabb,
        args: BufferHandle,
    ) -> Result<()>;
}
