//! In-memory GPU backend that records every command.
//!
//! Used by tests and the headless demo. Buffers keep their contents so
//! uploads can be inspected, and release counts are tracked per handle so
//! double releases and leaks are observable.

use glam::{Mat4, Vec4};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;

use super::{
    BufferHandle, BufferKind, GpuCommandSink, GpuDevice, KernelId, MaterialId, MeshHandle,
    ParamScope,
};

/// A recorded sink command
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetBuffer { scope: ParamScope, name: String, buffer: BufferHandle },
    SetMatrix { scope: ParamScope, name: String, value: Mat4 },
    SetInt { scope: ParamScope, name: String, value: i32 },
    SetFloat { scope: ParamScope, name: String, value: f32 },
    SetVector { scope: ParamScope, name: String, value: Vec4 },
    Dispatch { kernel: KernelId, groups: [u32; 3] },
    DrawIndirect { mesh: MeshHandle, material: MaterialId, bounds: Aabb, args: BufferHandle },
}

#[derive(Clone, Debug)]
struct BufferRecord {
    label: String,
    kind: BufferKind,
    data: Vec<u8>,
    releases: u32,
}

#[derive(Clone, Debug)]
struct MeshRecord {
    vertex_count: u32,
    releases: u32,
}

/// Recording implementation of [`GpuDevice`] and [`GpuCommandSink`].
#[derive(Debug, Default)]
pub struct RecordingBackend {
    buffers: Vec<BufferRecord>,
    meshes: Vec<MeshRecord>,
    commands: Vec<Command>,
    /// Allocation fails once this many buffers exist
    buffer_budget: Option<usize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose buffer allocations fail after `budget` successful ones.
    pub fn with_buffer_budget(budget: usize) -> Self {
        Self {
            buffer_budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain recorded commands (e.g. between frames)
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers created and not yet released
    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.releases == 0).count()
    }

    /// Number of times `buffer` was released
    pub fn release_count(&self, buffer: BufferHandle) -> u32 {
        self.buffers.get(buffer.0 as usize).map_or(0, |b| b.releases)
    }

    /// Handles released more than once
    pub fn double_releases(&self) -> usize {
        self.buffers.iter().filter(|b| b.releases > 1).count()
            + self.meshes.iter().filter(|m| m.releases > 1).count()
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer.0 as usize).map(|b| b.data.as_slice())
    }

    pub fn buffer_label(&self, buffer: BufferHandle) -> Option<&str> {
        self.buffers.get(buffer.0 as usize).map(|b| b.label.as_str())
    }

    pub fn buffer_kind(&self, buffer: BufferHandle) -> Option<BufferKind> {
        self.buffers.get(buffer.0 as usize).map(|b| b.kind)
    }

    pub fn mesh_vertex_count(&self, mesh: MeshHandle) -> Option<u32> {
        self.meshes.get(mesh.0 as usize).map(|m| m.vertex_count)
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.iter().filter(|m| m.releases == 0).count()
    }

    pub fn dispatches(&self) -> impl Iterator<Item = (KernelId, [u32; 3])> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Dispatch { kernel, groups } => Some((*kernel, *groups)),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndirect { .. }))
            .count()
    }

    fn live_buffer_mut(&mut self, buffer: BufferHandle) -> Result<&mut BufferRecord> {
        match self.buffers.get_mut(buffer.0 as usize) {
            Some(record) if record.releases == 0 => Ok(record),
            Some(_) => Err(Error::Gpu(format!("buffer {:?} used after release", buffer))),
            None => Err(Error::Gpu(format!("unknown buffer {:?}", buffer))),
        }
    }
}

impl GpuDevice for RecordingBackend {
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle> {
        if let Some(budget) = self.buffer_budget {
            if self.buffers.len() >= budget {
                return Err(Error::ResourceExhausted {
                    label: label.to_owned(),
                    requested: contents.len() as u64,
                    limit: 0,
                });
            }
        }
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(BufferRecord {
            label: label.to_owned(),
            kind,
            data: contents.to_vec(),
            releases: 0,
        });
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let record = self.live_buffer_mut(buffer)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > record.data.len() {
            return Err(Error::Gpu(format!(
                "write of {} bytes at {} overflows `{}` ({} bytes)",
                data.len(), offset, record.label, record.data.len()
            )));
        }
        record.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.get_mut(buffer.0 as usize) {
            Some(record) => {
                if record.releases > 0 {
                    log::warn!("Buffer `{}` released {} times", record.label, record.releases + 1);
                }
                record.releases += 1;
            }
            None => log::warn!("Release of unknown buffer {:?}", buffer),
        }
    }

    fn create_point_mesh(&mut self, _label: &str, vertex_count: u32) -> Result<MeshHandle> {
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(MeshRecord { vertex_count, releases: 0 });
        Ok(handle)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if let Some(record) = self.meshes.get_mut(mesh.0 as usize) {
            record.releases += 1;
        }
    }
}

impl GpuCommandSink for RecordingBackend {
    fn set_buffer(&mut self, scope: ParamScope, name: &str, buffer: BufferHandle) {
        self.commands.push(Command::SetBuffer { scope, name: name.to_owned(), buffer });
    }

    fn set_matrix(&mut self, scope: ParamScope, name: &str, value: Mat4) {
        self.commands.push(Command::SetMatrix { scope, name: name.to_owned(), value });
    }

    fn set_int(&mut self, scope: ParamScope, name: &str, value: i32) {
        self.commands.push(Command::SetInt { scope, name: name.to_owned(), value });
    }

    fn set_float(&mut self, scope: ParamScope, name: &str, value: f32) {
        self.commands.push(Command::SetFloat { scope, name: name.to_owned(), value });
    }

    fn set_vector(&mut self, scope: ParamScope, name: &str, value: Vec4) {
        self.commands.push(Command::SetVector { scope, name: name.to_owned(), value });
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<()> {
        self.commands.push(Command::Dispatch { kernel, groups });
        Ok(())
    }

    fn draw_indirect(
        &mut self,
        mesh: MeshHandle,
        material: MaterialId,
        bounds: &Aabb,
        args: BufferHandle,
    ) -> Result<()> {
        if self.mesh_vertex_count(mesh).is_none() {
            return Err(Error::Gpu(format!("unknown mesh {:?}", mesh)));
        }
        self.live_buffer_mut(args)?;
        self.commands.push(Command::DrawIndirect { mesh, material, bounds: *bounds, args });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_write() {
        let mut gpu = RecordingBackend::new();
        let buf = gpu.create_buffer("data", BufferKind::Storage, &[0u8; 8]).unwrap();
        gpu.write_buffer(buf, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(gpu.buffer_data(buf).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(gpu.write_buffer(buf, 6, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_release_tracking() {
        let mut gpu = RecordingBackend::new();
        let buf = gpu.create_buffer("data", BufferKind::Storage, &[0u8; 4]).unwrap();
        assert_eq!(gpu.live_buffers(), 1);
        gpu.release_buffer(buf);
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.double_releases(), 0);
        gpu.release_buffer(buf);
        assert_eq!(gpu.double_releases(), 1);
        assert!(gpu.write_buffer(buf, 0, &[1]).is_err());
    }

    #[test]
    fn test_buffer_budget() {
        let mut gpu = RecordingBackend::with_buffer_budget(1);
        assert!(gpu.create_buffer("a", BufferKind::Storage, &[0]).is_ok());
        let err = gpu.create_buffer("b", BufferKind::Storage, &[0]).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }

    #[test]
    fn test_records_commands_in_order() {
        let mut gpu = RecordingBackend::new();
        let args = gpu.create_buffer("args", BufferKind::IndirectArgs, &[0u8; 20]).unwrap();
        let mesh = gpu.create_point_mesh("points", 64).unwrap();
        gpu.set_int(ParamScope::Kernel(KernelId(0)), "startIndex", 7);
        gpu.dispatch(KernelId(0), [2, 1, 1]).unwrap();
        gpu.draw_indirect(mesh, MaterialId(0), &Aabb::default(), args).unwrap();

        assert_eq!(gpu.commands().len(), 3);
        assert_eq!(gpu.dispatches().collect::<Vec<_>>(), vec![(KernelId(0), [2, 1, 1])]);
        assert_eq!(gpu.draw_count(), 1);
        assert_eq!(gpu.take_commands().len(), 3);
        assert!(gpu.commands().is_empty());
    }
}
