//! `wgpu` implementation of the GPU capability traits.
//!
//! Compute kernels and materials are pipelines created by the host from its
//! own shaders and registered here together with a [`BindingTable`] that maps
//! parameter and buffer names onto bind group 0. Named scalar/vector/matrix
//! parameters are packed into one uniform block per dispatch or draw.
//! All passes of a frame are recorded into one command encoder and
//! submitted by [`WgpuBackend::end_frame`], in recording order.

use std::collections::HashMap;

use glam::{Mat4, Vec4};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;

use super::{
    BufferHandle, BufferKind, GpuCommandSink, GpuDevice, KernelId, MaterialId, MeshHandle,
    ParamScope,
};

/// Name-to-binding layout of a kernel's or material's bind group 0.
#[derive(Clone, Debug)]
pub struct BindingTable {
    label: String,
    /// Storage buffer name -> binding slot
    buffers: Vec<(String, u32)>,
    /// Parameter name -> (offset, length) in 32-bit words of the uniform block
    params: Vec<(String, u32, u32)>,
    /// Binding slot of the uniform block
    params_binding: u32,
}

impl BindingTable {
    pub fn new(label: impl Into<String>, params_binding: u32) -> Self {
        Self {
            label: label.into(),
            buffers: Vec::new(),
            params: Vec::new(),
            params_binding,
        }
    }

    pub fn with_buffer(mut self, name: &str, binding: u32) -> Self {
        self.buffers.push((name.to_owned(), binding));
        self
    }

    /// Declare a parameter at `offset_words` spanning `words` 32-bit words
    /// (1 for int/float, 4 for a vector, 16 for a matrix).
    pub fn with_param(mut self, name: &str, offset_words: u32, words: u32) -> Self {
        self.params.push((name.to_owned(), offset_words, words));
        self
    }

    /// Uniform block size in words, padded to a 16-byte multiple
    fn block_words(&self) -> usize {
        self.params
            .iter()
            .map(|(_, offset, words)| (offset + words) as usize)
            .max()
            .unwrap_or(0)
            .max(4)
            .next_multiple_of(4)
    }
}

/// Bound inputs of one kernel or material
#[derive(Debug)]
struct ScopeState {
    table: BindingTable,
    bound: HashMap<String, BufferHandle>,
    words: Vec<u32>,
}

impl ScopeState {
    fn new(table: BindingTable) -> Self {
        let words = vec![0; table.block_words()];
        Self {
            table,
            bound: HashMap::new(),
            words,
        }
    }

    fn write_param(&mut self, name: &str, values: &[u32]) {
        let Some((_, offset, len)) = self.table.params.iter().find(|(n, _, _)| n == name) else {
            return;
        };
        if values.len() > *len as usize {
            log::warn!(
                "{}: parameter `{}` holds {} words, got {}",
                self.table.label, name, len, values.len()
            );
            return;
        }
        let start = *offset as usize;
        self.words[start..start + values.len()].copy_from_slice(values);
    }

    fn bind_buffer(&mut self, name: &str, buffer: BufferHandle) {
        if self.table.buffers.iter().any(|(n, _)| n == name) {
            self.bound.insert(name.to_owned(), buffer);
        }
    }
}

struct PointMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

/// Color (and optional depth) attachment grass draws render into
pub struct FrameTarget {
    pub color: wgpu::TextureView,
    pub depth: Option<wgpu::TextureView>,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    target: FrameTarget,
}

/// GPU backend on a `wgpu` device
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: Vec<Option<wgpu::Buffer>>,
    meshes: Vec<Option<PointMesh>>,
    kernels: Vec<(wgpu::ComputePipeline, ScopeState)>,
    materials: Vec<(wgpu::RenderPipeline, ScopeState)>,
    frame: Option<Frame>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: Vec::new(),
            meshes: Vec::new(),
            kernels: Vec::new(),
            materials: Vec::new(),
            frame: None,
        }
    }

    /// Register a compute pipeline whose bind group 0 follows `table`
    pub fn register_kernel(&mut self, pipeline: wgpu::ComputePipeline, table: BindingTable) -> KernelId {
        log::debug!("Registered kernel `{}`", table.label);
        self.kernels.push((pipeline, ScopeState::new(table)));
        KernelId(self.kernels.len() as u32 - 1)
    }

    /// Register a render pipeline (point-list topology, one vec3 vertex
    /// attribute) whose bind group 0 follows `table`
    pub fn register_material(&mut self, pipeline: wgpu::RenderPipeline, table: BindingTable) -> MaterialId {
        log::debug!("Registered material `{}`", table.label);
        self.materials.push((pipeline, ScopeState::new(table)));
        MaterialId(self.materials.len() as u32 - 1)
    }

    /// Start recording a frame into `target`
    pub fn begin_frame(&mut self, target: FrameTarget) {
        if self.frame.is_some() {
            log::warn!("begin_frame called twice; previous frame discarded");
        }
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("grass_frame_encoder"),
        });
        self.frame = Some(Frame { encoder, target });
    }

    /// Submit everything recorded since `begin_frame`
    pub fn end_frame(&mut self) -> Result<()> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| Error::Gpu("end_frame without begin_frame".into()))?;
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        Ok(())
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn check_size(&self, label: &str, size: u64) -> Result<()> {
        let limit = self.device.limits().max_buffer_size;
        if size > limit {
            return Err(Error::ResourceExhausted {
                label: label.to_owned(),
                requested: size,
                limit,
            });
        }
        Ok(())
    }

    fn write_param(&mut self, scope: ParamScope, name: &str, values: &[u32]) {
        match scope {
            ParamScope::Global => {
                for (_, state) in &mut self.kernels {
                    state.write_param(name, values);
                }
                for (_, state) in &mut self.materials {
                    state.write_param(name, values);
                }
            }
            ParamScope::Kernel(id) => match self.kernels.get_mut(id.0 as usize) {
                Some((_, state)) => state.write_param(name, values),
                None => log::warn!("Parameter `{}` set on unknown kernel {:?}", name, id),
            },
            ParamScope::Material(id) => match self.materials.get_mut(id.0 as usize) {
                Some((_, state)) => state.write_param(name, values),
                None => log::warn!("Parameter `{}` set on unknown material {:?}", name, id),
            },
        }
    }
}

fn lookup_buffer(buffers: &[Option<wgpu::Buffer>], handle: BufferHandle) -> Result<&wgpu::Buffer> {
    buffers
        .get(handle.0 as usize)
        .and_then(Option::as_ref)
        .ok_or_else(|| Error::Gpu(format!("buffer {:?} is not live", handle)))
}

/// Build bind group 0 for one dispatch/draw: bound storage buffers plus a
/// fresh uniform block holding the current parameter values.
fn build_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffers: &[Option<wgpu::Buffer>],
    layout: &wgpu::BindGroupLayout,
    state: &ScopeState,
) -> Result<wgpu::BindGroup> {
    let label = state.table.label.as_str();
    let params = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (state.words.len() * std::mem::size_of::<u32>()) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    queue.write_buffer(&params, 0, bytemuck::cast_slice(&state.words));

    let mut entries = Vec::with_capacity(state.table.buffers.len() + 1);
    for (name, binding) in &state.table.buffers {
        let handle = state
            .bound
            .get(name)
            .ok_or_else(|| Error::Gpu(format!("{}: buffer `{}` is not bound", label, name)))?;
        entries.push(wgpu::BindGroupEntry {
            binding: *binding,
            resource: lookup_buffer(buffers, *handle)?.as_entire_binding(),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: state.table.params_binding,
        resource: params.as_entire_binding(),
    });

    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    }))
}

impl GpuDevice for WgpuBackend {
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle> {
        let size = (contents.len() as u64)
            .max(wgpu::COPY_BUFFER_ALIGNMENT)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        self.check_size(label, size)?;

        let usage = match kind {
            BufferKind::Storage => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
            }
            BufferKind::IndirectArgs => {
                wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });

        if contents.len() as u64 == size {
            self.queue.write_buffer(&buffer, 0, contents);
        } else if !contents.is_empty() {
            let mut padded = contents.to_vec();
            padded.resize(size as usize, 0);
            self.queue.write_buffer(&buffer, 0, &padded);
        }

        self.buffers.push(Some(buffer));
        Ok(BufferHandle(self.buffers.len() as u32 - 1))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(Error::Gpu(format!(
                "unaligned write of {} bytes at {} to {:?}",
                data.len(), offset, buffer
            )));
        }
        let target = lookup_buffer(&self.buffers, buffer)?;
        if offset + data.len() as u64 > target.size() {
            return Err(Error::Gpu(format!("write overflows buffer {:?}", buffer)));
        }
        self.queue.write_buffer(target, offset, data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.get_mut(buffer.0 as usize).and_then(Option::take) {
            Some(b) => b.destroy(),
            None => log::warn!("Release of unknown or released buffer {:?}", buffer),
        }
    }

    fn create_point_mesh(&mut self, label: &str, vertex_count: u32) -> Result<MeshHandle> {
        let vertex_bytes = vertex_count as u64 * 3 * std::mem::size_of::<f32>() as u64;
        let index_bytes = vertex_count as u64 * std::mem::size_of::<u32>() as u64;
        self.check_size(label, vertex_bytes.max(index_bytes))?;

        // Buffers are zero-initialized, so every vertex sits at the origin
        let vertices = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: vertex_bytes.max(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        let indices = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: index_bytes.max(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_data: Vec<u32> = (0..vertex_count).collect();
        if !index_data.is_empty() {
            self.queue.write_buffer(&indices, 0, bytemuck::cast_slice(&index_data));
        }

        self.meshes.push(Some(PointMesh { vertices, indices }));
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if let Some(m) = self.meshes.get_mut(mesh.0 as usize).and_then(Option::take) {
            m.vertices.destroy();
            m.indices.destroy();
        }
    }
}

impl GpuCommandSink for WgpuBackend {
    fn set_buffer(&mut self, scope: ParamScope, name: &str, buffer: BufferHandle) {
        match scope {
            ParamScope::Global => {
                for (_, state) in &mut self.kernels {
                    state.bind_buffer(name, buffer);
                }
                for (_, state) in &mut self.materials {
                    state.bind_buffer(name, buffer);
                }
            }
            ParamScope::Kernel(id) => {
                if let Some((_, state)) = self.kernels.get_mut(id.0 as usize) {
                    state.bind_buffer(name, buffer);
                }
            }
            ParamScope::Material(id) => {
                if let Some((_, state)) = self.materials.get_mut(id.0 as usize) {
                    state.bind_buffer(name, buffer);
                }
            }
        }
    }

    fn set_matrix(&mut self, scope: ParamScope, name: &str, value: Mat4) {
        self.write_param(scope, name, &value.to_cols_array().map(f32::to_bits));
    }

    fn set_int(&mut self, scope: ParamScope, name: &str, value: i32) {
        self.write_param(scope, name, &[value as u32]);
    }

    fn set_float(&mut self, scope: ParamScope, name: &str, value: f32) {
        self.write_param(scope, name, &[value.to_bits()]);
    }

    fn set_vector(&mut self, scope: ParamScope, name: &str, value: Vec4) {
        self.write_param(scope, name, &value.to_array().map(f32::to_bits));
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<()> {
        let (pipeline, state) = self
            .kernels
            .get(kernel.0 as usize)
            .ok_or_else(|| Error::Gpu(format!("unknown kernel {:?}", kernel)))?;
        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = build_bind_group(&self.device, &self.queue, &self.buffers, &layout, state)?;

        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| Error::Gpu("dispatch outside begin_frame/end_frame".into()))?;
        let mut pass = frame.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(state.table.label.as_str()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        Ok(())
    }

    fn draw_indirect(
        &mut self,
        mesh: MeshHandle,
        material: MaterialId,
        _bounds: &Aabb,
        args: BufferHandle,
    ) -> Result<()> {
        let (pipeline, state) = self
            .materials
            .get(material.0 as usize)
            .ok_or_else(|| Error::Gpu(format!("unknown material {:?}", material)))?;
        let mesh = self
            .meshes
            .get(mesh.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Gpu(format!("mesh {:?} is not live", mesh)))?;
        let args = lookup_buffer(&self.buffers, args)?;
        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = build_bind_group(&self.device, &self.queue, &self.buffers, &layout, state)?;

        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| Error::Gpu("draw outside begin_frame/end_frame".into()))?;
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(state.table.label.as_str()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: frame.target.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertices.slice(..));
        pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed_indirect(args, 0);
        Ok(())
    }
}
