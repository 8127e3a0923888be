use std::collections::HashMap;

use anyhow::{Result, ensure};

use super::{BufferAllocator, BufferSpec, DrawContext, DrawRange, IndexBinding, VertexBufferBinding};

/// Upload-side context (device + queue).
///
/// Implements [`BufferAllocator`] so batches can create and fill wgpu buffers.
#[derive(Copy, Clone)]
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl BufferAllocator for RenderCtx<'_> {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<wgpu::Buffer> {
        let limit = self.max_buffer_size();
        ensure!(
            spec.size <= limit,
            "buffer '{}' needs {} bytes but the device limit is {limit}",
            spec.label,
            spec.size
        );

        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(spec.label),
            size: spec.size,
            usage: spec.usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }
}

/// Render pipelines keyed by primitive topology.
///
/// wgpu bakes topology into the pipeline, so "setting the topology" on a pass
/// means selecting the pipeline built for it.
#[derive(Default)]
pub struct TopologyPipelines {
    pipelines: HashMap<wgpu::PrimitiveTopology, wgpu::RenderPipeline>,
}

impl TopologyPipelines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pipeline` for `topology`, returning any pipeline it replaces.
    pub fn insert(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        pipeline: wgpu::RenderPipeline,
    ) -> Option<wgpu::RenderPipeline> {
        self.pipelines.insert(topology, pipeline)
    }

    pub fn get(&self, topology: wgpu::PrimitiveTopology) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&topology)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Draw-side context wrapping an open render pass.
pub struct PassCtx<'p, 'e> {
    pass: &'p mut wgpu::RenderPass<'e>,
    pipelines: &'p TopologyPipelines,
    has_pipeline: bool,
}

impl<'p, 'e> PassCtx<'p, 'e> {
    #[inline]
    pub fn new(pass: &'p mut wgpu::RenderPass<'e>, pipelines: &'p TopologyPipelines) -> Self {
        Self {
            pass,
            pipelines,
            has_pipeline: false,
        }
    }

    /// The wrapped pass, for state this context does not manage (bind groups,
    /// scissor, etc.).
    pub fn pass(&mut self) -> &mut wgpu::RenderPass<'e> {
        &mut *self.pass
    }

    /// Issues the draw call for `range` with a single instance.
    ///
    /// Skipped when no pipeline matched the last topology; wgpu rejects draws
    /// without a pipeline.
    pub fn draw(&mut self, range: DrawRange) {
        if !self.has_pipeline {
            return;
        }
        match range {
            DrawRange::Indexed(indices) => self.pass.draw_indexed(indices, 0, 0..1),
            DrawRange::Vertices(vertices) => self.pass.draw(vertices, 0..1),
        }
    }
}

impl DrawContext for PassCtx<'_, '_> {
    type Buffer = wgpu::Buffer;

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: &wgpu::Buffer,
        binding: VertexBufferBinding,
    ) {
        let end = binding.offset + binding.size;
        self.pass.set_vertex_buffer(slot, buffer.slice(binding.offset..end));
    }

    fn set_index_buffer(&mut self, index: Option<IndexBinding<'_, wgpu::Buffer>>) {
        // wgpu has no way to unbind an index buffer; a non-indexed draw simply
        // ignores whatever is bound.
        if let Some(index) = index {
            self.pass.set_index_buffer(index.buffer.slice(..index.size), index.format);
        }
    }

    fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        match self.pipelines.get(topology) {
            Some(pipeline) => {
                self.pass.set_pipeline(pipeline);
                self.has_pipeline = true;
            }
            None => {
                log::warn!("PassCtx: no pipeline for {topology:?}; draw will be skipped");
                self.has_pipeline = false;
            }
        }
    }
}
