use std::ops::Range;

use anyhow::Result;

/// Parameters for a buffer allocation.
#[derive(Debug, Copy, Clone)]
pub struct BufferSpec<'a> {
    pub label: &'a str,
    /// Size in bytes.
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

/// Creates and fills GPU buffers.
pub trait BufferAllocator {
    type Buffer: Send + Sync;

    /// Allocates an uninitialized buffer of `spec.size` bytes.
    ///
    /// Fails when the size exceeds what the device can provide.
    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<Self::Buffer>;

    /// Copies `data` into `buffer` starting at `offset` bytes.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Largest buffer `create_buffer` accepts, in bytes.
    fn max_buffer_size(&self) -> u64;
}

/// One vertex stream bound for a draw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexBufferBinding {
    /// Bytes per vertex.
    pub stride: u64,
    /// Byte offset of the first vertex.
    pub offset: u64,
    /// Bytes of valid vertex data after `offset`.
    pub size: u64,
}

/// Index buffer bound for a draw.
#[derive(Debug)]
pub struct IndexBinding<'a, B> {
    pub buffer: &'a B,
    pub format: wgpu::IndexFormat,
    /// Bytes of valid index data.
    pub size: u64,
}

/// Receives buffer bindings and topology ahead of a draw call.
pub trait DrawContext {
    type Buffer;

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Self::Buffer, binding: VertexBufferBinding);

    /// `None` clears the index binding; the following draw is non-indexed.
    fn set_index_buffer(&mut self, index: Option<IndexBinding<'_, Self::Buffer>>);

    fn set_topology(&mut self, topology: wgpu::PrimitiveTopology);
}

/// What a draw call over a committed batch should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawRange {
    /// `draw_indexed` over these indices.
    Indexed(Range<u32>),
    /// `draw` over these vertices; the batch has no index data.
    Vertices(Range<u32>),
}
