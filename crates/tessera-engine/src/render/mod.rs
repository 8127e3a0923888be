//! Backend seams between the batching engine and the GPU.
//!
//! The engine never talks to wgpu directly. It allocates and writes buffers
//! through a [`BufferAllocator`] and binds them through a [`DrawContext`]:
//! - [`RenderCtx`] / [`PassCtx`] implement both on top of wgpu
//! - [`dummy`] keeps everything in memory for tests and CPU-only tooling

mod backend;
mod ctx;
pub mod dummy;

pub use backend::{
    BufferAllocator, BufferSpec, DrawContext, DrawRange, IndexBinding, VertexBufferBinding,
};
pub use ctx::{PassCtx, RenderCtx, TopologyPipelines};
