//! In-memory backend.
//!
//! Performs no GPU work: buffers are byte vectors and bindings are recorded as
//! commands. Counters expose how many allocations and uploads happened so
//! tests can assert on rebuild behavior without hardware.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use anyhow::{Result, ensure};
use bytemuck::Pod;
use parking_lot::Mutex;

use super::{BufferAllocator, BufferSpec, DrawContext, IndexBinding, VertexBufferBinding};

/// Default size limit, matching wgpu's default `max_buffer_size` (256 MiB).
const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 28;

#[derive(Debug)]
struct DummyBufferInner {
    id: u64,
    label: String,
    usage: wgpu::BufferUsages,
    data: Mutex<Vec<u8>>,
}

/// Handle to an in-memory buffer.
///
/// Clones share storage; the buffer is released when the last clone drops.
#[derive(Debug, Clone)]
pub struct DummyBuffer {
    inner: Arc<DummyBufferInner>,
}

impl DummyBuffer {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.inner.usage
    }

    /// Allocated size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.data.lock().len() as u64
    }

    /// Copy of the raw bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.data.lock().clone()
    }

    /// First `count` elements reinterpreted as `T`.
    pub fn read<T: Pod>(&self, count: usize) -> Vec<T> {
        let data = self.inner.data.lock();
        let size = std::mem::size_of::<T>().max(1);
        let count = count.min(data.len() / size);
        let mut out = vec![T::zeroed(); count];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&data[..count * size]);
        out
    }
}

/// Allocator that keeps buffers in memory and counts its work.
#[derive(Debug)]
pub struct DummyAllocator {
    max_buffer_size: u64,
    next_id: AtomicU64,
    created: AtomicUsize,
    writes: AtomicUsize,
    bytes_written: AtomicU64,
    buffers: Mutex<Vec<Weak<DummyBufferInner>>>,
}

impl Default for DummyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyAllocator {
    pub fn new() -> Self {
        Self::with_max_buffer_size(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Allocator that refuses buffers larger than `max_buffer_size` bytes.
    pub fn with_max_buffer_size(max_buffer_size: u64) -> Self {
        Self {
            max_buffer_size,
            next_id: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Number of `create_buffer` calls that succeeded.
    pub fn buffers_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of `write_buffer` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Buffers created by this allocator that have not been dropped yet.
    pub fn live_buffers(&self) -> usize {
        let mut buffers = self.buffers.lock();
        buffers.retain(|b| b.strong_count() > 0);
        buffers.len()
    }
}

impl BufferAllocator for DummyAllocator {
    type Buffer = DummyBuffer;

    fn create_buffer(&self, spec: &BufferSpec<'_>) -> Result<DummyBuffer> {
        ensure!(
            spec.size <= self.max_buffer_size,
            "buffer '{}' needs {} bytes but the device limit is {}",
            spec.label,
            spec.size,
            self.max_buffer_size
        );

        log::trace!("DummyAllocator: creating buffer {:?} (size: {})", spec.label, spec.size);

        let inner = Arc::new(DummyBufferInner {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            label: spec.label.to_string(),
            usage: spec.usage,
            data: Mutex::new(vec![0; spec.size as usize]),
        });
        self.buffers.lock().push(Arc::downgrade(&inner));
        self.created.fetch_add(1, Ordering::Relaxed);

        Ok(DummyBuffer { inner })
    }

    fn write_buffer(&self, buffer: &DummyBuffer, offset: u64, data: &[u8]) {
        let mut dst = buffer.inner.data.lock();
        let start = offset as usize;
        let end = start + data.len();
        // wgpu treats an out-of-bounds write as a validation error.
        assert!(
            end <= dst.len(),
            "write of {} bytes at {offset} overflows buffer {:?} ({} bytes)",
            data.len(),
            buffer.inner.label,
            dst.len()
        );
        dst[start..end].copy_from_slice(data);

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
    }

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }
}

/// A binding recorded by [`DummyPass`].
#[derive(Debug, Clone, PartialEq)]
pub enum PassCommand {
    SetVertexBuffer {
        slot: u32,
        buffer: u64,
        binding: VertexBufferBinding,
    },
    SetIndexBuffer {
        buffer: u64,
        format: wgpu::IndexFormat,
        size: u64,
    },
    ClearIndexBuffer,
    SetTopology(wgpu::PrimitiveTopology),
}

/// Draw context that records what would have been bound.
#[derive(Debug, Default)]
pub struct DummyPass {
    pub commands: Vec<PassCommand>,
}

impl DummyPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DrawContext for DummyPass {
    type Buffer = DummyBuffer;

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &DummyBuffer, binding: VertexBufferBinding) {
        self.commands.push(PassCommand::SetVertexBuffer {
            slot,
            buffer: buffer.id(),
            binding,
        });
    }

    fn set_index_buffer(&mut self, index: Option<IndexBinding<'_, DummyBuffer>>) {
        self.commands.push(match index {
            Some(index) => PassCommand::SetIndexBuffer {
                buffer: index.buffer.id(),
                format: index.format,
                size: index.size,
            },
            None => PassCommand::ClearIndexBuffer,
        });
    }

    fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.commands.push(PassCommand::SetTopology(topology));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(size: u64) -> BufferSpec<'static> {
        BufferSpec {
            label: "test",
            size,
            usage: wgpu::BufferUsages::VERTEX,
        }
    }

    #[test]
    fn create_and_write() {
        let alloc = DummyAllocator::new();
        let buffer = alloc.create_buffer(&spec(16)).unwrap();
        alloc.write_buffer(&buffer, 4, &[1, 2, 3, 4]);

        assert_eq!(buffer.size(), 16);
        assert_eq!(buffer.label(), "test");
        assert_eq!(buffer.usage(), wgpu::BufferUsages::VERTEX);
        assert_eq!(&buffer.contents()[4..8], &[1, 2, 3, 4]);
        assert_eq!(alloc.buffers_created(), 1);
        assert_eq!(alloc.writes(), 1);
        assert_eq!(alloc.bytes_written(), 4);
    }

    #[test]
    fn read_reinterprets_bytes() {
        let alloc = DummyAllocator::new();
        let buffer = alloc.create_buffer(&spec(16)).unwrap();
        alloc.write_buffer(&buffer, 0, bytemuck::cast_slice(&[7u32, 9u32]));
        assert_eq!(buffer.read::<u32>(2), vec![7, 9]);
    }

    #[test]
    fn size_limit_is_enforced() {
        let alloc = DummyAllocator::with_max_buffer_size(8);
        assert!(alloc.create_buffer(&spec(16)).is_err());
        assert_eq!(alloc.buffers_created(), 0);
    }

    #[test]
    fn live_buffers_tracks_drops() {
        let alloc = DummyAllocator::new();
        let a = alloc.create_buffer(&spec(4)).unwrap();
        let b = alloc.create_buffer(&spec(4)).unwrap();
        assert_eq!(alloc.live_buffers(), 2);
        drop(a);
        assert_eq!(alloc.live_buffers(), 1);
        drop(b);
        assert_eq!(alloc.live_buffers(), 0);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn out_of_bounds_write_panics() {
        let alloc = DummyAllocator::new();
        let buffer = alloc.create_buffer(&spec(4)).unwrap();
        alloc.write_buffer(&buffer, 2, &[0; 4]);
    }
}
