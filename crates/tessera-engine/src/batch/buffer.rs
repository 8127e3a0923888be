use anyhow::{Context, Result};

use crate::render::{BufferAllocator, BufferSpec};

/// Smallest allocation made for non-empty data.
pub(crate) const MIN_BUFFER_BYTES: u64 = 64;

/// Storage allocated by [`DynamicBuffer::reserve`] but not yet installed.
pub(crate) struct Reserved<B> {
    buffer: B,
    capacity: u64,
}

/// A GPU buffer that grows on demand and remembers how much of it is valid.
///
/// Growth is split into `reserve` (may fail, changes nothing) and `upload`
/// (infallible, installs and writes) so a caller can allocate several buffers
/// before committing to any of them.
pub(crate) struct DynamicBuffer<B> {
    label: String,
    usage: wgpu::BufferUsages,
    buffer: Option<B>,
    capacity: u64,
    len: usize,
    byte_len: u64,
}

impl<B> DynamicBuffer<B> {
    pub fn new(label: impl Into<String>, usage: wgpu::BufferUsages) -> Self {
        Self {
            label: label.into(),
            usage,
            buffer: None,
            capacity: 0,
            len: 0,
            byte_len: 0,
        }
    }

    #[inline]
    pub fn buffer(&self) -> Option<&B> {
        self.buffer.as_ref()
    }

    /// Number of valid elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// Allocated bytes; 0 when no buffer exists.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Allocates replacement storage when `bytes` does not fit the current
    /// buffer. Returns `None` when the current buffer can be reused.
    pub fn reserve<A>(&self, alloc: &A, bytes: u64) -> Result<Option<Reserved<B>>>
    where
        A: BufferAllocator<Buffer = B>,
    {
        if bytes == 0 || (self.buffer.is_some() && bytes <= self.capacity) {
            return Ok(None);
        }

        let capacity = bytes
            .checked_next_power_of_two()
            .unwrap_or(bytes)
            .max(MIN_BUFFER_BYTES)
            .min(alloc.max_buffer_size())
            .max(bytes);

        let buffer = alloc
            .create_buffer(&BufferSpec {
                label: &self.label,
                size: capacity,
                usage: self.usage,
            })
            .with_context(|| format!("failed to grow '{}' to {bytes} bytes", self.label))?;

        Ok(Some(Reserved { buffer, capacity }))
    }

    /// Installs `reserved` (if any) and writes `data` as the new contents.
    ///
    /// Empty data keeps the current allocation and only resets the length.
    pub fn upload<A>(&mut self, alloc: &A, reserved: Option<Reserved<B>>, data: &[u8], len: usize)
    where
        A: BufferAllocator<Buffer = B>,
    {
        if let Some(Reserved { buffer, capacity }) = reserved {
            log::debug!("'{}': capacity {} -> {capacity} bytes", self.label, self.capacity());
            self.buffer = Some(buffer);
            self.capacity = capacity;
        }

        self.len = len;
        self.byte_len = data.len() as u64;

        if data.is_empty() {
            return;
        }
        if let Some(buffer) = self.buffer.as_ref() {
            alloc.write_buffer(buffer, 0, data);
        }
    }

    /// Drops the GPU buffer. Returns whether one existed.
    pub fn release(&mut self) -> bool {
        let had = self.buffer.take().is_some();
        self.capacity = 0;
        self.len = 0;
        self.byte_len = 0;
        had
    }
}
