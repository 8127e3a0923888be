use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use parking_lot::Mutex;

use super::buffer::DynamicBuffer;
use super::fill::{self, Merged};
use super::notify::InvalidateHandlers;
use super::{BatchConfig, BatchVertex, ColoredFill, MeshFill, VertexFill};
use crate::geometry::{Aabb, BatchedGeometry};
use crate::render::{
    BufferAllocator, DrawContext, DrawRange, IndexBinding, VertexBufferBinding,
};

/// Summary of the most recent rebuild.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub geometry_count: usize,
    pub vertex_count: usize,
    pub index_count: usize,
    /// Whether the parallel fill path ran.
    pub parallel: bool,
    pub build_time: Duration,
    /// Bounds of all merged vertices in batch space.
    pub bounds: Aabb,
    /// Rebuilds performed since construction.
    pub builds: u64,
}

/// Everything a rebuild replaces, guarded as one unit.
struct BatchState<B> {
    dirty: bool,
    vertex: DynamicBuffer<B>,
    index: DynamicBuffer<B>,
    /// Empty exactly when there is no vertex data to bind.
    bindings: Vec<VertexBufferBinding>,
    stats: BatchStats,
}

/// Merges many transformed geometries into one vertex and one index buffer.
///
/// Lifecycle:
/// - [`set_geometries`] replaces the record list and marks the batch dirty
/// - [`commit`] rebuilds and uploads when dirty, otherwise does nothing
/// - [`attach_buffers`] commits, then binds buffers and topology for a draw
/// - [`dispose`] (or drop) releases the GPU buffers
///
/// `B` is the backend's buffer type; `wgpu::Buffer` unless a different
/// [`BufferAllocator`] is used.
///
/// Invalidate-render handlers fire once per `set_geometries`/`invalidate` call
/// and once per actual rebuild, always after the internal lock is released so
/// a handler may call back into the batch.
///
/// [`set_geometries`]: GeometryBatch::set_geometries
/// [`commit`]: GeometryBatch::commit
/// [`attach_buffers`]: GeometryBatch::attach_buffers
/// [`dispose`]: GeometryBatch::dispose
pub struct GeometryBatch<F: VertexFill, B = wgpu::Buffer> {
    config: BatchConfig,
    fill: F,
    topology: wgpu::PrimitiveTopology,
    geometries: Option<Arc<[BatchedGeometry]>>,
    state: Mutex<BatchState<B>>,
    handlers: InvalidateHandlers,
    disposed: bool,
}

/// Triangle-list batch of [`MeshVertex`](super::MeshVertex).
pub type MeshBatch<B = wgpu::Buffer> = GeometryBatch<MeshFill, B>;
/// Line-list batch of [`ColoredVertex`](super::ColoredVertex).
pub type LineBatch<B = wgpu::Buffer> = GeometryBatch<ColoredFill, B>;
/// Point-list batch of [`ColoredVertex`](super::ColoredVertex).
pub type PointBatch<B = wgpu::Buffer> = GeometryBatch<ColoredFill, B>;

impl<F: VertexFill, B> GeometryBatch<F, B> {
    pub fn new(fill: F, topology: wgpu::PrimitiveTopology, config: BatchConfig) -> Self {
        let vertex = DynamicBuffer::new(
            format!("{} vertices", config.label),
            wgpu::BufferUsages::VERTEX,
        );
        let index = DynamicBuffer::new(
            format!("{} indices", config.label),
            wgpu::BufferUsages::INDEX,
        );

        Self {
            config,
            fill,
            topology,
            geometries: None,
            state: Mutex::new(BatchState {
                dirty: false,
                vertex,
                index,
                bindings: Vec::new(),
                stats: BatchStats::default(),
            }),
            handlers: InvalidateHandlers::default(),
            disposed: false,
        }
    }

    // ── geometry ──────────────────────────────────────────────────────────

    /// Replaces the whole record list. No GPU work happens until `commit`.
    pub fn set_geometries(&mut self, geometries: impl Into<Arc<[BatchedGeometry]>>) {
        self.replace_geometries(Some(geometries.into()));
    }

    /// Removes all records; the next commit uploads empty buffers.
    pub fn clear_geometries(&mut self) {
        self.replace_geometries(None);
    }

    fn replace_geometries(&mut self, geometries: Option<Arc<[BatchedGeometry]>>) {
        self.geometries = geometries;
        self.state.get_mut().dirty = true;
        self.handlers.raise();
    }

    /// Current records; empty when none are set.
    pub fn geometries(&self) -> &[BatchedGeometry] {
        self.geometries.as_deref().unwrap_or(&[])
    }

    /// Forces the next commit to rebuild.
    pub fn invalidate(&self) {
        self.state.lock().dirty = true;
        self.handlers.raise();
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    // ── commit ────────────────────────────────────────────────────────────

    /// Rebuilds and uploads the merged buffers if the batch is dirty.
    ///
    /// Returns whether a rebuild happened. On error the batch stays dirty and
    /// the previously uploaded buffers are left untouched.
    pub fn commit<A>(&self, alloc: &A) -> Result<bool>
    where
        A: BufferAllocator<Buffer = B>,
    {
        ensure!(!self.disposed, "{}: used after dispose", self.config.label);

        let rebuilt = {
            let mut state = self.state.lock();
            if state.dirty {
                self.rebuild(&mut state, alloc)?;
                state.dirty = false;
                true
            } else {
                false
            }
        };

        if rebuilt {
            self.handlers.raise();
        } else {
            log::trace!("{}: commit skipped, not dirty", self.config.label);
        }
        Ok(rebuilt)
    }

    fn rebuild<A>(&self, state: &mut BatchState<B>, alloc: &A) -> Result<()>
    where
        A: BufferAllocator<Buffer = B>,
    {
        let started = Instant::now();
        let records = self.geometries();

        let merged = if records.is_empty() {
            log::trace!("{}: no geometry, uploading empty buffers", self.config.label);
            Merged::empty()
        } else {
            fill::merge(&self.fill, records, &self.config)?
        };

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&merged.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&merged.indices);

        // Allocate both before touching either so a failure leaves the old
        // buffers consistent with each other.
        let vertex_storage = state.vertex.reserve(alloc, vertex_bytes.len() as u64)?;
        let index_storage = state.index.reserve(alloc, index_bytes.len() as u64)?;

        state.vertex.upload(alloc, vertex_storage, vertex_bytes, merged.vertices.len());
        state.index.upload(alloc, index_storage, index_bytes, merged.indices.len());

        state.bindings.clear();
        if !merged.vertices.is_empty() {
            state.bindings.push(VertexBufferBinding {
                stride: <F::Vertex as BatchVertex>::stride(),
                offset: 0,
                size: vertex_bytes.len() as u64,
            });
        }

        let stats = BatchStats {
            geometry_count: records.len(),
            vertex_count: merged.vertices.len(),
            index_count: merged.indices.len(),
            parallel: merged.parallel,
            build_time: started.elapsed(),
            bounds: merged.bounds,
            builds: state.stats.builds + 1,
        };

        log::debug!(
            "{}: rebuilt {} geometries -> {} vertices, {} indices ({}) in {:?}",
            self.config.label,
            stats.geometry_count,
            stats.vertex_count,
            stats.index_count,
            if stats.parallel { "parallel" } else { "sequential" },
            stats.build_time
        );

        state.stats = stats;
        Ok(())
    }

    // ── attach ────────────────────────────────────────────────────────────

    /// Commits, then binds the merged buffers and topology on `ctx`.
    ///
    /// Vertex buffers are bound from `*vertex_slot` upwards and the slot is
    /// advanced past them. Returns `false`, binding nothing, when there is no
    /// vertex data; the caller must skip the draw.
    pub fn attach_buffers<A, D>(
        &self,
        alloc: &A,
        ctx: &mut D,
        vertex_slot: &mut u32,
    ) -> Result<bool>
    where
        A: BufferAllocator<Buffer = B>,
        D: DrawContext<Buffer = B>,
    {
        self.commit(alloc)?;

        let state = self.state.lock();
        let Some(vertex_buffer) = state.vertex.buffer() else {
            return Ok(false);
        };
        if state.bindings.is_empty() {
            return Ok(false);
        }

        for binding in &state.bindings {
            ctx.set_vertex_buffer(*vertex_slot, vertex_buffer, *binding);
            *vertex_slot += 1;
        }

        match state.index.buffer() {
            Some(buffer) if !state.index.is_empty() => ctx.set_index_buffer(Some(IndexBinding {
                buffer,
                format: wgpu::IndexFormat::Uint32,
                size: state.index.byte_len(),
            })),
            _ => ctx.set_index_buffer(None),
        }

        ctx.set_topology(self.topology);
        Ok(true)
    }

    /// Range for the draw call following a successful `attach_buffers`.
    pub fn draw_range(&self) -> Option<DrawRange> {
        let state = self.state.lock();
        let vertices = state.vertex.len() as u32;
        let indices = state.index.len() as u32;
        if vertices == 0 {
            None
        } else if indices > 0 {
            Some(DrawRange::Indexed(0..indices))
        } else {
            Some(DrawRange::Vertices(0..vertices))
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        self.topology
    }

    pub fn set_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.topology = topology;
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn fill(&self) -> &F {
        &self.fill
    }

    /// Vertices uploaded by the last commit.
    pub fn vertex_count(&self) -> usize {
        self.state.lock().vertex.len()
    }

    /// Indices uploaded by the last commit.
    pub fn index_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Binding descriptors from the last commit; empty when nothing to bind.
    pub fn vertex_buffer_bindings(&self) -> Vec<VertexBufferBinding> {
        self.state.lock().bindings.clone()
    }

    pub fn stats(&self) -> BatchStats {
        self.state.lock().stats
    }

    pub fn bounds(&self) -> Aabb {
        self.state.lock().stats.bounds
    }

    /// Runs `f` with the current vertex and index buffers, if allocated.
    pub fn with_buffers<R>(&self, f: impl FnOnce(Option<&B>, Option<&B>) -> R) -> R {
        let state = self.state.lock();
        f(state.vertex.buffer(), state.index.buffer())
    }

    // ── notifications / teardown ──────────────────────────────────────────

    /// Registers an invalidate-render handler.
    pub fn subscribe(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Releases both GPU buffers and drops all handlers. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let state = self.state.get_mut();
        let released = state.vertex.release() | state.index.release();
        state.bindings.clear();
        self.handlers.clear();

        if released {
            log::debug!("{}: buffers released", self.config.label);
        }
    }
}

impl<B> GeometryBatch<MeshFill, B> {
    /// Triangle-list mesh batch with the default fill.
    pub fn meshes(config: BatchConfig) -> Self {
        Self::new(MeshFill::default(), wgpu::PrimitiveTopology::TriangleList, config)
    }
}

impl<B> GeometryBatch<ColoredFill, B> {
    /// Line-list batch with the default fill.
    pub fn lines(config: BatchConfig) -> Self {
        Self::new(ColoredFill::default(), wgpu::PrimitiveTopology::LineList, config)
    }

    /// Point-list batch with the default fill.
    pub fn points(config: BatchConfig) -> Self {
        Self::new(ColoredFill::default(), wgpu::PrimitiveTopology::PointList, config)
    }
}

impl<F: VertexFill, B> Drop for GeometryBatch<F, B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::geometry::Geometry;
    use crate::render::dummy::{DummyAllocator, DummyBuffer, DummyPass, PassCommand};

    fn triangle(x: f32) -> BatchedGeometry {
        let g = Geometry::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]).with_indices(vec![0, 1, 2]);
        BatchedGeometry::new(Arc::new(g), Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    fn batch() -> MeshBatch<DummyBuffer> {
        MeshBatch::meshes(BatchConfig::labeled("test"))
    }

    fn counter(batch: &mut MeshBatch<DummyBuffer>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        batch.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    // ── dirty tracking ────────────────────────────────────────────────────

    #[test]
    fn new_batch_is_clean_and_empty() {
        let b = batch();
        assert_eq!(b.fill().default_color, [1.0; 4]);
        assert!(!b.is_dirty());
        assert!(b.geometries().is_empty());
        assert_eq!(b.topology(), wgpu::PrimitiveTopology::TriangleList);
        assert!(b.draw_range().is_none());
    }

    #[test]
    fn set_geometries_marks_dirty_and_commit_clears() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);
        assert!(b.is_dirty());

        assert!(b.commit(&alloc).unwrap());
        assert!(!b.is_dirty());
        assert!(!b.commit(&alloc).unwrap());
    }

    #[test]
    fn commit_uploads_once_per_invalidation() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);

        b.commit(&alloc).unwrap();
        b.commit(&alloc).unwrap();
        assert_eq!(alloc.writes(), 2); // vertices + indices

        b.invalidate();
        assert!(b.commit(&alloc).unwrap());
        assert_eq!(alloc.writes(), 4);
        assert_eq!(b.stats().builds, 2);
    }

    #[test]
    fn handlers_fire_per_set_and_per_rebuild() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        let count = counter(&mut b);

        b.set_geometries(vec![triangle(0.0)]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        b.commit(&alloc).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        b.commit(&alloc).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        b.set_geometries(vec![triangle(1.0)]);
        b.set_geometries(vec![triangle(2.0)]);
        b.commit(&alloc).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn invalidate_raises_once_and_forces_rebuild() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);
        b.commit(&alloc).unwrap();
        let count = counter(&mut b);

        b.invalidate();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(b.is_dirty());

        assert!(b.commit(&alloc).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handler_may_reenter_after_commit() {
        use std::sync::Weak;

        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);

        // Handlers run outside the lock, so taking it again must not deadlock.
        let target: Arc<Mutex<Weak<MeshBatch<DummyBuffer>>>> = Arc::new(Mutex::new(Weak::new()));
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let target = Arc::clone(&target);
            let seen = Arc::clone(&seen);
            b.subscribe(move || {
                if let Some(b) = target.lock().upgrade() {
                    if !b.is_dirty() {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        let b = Arc::new(b);
        *target.lock() = Arc::downgrade(&b);
        assert!(b.commit(&alloc).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    // ── contents ──────────────────────────────────────────────────────────

    #[test]
    fn commit_uploads_rebased_indices() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0), triangle(1.0), triangle(2.0)]);
        b.commit(&alloc).unwrap();

        let indices = b.with_buffers(|_, ib| ib.unwrap().read::<u32>(9));
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(b.vertex_count(), 9);
        assert_eq!(b.index_count(), 9);
        assert_eq!(b.draw_range(), Some(DrawRange::Indexed(0..9)));
    }

    #[test]
    fn bindings_describe_vertex_buffer() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);
        b.commit(&alloc).unwrap();

        assert_eq!(
            b.vertex_buffer_bindings(),
            vec![VertexBufferBinding {
                stride: 52,
                offset: 0,
                size: 3 * 52,
            }]
        );
    }

    #[test]
    fn stats_track_bounds() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0), triangle(10.0)]);
        b.commit(&alloc).unwrap();

        let bounds = b.bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(11.0, 1.0, 0.0));
        assert_eq!(b.stats().geometry_count, 2);
    }

    #[test]
    fn clearing_uploads_empty_and_keeps_allocation() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);
        b.commit(&alloc).unwrap();

        b.clear_geometries();
        assert!(b.commit(&alloc).unwrap());
        assert_eq!(b.vertex_count(), 0);
        assert!(b.vertex_buffer_bindings().is_empty());
        assert_eq!(alloc.live_buffers(), 2);

        let mut pass = DummyPass::new();
        let mut slot = 0;
        assert!(!b.attach_buffers(&alloc, &mut pass, &mut slot).unwrap());
        assert!(pass.commands.is_empty());
    }

    // ── attach ────────────────────────────────────────────────────────────

    #[test]
    fn attach_binds_and_advances_slot() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);

        let mut pass = DummyPass::new();
        let mut slot = 2;
        assert!(b.attach_buffers(&alloc, &mut pass, &mut slot).unwrap());
        assert_eq!(slot, 3);
        assert!(!b.is_dirty());

        let (vb, ib) = b.with_buffers(|v, i| (v.unwrap().id(), i.unwrap().id()));
        assert_eq!(
            pass.commands,
            vec![
                PassCommand::SetVertexBuffer {
                    slot: 2,
                    buffer: vb,
                    binding: VertexBufferBinding {
                        stride: 52,
                        offset: 0,
                        size: 156,
                    },
                },
                PassCommand::SetIndexBuffer {
                    buffer: ib,
                    format: wgpu::IndexFormat::Uint32,
                    size: 12,
                },
                PassCommand::SetTopology(wgpu::PrimitiveTopology::TriangleList),
            ]
        );
    }

    #[test]
    fn attach_clears_index_binding_without_indices() {
        let alloc = DummyAllocator::new();
        let mut b: LineBatch<DummyBuffer> = LineBatch::lines(BatchConfig::default());
        let g = Geometry::new(vec![Vec3::ZERO, Vec3::X]);
        b.set_geometries(vec![BatchedGeometry::new(Arc::new(g), Mat4::IDENTITY)]);

        let mut pass = DummyPass::new();
        let mut slot = 0;
        assert!(b.attach_buffers(&alloc, &mut pass, &mut slot).unwrap());
        assert_eq!(pass.commands[1], PassCommand::ClearIndexBuffer);
        assert_eq!(pass.commands[2], PassCommand::SetTopology(wgpu::PrimitiveTopology::LineList));
        assert_eq!(b.draw_range(), Some(DrawRange::Vertices(0..2)));
    }

    #[test]
    fn set_topology_is_used_on_attach() {
        let alloc = DummyAllocator::new();
        let mut b: PointBatch<DummyBuffer> = PointBatch::points(BatchConfig::default());
        assert_eq!(b.topology(), wgpu::PrimitiveTopology::PointList);
        b.set_topology(wgpu::PrimitiveTopology::LineStrip);
        b.set_geometries(vec![BatchedGeometry::new(
            Arc::new(Geometry::new(vec![Vec3::ZERO])),
            Mat4::IDENTITY,
        )]);

        let mut pass = DummyPass::new();
        let mut slot = 0;
        b.attach_buffers(&alloc, &mut pass, &mut slot).unwrap();
        assert_eq!(
            pass.commands.last(),
            Some(&PassCommand::SetTopology(wgpu::PrimitiveTopology::LineStrip))
        );
    }

    // ── failures / teardown ───────────────────────────────────────────────

    #[test]
    fn failed_allocation_keeps_dirty_and_old_buffers() {
        let alloc = DummyAllocator::with_max_buffer_size(256);
        let mut b = batch();
        b.set_geometries(vec![triangle(0.0)]);
        b.commit(&alloc).unwrap();
        let before = b.with_buffers(|v, _| v.unwrap().contents());

        // 3 triangles * 3 vertices * 52 bytes = 468 bytes > 256
        b.set_geometries(vec![triangle(5.0), triangle(6.0), triangle(7.0)]);
        assert!(b.commit(&alloc).is_err());
        assert!(b.is_dirty());
        assert_eq!(b.vertex_count(), 3);
        assert_eq!(b.with_buffers(|v, _| v.unwrap().contents()), before);
    }

    #[test]
    fn dispose_releases_buffers_once() {
        let alloc = DummyAllocator::new();
        let mut b = batch();
        let _count = counter(&mut b);
        b.set_geometries(vec![triangle(0.0)]);
        b.commit(&alloc).unwrap();
        assert_eq!(alloc.live_buffers(), 2);

        b.dispose();
        b.dispose();
        assert!(b.is_disposed());
        assert_eq!(alloc.live_buffers(), 0);
        assert_eq!(b.subscriber_count(), 0);
        assert!(b.vertex_buffer_bindings().is_empty());
        assert!(b.commit(&alloc).is_err());

        let mut pass = DummyPass::new();
        let mut slot = 0;
        assert!(b.attach_buffers(&alloc, &mut pass, &mut slot).is_err());
        assert_eq!(slot, 0);
        assert!(pass.commands.is_empty());
    }

    #[test]
    fn drop_releases_buffers() {
        let alloc = DummyAllocator::new();
        {
            let mut b = batch();
            b.set_geometries(vec![triangle(0.0)]);
            b.commit(&alloc).unwrap();
            assert_eq!(alloc.live_buffers(), 2);
        }
        assert_eq!(alloc.live_buffers(), 0);
    }

    #[test]
    fn dispose_without_allocation_is_harmless() {
        let mut b = batch();
        b.dispose();
        assert!(b.is_disposed());
    }
}
