//! Flattening records into one vertex array and one re-based index array.

use anyhow::{Result, ensure};

use super::{BatchConfig, BatchVertex, VertexFill};
use crate::geometry::{Aabb, BatchedGeometry};

/// CPU-side result of one merge.
pub(crate) struct Merged<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
    pub parallel: bool,
    /// Bounds of every merged vertex position.
    pub bounds: Aabb,
}

impl<V> Merged<V> {
    /// No geometry. `Vec::new` does not allocate.
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            parallel: false,
            bounds: Aabb::EMPTY,
        }
    }
}

/// Prefix sums of per-record vertex and index counts.
///
/// Both tables have `records + 1` entries so record `i` owns
/// `table[i]..table[i + 1]`. A record without indices owns an empty index
/// range rather than a reserved slot.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct OffsetTable {
    pub vertex: Vec<usize>,
    pub index: Vec<usize>,
}

impl OffsetTable {
    pub fn new(records: &[BatchedGeometry]) -> Self {
        let mut vertex = Vec::with_capacity(records.len() + 1);
        let mut index = Vec::with_capacity(records.len() + 1);
        let (mut v, mut x) = (0, 0);
        vertex.push(v);
        index.push(x);
        for r in records {
            v += r.vertex_count();
            x += r.index_count();
            vertex.push(v);
            index.push(x);
        }
        Self { vertex, index }
    }
}

/// Merges `records` into flat arrays.
///
/// Output is identical for the sequential and parallel paths: every record's
/// data lands at offsets fixed by the preceding records' counts.
pub(crate) fn merge<F: VertexFill>(
    fill: &F,
    records: &[BatchedGeometry],
    config: &BatchConfig,
) -> Result<Merged<F::Vertex>> {
    let (total_vertices, total_indices) = records
        .iter()
        .fold((0usize, 0usize), |(v, x), r| (v + r.vertex_count(), x + r.index_count()));

    ensure!(
        u32::try_from(total_vertices).is_ok(),
        "{}: merged vertex count {total_vertices} exceeds the 32-bit index range",
        config.label
    );

    let mut vertices = vec![<F::Vertex as bytemuck::Zeroable>::zeroed(); total_vertices];
    let mut indices = vec![0u32; total_indices];

    let parallel = config.use_parallel(records.len(), total_vertices);
    let bounds = if parallel {
        fill_parallel(fill, records, config.effective_workers(), &mut vertices, &mut indices)
    } else {
        fill_sequential(fill, records, &mut vertices, &mut indices)
    };

    Ok(Merged {
        vertices,
        indices,
        parallel,
        bounds,
    })
}

/// Single pass with running offsets; no offset tables.
fn fill_sequential<F: VertexFill>(
    fill: &F,
    records: &[BatchedGeometry],
    vertices: &mut [F::Vertex],
    indices: &mut [u32],
) -> Aabb {
    let (mut v, mut x) = (0usize, 0usize);
    let mut bounds = Aabb::EMPTY;
    for r in records {
        let (vc, xc) = (r.vertex_count(), r.index_count());
        let dst = &mut vertices[v..v + vc];
        fill_record(fill, r, v as u32, dst, &mut indices[x..x + xc]);
        bounds = bounds.union(vertex_bounds(dst));
        v += vc;
        x += xc;
    }
    bounds
}

/// Partitions `records` into contiguous runs and fills each run's disjoint
/// vertex and index slices on its own scoped thread. Each worker also bounds
/// the vertices it wrote; the partial bounds are unioned after the join.
fn fill_parallel<F: VertexFill>(
    fill: &F,
    records: &[BatchedGeometry],
    workers: usize,
    vertices: &mut [F::Vertex],
    indices: &mut [u32],
) -> Aabb {
    let offsets = OffsetTable::new(records);
    let partitions = workers.min(records.len()).max(1);
    let run = records.len().div_ceil(partitions);

    std::thread::scope(|scope| {
        let offsets = &offsets;
        let mut vertex_rest = vertices;
        let mut index_rest = indices;
        let mut workers = Vec::with_capacity(partitions);

        for (p, part) in records.chunks(run).enumerate() {
            let first = p * run;
            let end = first + part.len();

            let (vertex_part, vertex_tail) = std::mem::take(&mut vertex_rest)
                .split_at_mut(offsets.vertex[end] - offsets.vertex[first]);
            let (index_part, index_tail) = std::mem::take(&mut index_rest)
                .split_at_mut(offsets.index[end] - offsets.index[first]);
            vertex_rest = vertex_tail;
            index_rest = index_tail;

            workers.push(scope.spawn(move || {
                let mut vertex_part = vertex_part;
                let mut index_part = index_part;
                let mut bounds = Aabb::EMPTY;
                for (k, r) in part.iter().enumerate() {
                    let (dst_vertices, vertex_tail) =
                        std::mem::take(&mut vertex_part).split_at_mut(r.vertex_count());
                    let (dst_indices, index_tail) =
                        std::mem::take(&mut index_part).split_at_mut(r.index_count());
                    vertex_part = vertex_tail;
                    index_part = index_tail;

                    let vertex_start = offsets.vertex[first + k] as u32;
                    fill_record(fill, r, vertex_start, dst_vertices, dst_indices);
                    bounds = bounds.union(vertex_bounds(dst_vertices));
                }
                bounds
            }));
        }

        workers.into_iter().fold(Aabb::EMPTY, |bounds, worker| {
            match worker.join() {
                Ok(part) => bounds.union(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    })
}

#[inline]
fn vertex_bounds<V: BatchVertex>(vertices: &[V]) -> Aabb {
    Aabb::from_points(vertices.iter().map(BatchVertex::position))
}

#[inline]
fn fill_record<F: VertexFill>(
    fill: &F,
    record: &BatchedGeometry,
    vertex_start: u32,
    vertices: &mut [F::Vertex],
    indices: &mut [u32],
) {
    fill.fill(record, vertices);
    if let Some(src) = &record.geometry.indices {
        for (dst, &local) in indices.iter_mut().zip(src) {
            *dst = local + vertex_start;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::batch::{ColoredFill, MeshFill};
    use crate::geometry::Geometry;

    fn triangle_at(x: f32) -> BatchedGeometry {
        let g = Geometry::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]).with_indices(vec![0, 1, 2]);
        BatchedGeometry::new(Arc::new(g), Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    fn points(n: usize) -> BatchedGeometry {
        let g = Geometry::new(vec![Vec3::ONE; n]);
        BatchedGeometry::new(Arc::new(g), Mat4::IDENTITY)
    }

    // ── offsets ───────────────────────────────────────────────────────────

    #[test]
    fn offset_table_is_prefix_sum() {
        let records = [triangle_at(0.0), points(4), triangle_at(1.0)];
        let t = OffsetTable::new(&records);
        assert_eq!(t.vertex, vec![0, 3, 7, 10]);
        // the index-free record owns an empty range
        assert_eq!(t.index, vec![0, 3, 3, 6]);
    }

    #[test]
    fn offset_table_empty() {
        let t = OffsetTable::new(&[]);
        assert_eq!(t.vertex, vec![0]);
        assert_eq!(t.index, vec![0]);
    }

    // ── merge ─────────────────────────────────────────────────────────────

    #[test]
    fn sequential_rebases_indices() {
        let records = [triangle_at(0.0), points(2), triangle_at(5.0)];
        let m = merge(&ColoredFill::default(), &records, &BatchConfig::sequential()).unwrap();

        assert!(!m.parallel);
        assert_eq!(m.vertices.len(), 8);
        assert_eq!(m.indices, vec![0, 1, 2, 5, 6, 7]);
        assert_eq!(m.vertices[5].position, [5.0, 0.0, 0.0]);
    }

    #[test]
    fn parallel_matches_sequential() {
        let records: Vec<_> = (0..37)
            .map(|i| if i % 5 == 0 { points(i % 7 + 1) } else { triangle_at(i as f32) })
            .collect();

        let seq = merge(&MeshFill::default(), &records, &BatchConfig::sequential()).unwrap();
        for workers in [1, 2, 3, 8, 64] {
            let config = BatchConfig::always_parallel().with_worker_threads(workers);
            let par = merge(&MeshFill::default(), &records, &config).unwrap();
            assert!(par.parallel);
            assert_eq!(par.indices, seq.indices, "workers = {workers}");
            assert_eq!(par.bounds, seq.bounds, "workers = {workers}");
            assert_eq!(
                bytemuck::cast_slice::<_, u8>(&par.vertices),
                bytemuck::cast_slice::<_, u8>(&seq.vertices),
                "workers = {workers}"
            );
        }
    }

    #[test]
    fn bounds_cover_every_partition() {
        let records: Vec<_> = (0..12).map(|i| triangle_at(i as f32 * 2.0)).collect();
        let config = BatchConfig::always_parallel().with_worker_threads(4);
        let m = merge(&ColoredFill::default(), &records, &config).unwrap();

        assert_eq!(m.bounds.min, Vec3::ZERO);
        assert_eq!(m.bounds.max, Vec3::new(23.0, 1.0, 0.0));
        assert_eq!(m.bounds, Aabb::from_points(m.vertices.iter().map(|v| v.position())));
    }

    #[test]
    fn empty_merge_has_empty_bounds() {
        let m = merge(&MeshFill::default(), &[], &BatchConfig::always_parallel()).unwrap();
        assert!(m.bounds.is_empty());
    }

    #[test]
    fn records_without_vertices_are_skipped() {
        let empty = BatchedGeometry::new(Arc::new(Geometry::default()), Mat4::IDENTITY);
        let records = [empty.clone(), triangle_at(0.0), empty];
        let config = BatchConfig::always_parallel().with_worker_threads(3);
        let m = merge(&ColoredFill::default(), &records, &config).unwrap();
        assert_eq!(m.vertices.len(), 3);
        assert_eq!(m.indices, vec![0, 1, 2]);
    }

    #[test]
    fn default_config_goes_parallel_only_when_large() {
        let small: Vec<_> = (0..60).map(|_| points(10)).collect();
        let large: Vec<_> = (0..60).map(|_| points(100)).collect();
        let config = BatchConfig::default();

        assert!(!merge(&ColoredFill::default(), &small, &config).unwrap().parallel);
        assert!(merge(&ColoredFill::default(), &large, &config).unwrap().parallel);
    }
}
