//! Static geometry batching.
//!
//! A [`GeometryBatch`] merges an ordered list of [`BatchedGeometry`] records
//! into one vertex buffer and one index buffer:
//! - vertices are transformed to the batch's space by each record's model
//!   transform, through a pluggable [`VertexFill`] strategy
//! - indices are re-based so they address the merged vertex array
//! - large batches are filled in parallel over disjoint slices
//! - the merge runs at most once per invalidation
//!
//! [`BatchedGeometry`]: crate::geometry::BatchedGeometry

mod buffer;
mod config;
mod engine;
mod fill;
mod notify;
mod vertex;

pub use config::BatchConfig;
pub use engine::{BatchStats, GeometryBatch, LineBatch, MeshBatch, PointBatch};
pub use notify::{InvalidateHandler, RedrawRequest};
pub use vertex::{BatchVertex, ColoredFill, ColoredVertex, MeshFill, MeshVertex, VertexFill};
