//! Source geometry consumed by the batching engine.
//!
//! Geometry is authored elsewhere (mesh builders, loaders) and handed to the
//! engine as immutable, reference-counted data. Each batched record pairs one
//! geometry with the transform that places it in the merged buffer's space.

mod bounds;
mod mesh;
mod record;

pub use bounds::Aabb;
pub use mesh::Geometry;
pub use record::BatchedGeometry;
