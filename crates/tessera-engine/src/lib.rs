//! Tessera engine crate.
//!
//! Merges many independently transformed geometries into one vertex buffer and
//! one index buffer so a whole static set can be drawn with a single call.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`geometry`] | `Geometry`, `BatchedGeometry`, `Aabb` |
//! | [`batch`] | `GeometryBatch`, vertex layouts, fill strategies, `BatchConfig` |
//! | [`render`] | backend seams (`BufferAllocator`, `DrawContext`), wgpu and dummy backends |
//! | [`device`] | headless wgpu device and offscreen frames |
//! | [`logging`] | logger initialization |

pub mod batch;
pub mod device;
pub mod geometry;
pub mod logging;
pub mod render;
