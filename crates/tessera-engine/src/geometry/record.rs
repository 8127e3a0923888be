use std::sync::Arc;

use glam::Mat4;

use super::{Aabb, Geometry};

/// One geometry instance to merge into a batch.
///
/// The geometry is shared, never copied; the engine keeps only a snapshot of
/// the record list for the duration of a rebuild.
#[derive(Debug, Clone)]
pub struct BatchedGeometry {
    pub geometry: Arc<Geometry>,
    /// Maps the geometry's local space to the space the batch is rendered in.
    pub model_transform: Mat4,
    /// Written into mesh vertices so a single draw can index a material table.
    pub material_index: u32,
}

impl BatchedGeometry {
    pub fn new(geometry: Arc<Geometry>, model_transform: Mat4) -> Self {
        Self {
            geometry,
            model_transform,
            material_index: 0,
        }
    }

    pub fn with_material_index(mut self, material_index: u32) -> Self {
        self.material_index = material_index;
        self
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.geometry.index_count()
    }

    /// Bounds of the geometry after applying the model transform.
    pub fn world_bounds(&self) -> Aabb {
        self.geometry.bounds().transformed(&self.model_transform)
    }
}
