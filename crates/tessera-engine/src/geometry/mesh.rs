use anyhow::{Result, ensure};
use glam::{Vec2, Vec3};

use super::Aabb;

/// Immutable source geometry in local (model) space.
///
/// Positions are required; every other attribute is optional. `indices = None`
/// means the geometry contributes no indices to a batch (its vertices are still
/// merged). Attribute vectors, when present, are expected to have one entry per
/// position; use [`Geometry::validate`] to check that before batching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub texcoords: Option<Vec<Vec2>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_texcoords(mut self, texcoords: Vec<Vec2>) -> Self {
        self.texcoords = Some(texcoords);
        self
    }

    pub fn with_colors(mut self, colors: Vec<[f32; 4]>) -> Self {
        self.colors = Some(colors);
        self
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of indices; 0 when the geometry has none.
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.as_ref().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Local-space bounds of all positions.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Checks the invariants the batching engine relies on but does not verify:
    /// attribute lengths match the position count and every index addresses an
    /// existing vertex.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertex_count();

        if let Some(normals) = &self.normals {
            ensure!(normals.len() == n, "geometry has {} normals for {n} positions", normals.len());
        }
        if let Some(texcoords) = &self.texcoords {
            ensure!(
                texcoords.len() == n,
                "geometry has {} texcoords for {n} positions",
                texcoords.len()
            );
        }
        if let Some(colors) = &self.colors {
            ensure!(colors.len() == n, "geometry has {} colors for {n} positions", colors.len());
        }
        if let Some(indices) = &self.indices {
            if let Some((at, &bad)) = indices.iter().enumerate().find(|&(_, &i)| i as usize >= n) {
                anyhow::bail!("index {bad} at position {at} is out of range for {n} vertices");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]).with_indices(vec![0, 1, 2])
    }

    #[test]
    fn counts() {
        let g = triangle();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.index_count(), 3);
        assert_eq!(Geometry::new(vec![Vec3::ZERO]).index_count(), 0);
    }

    #[test]
    fn validate_accepts_consistent_geometry() {
        let g = triangle()
            .with_normals(vec![Vec3::Z; 3])
            .with_colors(vec![[1.0; 4]; 3]);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let g = Geometry::new(vec![Vec3::ZERO, Vec3::X]).with_indices(vec![0, 1, 2]);
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn validate_rejects_short_attribute() {
        let g = triangle().with_normals(vec![Vec3::Z; 2]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn bounds_of_triangle() {
        let b = triangle().bounds();
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));
    }
}
