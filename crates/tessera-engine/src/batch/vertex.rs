use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3};

use crate::geometry::BatchedGeometry;

/// A vertex layout that can live in a merged batch buffer.
pub trait BatchVertex: Pod + Send + Sync {
    /// Shader-visible attributes, in location order.
    const ATTRIBUTES: &'static [wgpu::VertexAttribute];

    /// Position in batch space, used for bounds.
    fn position(&self) -> Vec3;

    /// Bytes per vertex.
    #[inline]
    fn stride() -> u64 {
        std::mem::size_of::<Self>() as u64
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::stride(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: Self::ATTRIBUTES,
        }
    }
}

/// Converts one record's geometry into batch vertices.
///
/// `fill` receives a slice of exactly `record.vertex_count()` vertices and must
/// write every one of them. Strategies are shared across fill workers, hence
/// `Sync`.
pub trait VertexFill: Send + Sync {
    type Vertex: BatchVertex;

    fn fill(&self, record: &BatchedGeometry, out: &mut [Self::Vertex]);
}

// ── mesh ──────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
    pub material_index: u32,
}

impl BatchVertex for MeshVertex {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x3, // normal
        2 => Float32x2, // texcoord
        3 => Float32x4, // color
        4 => Uint32     // material index
    ];

    #[inline]
    fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Fill for lit, textured meshes.
///
/// Positions go through the model transform; normals through its
/// inverse-transpose and are re-normalized. Missing normals become zero,
/// missing texcoords `(0, 0)`, missing colors `default_color`.
#[derive(Debug, Clone)]
pub struct MeshFill {
    pub default_color: [f32; 4],
}

impl Default for MeshFill {
    fn default() -> Self {
        Self {
            default_color: [1.0; 4],
        }
    }
}

impl VertexFill for MeshFill {
    type Vertex = MeshVertex;

    fn fill(&self, record: &BatchedGeometry, out: &mut [MeshVertex]) {
        let g = &*record.geometry;
        debug_assert_eq!(out.len(), g.vertex_count());

        let model = record.model_transform;
        let normal_matrix = normal_matrix(&model);

        for (i, (dst, &p)) in out.iter_mut().zip(&g.positions).enumerate() {
            let normal = attribute(&g.normals, i).unwrap_or(Vec3::ZERO);
            let texcoord = attribute(&g.texcoords, i).unwrap_or(Vec2::ZERO);
            let color = attribute(&g.colors, i).unwrap_or(self.default_color);

            *dst = MeshVertex {
                position: model.transform_point3(p).to_array(),
                normal: (normal_matrix * normal).normalize_or_zero().to_array(),
                texcoord: texcoord.to_array(),
                color,
                material_index: record.material_index,
            };
        }
    }
}

// ── lines / points ────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl BatchVertex for ColoredVertex {
    const ATTRIBUTES: &'static [wgpu::VertexAttribute] = &wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x4  // color
    ];

    #[inline]
    fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Fill for unlit line and point geometry.
#[derive(Debug, Clone)]
pub struct ColoredFill {
    pub default_color: [f32; 4],
}

impl Default for ColoredFill {
    fn default() -> Self {
        Self {
            default_color: [1.0; 4],
        }
    }
}

impl VertexFill for ColoredFill {
    type Vertex = ColoredVertex;

    fn fill(&self, record: &BatchedGeometry, out: &mut [ColoredVertex]) {
        let g = &*record.geometry;
        debug_assert_eq!(out.len(), g.vertex_count());

        let model = record.model_transform;
        for (i, (dst, &p)) in out.iter_mut().zip(&g.positions).enumerate() {
            *dst = ColoredVertex {
                position: model.transform_point3(p).to_array(),
                color: attribute(&g.colors, i).unwrap_or(self.default_color),
            };
        }
    }
}

#[inline]
fn attribute<T: Copy>(values: &Option<Vec<T>>, i: usize) -> Option<T> {
    values.as_ref().and_then(|v| v.get(i)).copied()
}

/// Inverse-transpose of the upper 3x3; falls back to the plain 3x3 for
/// singular transforms (e.g. a zero scale axis).
fn normal_matrix(model: &Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(*model);
    if linear.determinant().abs() <= f32::EPSILON {
        linear
    } else {
        linear.inverse().transpose()
    }
}
