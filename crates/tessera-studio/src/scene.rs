//! Demo content: a field of unit cubes and a ground grid.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use tessera_engine::geometry::{BatchedGeometry, Geometry};

use crate::config::StudioConfig;

/// Unit cube centered on the origin with per-face normals.
pub fn cube() -> Geometry {
    // (normal, tangent u, tangent v) per face
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (n, u, v) in FACES {
        let base = positions.len() as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            positions.push(n * 0.5 + u * su + v * sv);
            normals.push(n);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Geometry::new(positions)
        .with_normals(normals)
        .with_indices(indices)
}

/// Cube records laid out on the XZ plane, heights driven by `phase`.
pub fn cube_field(cube: &Arc<Geometry>, config: &StudioConfig, phase: f32) -> Vec<BatchedGeometry> {
    let half = config.half_extent();
    let mut records = Vec::with_capacity((config.rows * config.cols) as usize);

    for row in 0..config.rows {
        for col in 0..config.cols {
            let x = col as f32 * config.spacing - half;
            let z = row as f32 * config.spacing - half;
            let wave = ((x * 0.15 + phase).sin() + (z * 0.2 + phase * 0.7).cos()) * 0.5;
            let height = 1.0 + 1.5 * (wave + 1.0);

            let transform = Mat4::from_scale_rotation_translation(
                Vec3::new(1.0, height, 1.0),
                Quat::from_rotation_y(wave * 0.4),
                Vec3::new(x, height * 0.5, z),
            );
            records.push(
                BatchedGeometry::new(Arc::clone(cube), transform)
                    .with_material_index(row * config.cols + col),
            );
        }
    }
    records
}

/// Ground grid as one shared unit segment along +X, instanced per line.
pub fn grid(config: &StudioConfig) -> Vec<BatchedGeometry> {
    let segment = Arc::new(
        Geometry::new(vec![Vec3::ZERO, Vec3::X])
            .with_colors(vec![[0.35, 0.38, 0.42, 1.0]; 2])
            .with_indices(vec![0, 1]),
    );

    let half = config.half_extent() + config.spacing;
    let length = half * 2.0;
    let lines = (length / config.spacing).ceil() as u32;

    let mut records = Vec::with_capacity(2 * (lines as usize + 1));
    for i in 0..=lines {
        let offset = i as f32 * config.spacing - half;
        // along X
        records.push(BatchedGeometry::new(
            Arc::clone(&segment),
            Mat4::from_translation(Vec3::new(-half, 0.0, offset))
                * Mat4::from_scale(Vec3::splat(length)),
        ));
        // along Z
        records.push(BatchedGeometry::new(
            Arc::clone(&segment),
            Mat4::from_translation(Vec3::new(offset, 0.0, -half))
                * Mat4::from_rotation_y(-std::f32::consts::FRAC_PI_2)
                * Mat4::from_scale(Vec3::splat(length)),
        ));
    }
    records
}
