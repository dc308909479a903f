//! Primitive meshes used by geometry templates.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use super::Mesh;

/// UV sphere centred on the origin.
///
/// `resolution` is the number of latitude bands; longitude uses twice as many.
pub fn uv_sphere(radius: f32, resolution: u32) -> Mesh {
    let stacks = resolution.max(2);
    let slices = (2 * resolution).max(3);

    let mut vertices = Vec::with_capacity(((stacks - 1) * slices + 2) as usize);
    vertices.push(Vec3::new(0.0, 0.0, radius));
    for i in 1..stacks {
        let (st, ct) = (PI * i as f32 / stacks as f32).sin_cos();
        for j in 0..slices {
            let (sp, cp) = (TAU * j as f32 / slices as f32).sin_cos();
            vertices.push(Vec3::new(radius * st * cp, radius * st * sp, radius * ct));
        }
    }
    let south = vertices.len() as u32;
    vertices.push(Vec3::new(0.0, 0.0, -radius));

    // Index of vertex `j` on latitude ring `i` (1-based).
    let ring = |i: u32, j: u32| 1 + (i - 1) * slices + (j % slices);

    let mut triangles = Vec::with_capacity((2 * slices * (stacks - 1)) as usize);
    for j in 0..slices {
        triangles.push([0, ring(1, j), ring(1, j + 1)]);
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            triangles.push([a, c, d]);
            triangles.push([a, d, b]);
        }
    }
    for j in 0..slices {
        triangles.push([south, ring(stacks - 1, j + 1), ring(stacks - 1, j)]);
    }

    Mesh::new(vertices, triangles)
}

/// Capped cylinder centred on the origin with its axis along +Z.
pub fn cylinder(radius: f32, height: f32, resolution: u32) -> Mesh {
    let slices = resolution.max(3);
    let half = 0.5 * height;

    let mut vertices = Vec::with_capacity((2 * slices + 2) as usize);
    for z in [-half, half] {
        for j in 0..slices {
            let (s, c) = (TAU * j as f32 / slices as f32).sin_cos();
            vertices.push(Vec3::new(radius * c, radius * s, z));
        }
    }
    let bottom_centre = vertices.len() as u32;
    vertices.push(Vec3::new(0.0, 0.0, -half));
    let top_centre = vertices.len() as u32;
    vertices.push(Vec3::new(0.0, 0.0, half));

    let mut triangles = Vec::with_capacity((4 * slices) as usize);
    for j in 0..slices {
        let j1 = (j + 1) % slices;
        let (b0, b1) = (j, j1);
        let (t0, t1) = (slices + j, slices + j1);
        triangles.push([b0, b1, t1]);
        triangles.push([b0, t1, t0]);
        triangles.push([bottom_centre, b1, b0]);
        triangles.push([top_centre, t0, t1]);
    }

    Mesh::new(vertices, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_topology() {
        let mesh = uv_sphere(2.0, 5);
        // 4 rings of 10 plus two poles
        assert_eq!(mesh.vertex_count(), 4 * 10 + 2);
        assert_eq!(mesh.triangle_count(), 2 * 10 * 4);
        for v in &mesh.vertices {
            assert!((v.length() - 2.0).abs() < 1e-5);
        }
        let n = mesh.vertex_count() as u32;
        assert!(mesh.triangles.iter().flatten().all(|&i| i < n));
    }

    #[test]
    fn test_sphere_minimum_resolution() {
        let mesh = uv_sphere(1.0, 0);
        assert_eq!(mesh.vertex_count(), 3 + 2);
        assert_eq!(mesh.triangle_count(), 6);
    }

    #[test]
    fn test_cylinder_topology() {
        let mesh = cylinder(0.5, 4.0, 8);
        assert_eq!(mesh.vertex_count(), 18);
        assert_eq!(mesh.triangle_count(), 32);
        let (lo, hi) = mesh.bounds().unwrap();
        assert!((lo.z + 2.0).abs() < 1e-6);
        assert!((hi.z - 2.0).abs() < 1e-6);
    }
}
