//! Triangle mesh with per-vertex colours.

use std::io::{self, Write};
use std::ops::AddAssign;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Colour used for vertices without an explicit colour.
const DEFAULT_COLOUR: [f32; 3] = [0.7, 0.7, 0.7];

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    /// RGB per vertex, components in [0, 1]. May be empty.
    #[serde(default)]
    pub colours: Vec<[f32; 3]>,
}

impl Mesh {
    /// Create an uncoloured mesh.
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            colours: Vec::new(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Colour of vertex `i`.
    #[inline]
    pub fn colour(&self, i: usize) -> [f32; 3] {
        self.colours.get(i).copied().unwrap_or(DEFAULT_COLOUR)
    }

    /// Assign a uniform colour to every vertex.
    pub fn paint(&mut self, colour: [f32; 3]) {
        self.colours.clear();
        self.colours.resize(self.vertices.len(), colour);
    }

    /// Copy of this mesh rotated about the origin, then translated.
    pub fn transformed(&self, rotation: Quat, translation: Vec3) -> Mesh {
        Mesh {
            vertices: self
                .vertices
                .iter()
                .map(|&v| rotation * v + translation)
                .collect(),
            triangles: self.triangles.clone(),
            colours: self.colours.clone(),
        }
    }

    /// Append another mesh, re-indexing its triangles.
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.vertices.len() as u32;
        // Keep colours aligned with vertices when only one side is coloured.
        if self.colours.len() < self.vertices.len() {
            self.colours.resize(self.vertices.len(), DEFAULT_COLOUR);
        }
        self.vertices.extend_from_slice(&other.vertices);
        self.colours
            .extend((0..other.vertices.len()).map(|i| other.colour(i)));
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }

    /// Axis-aligned bounding box, `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Mean vertex position.
    pub fn centroid(&self) -> Option<Vec3> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum: Vec3 = self.vertices.iter().copied().sum();
        Some(sum / self.vertices.len() as f32)
    }

    /// Write the mesh as an ASCII PLY model with vertex colours.
    pub fn write_ply<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "ply")?;
        writeln!(w, "format ascii 1.0")?;
        writeln!(w, "comment generated by znvis")?;
        writeln!(w, "element vertex {}", self.vertices.len())?;
        writeln!(w, "property float x")?;
        writeln!(w, "property float y")?;
        writeln!(w, "property float z")?;
        writeln!(w, "property uchar red")?;
        writeln!(w, "property uchar green")?;
        writeln!(w, "property uchar blue")?;
        writeln!(w, "element face {}", self.triangles.len())?;
        writeln!(w, "property list uchar int vertex_indices")?;
        writeln!(w, "end_header")?;

        for (i, v) in self.vertices.iter().enumerate() {
            let [r, g, b] = self.colour(i).map(to_byte);
            writeln!(w, "{} {} {} {} {} {}", v.x, v.y, v.z, r, g, b)?;
        }
        for t in &self.triangles {
            writeln!(w, "3 {} {} {}", t[0], t[1], t[2])?;
        }
        Ok(())
    }
}

impl AddAssign<&Mesh> for Mesh {
    fn add_assign(&mut self, other: &Mesh) {
        self.append(other);
    }
}

/// Convert a [0, 1] colour component to a byte.
#[inline]
pub fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}
