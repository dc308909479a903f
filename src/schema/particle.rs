//! Particle description: identity, geometry template and trajectory.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::geometry::{Mesh, shapes};

fn default_colour() -> [f32; 3] {
    [0.7, 0.7, 0.7]
}

fn default_resolution() -> u32 {
    10
}

/// Placement of one instance of a particle's template at a single step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    /// Explicit rotation; takes precedence over `director`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Quat>,
    /// Direction the template's +Z axis is turned towards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<Vec3>,
}

impl Pose {
    /// Pose at `position` with the template's own orientation.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: None,
            director: None,
        }
    }

    pub fn oriented(position: Vec3, orientation: Quat) -> Self {
        Self {
            orientation: Some(orientation),
            ..Self::at(position)
        }
    }

    /// Pose whose template +Z axis points along `director` (any length).
    pub fn directed(position: Vec3, director: Vec3) -> Self {
        Self {
            director: Some(director),
            ..Self::at(position)
        }
    }

    /// Rotation applied to the template.
    ///
    /// Identity when neither an orientation nor a non-zero director is set.
    #[inline]
    pub fn rotation(&self) -> Quat {
        if let Some(orientation) = self.orientation {
            return orientation;
        }
        match self.director.map(Vec3::normalize_or_zero) {
            Some(dir) if dir != Vec3::ZERO => Quat::from_rotation_arc(Vec3::Z, dir),
            _ => Quat::IDENTITY,
        }
    }
}

/// Primitive shape a particle is drawn with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Sphere {
        radius: f32,
        #[serde(default = "default_resolution")]
        resolution: u32,
    },
    /// Cylinder centred on the origin, axis along +Z before rotation.
    Cylinder {
        radius: f32,
        height: f32,
        #[serde(default = "default_resolution")]
        resolution: u32,
    },
    /// Arbitrary triangle mesh supplied by the caller.
    Custom { mesh: Mesh },
}

/// Shape plus colour; instantiated once per step by the frame cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryTemplate {
    pub shape: Shape,
    /// RGB colour, components in [0, 1].
    #[serde(default = "default_colour")]
    pub colour: [f32; 3],
}

impl GeometryTemplate {
    pub fn sphere(radius: f32, colour: [f32; 3], resolution: u32) -> Self {
        Self {
            shape: Shape::Sphere { radius, resolution },
            colour,
        }
    }

    pub fn cylinder(radius: f32, height: f32, colour: [f32; 3], resolution: u32) -> Self {
        Self {
            shape: Shape::Cylinder {
                radius,
                height,
                resolution,
            },
            colour,
        }
    }

    pub fn custom(mesh: Mesh, colour: [f32; 3]) -> Self {
        Self {
            shape: Shape::Custom { mesh },
            colour,
        }
    }

    /// Build the template mesh at the origin with the template colour applied.
    pub fn base_mesh(&self) -> Mesh {
        let mut mesh = match &self.shape {
            Shape::Sphere { radius, resolution } => shapes::uv_sphere(*radius, *resolution),
            Shape::Cylinder {
                radius,
                height,
                resolution,
            } => shapes::cylinder(*radius, *height, *resolution),
            Shape::Custom { mesh } => mesh.clone(),
        };
        mesh.paint(self.colour);
        mesh
    }
}

/// A named group of identical objects moving along a precomputed trajectory.
///
/// Every step lists the poses of all instances at that step; the group is
/// drawn as one geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    /// Unique name; also the geometry key inside the rendering engine.
    pub name: String,
    #[serde(rename = "mesh")]
    pub template: GeometryTemplate,
    /// Instance poses, one list per simulation step.
    pub trajectory: Vec<Vec<Pose>>,
}

impl Particle {
    pub fn new(
        name: impl Into<String>,
        template: GeometryTemplate,
        trajectory: Vec<Vec<Pose>>,
    ) -> Self {
        Self {
            name: name.into(),
            template,
            trajectory,
        }
    }

    /// Single instance, one pose per step.
    pub fn from_poses<I>(name: impl Into<String>, template: GeometryTemplate, poses: I) -> Self
    where
        I: IntoIterator<Item = Pose>,
    {
        Self::new(name, template, poses.into_iter().map(|p| vec![p]).collect())
    }

    /// Single instance with position-only poses.
    pub fn from_positions<I>(name: impl Into<String>, template: GeometryTemplate, positions: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        Self::from_poses(name, template, positions.into_iter().map(Pose::at))
    }

    /// Group of instances given as positions per step.
    pub fn group<I, S>(name: impl Into<String>, template: GeometryTemplate, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = Vec3>,
    {
        let trajectory = steps
            .into_iter()
            .map(|step| step.into_iter().map(Pose::at).collect())
            .collect();
        Self::new(name, template, trajectory)
    }

    /// Group of instances with a director per instance and step.
    ///
    /// `positions` and `directors` must have the same shape.
    pub fn directed_group(
        name: impl Into<String>,
        template: GeometryTemplate,
        positions: Vec<Vec<Vec3>>,
        directors: Vec<Vec<Vec3>>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let same_shape = positions.len() == directors.len()
            && positions.iter().zip(&directors).all(|(p, d)| p.len() == d.len());
        if !same_shape {
            return Err(ConfigError::DirectorShapeMismatch(name));
        }

        let trajectory = positions
            .into_iter()
            .zip(directors)
            .map(|(p, d)| p.into_iter().zip(d).map(|(p, d)| Pose::directed(p, d)).collect())
            .collect();
        Ok(Self::new(name, template, trajectory))
    }

    /// Number of steps in the trajectory.
    #[inline]
    pub fn steps(&self) -> usize {
        self.trajectory.len()
    }

    /// Largest number of instances at any step.
    pub fn max_instances(&self) -> usize {
        self.trajectory.iter().map(Vec::len).max().unwrap_or(0)
    }
}
