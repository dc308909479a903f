//! Per-particle geometry precomputed for every step.
//!
//! Playback swaps whole meshes in and out of the scene, so every
//! (particle, step) instance is built up front. Memory grows with
//! particles × steps × template size.

use rayon::prelude::*;

use super::Mesh;
use crate::error::{Result, VisError};
use crate::schema::{ConfigError, Particle};

/// Positioned meshes for one particle, indexed by step.
#[derive(Debug, Clone)]
pub struct FrameCache {
    name: String,
    frames: Vec<Mesh>,
}

impl FrameCache {
    /// Instantiate the particle's template for each of the first `number_of_steps`
    /// steps; a step's mesh is the union of all its instances.
    pub fn build(particle: &Particle, number_of_steps: usize) -> Result<Self> {
        if particle.trajectory.len() < number_of_steps {
            return Err(ConfigError::TrajectoryTooShort {
                particle: particle.name.clone(),
                available: particle.trajectory.len(),
                required: number_of_steps,
            }
            .into());
        }

        let base = particle.template.base_mesh();
        let frames = particle.trajectory[..number_of_steps]
            .iter()
            .map(|instances| {
                let mut mesh = Mesh::default();
                for pose in instances {
                    mesh += &base.transformed(pose.rotation(), pose.position);
                }
                mesh
            })
            .collect();

        Ok(Self {
            name: particle.name.clone(),
            frames,
        })
    }

    /// Build caches for every particle in parallel, preserving order.
    pub fn build_all(particles: &[Particle], number_of_steps: usize) -> Result<Vec<Self>> {
        particles
            .par_iter()
            .map(|p| Self::build(p, number_of_steps))
            .collect()
    }

    /// Name of the particle this cache belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cached steps.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Mesh for `step`.
    pub fn get(&self, step: usize) -> Result<&Mesh> {
        self.frames.get(step).ok_or_else(|| VisError::StepOutOfRange {
            particle: self.name.clone(),
            step,
            steps: self.frames.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mesh> {
        self.frames.iter()
    }
}

/// Union of every particle's mesh at `step`.
pub fn combined_mesh(caches: &[FrameCache], step: usize) -> Result<Mesh> {
    let mut combined = Mesh::default();
    for cache in caches {
        combined += cache.get(step)?;
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GeometryTemplate, Pose};
    use glam::{Quat, Vec3};
    use proptest::prelude::*;

    fn particle(name: &str, steps: usize) -> Particle {
        Particle::from_positions(
            name,
            GeometryTemplate::sphere(1.0, [0.2, 0.4, 1.0], 4),
            (0..steps).map(|i| Vec3::new(i as f32, -(i as f32), 0.5)),
        )
    }

    #[test]
    fn test_cache_follows_trajectory() {
        let cache = FrameCache::build(&particle("a", 6), 6).unwrap();
        assert_eq!(cache.name(), "a");
        assert_eq!(cache.len(), 6);
        for step in 0..6 {
            let centre = cache.get(step).unwrap().centroid().unwrap();
            let expected = Vec3::new(step as f32, -(step as f32), 0.5);
            assert!((centre - expected).length() < 1e-4, "step {}", step);
        }
    }

    #[test]
    fn test_cache_applies_orientation() {
        let template = GeometryTemplate::cylinder(0.1, 2.0, [1.0, 1.0, 1.0], 6);
        let particle = Particle::from_poses(
            "rod",
            template,
            [Pose::oriented(
                Vec3::ZERO,
                Quat::from_rotation_arc(Vec3::Z, Vec3::X),
            )],
        );
        let cache = FrameCache::build(&particle, 1).unwrap();
        let (lo, hi) = cache.get(0).unwrap().bounds().unwrap();
        assert!((hi.x - 1.0).abs() < 1e-5);
        assert!((lo.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cache_unions_group_instances() {
        let template = GeometryTemplate::sphere(0.5, [0.2, 0.4, 1.0], 4);
        let single = template.base_mesh();
        let group = Particle::group(
            "swarm",
            template,
            (0..2).map(|s| (0..3).map(move |i| Vec3::new(i as f32 * 4.0, s as f32, 0.0))),
        );

        let cache = FrameCache::build(&group, 2).unwrap();
        let mesh = cache.get(1).unwrap();
        assert_eq!(mesh.vertex_count(), 3 * single.vertex_count());
        assert_eq!(mesh.triangle_count(), 3 * single.triangle_count());
        let centre = mesh.centroid().unwrap();
        assert!((centre - Vec3::new(4.0, 1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_cache_applies_directors() {
        let template = GeometryTemplate::cylinder(0.1, 2.0, [1.0, 1.0, 1.0], 6);
        let rods = Particle::directed_group(
            "rods",
            template,
            vec![vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)]],
            vec![vec![Vec3::Y, Vec3::new(0.0, 2.0, 0.0)]],
        )
        .unwrap();
        let cache = FrameCache::build(&rods, 1).unwrap();
        let (lo, hi) = cache.get(0).unwrap().bounds().unwrap();
        assert!((hi.y - 1.0).abs() < 1e-5);
        assert!((lo.y + 1.0).abs() < 1e-5);
        assert!(hi.z > 9.0 && lo.z < 1.0);
    }

    #[test]
    fn test_cache_truncates_to_requested_steps() {
        let cache = FrameCache::build(&particle("a", 10), 4).unwrap();
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_short_trajectory_is_an_error() {
        let result = FrameCache::build(&particle("short", 3), 5);
        assert!(matches!(
            result,
            Err(VisError::Config(ConfigError::TrajectoryTooShort { .. }))
        ));
    }

    #[test]
    fn test_missing_step_is_out_of_range() {
        let cache = FrameCache::build(&particle("a", 3), 3).unwrap();
        match cache.get(3) {
            Err(VisError::StepOutOfRange { step, steps, .. }) => {
                assert_eq!(step, 3);
                assert_eq!(steps, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_combined_mesh() {
        let caches = FrameCache::build_all(&[particle("a", 2), particle("b", 2)], 2).unwrap();
        let single = caches[0].get(1).unwrap();
        let combined = combined_mesh(&caches, 1).unwrap();
        assert_eq!(combined.vertex_count(), 2 * single.vertex_count());
        assert_eq!(combined.triangle_count(), 2 * single.triangle_count());
    }

    proptest! {
        #[test]
        fn prop_cache_has_one_entry_per_particle_step(n in 1usize..5, s in 1usize..12) {
            let particles: Vec<_> = (0..n).map(|i| particle(&format!("p{}", i), s)).collect();
            let caches = FrameCache::build_all(&particles, s).unwrap();
            prop_assert_eq!(caches.len(), n);
            let total: usize = caches.iter().map(|c| c.iter().count()).sum();
            prop_assert_eq!(total, n * s);
            for (cache, particle) in caches.iter().zip(&particles) {
                prop_assert_eq!(cache.name(), particle.name.as_str());
            }
        }
    }
}
