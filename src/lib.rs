//! ZnVis - Particle trajectory visualizer.
//!
//! Renders a set of particles, each with a mesh template and a per-step
//! trajectory, and lets the user step through the steps, play them as an
//! animation, and export screenshots, triangle meshes and videos.
//!
//! # Architecture
//!
//! - `schema`: Particles, visualizer configuration and scene files
//! - `geometry`: Meshes, primitive shapes and per-step frame caches
//! - `engine`: Rendering engine boundary, GUI-thread dispatcher and a headless engine
//! - `animation`: Playback loop, frame recording and video assembly
//! - `visualizer`: Ties the pieces together behind the user actions
//!
//! # Example
//!
//! ```rust,no_run
//! use glam::Vec3;
//! use znvis::{
//!     engine::HeadlessEngine,
//!     schema::{GeometryTemplate, Particle, VisualizerConfig},
//!     visualizer::{ACTION_EXPORT_VIDEO, Visualizer},
//! };
//!
//! let blue = Particle::from_positions(
//!     "Blue",
//!     GeometryTemplate::sphere(1.0, [0.1, 0.5, 1.0], 10),
//!     (0..100).map(|i| Vec3::new(i as f32 * 0.1, 0.0, 0.0)),
//! );
//!
//! let visualizer = Visualizer::<HeadlessEngine>::new(&[blue], VisualizerConfig::default())?;
//! let handle = visualizer.handle();
//! let dispatcher = visualizer.dispatcher();
//!
//! std::thread::spawn(move || {
//!     let _ = dispatcher.post(|engine: &mut HeadlessEngine| {
//!         engine.trigger_action(ACTION_EXPORT_VIDEO);
//!     });
//!     // ... later: handle.wait_for_export(), then dispatcher.close()
//! #   let _ = handle;
//! });
//!
//! let _engine = visualizer.run(HeadlessEngine::new())?;
//! # Ok::<(), znvis::VisError>(())
//! ```

pub mod animation;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod schema;
pub mod visualizer;

// Re-export commonly used types
pub use error::{Result, VisError};
pub use geometry::{FrameCache, Mesh};
pub use schema::{ConfigError, GeometryTemplate, Particle, Pose, Scene, VisualizerConfig};
pub use visualizer::{Visualizer, VisualizerHandle};
