//! Geometry module - Meshes, primitive shapes and per-step frame caches.

mod cache;
mod mesh;
pub mod shapes;

pub use cache::*;
pub use mesh::*;
