//! Schema module - Configuration, particle and scene types.

mod config;
mod particle;
mod scene;

pub use config::*;
pub use particle::*;
pub use scene::*;
