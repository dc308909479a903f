//! Scene files: a viewer configuration plus the particles to show.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Particle, VisualizerConfig};
use crate::error::Result;

/// Everything needed to launch the viewer, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub config: VisualizerConfig,
    pub particles: Vec<Particle>,
}

impl Scene {
    /// Load a scene from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the scene as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}
