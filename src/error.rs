//! Error types shared across the viewer.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::schema::ConfigError;

/// Errors produced by the viewer core.
#[derive(Debug, thiserror::Error)]
pub enum VisError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Step {step} out of range for particle '{particle}' ({steps} steps cached)")]
    StepOutOfRange {
        particle: String,
        step: usize,
        steps: usize,
    },
    #[error("Step {step} is outside the animation (0..{steps})")]
    InvalidStep { step: usize, steps: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("No frames captured in {}", .0.display())]
    EmptyCapture(PathBuf),
    #[error("Frame {} is {actual:?}, expected {expected:?}", .path.display())]
    FrameDimensionMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("GUI thread did not respond within {0:?}")]
    DispatcherTimeout(Duration),
    #[error("GUI event loop has shut down")]
    DispatcherClosed,
    #[error("A video export is already in progress")]
    RecordingInProgress,
    #[error("Video encoder failed: {0}")]
    Encoder(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VisError>;
