//! Configuration types for the viewer and its exports.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Particle;

/// Directory (inside the output directory) holding frames during a recording.
pub const FRAME_DIR_NAME: &str = "temp_video";

/// Stem of the assembled video file.
pub const VIDEO_STEM: &str = "ZnVis-Video";

fn default_frame_rate() -> u32 {
    24
}

fn default_video_format() -> String {
    "gif".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

/// Top-level viewer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Playback and recording rate in frames per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Number of steps to animate. Defaults to the first particle's trajectory length.
    #[serde(default)]
    pub number_of_steps: Option<usize>,
    /// Keep the captured frames after a video has been assembled.
    #[serde(default)]
    pub store_run_files: bool,
    /// Video container identifier (`gif`, `avi`, `mp4`, `mkv`, `mov`, `webm`).
    #[serde(default = "default_video_format")]
    pub video_format: String,
    /// Directory receiving screenshots, scene exports and videos.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Window parameters.
    #[serde(default)]
    pub window: WindowConfig,
    /// Upper bound on any wait for the GUI thread, in milliseconds.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Pause after the last captured frame before assembly, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            number_of_steps: None,
            store_run_files: false,
            video_format: default_video_format(),
            output_dir: default_output_dir(),
            window: WindowConfig::default(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Window title and framebuffer size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ZnVis Visualizer".to_string(),
            width: 1024,
            height: 768,
        }
    }
}

/// Supported video containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// Animated GIF, encoded in-process.
    Gif,
    /// Containers encoded by an external `ffmpeg`.
    Avi,
    Mp4,
    Mkv,
    Mov,
    Webm,
}

impl VideoFormat {
    /// File extension for this container.
    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Gif => "gif",
            VideoFormat::Avi => "avi",
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Mov => "mov",
            VideoFormat::Webm => "webm",
        }
    }
}

impl FromStr for VideoFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "gif" => Ok(VideoFormat::Gif),
            "avi" => Ok(VideoFormat::Avi),
            "mp4" => Ok(VideoFormat::Mp4),
            "mkv" => Ok(VideoFormat::Mkv),
            "mov" => Ok(VideoFormat::Mov),
            "webm" => Ok(VideoFormat::Webm),
            _ => Err(ConfigError::UnsupportedVideoFormat(s.to_string())),
        }
    }
}

/// GIF delays are whole centiseconds, so faster rates cannot be represented.
pub const MAX_GIF_FRAME_RATE: u32 = 100;

/// Time between two frames at `frame_rate` frames per second.
///
/// A zero rate is treated as 1 fps.
#[inline]
pub fn frame_interval(frame_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64)
}

impl VisualizerConfig {
    #[inline]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    #[inline]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parsed video container.
    pub fn video_format(&self) -> Result<VideoFormat, ConfigError> {
        self.video_format.parse()
    }

    /// Where captured frames are written during a recording.
    pub fn frame_dir(&self) -> PathBuf {
        self.output_dir.join(FRAME_DIR_NAME)
    }

    /// Path of the assembled video.
    pub fn video_path(&self) -> Result<PathBuf, ConfigError> {
        let format = self.video_format()?;
        Ok(self
            .output_dir
            .join(format!("{}.{}", VIDEO_STEM, format.extension())))
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.number_of_steps == Some(0) {
            return Err(ConfigError::NoSteps);
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::InvalidDispatchTimeout);
        }
        if self.video_format()? == VideoFormat::Gif && self.frame_rate > MAX_GIF_FRAME_RATE {
            return Err(ConfigError::GifFrameRateTooHigh(self.frame_rate));
        }
        Ok(())
    }

    /// Resolve the number of steps for a particle set.
    ///
    /// Uses the explicit override when present, otherwise the first particle's
    /// trajectory length. Every particle must provide at least that many steps.
    pub fn step_count(&self, particles: &[Particle]) -> Result<usize, ConfigError> {
        let first = particles.first().ok_or(ConfigError::NoParticles)?;
        let steps = self.number_of_steps.unwrap_or(first.trajectory.len());
        if steps == 0 {
            return Err(ConfigError::NoSteps);
        }

        let mut names = HashSet::with_capacity(particles.len());
        for particle in particles {
            if !names.insert(particle.name.as_str()) {
                return Err(ConfigError::DuplicateParticleName(particle.name.clone()));
            }
            if particle.trajectory.len() < steps {
                return Err(ConfigError::TrajectoryTooShort {
                    particle: particle.name.clone(),
                    available: particle.trajectory.len(),
                    required: steps,
                });
            }
        }
        Ok(steps)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one particle is required")]
    NoParticles,
    #[error("Frame rate must be positive")]
    InvalidFrameRate,
    #[error("Number of steps must be non-zero")]
    NoSteps,
    #[error("Window dimensions must be non-zero")]
    InvalidWindowSize,
    #[error("Dispatch timeout must be non-zero")]
    InvalidDispatchTimeout,
    #[error("GIF supports at most 100 fps, got {0}")]
    GifFrameRateTooHigh(u32),
    #[error("Unsupported video format '{0}'")]
    UnsupportedVideoFormat(String),
    #[error("Particle '{0}' has directors that do not match its positions")]
    DirectorShapeMismatch(String),
    #[error("Particle name '{0}' is used more than once")]
    DuplicateParticleName(String),
    #[error("Particle '{particle}' has {available} steps but {required} were requested")]
    TrajectoryTooShort {
        particle: String,
        available: usize,
        required: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GeometryTemplate, Pose};
    use glam::Vec3;

    fn particle(name: &str, steps: usize) -> Particle {
        Particle::new(
            name,
            GeometryTemplate::sphere(1.0, [1.0, 0.0, 0.0], 4),
            (0..steps)
                .map(|i| vec![Pose::at(Vec3::splat(i as f32))])
                .collect(),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(VisualizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let config = VisualizerConfig {
            frame_rate: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFrameRate)
        ));
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn test_gif_frame_rate_limit() {
        let gif = VisualizerConfig {
            frame_rate: 120,
            ..Default::default()
        };
        assert!(matches!(
            gif.validate(),
            Err(ConfigError::GifFrameRateTooHigh(120))
        ));

        let at_limit = VisualizerConfig {
            frame_rate: MAX_GIF_FRAME_RATE,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let mp4 = VisualizerConfig {
            frame_rate: 120,
            video_format: "mp4".to_string(),
            ..Default::default()
        };
        assert!(mp4.validate().is_ok());
    }

    #[test]
    fn test_video_format_parsing() {
        assert_eq!("gif".parse::<VideoFormat>().unwrap(), VideoFormat::Gif);
        assert_eq!(".AVI".parse::<VideoFormat>().unwrap(), VideoFormat::Avi);
        assert!(matches!(
            "flv".parse::<VideoFormat>(),
            Err(ConfigError::UnsupportedVideoFormat(_))
        ));
    }

    #[test]
    fn test_step_count_from_first_particle() {
        let config = VisualizerConfig::default();
        let particles = vec![particle("a", 7), particle("b", 9)];
        assert_eq!(config.step_count(&particles).unwrap(), 7);
    }

    #[test]
    fn test_step_count_override() {
        let config = VisualizerConfig {
            number_of_steps: Some(3),
            ..Default::default()
        };
        let particles = vec![particle("a", 7), particle("b", 5)];
        assert_eq!(config.step_count(&particles).unwrap(), 3);
    }

    #[test]
    fn test_short_trajectory_rejected() {
        let config = VisualizerConfig::default();
        let particles = vec![particle("a", 7), particle("b", 4)];
        match config.step_count(&particles) {
            Err(ConfigError::TrajectoryTooShort {
                particle,
                available,
                required,
            }) => {
                assert_eq!(particle, "b");
                assert_eq!(available, 4);
                assert_eq!(required, 7);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_duplicate_particles_rejected() {
        let config = VisualizerConfig::default();
        assert!(matches!(
            config.step_count(&[]),
            Err(ConfigError::NoParticles)
        ));
        let particles = vec![particle("a", 3), particle("a", 3)];
        assert!(matches!(
            config.step_count(&particles),
            Err(ConfigError::DuplicateParticleName(_))
        ));
    }

    #[test]
    fn test_output_paths() {
        let config = VisualizerConfig {
            output_dir: PathBuf::from("/tmp/out"),
            video_format: "mp4".to_string(),
            ..Default::default()
        };
        assert_eq!(config.frame_dir(), PathBuf::from("/tmp/out/temp_video"));
        assert_eq!(
            config.video_path().unwrap(),
            PathBuf::from("/tmp/out/ZnVis-Video.mp4")
        );
    }

    #[test]
    fn test_config_json_defaults() {
        let config: VisualizerConfig = serde_json::from_str(r#"{"frame_rate": 10}"#).unwrap();
        assert_eq!(config.frame_rate, 10);
        assert_eq!(config.video_format, "gif");
        assert_eq!(config.window.width, 1024);
        assert!(!config.store_run_files);
    }
}
