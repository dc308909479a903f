//! Recording pipeline: captures one image per step through the GUI thread.
//!
//! Redraw and capture both have to run on the GUI thread, so the driver
//! thread only posts them and waits on a handshake. Each cycle captures the
//! current step and then advances it; a new cycle is never posted while the
//! previous capture or advance is outstanding.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use parking_lot::{Condvar, Mutex};

use crate::engine::{GuiDispatcher, RenderEngine};
use crate::error::{Result, VisError};
use crate::schema::{VisualizerConfig, frame_interval};

/// Configuration for a recording run.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Capture cadence in frames per second.
    pub frame_rate: u32,
    /// Number of frames to capture.
    pub target_frames: usize,
    /// Directory created for the frame images. Must not exist yet.
    pub frame_dir: PathBuf,
    /// Longest wait for the GUI thread to finish a capture or advance.
    pub dispatch_timeout: Duration,
    /// Extra pause after the last frame before returning.
    pub settle_delay: Duration,
}

impl RecorderConfig {
    /// Recording of every step described by a viewer configuration.
    pub fn from_visualizer(config: &VisualizerConfig, number_of_steps: usize) -> Self {
        Self {
            frame_rate: config.frame_rate,
            target_frames: number_of_steps,
            frame_dir: config.frame_dir(),
            dispatch_timeout: config.dispatch_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// File name of the frame with the given index.
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{}.png", index)
}

/// Callback advancing the scene by one step; runs on the GUI thread.
pub type AdvanceFn<E> = Arc<dyn Fn(&mut E) -> Result<()> + Send + Sync>;

/// Progress callback: `(frames_written, target_frames)`. Runs on the recording thread.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Default)]
struct HandshakeState {
    advance_pending: bool,
    capture_pending: bool,
    failure: Option<VisError>,
}

impl HandshakeState {
    fn busy(&self) -> bool {
        self.advance_pending || self.capture_pending
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(err) = result {
            if self.failure.is_none() {
                self.failure = Some(err);
            }
        }
    }
}

/// Advance-done / capture-done flags shared with the GUI-thread callbacks.
#[derive(Default)]
struct Handshake {
    state: Mutex<HandshakeState>,
    changed: Condvar,
}

impl Handshake {
    fn begin_cycle(&self) {
        let mut state = self.state.lock();
        state.advance_pending = true;
        state.capture_pending = true;
    }

    fn finish_capture(&self, result: Result<()>) {
        let mut state = self.state.lock();
        state.capture_pending = false;
        state.record(result);
        self.changed.notify_all();
    }

    fn finish_advance(&self, result: Result<()>) {
        let mut state = self.state.lock();
        state.advance_pending = false;
        state.record(result);
        self.changed.notify_all();
    }

    /// Block until neither callback is outstanding, or fail after `timeout`.
    fn wait_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.busy() {
            if self.changed.wait_until(&mut state, deadline).timed_out() && state.busy() {
                return Err(VisError::DispatcherTimeout(timeout));
            }
        }
        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// State of a single export: target directory, next frame index, handshake.
struct RecordingSession {
    frame_dir: PathBuf,
    next_frame: usize,
    handshake: Arc<Handshake>,
}

impl RecordingSession {
    fn create(frame_dir: &Path) -> Result<Self> {
        fs::create_dir(frame_dir)?;
        Ok(Self {
            frame_dir: frame_dir.to_path_buf(),
            next_frame: 0,
            handshake: Arc::new(Handshake::default()),
        })
    }

    fn next_frame_path(&mut self) -> PathBuf {
        let path = self.frame_dir.join(frame_file_name(self.next_frame));
        self.next_frame += 1;
        path
    }
}

/// Drives capture/advance cycles on the GUI thread and collects frame images.
///
/// Usage:
/// ```ignore
/// let pipeline = RecordingPipeline::new(dispatcher, config, |engine| advance(engine));
/// let stats = pipeline.run()?;
/// Assembler::new(24, VideoFormat::Gif).assemble(&stats.frame_dir, "out.gif")?;
/// ```
pub struct RecordingPipeline<E> {
    dispatcher: GuiDispatcher<E>,
    advance: AdvanceFn<E>,
    progress: Option<ProgressFn>,
    config: RecorderConfig,
}

impl<E: RenderEngine> RecordingPipeline<E> {
    pub fn new<F>(dispatcher: GuiDispatcher<E>, config: RecorderConfig, advance: F) -> Self
    where
        F: Fn(&mut E) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            dispatcher,
            advance: Arc::new(advance),
            progress: None,
            config,
        }
    }

    /// Observe progress. Called every 10 % of the target with the number of
    /// frames already on disk, and once more when the last frame is written.
    pub fn on_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Capture `target_frames` frames into a fresh `frame_dir`.
    ///
    /// Blocks the calling thread; never call from the GUI thread. Frames are
    /// named `frame_0.png`, `frame_1.png`, ... in capture order. A GUI thread
    /// that stops responding yields `DispatcherTimeout`; the partially filled
    /// directory is left in place.
    pub fn run(&self) -> Result<RecordingStats> {
        let start = Instant::now();
        let mut session = RecordingSession::create(&self.config.frame_dir)?;
        let target = self.config.target_frames;
        let interval = frame_interval(self.config.frame_rate);
        let timeout = self.config.dispatch_timeout;
        let report_every = (target / 10).max(1);

        info!(
            "Recording {} frames to {} at {} fps",
            target,
            session.frame_dir.display(),
            self.config.frame_rate
        );

        while session.next_frame < target {
            thread::sleep(interval);
            session.handshake.wait_idle(timeout)?;

            // Every cycle posted so far has finished.
            let written = session.next_frame;
            if written > 0 && written % report_every == 0 {
                self.report(written, target);
            }

            let path = session.next_frame_path();
            session.handshake.begin_cycle();

            let handshake = Arc::clone(&session.handshake);
            self.dispatcher.post(move |engine: &mut E| {
                let result = engine.export_current_image(&path);
                handshake.finish_capture(result);
            })?;

            let handshake = Arc::clone(&session.handshake);
            let advance = Arc::clone(&self.advance);
            self.dispatcher.post(move |engine: &mut E| {
                let result = advance(engine);
                handshake.finish_advance(result);
            })?;
        }

        session.handshake.wait_idle(timeout)?;
        self.report(session.next_frame, target);
        thread::sleep(self.config.settle_delay);

        Ok(RecordingStats {
            frame_count: session.next_frame,
            frame_dir: session.frame_dir,
            elapsed: start.elapsed(),
        })
    }
}

impl<E> RecordingPipeline<E> {
    fn report(&self, written: usize, target: usize) {
        info!("  Saving scenes: {}/{}", written, target);
        if let Some(progress) = &self.progress {
            progress(written, target);
        }
    }
}

/// Statistics from a recording session.
#[derive(Debug, Clone)]
pub struct RecordingStats {
    /// Frames written.
    pub frame_count: usize,
    /// Directory holding the frames.
    pub frame_dir: PathBuf,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl fmt::Display for RecordingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames in {} ({:.2}s)",
            self.frame_count,
            self.frame_dir.display(),
            self.elapsed.as_secs_f32()
        )
    }
}
