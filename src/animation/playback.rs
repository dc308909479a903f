//! Interactive playback: a looping step counter driven by a background thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{Result, VisError};
use crate::schema::frame_interval;

/// Run state of the playback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    /// No loop running. Initial state; playback can be restarted from here.
    Stopped = 0,
    /// A loop thread is advancing the counter.
    Running = 1,
    /// Pause was requested; the loop resolves this to `Stopped` on its next check.
    PauseRequested = 2,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Running,
            2 => PlaybackState::PauseRequested,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Callback asking for the scene to be redrawn at a step. Must not block on
/// the GUI thread.
pub type RedrawFn = Box<dyn Fn(usize) -> Result<()> + Send + Sync>;

struct Shared {
    counter: AtomicUsize,
    state: AtomicU8,
    number_of_steps: usize,
    frame_interval: Duration,
    redraw: RedrawFn,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn advance(&self) -> usize {
        let n = self.number_of_steps;
        let (Ok(prev) | Err(prev)) =
            self.counter
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % n));
        (prev + 1) % n
    }
}

/// Owns the step counter and the playback loop.
///
/// At most one loop thread exists at a time. The counter always stays in
/// `0..number_of_steps` and wraps to 0 after the last step.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Create a stopped engine at step 0.
    ///
    /// `number_of_steps` must be non-zero.
    pub fn new<F>(number_of_steps: usize, frame_rate: u32, redraw: F) -> Self
    where
        F: Fn(usize) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                counter: AtomicUsize::new(0),
                state: AtomicU8::new(PlaybackState::Stopped as u8),
                number_of_steps: number_of_steps.max(1),
                frame_interval: frame_interval(frame_rate),
                redraw: Box::new(redraw),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn number_of_steps(&self) -> usize {
        self.shared.number_of_steps
    }

    pub fn frame_interval(&self) -> Duration {
        self.shared.frame_interval
    }

    /// Current value of the step counter.
    pub fn current_step(&self) -> usize {
        self.shared.counter.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlaybackState::Running
    }

    /// True while a loop thread is alive.
    pub fn is_loop_active(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Play/Pause button: pause when running, start when stopped.
    ///
    /// Returns the state after the toggle.
    pub fn toggle(&self) -> Result<PlaybackState> {
        if self.request_pause() {
            return Ok(PlaybackState::PauseRequested);
        }
        self.play()?;
        Ok(self.state())
    }

    /// Start the loop unless it is already running.
    ///
    /// A pending pause is cancelled instead of spawning a second loop.
    /// Returns true if a new loop thread was spawned.
    pub fn play(&self) -> Result<bool> {
        loop {
            if self
                .shared
                .transition(PlaybackState::Stopped, PlaybackState::Running)
            {
                break;
            }
            match self.state() {
                PlaybackState::Running => return Ok(false),
                PlaybackState::PauseRequested => {
                    if self
                        .shared
                        .transition(PlaybackState::PauseRequested, PlaybackState::Running)
                    {
                        return Ok(false);
                    }
                }
                // Loop exited between the two checks; retry the start.
                PlaybackState::Stopped => {}
            }
        }

        let mut worker = self.worker.lock();
        if let Some(finished) = worker.take() {
            let _ = finished.join();
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("znvis-playback".into())
            .spawn(move || run_loop(shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(true)
            }
            Err(err) => {
                self.shared
                    .state
                    .store(PlaybackState::Stopped as u8, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Ask a running loop to stop. Returns true if it was running.
    pub fn request_pause(&self) -> bool {
        self.shared
            .transition(PlaybackState::Running, PlaybackState::PauseRequested)
    }

    /// Stop the loop and wait for its thread to exit.
    ///
    /// Returns true if playback was running beforehand. Waits at most about
    /// one frame interval.
    pub fn pause(&self) -> bool {
        let was_running = self.request_pause();
        self.wait_stopped();
        was_running
    }

    /// Join the loop thread, if any. Returns immediately when none exists.
    pub fn wait_stopped(&self) {
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }

    /// Advance the counter by one with wraparound, without redrawing.
    pub fn advance(&self) -> usize {
        self.shared.advance()
    }

    /// Manual step: jump to `index`, or advance by one when `None`, then redraw.
    pub fn step(&self, index: Option<usize>) -> Result<usize> {
        let step = match index {
            Some(step) if step >= self.shared.number_of_steps => {
                return Err(VisError::InvalidStep {
                    step,
                    steps: self.shared.number_of_steps,
                });
            }
            Some(step) => {
                self.shared.counter.store(step, Ordering::Release);
                step
            }
            None => self.shared.advance(),
        };
        (self.shared.redraw)(step)?;
        Ok(step)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.pause();
    }
}

fn run_loop(shared: Arc<Shared>) {
    debug!("Playback loop started at step {}", shared.counter.load(Ordering::Acquire));

    // A pause request is only honoured while it is still pending, so a
    // resume issued before we get here keeps the loop alive.
    let paused =
        |s: &Shared| s.transition(PlaybackState::PauseRequested, PlaybackState::Stopped);

    loop {
        if paused(&shared) {
            break;
        }
        thread::sleep(shared.frame_interval);
        if paused(&shared) {
            break;
        }

        let step = shared.advance();
        if let Err(err) = (shared.redraw)(step) {
            warn!("Playback stopped at step {}: {}", step, err);
            shared
                .state
                .store(PlaybackState::Stopped as u8, Ordering::Release);
            break;
        }
    }

    debug!("Playback loop stopped");
}
