//! Viewer orchestration: window lifecycle, user actions and redraw discipline.
//!
//! The thread calling [`Visualizer::run`] becomes the GUI thread. Playback,
//! recording and every action mutate the scene only through
//! [`draw_particles`], executed on that thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::animation::{Assembler, PlaybackEngine, PlaybackState, RecorderConfig, RecordingPipeline};
use crate::engine::{Action, GuiDispatcher, GuiEventLoop, RenderEngine, gui_channel};
use crate::error::{Result, VisError};
use crate::geometry::{FrameCache, combined_mesh};
use crate::schema::{Particle, VisualizerConfig};

pub const ACTION_STEP: &str = "Step";
pub const ACTION_PLAY_PAUSE: &str = "Play/Pause";
pub const ACTION_EXPORT_SCENE: &str = "Export Scene";
pub const ACTION_SCREENSHOT: &str = "Screenshot";
pub const ACTION_EXPORT_VIDEO: &str = "Export Video";

/// How [`draw_particles`] treats geometry already in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    /// First draw: only add.
    Initial,
    /// Remove each particle's geometry, then add it back at the new step.
    Replace,
}

/// Show every particle at `step` and request a redraw. GUI thread only.
///
/// All meshes are looked up before the scene is touched, so a bad step
/// leaves the scene unchanged.
pub fn draw_particles<E: RenderEngine>(
    engine: &mut E,
    caches: &[FrameCache],
    step: usize,
    mode: DrawMode,
) -> Result<()> {
    let meshes = caches
        .iter()
        .map(|cache| cache.get(step))
        .collect::<Result<Vec<_>>>()?;

    for (cache, mesh) in caches.iter().zip(meshes) {
        if mode == DrawMode::Replace {
            engine.remove_geometry(cache.name());
        }
        engine.add_geometry(cache.name(), mesh)?;
    }
    engine.post_redraw();
    Ok(())
}

/// State shared by the actions, the playback loop and the recorder thread.
struct Core<E> {
    config: VisualizerConfig,
    caches: Arc<[FrameCache]>,
    playback: PlaybackEngine,
    dispatcher: GuiDispatcher<E>,
    recording: AtomicBool,
    export: Mutex<Option<JoinHandle<Result<PathBuf>>>>,
}

impl<E: RenderEngine> Core<E> {
    fn ensure_not_recording(&self) -> Result<()> {
        if self.recording.load(Ordering::Acquire) {
            return Err(VisError::RecordingInProgress);
        }
        Ok(())
    }
}

/// Particle viewer bound to a rendering engine type.
///
/// Usage:
/// ```ignore
/// let visualizer = Visualizer::<HeadlessEngine>::new(&particles, VisualizerConfig::default())?;
/// let handle = visualizer.handle();
/// visualizer.run(HeadlessEngine::new())?; // blocks until the window closes
/// ```
pub struct Visualizer<E> {
    core: Arc<Core<E>>,
    event_loop: GuiEventLoop<E>,
}

impl<E: RenderEngine> Visualizer<E> {
    /// Validate the input and build every particle's frame cache.
    pub fn new(particles: &[Particle], config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        let number_of_steps = config.step_count(particles)?;

        info!(
            "Building frame caches: {} particles x {} steps",
            particles.len(),
            number_of_steps
        );
        let caches: Arc<[FrameCache]> = FrameCache::build_all(particles, number_of_steps)?.into();

        let (dispatcher, event_loop) = gui_channel::<E>();

        let redraw_caches = Arc::clone(&caches);
        let redraw_dispatcher = dispatcher.clone();
        let playback = PlaybackEngine::new(number_of_steps, config.frame_rate, move |step| {
            let caches = Arc::clone(&redraw_caches);
            redraw_dispatcher.post(move |engine: &mut E| {
                if let Err(err) = draw_particles(engine, &caches, step, DrawMode::Replace) {
                    warn!("Redraw of step {} failed: {}", step, err);
                }
            })
        });

        Ok(Self {
            core: Arc::new(Core {
                config,
                caches,
                playback,
                dispatcher,
                recording: AtomicBool::new(false),
                export: Mutex::new(None),
            }),
            event_loop,
        })
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.core.config
    }

    pub fn number_of_steps(&self) -> usize {
        self.core.playback.number_of_steps()
    }

    /// Dispatcher for posting work to the GUI thread once `run` has started.
    pub fn dispatcher(&self) -> GuiDispatcher<E> {
        self.core.dispatcher.clone()
    }

    /// Observer usable from other threads while the viewer runs.
    pub fn handle(&self) -> VisualizerHandle<E> {
        VisualizerHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Open the window, draw the first step and run the event loop.
    ///
    /// Blocks until the loop is closed through the dispatcher, then stops
    /// playback and hands the engine back.
    pub fn run(self, mut engine: E) -> Result<E> {
        let Self { core, event_loop } = self;

        engine.initialize(&core.config.window)?;
        register_actions(&mut engine, &core);
        draw_particles(
            &mut engine,
            &core.caches,
            core.playback.current_step(),
            DrawMode::Initial,
        )?;
        engine.reset_camera();

        info!("Viewer running ({} steps)", core.playback.number_of_steps());
        event_loop.run(&mut engine);

        core.playback.pause();
        info!("Viewer closed");
        Ok(engine)
    }
}

fn action<E: RenderEngine>(
    core: &Arc<Core<E>>,
    label: &'static str,
    handler: fn(&Arc<Core<E>>, &mut E) -> Result<()>,
) -> Action<E> {
    let core = Arc::clone(core);
    Arc::new(move |engine: &mut E| {
        if let Err(err) = handler(&core, engine) {
            error!("{} failed: {}", label, err);
        }
    })
}

fn register_actions<E: RenderEngine>(engine: &mut E, core: &Arc<Core<E>>) {
    engine.add_action(ACTION_STEP, action(core, ACTION_STEP, step));
    engine.add_action(ACTION_PLAY_PAUSE, action(core, ACTION_PLAY_PAUSE, play_pause));
    engine.add_action(ACTION_EXPORT_SCENE, action(core, ACTION_EXPORT_SCENE, export_scene));
    engine.add_action(ACTION_SCREENSHOT, action(core, ACTION_SCREENSHOT, screenshot));
    engine.add_action(ACTION_EXPORT_VIDEO, action(core, ACTION_EXPORT_VIDEO, export_video));
}

fn step<E: RenderEngine>(core: &Arc<Core<E>>, _engine: &mut E) -> Result<()> {
    core.ensure_not_recording()?;
    core.playback.step(None)?;
    Ok(())
}

fn play_pause<E: RenderEngine>(core: &Arc<Core<E>>, _engine: &mut E) -> Result<()> {
    core.ensure_not_recording()?;
    let state = core.playback.toggle()?;
    info!("Playback {:?}", state);
    Ok(())
}

fn export_scene<E: RenderEngine>(core: &Arc<Core<E>>, engine: &mut E) -> Result<()> {
    let was_running = core.playback.pause();
    let step = core.playback.current_step();
    let path = core.config.output_dir.join(format!("My_mesh_{}.ply", step));

    let written =
        combined_mesh(&core.caches, step).and_then(|mesh| engine.write_triangle_mesh(&path, &mesh));

    if was_running {
        core.playback.play()?;
    }
    written?;
    info!("Scene exported to {}", path.display());
    Ok(())
}

fn screenshot<E: RenderEngine>(core: &Arc<Core<E>>, engine: &mut E) -> Result<()> {
    let path = core
        .config
        .output_dir
        .join(format!("screenshot_{}.png", core.playback.current_step()));
    engine.export_current_image(&path)?;
    info!("Screenshot saved to {}", path.display());
    Ok(())
}

fn export_video<E: RenderEngine>(core: &Arc<Core<E>>, _engine: &mut E) -> Result<()> {
    if core.recording.swap(true, Ordering::AcqRel) {
        return Err(VisError::RecordingInProgress);
    }
    let started = start_export(core);
    if started.is_err() {
        core.recording.store(false, Ordering::Release);
    }
    started
}

fn start_export<E: RenderEngine>(core: &Arc<Core<E>>) -> Result<()> {
    let assembler = Assembler::from_config(&core.config)?;
    let video_path = core.config.video_path()?;

    core.playback.pause();
    // Queued ahead of the first capture, so recording starts at step 0.
    core.playback.step(Some(0))?;

    let recorder_config =
        RecorderConfig::from_visualizer(&core.config, core.playback.number_of_steps());
    let advance_core = Arc::clone(core);
    let pipeline = RecordingPipeline::new(
        core.dispatcher.clone(),
        recorder_config,
        move |engine: &mut E| {
            let step = advance_core.playback.advance();
            draw_particles(engine, &advance_core.caches, step, DrawMode::Replace)
        },
    );

    let worker_core = Arc::clone(core);
    let handle = thread::Builder::new()
        .name("znvis-recorder".into())
        .spawn(move || {
            let result = pipeline
                .run()
                .and_then(|stats| {
                    info!("Captured {}", stats);
                    assembler.assemble(&stats.frame_dir, &video_path)
                })
                .map(|stats| {
                    info!("Video written: {}", stats);
                    stats.output
                });
            if let Err(err) = &result {
                error!("Video export failed: {}", err);
            }
            worker_core.recording.store(false, Ordering::Release);
            result
        })?;

    *core.export.lock() = Some(handle);
    Ok(())
}

/// Thread-safe view of a running [`Visualizer`].
pub struct VisualizerHandle<E> {
    core: Arc<Core<E>>,
}

impl<E> Clone for VisualizerHandle<E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<E: RenderEngine> VisualizerHandle<E> {
    pub fn current_step(&self) -> usize {
        self.core.playback.current_step()
    }

    pub fn number_of_steps(&self) -> usize {
        self.core.playback.number_of_steps()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.core.playback.state()
    }

    /// True while a video export is capturing or assembling.
    pub fn is_recording(&self) -> bool {
        self.core.recording.load(Ordering::Acquire)
    }

    pub fn dispatcher(&self) -> GuiDispatcher<E> {
        self.core.dispatcher.clone()
    }

    /// Wait for the last started video export and return the video path.
    ///
    /// Returns `None` if no export was started since the previous call. Must
    /// not be called from the GUI thread, which the export depends on.
    pub fn wait_for_export(&self) -> Option<Result<PathBuf>> {
        let handle = self.core.export.lock().take()?;
        Some(
            handle
                .join()
                .unwrap_or_else(|_| Err(VisError::Encoder("recorder thread panicked".into()))),
        )
    }
}
