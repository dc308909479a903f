//! Engine module - The rendering engine boundary and GUI-thread dispatch.
//!
//! A [`RenderEngine`] owns the scene and may only be touched from the thread
//! running its event loop. Everything else reaches it through a
//! [`GuiDispatcher`].

mod dispatcher;
mod headless;

use std::path::Path;
use std::sync::Arc;

pub use dispatcher::{GuiDispatcher, GuiEventLoop, Task, gui_channel};
pub use headless::HeadlessEngine;

use crate::error::Result;
use crate::geometry::Mesh;
use crate::schema::WindowConfig;

/// User-triggerable callback registered with the engine.
pub type Action<E> = Arc<dyn Fn(&mut E) + Send + Sync>;

/// Operations the viewer needs from a rendering engine.
pub trait RenderEngine: Sized + 'static {
    /// Create the window and any backing resources.
    fn initialize(&mut self, window: &WindowConfig) -> Result<()>;

    /// Add a named geometry to the scene.
    fn add_geometry(&mut self, name: &str, mesh: &Mesh) -> Result<()>;

    /// Remove a named geometry. Returns false if it was not present.
    fn remove_geometry(&mut self, name: &str) -> bool;

    /// Request that the window be redrawn.
    fn post_redraw(&mut self);

    /// Save the currently displayed frame as an image.
    fn export_current_image(&mut self, path: &Path) -> Result<()>;

    /// Write a triangle mesh to a model file.
    fn write_triangle_mesh(&mut self, path: &Path, mesh: &Mesh) -> Result<()>;

    /// Register a labelled action in the window's UI.
    fn add_action(&mut self, label: &str, action: Action<Self>);

    /// Fit the camera to the current scene.
    fn reset_camera(&mut self) {}
}
