//! Offscreen rendering engine.
//!
//! Rasterizes the scene with an orthographic camera looking down -Z into an
//! in-memory framebuffer. Used by the command line tool and the tests, where
//! no windowing system is available.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::{Vec2, Vec3};
use image::{Rgb, RgbImage};
use log::debug;

use super::{Action, RenderEngine};
use crate::error::Result;
use crate::geometry::{Mesh, to_byte};
use crate::schema::WindowConfig;

const DEFAULT_BACKGROUND: [u8; 3] = [24, 24, 32];

/// Orthographic view: world point `centre` maps to the image centre and
/// `half_extent` world units to half of the shorter image side.
#[derive(Debug, Clone, Copy)]
struct Camera {
    centre: Vec3,
    half_extent: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            centre: Vec3::ZERO,
            half_extent: 10.0,
        }
    }
}

/// Software rendering engine without a window.
pub struct HeadlessEngine {
    title: String,
    background: [u8; 3],
    geometries: BTreeMap<String, Mesh>,
    actions: BTreeMap<String, Action<Self>>,
    framebuffer: RgbImage,
    depth: Vec<f32>,
    camera: Camera,
    dirty: bool,
    redraws: u64,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    /// Create an engine; the framebuffer is allocated by `initialize`.
    pub fn new() -> Self {
        Self {
            title: String::new(),
            background: DEFAULT_BACKGROUND,
            geometries: BTreeMap::new(),
            actions: BTreeMap::new(),
            framebuffer: RgbImage::new(0, 0),
            depth: Vec::new(),
            camera: Camera::default(),
            dirty: true,
            redraws: 0,
        }
    }

    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self.dirty = true;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Framebuffer size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.framebuffer.dimensions()
    }

    /// Names of the geometries currently in the scene.
    pub fn geometry_names(&self) -> impl Iterator<Item = &str> {
        self.geometries.keys().map(String::as_str)
    }

    pub fn geometry(&self, name: &str) -> Option<&Mesh> {
        self.geometries.get(name)
    }

    /// Number of redraw requests received.
    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn action_labels(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Invoke a registered action as if its button had been pressed.
    ///
    /// Returns false when no action has that label.
    pub fn trigger_action(&mut self, label: &str) -> bool {
        let Some(action) = self.actions.get(label).cloned() else {
            return false;
        };
        debug!("Action '{}' triggered", label);
        action(self);
        true
    }

    /// Current frame, rendered on demand.
    pub fn frame(&mut self) -> &RgbImage {
        if self.dirty {
            self.render();
        }
        &self.framebuffer
    }

    fn render(&mut self) {
        let (width, height) = self.framebuffer.dimensions();
        for pixel in self.framebuffer.pixels_mut() {
            *pixel = Rgb(self.background);
        }
        self.depth.clear();
        self.depth
            .resize(width as usize * height as usize, f32::NEG_INFINITY);

        let scale = 0.5 * width.min(height) as f32 / self.camera.half_extent;
        let half = Vec2::new(width as f32, height as f32) * 0.5;
        let centre = self.camera.centre;
        let project = |v: Vec3| {
            Vec3::new(
                (v.x - centre.x) * scale + half.x,
                half.y - (v.y - centre.y) * scale,
                v.z,
            )
        };

        for mesh in self.geometries.values() {
            for tri in &mesh.triangles {
                let idx = tri.map(|i| i as usize);
                let (Some(&v0), Some(&v1), Some(&v2)) = (
                    mesh.vertices.get(idx[0]),
                    mesh.vertices.get(idx[1]),
                    mesh.vertices.get(idx[2]),
                ) else {
                    continue;
                };

                // Flat shading from the face normal against the view direction.
                let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
                let shade = 0.35 + 0.65 * normal.z.abs();
                let colour = (0..3).fold([0.0f32; 3], |mut acc, k| {
                    let c = mesh.colour(idx[k]);
                    for (a, c) in acc.iter_mut().zip(c) {
                        *a += c * shade / 3.0;
                    }
                    acc
                });
                let rgb = Rgb(colour.map(to_byte));

                let (p0, p1, p2) = (project(v0), project(v1), project(v2));
                let area = edge(p0, p1, p2);
                if area.abs() < 1e-8 {
                    continue;
                }

                let x0 = p0.x.min(p1.x).min(p2.x).floor().max(0.0) as u32;
                let y0 = p0.y.min(p1.y).min(p2.y).floor().max(0.0) as u32;
                let x1 = (p0.x.max(p1.x).max(p2.x).ceil() as i64).min(width as i64 - 1);
                let y1 = (p0.y.max(p1.y).max(p2.y).ceil() as i64).min(height as i64 - 1);
                if x1 < 0 || y1 < 0 {
                    continue;
                }

                for py in y0..=y1 as u32 {
                    for px in x0..=x1 as u32 {
                        let p = Vec3::new(px as f32 + 0.5, py as f32 + 0.5, 0.0);
                        let l0 = edge(p1, p2, p) / area;
                        let l1 = edge(p2, p0, p) / area;
                        let l2 = edge(p0, p1, p) / area;
                        if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                            continue;
                        }
                        let z = l0 * p0.z + l1 * p1.z + l2 * p2.z;
                        let slot = py as usize * width as usize + px as usize;
                        if z > self.depth[slot] {
                            self.depth[slot] = z;
                            self.framebuffer.put_pixel(px, py, rgb);
                        }
                    }
                }
            }
        }

        self.dirty = false;
    }
}

/// Twice the signed area of triangle (a, b, c) in screen space.
#[inline]
fn edge(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

impl RenderEngine for HeadlessEngine {
    fn initialize(&mut self, window: &WindowConfig) -> Result<()> {
        self.title = window.title.clone();
        self.framebuffer = RgbImage::new(window.width, window.height);
        self.depth = vec![f32::NEG_INFINITY; window.width as usize * window.height as usize];
        self.dirty = true;
        debug!(
            "Headless window '{}' ({}x{})",
            self.title, window.width, window.height
        );
        Ok(())
    }

    fn add_geometry(&mut self, name: &str, mesh: &Mesh) -> Result<()> {
        self.geometries.insert(name.to_string(), mesh.clone());
        self.dirty = true;
        Ok(())
    }

    fn remove_geometry(&mut self, name: &str) -> bool {
        self.dirty = true;
        self.geometries.remove(name).is_some()
    }

    fn post_redraw(&mut self) {
        self.redraws += 1;
        self.dirty = true;
    }

    fn export_current_image(&mut self, path: &Path) -> Result<()> {
        self.frame().save(path)?;
        Ok(())
    }

    fn write_triangle_mesh(&mut self, path: &Path, mesh: &Mesh) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        mesh.write_ply(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn add_action(&mut self, label: &str, action: Action<Self>) {
        self.actions.insert(label.to_string(), action);
    }

    fn reset_camera(&mut self) {
        let bounds = self
            .geometries
            .values()
            .filter_map(Mesh::bounds)
            .reduce(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)));

        self.camera = match bounds {
            Some((lo, hi)) => {
                let extent = 0.5 * (hi - lo);
                Camera {
                    centre: 0.5 * (lo + hi),
                    half_extent: (1.1 * extent.x.max(extent.y)).max(1e-3),
                }
            }
            None => Camera::default(),
        };
        self.dirty = true;
    }
}
