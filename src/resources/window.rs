//! Presentation surfaces.
//!
//! Each window is an entity carrying a [`Window`] component. The main loop
//! keeps running while at least one of them is open.

use std::sync::Arc;

use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::WindowEvent,
};

use crate::{config::Config, error::ConfigError, error::RenderError};

pub trait Surface {
    fn is_closed(&self) -> bool;

    /// Per-frame window update (event pump, present request).
    fn update(&mut self) -> Result<(), RenderError>;

    fn size(&self) -> (u32, u32);

    fn handle_window_event(&mut self, _event: &WindowEvent) {}
}

pub struct Window {
    pub title: String,
    pub surface: Box<dyn Surface>,
}

impl Window {
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.surface.size();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}

/// Marker for windows that reported closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowClosed;

/// The `Window` section of the config.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSettings {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl WindowSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            x: config.at("Window", "xstart")?,
            y: config.at("Window", "ystart")?,
            width: config.at("Window", "width")?,
            height: config.at("Window", "height")?,
            title: config.at("Window", "title")?,
        })
    }

    pub fn attributes(&self) -> winit::window::WindowAttributes {
        winit::window::Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_position(PhysicalPosition::new(self.x, self.y))
    }
}

/// [`Surface`] backed by a winit window.
#[derive(Debug)]
pub struct WinitSurface {
    window: Arc<winit::window::Window>,
    closed: bool,
}

impl WinitSurface {
    pub fn new(window: Arc<winit::window::Window>) -> Self {
        Self {
            window,
            closed: false,
        }
    }
}

impl Surface for WinitSurface {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn update(&mut self) -> Result<(), RenderError> {
        self.window.request_redraw();
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn handle_window_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::CloseRequested | WindowEvent::Destroyed = event {
            self.closed = true;
        }
    }
}
