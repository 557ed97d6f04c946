//! Window shell for vidpane
//!
//! Hosts one [`MediaElement`] in a winit window. Window lifecycle events
//! drive the surface hooks; engine and render notifications wake the event
//! loop through a user event and are drained on the loop thread.

use crate::engine::{EngineHandle, RetryPolicy};
use crate::player::{MediaElement, MediaSource, PlaybackState, PlayerEvent};
use crate::surface::{GpuOptions, SurfaceRegion, WgpuContext};
use crate::utils::config::Config;
use crate::utils::error::{PlayerError, Result, ResultExt};
use crate::utils::format_position;
use log::{debug, error, info, log, warn, Level};
use parking_lot::Mutex;
use raw_window_handle::HasWindowHandle;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

/// Event posted to the loop from other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    /// The media element has queued notifications
    Wake,
}

/// Keyboard shortcut actions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shortcut {
    TogglePlayPause,
    Stop,
    ToggleMute,
    /// Relative seek in seconds
    Seek(f64),
    /// Volume step in percent
    Volume(i16),
    Quit,
}

/// Map a pressed key to its shortcut
pub fn shortcut_for(key: &Key, seek_step: f64) -> Option<Shortcut> {
    match key {
        Key::Named(NamedKey::Space) => Some(Shortcut::TogglePlayPause),
        Key::Named(NamedKey::ArrowLeft) => Some(Shortcut::Seek(-seek_step)),
        Key::Named(NamedKey::ArrowRight) => Some(Shortcut::Seek(seek_step)),
        Key::Named(NamedKey::ArrowUp) => Some(Shortcut::Volume(5)),
        Key::Named(NamedKey::ArrowDown) => Some(Shortcut::Volume(-5)),
        Key::Named(NamedKey::Escape) => Some(Shortcut::Quit),
        Key::Character(c) => match c.to_lowercase().as_str() {
            "s" => Some(Shortcut::Stop),
            "m" => Some(Shortcut::ToggleMute),
            _ => None,
        },
        _ => None,
    }
}

/// Application state for the event loop
pub struct App {
    config: Config,
    proxy: EventLoopProxy<UserEvent>,
    source: Option<MediaSource>,
    window: Option<Arc<Window>>,
    element: Option<MediaElement>,
    failure: Option<PlayerError>,
}

impl App {
    fn new(config: Config, source: Option<MediaSource>, proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            config,
            proxy,
            source,
            window: None,
            element: None,
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.window.width as f64,
                self.config.window.height as f64,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .surface_err("Failed to create window")?,
        );
        if let Ok(handle) = window.window_handle() {
            debug!("Native window: {:?}", handle.as_raw());
        }

        let engine = EngineHandle::open(
            &self.config.engine,
            RetryPolicy::from(&self.config.player.property_retry),
        )?;
        let gpu = Box::new(WgpuContext::new(GpuOptions::from(&self.config.render)));
        let proxy = Mutex::new(self.proxy.clone());
        let mut element = MediaElement::new(engine, gpu, &self.config, move || {
            // Closed once the loop is exiting; the queue is drained on teardown
            logged(Level::Debug, "Wake", proxy.lock().send_event(UserEvent::Wake));
        })?;

        let title = self.config.window.title.clone();
        let observed = window.clone();
        element.subscribe(move |event| log_event(&observed, &title, event));

        let region = region_for(&window, window.inner_size());
        element.on_surface_ready(&region)?;

        if let Some(source) = self.source.take() {
            element.set_source(source)?;
        }

        self.window = Some(window);
        self.element = Some(element);
        Ok(())
    }

    fn shortcut(&mut self, event_loop: &ActiveEventLoop, shortcut: Shortcut) {
        if shortcut == Shortcut::Quit {
            event_loop.exit();
            return;
        }
        let Some(element) = self.element.as_mut() else {
            return;
        };
        let result = match shortcut {
            Shortcut::TogglePlayPause => element.toggle_play_pause(),
            Shortcut::Stop => element.stop(),
            Shortcut::ToggleMute => {
                let muted = element.is_muted();
                element.set_muted(!muted)
            }
            Shortcut::Seek(offset) => element.seek_relative(offset),
            Shortcut::Volume(step) => {
                let level = (element.volume().round() as i16 + step).clamp(0, 100);
                element.set_volume(level as u8)
            }
            Shortcut::Quit => Ok(()),
        };
        logged(Level::Warn, &format!("Shortcut {:?}", shortcut), result);
    }
}

/// Log a failed `result` at `level`; true when it succeeded
fn logged<E: std::fmt::Display>(level: Level, what: &str, result: std::result::Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log!(level, "{} failed: {}", what, e);
            false
        }
    }
}

fn region_for(window: &Arc<Window>, size: PhysicalSize<u32>) -> SurfaceRegion {
    let scale = window.scale_factor();
    let logical = size.to_logical::<f64>(scale);
    SurfaceRegion::for_window(window.clone(), logical.width, logical.height, scale)
}

fn log_event(window: &Window, title: &str, event: &PlayerEvent) {
    match event {
        PlayerEvent::StateChanged { new, .. } => {
            window.set_title(&format!("{} [{}]", title, new));
        }
        PlayerEvent::PositionChanged { position } => {
            log::trace!("Position: {}", format_position(position.as_secs_f64()));
        }
        PlayerEvent::LengthChanged { length: Some(length) } => {
            info!("Length: {}", format_position(length.as_secs_f64()));
        }
        PlayerEvent::VolumeChanged { volume } => info!("Volume: {:.0}%", volume),
        PlayerEvent::MuteChanged { muted } => info!("Muted: {}", muted),
        PlayerEvent::Error { message } => error!("Player error: {}", message),
        PlayerEvent::SurfaceUnavailable { reason } => error!("Video surface unavailable: {}", reason),
        PlayerEvent::SurfaceRestored => info!("Video surface restored"),
        PlayerEvent::EndOfMedia => info!("End of media reached"),
        _ => {}
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            error!("Startup failed: {}", e);
            self.failure = Some(e);
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Wake => {
                if let Some(element) = self.element.as_mut() {
                    element.pump();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                let (Some(window), Some(element)) = (self.window.as_ref(), self.element.as_mut()) else {
                    return;
                };
                let logical = size.to_logical::<f64>(window.scale_factor());
                if let Err(e) = element.on_resize(logical.width, logical.height, window.scale_factor()) {
                    warn!("Resize failed: {}", e);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let (Some(window), Some(element)) = (self.window.as_ref(), self.element.as_mut()) else {
                    return;
                };
                let logical = window.inner_size().to_logical::<f64>(scale_factor);
                if let Err(e) = element.on_resize(logical.width, logical.height, scale_factor) {
                    warn!("Scale change failed: {}", e);
                }
            }
            WindowEvent::Occluded(occluded) => {
                if let Some(element) = self.element.as_mut() {
                    if let Err(e) = element.on_visibility_changed(!occluded) {
                        warn!("Visibility change failed: {}", e);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                let step = self.config.player.seek_step_secs;
                if let Some(shortcut) = shortcut_for(&logical_key, step) {
                    self.shortcut(event_loop, shortcut);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut element) = self.element.take() {
            if element.state() != PlaybackState::Closed {
                logged(Level::Warn, "Stop on exit", element.stop());
            }
            element.on_surface_teardown();
        }
        self.window = None;
        info!("Window closed");
    }
}

/// Open the window and play `source` until the window closes
pub fn run(config: Config, source: Option<MediaSource>) -> Result<()> {
    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .surface_err("Failed to create event loop")?;
    let mut app = App::new(config, source, event_loop.create_proxy());
    event_loop
        .run_app(&mut app)
        .map_err(|e| crate::internal_error!("event loop: {}", e))?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
