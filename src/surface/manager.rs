//! Surface lifecycle and the surface-mutation lock

use super::{FrameTarget, GpuContext, PixelFormat, SurfaceHandle, SurfaceRegion};
use crate::utils::error::{PlayerError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Surface manager behind the surface-mutation lock
///
/// Every draw, present and recreate goes through this mutex, so the render
/// loop and the UI-thread hand-off can never touch the surface at once.
pub type SharedSurface = Arc<Mutex<SurfaceManager>>;

/// Owns the single surface bound to a window region
pub struct SurfaceManager {
    gpu: Box<dyn GpuContext>,
    region: Option<SurfaceRegion>,
    surface: SurfaceHandle,
    back_buffer: FrameTarget,
    current_thread: Option<ThreadId>,
    /// Bumped on every successful create
    generation: u64,
}

impl SurfaceManager {
    /// Create a manager with no surface
    pub fn new(gpu: Box<dyn GpuContext>, format: PixelFormat) -> Self {
        Self {
            gpu,
            region: None,
            surface: SurfaceHandle::NONE,
            back_buffer: FrameTarget::empty(format),
            current_thread: None,
            generation: 0,
        }
    }

    /// Wrap in the surface-mutation lock
    pub fn into_shared(self) -> SharedSurface {
        Arc::new(Mutex::new(self))
    }

    /// Bind a surface to `region`
    ///
    /// Returns the existing surface unchanged if one is already live.
    pub fn create_surface(&mut self, region: &SurfaceRegion) -> Result<SurfaceHandle> {
        if self.surface.is_valid() {
            return Ok(self.surface);
        }

        let (width, height) = region.physical_size();
        if width == 0 || height == 0 {
            return Err(PlayerError::SurfaceCreation(format!(
                "region has no drawable area ({}x{})",
                width, height
            )));
        }

        let surface = self.gpu.create_surface(region)?;
        if !surface.is_valid() {
            return Err(PlayerError::SurfaceCreation(
                "GPU context returned the no-surface handle".to_string(),
            ));
        }

        self.surface = surface;
        self.region = Some(region.clone());
        self.generation += 1;
        info!(
            "Created surface {} ({}x{} @ {:.2}x, generation {})",
            surface.raw(),
            width,
            height,
            region.scale_factor,
            self.generation
        );
        Ok(surface)
    }

    /// Release `surface` and reset the caller's handle to the sentinel
    pub fn destroy_surface(&mut self, surface: &mut SurfaceHandle) {
        if surface.is_valid() && *surface == self.surface {
            self.gpu.destroy_surface(self.surface);
            debug!("Destroyed surface {}", self.surface.raw());
            self.surface = SurfaceHandle::NONE;
        }
        *surface = SurfaceHandle::NONE;
    }

    /// Release the live surface, if any, and forget the region
    pub fn release(&mut self) {
        let mut surface = self.surface;
        self.destroy_surface(&mut surface);
        self.region = None;
        self.current_thread = None;
    }

    /// Reinitialize the GPU context after device loss
    pub fn reset(&mut self) -> Result<()> {
        self.current_thread = None;
        self.gpu.reset()
    }

    /// Destroy, reset and recreate against the last bound region
    pub fn recreate(&mut self) -> Result<SurfaceHandle> {
        let region = self.region.clone().ok_or_else(|| {
            PlayerError::SurfaceCreation("no region bound to recreate against".to_string())
        })?;

        let mut surface = self.surface;
        self.destroy_surface(&mut surface);
        self.reset()?;
        self.create_surface(&region)
    }

    /// Track a new logical size or scale for the bound region
    pub fn update_region(&mut self, width: f64, height: f64, scale_factor: f64) -> Result<()> {
        let Some(region) = self.region.as_ref() else {
            return Ok(());
        };
        let region = region.resized(width, height, scale_factor);
        let (w, h) = region.physical_size();
        self.region = Some(region);

        if self.surface.is_valid() && w > 0 && h > 0 {
            self.gpu.resize(self.surface, w, h)?;
        }
        Ok(())
    }

    /// The live surface, or the sentinel
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Creation counter; a recovery for an older generation is stale
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current presentable size in device pixels
    pub fn dimensions(&self, surface: SurfaceHandle) -> Option<(u32, u32)> {
        if !surface.is_valid() || surface != self.surface {
            return None;
        }
        self.region.as_ref().map(SurfaceRegion::physical_size)
    }

    /// Claim the GPU context for the calling thread
    pub fn make_current(&mut self) -> Result<()> {
        self.gpu.make_current()?;
        self.current_thread = Some(thread::current().id());
        Ok(())
    }

    /// Size the back buffer for the next frame
    pub fn prepare_frame(&mut self, dimensions: (u32, u32)) -> &mut FrameTarget {
        if self.back_buffer.resize(dimensions.0, dimensions.1) {
            debug!("Back buffer resized to {}x{}", dimensions.0, dimensions.1);
        }
        &mut self.back_buffer
    }

    /// The back buffer as last drawn
    pub fn back_buffer(&self) -> &FrameTarget {
        &self.back_buffer
    }

    /// Swap the back buffer to the screen
    ///
    /// A failure here is the device-loss signal.
    pub fn present(&mut self, surface: SurfaceHandle) -> Result<()> {
        if !surface.is_valid() || surface != self.surface {
            return Err(PlayerError::DeviceLost(format!(
                "present on stale surface {}",
                surface.raw()
            )));
        }
        if self.current_thread != Some(thread::current().id()) {
            warn!("Present attempted without making the context current");
            return Err(PlayerError::DeviceLost(
                "GPU context is not current on this thread".to_string(),
            ));
        }
        self.gpu.present(surface, &self.back_buffer)
    }
}
