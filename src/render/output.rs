//! UI-thread side of video output: surface lifecycle, draw hand-off and
//! device-loss recovery

use super::{present_pending_frame, FrameGate, FrameSource, Presented, RenderLoop};
use crate::dispatch::UiDispatcher;
use crate::surface::{SharedSurface, SurfaceHandle, SurfaceManager, SurfaceRegion};
use crate::utils::error::Result;
use log::{debug, error, info, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Surface availability changes the UI layer should reflect
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceNotice {
    /// Recovery recreated the surface
    Restored,
    /// Recovery failed; the surface is gone until the region is recreated
    Unavailable(String),
}

/// Owns the surface and its render loop for one window region
///
/// Every method runs on the UI-owning thread. Recovery takes `&mut self`,
/// so two recoveries can never interleave.
pub struct VideoOutput {
    surface: SharedSurface,
    render_loop: RenderLoop,
    gate: Arc<FrameGate>,
    source: Weak<dyn FrameSource>,
    visible: bool,
    recoveries: u64,
}

impl VideoOutput {
    pub fn new(
        manager: SurfaceManager,
        source: Weak<dyn FrameSource>,
        gate: Arc<FrameGate>,
        dispatcher: UiDispatcher,
        frame_interval: Duration,
    ) -> Self {
        let surface = manager.into_shared();
        let render_loop = RenderLoop::new(&surface, source.clone(), gate.clone(), dispatcher, frame_interval);
        Self {
            surface,
            render_loop,
            gate,
            source,
            visible: true,
            recoveries: 0,
        }
    }

    /// The region became available: bind a surface and start rendering
    pub fn surface_ready(&mut self, region: &SurfaceRegion) -> Result<SurfaceHandle> {
        let handle = self.surface.lock().create_surface(region)?;
        if self.visible {
            self.render_loop.start()?;
        }
        Ok(handle)
    }

    /// The region is going away: stop rendering and release the surface
    pub fn teardown(&mut self) {
        self.render_loop.stop();
        self.surface.lock().release();
        info!("Video output torn down");
    }

    /// Track a new region size or scale
    pub fn resize(&mut self, width: f64, height: f64, scale_factor: f64) -> Result<()> {
        self.surface.lock().update_region(width, height, scale_factor)
    }

    /// Pause or resume the render loop without touching the surface
    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        if self.visible == visible {
            return Ok(());
        }
        self.visible = visible;
        if visible {
            if self.surface.lock().surface().is_valid() {
                self.render_loop.start()?;
            }
        } else {
            self.render_loop.stop();
        }
        debug!("Video output visible: {}", visible);
        Ok(())
    }

    /// Draw the pending frame on this thread, then park the loop until the
    /// engine signals again
    ///
    /// Returns a notice if the present failed and recovery ran.
    pub fn draw_now(&mut self) -> Option<SurfaceNotice> {
        let Some(source) = self.source.upgrade() else {
            return None;
        };
        let outcome = {
            let mut mgr = self.surface.lock();
            present_pending_frame(&mut mgr, &self.gate, source.as_ref())
        };
        drop(source);

        match outcome {
            Presented::Skipped => None,
            Presented::Done => {
                self.render_loop.stop();
                None
            }
            Presented::DeviceLost { generation, error } => {
                warn!("Present failed on the UI thread: {}", error);
                self.recover_from_device_lost(generation)
            }
        }
    }

    /// Destroy, reset and recreate the surface, then restart the loop
    ///
    /// A request for an older surface generation has already been handled
    /// and is ignored.
    pub fn recover_from_device_lost(&mut self, generation: u64) -> Option<SurfaceNotice> {
        if self.surface.lock().generation() != generation {
            debug!("Ignoring stale device-loss report for generation {}", generation);
            return None;
        }

        info!("Recovering from device loss (generation {})", generation);
        self.render_loop.stop();

        let recreated = self.surface.lock().recreate();
        match recreated {
            Ok(handle) => {
                self.recoveries += 1;
                info!("Surface recreated as {}", handle.raw());
                if self.visible {
                    if let Err(e) = self.render_loop.start() {
                        error!("Render loop failed to restart: {}", e);
                        return Some(SurfaceNotice::Unavailable(e.to_string()));
                    }
                }
                Some(SurfaceNotice::Restored)
            }
            Err(e) => {
                error!("Device-loss recovery failed: {}", e);
                Some(SurfaceNotice::Unavailable(e.to_string()))
            }
        }
    }

    /// Live surface handle, or the sentinel
    pub fn surface_handle(&self) -> SurfaceHandle {
        self.surface.lock().surface()
    }

    /// Current presentable size
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let mgr = self.surface.lock();
        mgr.dimensions(mgr.surface())
    }

    pub fn is_rendering(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Completed recoveries
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }
}

impl Drop for VideoOutput {
    fn drop(&mut self) {
        self.render_loop.stop();
    }
}
