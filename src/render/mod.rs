//! Render loop, frame hand-off and device-loss recovery
//!
//! The [`RenderLoop`] runs on its own thread and only ever touches the
//! surface under the surface-mutation lock. It holds weak references to the
//! surface and the frame source, so it can never keep either alive.

mod gate;
mod output;

pub use gate::{frame_ready_trampoline, FrameGate, FrameNotifier};
pub use output::{SurfaceNotice, VideoOutput};

use crate::dispatch::{UiDispatcher, UiMessage};
use crate::surface::{SharedSurface, SurfaceManager};
use crate::utils::error::{PlayerError, Result};
use crate::surface::FrameTarget;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Something that can draw the current video frame into a buffer
pub trait FrameSource: Send + Sync {
    /// Render into `frame`; must run with the GPU context current
    fn draw(&self, frame: &mut FrameTarget) -> Result<()>;

    /// The frame last drawn has been presented
    fn report_frame_presented(&self);
}

/// Outcome of one draw + present under the lock
pub(crate) enum Presented {
    /// Nothing was pending, or nothing to draw on
    Skipped,
    /// Drawn and swapped
    Done,
    /// Present failed; the surface of `generation` needs recovery
    DeviceLost { generation: u64, error: PlayerError },
}

/// One locked draw → present → report pass, shared by the loop and the
/// UI-thread hand-off
pub(crate) fn present_pending_frame(
    mgr: &mut SurfaceManager,
    gate: &FrameGate,
    source: &dyn FrameSource,
) -> Presented {
    let handle = mgr.surface();
    let Some(dimensions) = mgr.dimensions(handle) else {
        return Presented::Skipped;
    };
    if let Err(e) = mgr.make_current() {
        return Presented::DeviceLost {
            generation: mgr.generation(),
            error: e,
        };
    }

    let frame = mgr.prepare_frame(dimensions);
    if !gate.take() {
        return Presented::Skipped;
    }
    if let Err(e) = source.draw(frame) {
        // A failed draw loses one frame; the engine will signal the next
        warn!("Frame draw failed: {}", e);
        return Presented::Skipped;
    }

    match mgr.present(handle) {
        Ok(()) => {
            source.report_frame_presented();
            Presented::Done
        }
        Err(e) => Presented::DeviceLost {
            generation: mgr.generation(),
            error: e,
        },
    }
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct LoopContext {
    surface: Weak<Mutex<SurfaceManager>>,
    source: Weak<dyn FrameSource>,
    gate: Arc<FrameGate>,
    dispatcher: UiDispatcher,
    frame_interval: Duration,
}

impl LoopContext {
    fn run(&self, cancel: &AtomicBool) {
        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let (Some(surface), Some(source)) = (self.surface.upgrade(), self.source.upgrade()) else {
                debug!("Render loop target gone; exiting");
                break;
            };

            {
                let mut mgr = surface.lock();
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                if !mgr.surface().is_valid() {
                    debug!("No surface; render loop exiting");
                    break;
                }
                match present_pending_frame(&mut mgr, &self.gate, source.as_ref()) {
                    Presented::Skipped | Presented::Done => {}
                    Presented::DeviceLost { generation, error } => {
                        warn!("Present failed ({}); requesting surface recovery", error);
                        self.dispatcher.post(UiMessage::DeviceLost { generation });
                        break;
                    }
                }
            }

            // Drop strong refs before sleeping
            drop(source);
            drop(surface);
            self.gate.wait(self.frame_interval);
        }
    }
}

/// Background loop driving draw + present for one surface
pub struct RenderLoop {
    ctx: Arc<LoopContext>,
    worker: Option<Worker>,
}

impl RenderLoop {
    pub fn new(
        surface: &SharedSurface,
        source: Weak<dyn FrameSource>,
        gate: Arc<FrameGate>,
        dispatcher: UiDispatcher,
        frame_interval: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(LoopContext {
                surface: Arc::downgrade(surface),
                source,
                gate,
                dispatcher,
                frame_interval,
            }),
            worker: None,
        }
    }

    /// Whether the loop thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Start the loop; no-op if it is already running
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a loop that exited on its own
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = self.ctx.clone();
        let flag = cancel.clone();
        let handle = thread::Builder::new()
            .name("render-loop".to_string())
            .spawn(move || ctx.run(&flag))
            .map_err(|e| PlayerError::Renderer(format!("Failed to spawn render loop: {}", e)))?;

        info!("Render loop started");
        self.worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Signal cancellation and wait for the current iteration to finish
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.cancel.store(true, Ordering::SeqCst);
        self.ctx.gate.wake();
        if worker.handle.join().is_err() {
            error!("Render loop thread panicked");
        } else {
            debug!("Render loop stopped");
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
