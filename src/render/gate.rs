//! Frame request token and the engine's frame-ready callback

use crate::dispatch::{UiDispatcher, UiMessage};
use crate::utils::ffi::ffi_guard;
use parking_lot::{Condvar, Mutex};
use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct GateState {
    /// A frame is ready and nobody has drawn it yet
    pending: bool,
    /// Wake waiters without a frame (stop, visibility change)
    woken: bool,
}

/// Single-slot token between the engine's frame notifications and drawing
///
/// At most one token is outstanding; whoever takes it draws and presents
/// that frame, so a notification never produces two presents.
#[derive(Default)]
pub struct FrameGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl FrameGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a frame ready; true if no token was already outstanding
    pub fn request(&self) -> bool {
        let mut state = self.state.lock();
        let newly = !state.pending;
        state.pending = true;
        self.cond.notify_all();
        newly
    }

    /// Claim the outstanding token, if any
    pub fn take(&self) -> bool {
        std::mem::take(&mut self.state.lock().pending)
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Block until a token is outstanding, [`FrameGate::wake`] is called, or
    /// `timeout` passes
    pub fn wait(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if !state.pending && !state.woken {
            self.cond.wait_for(&mut state, timeout);
        }
        state.woken = false;
    }

    /// Release any waiter
    pub fn wake(&self) {
        self.state.lock().woken = true;
        self.cond.notify_all();
    }
}

/// Installed as the engine's frame-ready callback context
pub struct FrameNotifier {
    gate: Arc<FrameGate>,
    dispatcher: UiDispatcher,
}

impl FrameNotifier {
    pub fn new(gate: Arc<FrameGate>, dispatcher: UiDispatcher) -> Self {
        Self { gate, dispatcher }
    }

    /// Record a ready frame and ask the UI thread to draw it once
    pub fn notify(&self) {
        if self.gate.request() {
            self.dispatcher.post(UiMessage::DrawFrame);
        }
    }
}

/// Frame-ready callback handed to the engine
///
/// # Safety
///
/// `ctx` must point to a live [`FrameNotifier`].
pub unsafe extern "C" fn frame_ready_trampoline(ctx: *mut c_void) {
    ffi_guard((), || {
        if let Some(notifier) = (ctx as *const FrameNotifier).as_ref() {
            notifier.notify();
        }
    })
}
