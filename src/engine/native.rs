//! Safe seam over a native engine instance
//!
//! [`NativeEngine`] is what [`EngineHandle`](super::EngineHandle) drives.
//! [`LibMpv`](super::library::LibMpv) implements it over the dynamically
//! loaded library; tests substitute a mock.

use super::ffi::{ErrorCode, RenderUpdateFn, StreamOpenFn};
use crate::surface::FrameTarget;
use std::ffi::c_void;
use std::time::Duration;

/// Why the engine stopped playing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Eof,
    Stop,
    Quit,
    Error,
    Redirect,
}

/// Observed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Flag(bool),
    Double(f64),
    Int(i64),
    Text(String),
    /// Observed but not currently available (e.g. no file loaded)
    Unavailable,
}

impl PropertyValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v != 0),
            PropertyValue::Text(s) => match s.as_str() {
                "yes" => Some(true),
                "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Notification from the engine's event queue
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StartFile,
    FileLoaded,
    PlaybackRestart,
    EndFile { reason: EndReason, error: ErrorCode },
    PropertyChange { name: String, value: PropertyValue },
    Idle,
    Shutdown,
}

/// How an observed property is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFormat {
    Flag,
    Double,
    Int,
    Text,
}

/// Operations on one native engine instance
///
/// Methods take `&self`; the native client API is thread-safe except for
/// the render calls, which the render loop serializes under the surface
/// lock.
pub trait NativeEngine: Send + Sync {
    /// Start the engine; options set afterwards may be rejected
    fn initialize(&self) -> Result<(), ErrorCode>;

    fn set_option(&self, name: &str, value: &str) -> Result<(), ErrorCode>;

    /// Run a command given as separate arguments
    fn command(&self, args: &[&str]) -> Result<(), ErrorCode>;

    /// Read a property as text
    fn get_property(&self, name: &str) -> Result<String, ErrorCode>;

    fn set_property(&self, name: &str, value: &str) -> Result<(), ErrorCode>;

    /// Subscribe to change notifications for `name`
    fn observe_property(&self, name: &str, format: PropertyFormat) -> Result<(), ErrorCode>;

    /// Block up to `timeout` for the next event
    fn wait_event(&self, timeout: Duration) -> Option<EngineEvent>;

    /// Interrupt a blocked [`NativeEngine::wait_event`]
    fn wakeup(&self);

    /// Register `open` for URIs under `scheme`
    ///
    /// # Safety
    ///
    /// `user_data` must stay valid until [`NativeEngine::release_callbacks`]
    /// returns or the engine is destroyed.
    unsafe fn add_stream_protocol(
        &self,
        scheme: &str,
        user_data: *mut c_void,
        open: StreamOpenFn,
    ) -> Result<(), ErrorCode>;

    /// Create the render sub-context and install the frame-ready callback
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid until [`NativeEngine::release_callbacks`]
    /// returns or the engine is destroyed.
    unsafe fn create_render_context(&self, update: RenderUpdateFn, ctx: *mut c_void) -> Result<(), ErrorCode>;

    /// Detach every callback registered on this instance
    ///
    /// Once this returns the engine never calls the frame-ready callback or
    /// a stream opener again, so their user data may be freed.
    fn release_callbacks(&self);

    /// Render the current video frame into `frame`
    fn render(&self, frame: &mut FrameTarget) -> Result<(), ErrorCode>;

    /// Tell the engine the last rendered frame reached the screen
    fn report_swap(&self);
}
