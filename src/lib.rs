//! vidpane - embeds a native media engine in a window
//!
//! The engine decodes; this crate owns everything around it: the GPU
//! surface and its device-loss recovery, the background render loop and its
//! hand-off to the UI thread, the stream bridge that lets the engine read
//! caller-owned data, and the playback state the UI observes.

pub mod dispatch;
pub mod engine;
pub mod player;
pub mod render;
pub mod stream;
pub mod surface;
pub mod utils;
pub mod window;

pub use engine::{EngineHandle, NativeEngine};
pub use player::{MediaElement, MediaSource, PlaybackState, PlayerEvent};
pub use utils::error::{PlayerError, Result};
