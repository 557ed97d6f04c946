//! Playback session for vidpane
//!
//! This module keeps the coarse player state consistent with what the engine
//! reports, and owns the session that ties the engine handle, the video
//! output and the stream registry together.

mod element;
mod state;

pub use element::{MediaElement, MediaSource};
pub use state::PlaybackStateMachine;

use std::fmt;
use std::time::Duration;

/// Coarse playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No media loaded
    Closed,

    /// Media requested, engine is opening it
    Opening,

    /// Playback stalled waiting for data
    Buffering,

    /// Currently playing
    Playing,

    /// Playback paused
    Paused,

    /// Playback stopped by request
    Stopped,

    /// The engine reported a failure; left by any later transition
    Error,
}

impl PlaybackState {
    /// Whether media is loaded and the transport is active
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlaybackState::Buffering | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Closed => "closed",
            PlaybackState::Opening => "opening",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Player event for observers on the UI thread
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The coarse state changed
    StateChanged { old: PlaybackState, new: PlaybackState },

    /// Position changed
    PositionChanged { position: Duration },

    /// Media length became known, or unknown again
    LengthChanged { length: Option<Duration> },

    /// Seekability changed
    SeekableChanged { seekable: bool },

    /// Volume changed (0 - 100)
    VolumeChanged { volume: f64 },

    /// Mute toggled
    MuteChanged { muted: bool },

    /// Error occurred
    Error { message: String },

    /// Surface recovery failed; show a placeholder
    SurfaceUnavailable { reason: String },

    /// Surface recovered after a device loss
    SurfaceRestored,

    /// End of media reached
    EndOfMedia,
}
