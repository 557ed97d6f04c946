//! Playback state machine
//!
//! State only moves in response to engine notifications. Observers are
//! plain closures run on the UI thread.

use super::{PlaybackState, PlayerEvent};
use log::{debug, info, warn};
use std::time::Duration;

type Observer = Box<dyn FnMut(&PlayerEvent)>;

/// Convert engine seconds to a duration, clamping junk to zero
pub(crate) fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

/// Coarse state plus the position/length/seekable values shown alongside it
pub struct PlaybackStateMachine {
    state: PlaybackState,
    position: Duration,
    length: Option<Duration>,
    seekable: bool,
    volume: f64,
    muted: bool,
    last_error: Option<String>,
    observers: Vec<Observer>,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Closed,
            position: Duration::ZERO,
            length: None,
            seekable: false,
            volume: 100.0,
            muted: false,
            last_error: None,
            observers: Vec::new(),
        }
    }

    /// Register an observer for every event this machine emits
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&PlayerEvent) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub(crate) fn emit(&mut self, event: PlayerEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn length(&self) -> Option<Duration> {
        self.length
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Move to `new`
    ///
    /// Returns false, and notifies nobody, when already in `new`.
    pub fn transition(&mut self, new: PlaybackState) -> bool {
        let old = self.state;
        if old == new {
            return false;
        }
        self.state = new;
        info!("Playback state: {} -> {}", old, new);
        self.emit(PlayerEvent::StateChanged { old, new });

        if matches!(new, PlaybackState::Closed | PlaybackState::Stopped) {
            self.set_position(Duration::ZERO);
        }
        if matches!(
            new,
            PlaybackState::Opening | PlaybackState::Closed | PlaybackState::Stopped
        ) {
            self.set_seekable(false);
        }
        if new == PlaybackState::Closed {
            self.set_length(None);
        }
        true
    }

    /// Enter `Error` with `message`
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("Playback error: {}", message);
        self.last_error = Some(message.clone());
        self.transition(PlaybackState::Error);
        self.emit(PlayerEvent::Error { message });
    }

    pub fn set_position(&mut self, position: Duration) {
        if self.position != position {
            self.position = position;
            self.emit(PlayerEvent::PositionChanged { position });
        }
    }

    pub fn set_length(&mut self, length: Option<Duration>) {
        if self.length != length {
            self.length = length;
            debug!("Media length: {:?}", length);
            self.emit(PlayerEvent::LengthChanged { length });
        }
    }

    pub fn set_seekable(&mut self, seekable: bool) {
        if self.seekable != seekable {
            self.seekable = seekable;
            self.emit(PlayerEvent::SeekableChanged { seekable });
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if (self.volume - volume).abs() > f64::EPSILON {
            self.volume = volume;
            self.emit(PlayerEvent::VolumeChanged { volume });
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            self.muted = muted;
            self.emit(PlayerEvent::MuteChanged { muted });
        }
    }
}
