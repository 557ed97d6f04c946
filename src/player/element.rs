//! Media element: one playback session
//!
//! Owns the engine handle, the video output for its window region, the
//! stream registry and the state machine. Lives on the UI thread; engine and
//! render notifications reach it through [`MediaElement::pump`].

use super::state::{seconds, PlaybackStateMachine};
use super::{PlaybackState, PlayerEvent};
use crate::dispatch::{self, UiMessage, UiQueue};
use crate::engine::{EndReason, EngineEvent, EngineHandle, ErrorCode, PropertyFormat, PropertyValue};
use crate::render::{FrameGate, FrameNotifier, FrameSource, SurfaceNotice, VideoOutput};
use crate::stream::{MediaStream, StreamRegistry};
use crate::surface::{GpuContext, PixelFormat, SurfaceHandle, SurfaceManager, SurfaceRegion};
use crate::utils::config::{Config, PlayerSettings};
use crate::utils::error::{PlayerError, Result};
use log::{debug, info, trace, warn};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Properties the session keeps in sync through change events
const OBSERVED: [(&str, PropertyFormat); 7] = [
    ("pause", PropertyFormat::Flag),
    ("paused-for-cache", PropertyFormat::Flag),
    ("time-pos", PropertyFormat::Double),
    ("duration", PropertyFormat::Double),
    ("seekable", PropertyFormat::Flag),
    ("volume", PropertyFormat::Double),
    ("mute", PropertyFormat::Flag),
];

/// What to play
pub enum MediaSource {
    /// Path or URI handed to the engine as-is
    Uri(String),

    /// Caller-opened resource bridged through a stream session
    Stream {
        stream: Box<dyn MediaStream>,
        token: String,
    },
}

impl MediaSource {
    pub fn uri(uri: impl Into<String>) -> Self {
        MediaSource::Uri(uri.into())
    }

    pub fn stream<S>(stream: S, token: impl Into<String>) -> Self
    where
        S: MediaStream + 'static,
    {
        MediaSource::Stream {
            stream: Box::new(stream),
            token: token.into(),
        }
    }

    /// Open `path` and bridge it, using the path as the token
    pub fn open_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::stream(BufReader::new(file), path.display().to_string()))
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            MediaSource::Stream { token, .. } => f.debug_struct("Stream").field("token", token).finish(),
        }
    }
}

/// The source currently set, as the engine sees it
struct LoadTarget {
    uri: String,
    /// Direct URIs can be loaded again; a bridged stream is consumed by its
    /// first open
    reusable: bool,
    loads: u32,
}

/// One playback session bound to one window region
pub struct MediaElement {
    // Dropped first: the render loop must stop before the engine goes away
    output: VideoOutput,
    engine: Arc<EngineHandle>,
    registry: Arc<StreamRegistry>,
    state: PlaybackStateMachine,
    queue: UiQueue,
    settings: PlayerSettings,
    target: Option<LoadTarget>,
    loaded: bool,
    paused: bool,
    buffering: bool,
}

impl MediaElement {
    /// Configure and start `engine`, and wire its callbacks to this session
    ///
    /// # Arguments
    ///
    /// * `engine` - A created, not yet initialized engine handle
    /// * `gpu` - GPU context for the window region
    /// * `config` - Engine, render and player settings
    /// * `waker` - Called from any thread whenever [`MediaElement::pump`] has work
    pub fn new<W>(engine: Arc<EngineHandle>, gpu: Box<dyn GpuContext>, config: &Config, waker: W) -> Result<Self>
    where
        W: Fn() + Send + Sync + 'static,
    {
        let (dispatcher, queue) = dispatch::channel(waker);

        engine.set_option("vo", "libmpv")?;
        engine.set_option("idle", "yes")?;
        engine.set_option("msg-level", &config.engine.msg_level)?;
        engine.set_option("hwdec", &config.engine.hwdec)?;
        if let Some(log_file) = &config.engine.log_file {
            engine.set_option("log-file", &log_file.display().to_string())?;
        }
        engine.set_option("volume", &config.player.default_volume.min(100).to_string())?;
        if config.player.auto_repeat {
            engine.set_option("loop-file", "inf")?;
        }
        for (name, value) in &config.engine.options {
            engine.set_option(name, value)?;
        }

        engine.initialize()?;

        let registry = StreamRegistry::new();
        engine.register_stream_opener(registry.opener())?;
        for (name, format) in OBSERVED {
            engine.observe_property(name, format)?;
        }

        let gate = FrameGate::new();
        engine.register_draw_callback(FrameNotifier::new(gate.clone(), dispatcher.clone()))?;
        engine.start_event_pump(dispatcher.clone())?;

        let source: Weak<dyn FrameSource> = Arc::downgrade(&engine) as Weak<dyn FrameSource>;
        let output = VideoOutput::new(
            SurfaceManager::new(gpu, PixelFormat::Rgb0),
            source,
            gate,
            dispatcher,
            config.render.frame_interval(),
        );

        let mut state = PlaybackStateMachine::new();
        state.set_volume(f64::from(config.player.default_volume.min(100)));

        info!("Media element ready");
        Ok(Self {
            output,
            engine,
            registry,
            state,
            queue,
            settings: config.player.clone(),
            target: None,
            loaded: false,
            paused: false,
            buffering: false,
        })
    }

    /// Register an observer for player events
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&PlayerEvent) + 'static,
    {
        self.state.subscribe(observer);
    }

    /// Set what to play; loads it right away when auto-play is on
    pub fn set_source(&mut self, source: MediaSource) -> Result<()> {
        info!("Source: {:?}", source);
        let target = match source {
            MediaSource::Uri(uri) => LoadTarget {
                uri,
                reusable: true,
                loads: 0,
            },
            MediaSource::Stream { stream, token } => LoadTarget {
                uri: self.registry.stage(stream, token),
                reusable: false,
                loads: 0,
            },
        };
        self.target = Some(target);

        if self.settings.auto_play {
            self.load()
        } else if self.loaded {
            self.stop()
        } else {
            Ok(())
        }
    }

    fn load(&mut self) -> Result<()> {
        let Some(target) = self.target.as_mut() else {
            return Err(PlayerError::InvalidInput("no media source set".to_string()));
        };
        if target.loads > 0 && !target.reusable {
            return Err(PlayerError::InvalidInput(
                "stream source already consumed; set the source again".to_string(),
            ));
        }
        target.loads += 1;
        let uri = target.uri.clone();

        self.set_engine_property("pause", "no")?;
        self.command(&["loadfile", &uri, "replace"])?;
        self.loaded = true;
        Ok(())
    }

    /// Start or resume playback, loading the source if nothing is loaded
    pub fn play(&mut self) -> Result<()> {
        if !self.loaded {
            return self.load();
        }
        self.set_engine_property("pause", "no")
    }

    pub fn pause(&mut self) -> Result<()> {
        self.set_engine_property("pause", "yes")
    }

    /// Stop playback and unload the media
    pub fn stop(&mut self) -> Result<()> {
        self.command(&["stop"])
    }

    pub fn toggle_play_pause(&mut self) -> Result<()> {
        match self.state.state() {
            PlaybackState::Playing | PlaybackState::Buffering => self.pause(),
            _ => self.play(),
        }
    }

    /// Seek to `fraction` of the media length
    ///
    /// Ignored while the media is not seekable.
    pub fn set_position(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(PlayerError::InvalidInput(format!(
                "position {} outside 0..=1",
                fraction
            )));
        }
        if !self.state.is_seekable() {
            debug!("Seek to {:.3} ignored: not seekable", fraction);
            return Ok(());
        }
        let percent = format!("{:.3}", fraction * 100.0);
        self.command(&["seek", &percent, "absolute-percent"])
    }

    /// Seek by `offset` seconds; negative seeks backwards
    pub fn seek_relative(&mut self, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(PlayerError::InvalidInput(format!("seek offset {}", offset)));
        }
        if !self.state.is_seekable() {
            debug!("Relative seek {:+} ignored: not seekable", offset);
            return Ok(());
        }
        let offset = format!("{:.3}", offset);
        self.command(&["seek", &offset, "relative"])
    }

    /// Set volume, clamped to 0 - 100
    pub fn set_volume(&mut self, level: u8) -> Result<()> {
        self.set_engine_property("volume", &level.min(100).to_string())
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.set_engine_property("mute", if muted { "yes" } else { "no" })
    }

    /// Replay the media on end of file instead of closing
    pub fn set_auto_repeat(&mut self, repeat: bool) -> Result<()> {
        self.set_engine_property("loop-file", if repeat { "inf" } else { "no" })?;
        self.settings.auto_repeat = repeat;
        Ok(())
    }

    /// Media length, asking the engine with bounded retry if not yet reported
    pub fn media_length(&mut self) -> Result<Duration> {
        if let Some(length) = self.state.length() {
            return Ok(length);
        }
        let raw = self.engine.get_property_with_retry("duration")?;
        let secs: f64 = raw
            .trim()
            .parse()
            .map_err(|_| PlayerError::EngineCommand(format!("unparseable duration '{}'", raw)))?;
        let length = seconds(secs);
        self.state.set_length(Some(length));
        Ok(length)
    }

    fn command(&mut self, args: &[&str]) -> Result<()> {
        let result = self.engine.execute_command(args);
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    fn set_engine_property(&mut self, name: &str, value: &str) -> Result<()> {
        let result = self.engine.set_property(name, value);
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    fn report(&mut self, error: &PlayerError) {
        if let PlayerError::EngineCommand(message) = error {
            self.state.fail(message.clone());
        }
    }

    /// Handle every queued engine and render notification
    ///
    /// Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.queue.try_next() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for a notification, then drain the queue
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.queue.next_timeout(timeout) {
            Some(message) => {
                self.handle(message);
                1 + self.pump()
            }
            None => 0,
        }
    }

    fn handle(&mut self, message: UiMessage) {
        match message {
            UiMessage::Engine(event) => self.engine_event(event),
            UiMessage::DrawFrame => {
                if let Some(notice) = self.output.draw_now() {
                    self.surface_notice(notice);
                }
            }
            UiMessage::DeviceLost { generation } => {
                if let Some(notice) = self.output.recover_from_device_lost(generation) {
                    self.surface_notice(notice);
                }
            }
        }
    }

    fn surface_notice(&mut self, notice: SurfaceNotice) {
        match notice {
            SurfaceNotice::Restored => self.state.emit(PlayerEvent::SurfaceRestored),
            SurfaceNotice::Unavailable(reason) => self.state.emit(PlayerEvent::SurfaceUnavailable { reason }),
        }
    }

    fn resolved_state(&self) -> PlaybackState {
        if self.buffering {
            PlaybackState::Buffering
        } else if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    fn engine_event(&mut self, event: EngineEvent) {
        trace!("Engine event: {:?}", event);
        match event {
            EngineEvent::StartFile => {
                self.loaded = true;
                self.state.transition(PlaybackState::Opening);
            }
            EngineEvent::FileLoaded => {
                let state = self.resolved_state();
                self.state.transition(state);
            }
            EngineEvent::PlaybackRestart => {
                if matches!(self.state.state(), PlaybackState::Opening | PlaybackState::Buffering) {
                    let state = self.resolved_state();
                    self.state.transition(state);
                }
            }
            EngineEvent::PropertyChange { name, value } => self.property_changed(&name, &value),
            EngineEvent::EndFile { reason, error } => self.end_file(reason, error),
            EngineEvent::Idle => debug!("Engine idle"),
            EngineEvent::Shutdown => {
                self.loaded = false;
                self.state.transition(PlaybackState::Closed);
            }
        }
    }

    fn property_changed(&mut self, name: &str, value: &PropertyValue) {
        match name {
            "pause" => {
                let Some(paused) = value.as_flag() else { return };
                self.paused = paused;
                if self.state.state().is_active() {
                    let state = self.resolved_state();
                    self.state.transition(state);
                }
            }
            "paused-for-cache" => {
                let Some(buffering) = value.as_flag() else { return };
                self.buffering = buffering;
                if self.state.state().is_active() {
                    let state = self.resolved_state();
                    self.state.transition(state);
                }
            }
            "time-pos" => {
                if let Some(position) = value.as_f64() {
                    self.state.set_position(seconds(position));
                }
            }
            "duration" => self.state.set_length(value.as_f64().map(seconds)),
            "seekable" => {
                if let Some(seekable) = value.as_flag() {
                    self.state.set_seekable(seekable);
                }
            }
            "volume" => {
                if let Some(volume) = value.as_f64() {
                    self.state.set_volume(volume);
                }
            }
            "mute" => {
                if let Some(muted) = value.as_flag() {
                    self.state.set_muted(muted);
                }
            }
            other => trace!("Unhandled property change: {}", other),
        }
    }

    fn end_file(&mut self, reason: EndReason, error: ErrorCode) {
        debug!("End of file: {:?} ({})", reason, error);
        if reason == EndReason::Redirect {
            return;
        }
        self.loaded = false;
        self.buffering = false;
        match reason {
            EndReason::Eof => {
                self.state.emit(PlayerEvent::EndOfMedia);
                self.state.transition(PlaybackState::Closed);
            }
            EndReason::Stop => {
                self.state.transition(PlaybackState::Stopped);
            }
            EndReason::Quit => {
                self.state.transition(PlaybackState::Closed);
            }
            EndReason::Error => self.state.fail(format!("playback failed: {}", error)),
            EndReason::Redirect => {}
        }
    }

    /// The window region is available
    pub fn on_surface_ready(&mut self, region: &SurfaceRegion) -> Result<SurfaceHandle> {
        self.output.surface_ready(region)
    }

    /// The window region is going away
    pub fn on_surface_teardown(&mut self) {
        self.output.teardown();
    }

    pub fn on_resize(&mut self, width: f64, height: f64, scale_factor: f64) -> Result<()> {
        self.output.resize(width, height, scale_factor)
    }

    /// Pause or resume rendering; playback is unaffected
    pub fn on_visibility_changed(&mut self, visible: bool) -> Result<()> {
        self.output.set_visible(visible)
    }

    pub fn state(&self) -> PlaybackState {
        self.state.state()
    }

    pub fn position(&self) -> Duration {
        self.state.position()
    }

    pub fn length(&self) -> Option<Duration> {
        self.state.length()
    }

    pub fn is_seekable(&self) -> bool {
        self.state.is_seekable()
    }

    pub fn volume(&self) -> f64 {
        self.state.volume()
    }

    pub fn is_muted(&self) -> bool {
        self.state.is_muted()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error()
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn surface_handle(&self) -> SurfaceHandle {
        self.output.surface_handle()
    }

    pub fn is_rendering(&self) -> bool {
        self.output.is_rendering()
    }

    /// Completed device-loss recoveries
    pub fn recoveries(&self) -> u64 {
        self.output.recoveries()
    }

    /// Stream sessions opened by the engine and not yet closed
    pub fn live_stream_sessions(&self) -> usize {
        self.registry.live_sessions()
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }
}

impl Drop for MediaElement {
    fn drop(&mut self) {
        self.output.teardown();
        if self.registry.live_sessions() > 0 {
            warn!(
                "{} stream session(s) still open at session end",
                self.registry.live_sessions()
            );
        }
    }
}
