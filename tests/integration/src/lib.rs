//! Integration test utilities for vidpane
//!
//! This module provides:
//! - A scripted native engine that answers commands with the events the
//!   real engine would emit, and drives the stream callbacks it is given
//! - A GPU context that can be told to fail presentation
//! - Test fixtures and helpers

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vidpane::engine::ffi::{
    mpv_stream_cb_info, RenderUpdateFn, StreamCloseFn, StreamOpenFn, StreamReadFn, StreamSizeFn,
};
use vidpane::engine::{EndReason, EngineEvent, ErrorCode, NativeEngine, PropertyFormat, PropertyValue};
use vidpane::surface::{FrameTarget, GpuContext, SurfaceHandle, SurfaceRegion};
use vidpane::utils::config::Config;
use vidpane::utils::error::{PlayerError, Result as PlayerResult};
use vidpane::{EngineHandle, MediaElement};

/// Length the mock reports for every loaded media item
pub const MOCK_LENGTH_SECS: f64 = 10.0;

/// Test fixture with a temporary directory for media and config files
pub struct TestFixture {
    pub temp_dir: TempDir,
}

impl TestFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `len` bytes of a repeating pattern and return the file path
    pub fn media_file(&self, name: &str, len: usize) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, pattern(len))?;
        Ok(path)
    }
}

/// Deterministic payload for backing stores
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// In-memory backing store that records when it is released
pub struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<AtomicBool>,
    /// Latency of every read, as a slow disk or network would add
    delay: Duration,
}

impl TrackedStream {
    pub fn new(len: usize) -> (Self, Arc<AtomicBool>) {
        Self::with_delay(len, Duration::ZERO)
    }

    pub fn with_delay(len: usize, delay: Duration) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: Cursor::new(pattern(len)),
                dropped: dropped.clone(),
                delay,
            },
            dropped,
        )
    }
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        assert!(!self.dropped.load(Ordering::SeqCst), "read after close");
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.read(buf)
    }
}

impl Seek for TrackedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Stream callbacks handed back by an opener, kept as the engine would
#[derive(Clone, Copy)]
struct OpenStream {
    cookie: usize,
    read: StreamReadFn,
    size: StreamSizeFn,
    close: StreamCloseFn,
}

#[derive(Default)]
struct MockState {
    initialized: bool,
    options: Vec<(String, String)>,
    commands: Vec<Vec<String>>,
    properties: HashMap<String, String>,
    observed: Vec<String>,
    openers: Vec<(String, usize, StreamOpenFn)>,
    render_update: Option<(RenderUpdateFn, usize)>,
    stream: Option<OpenStream>,
    loaded: bool,
    position: f64,
    fail_draw: bool,
    reject_commands: bool,
}

/// State behind a [`MockEngine`], shared by its clones
pub struct MockCore {
    state: Mutex<MockState>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    draws: AtomicUsize,
    swaps: AtomicUsize,
}

impl Default for MockCore {
    fn default() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            state: Mutex::new(MockState::default()),
            events_tx,
            events_rx,
            draws: AtomicUsize::new(0),
            swaps: AtomicUsize::new(0),
        }
    }
}

/// Scripted stand-in for the native engine
///
/// The engine handle owns one clone; tests keep another to drive and
/// inspect the same state.
#[derive(Clone, Default)]
pub struct MockEngine(Arc<MockCore>);

impl std::ops::Deref for MockEngine {
    type Target = MockCore;

    fn deref(&self) -> &MockCore {
        &self.0
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MockCore {
    fn push(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    fn property_change(&self, name: &str, value: PropertyValue) {
        self.push(EngineEvent::PropertyChange {
            name: name.to_string(),
            value,
        });
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().commands.clone()
    }

    /// Options applied so far
    pub fn options(&self) -> Vec<(String, String)> {
        self.state.lock().options.clone()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.state.lock().properties.get(name).cloned()
    }

    pub fn observed(&self) -> Vec<String> {
        self.state.lock().observed.clone()
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    pub fn swaps(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }

    pub fn set_fail_draw(&self, fail: bool) {
        self.state.lock().fail_draw = fail;
    }

    /// Reject every command with the engine's command error
    pub fn set_reject_commands(&self, reject: bool) {
        self.state.lock().reject_commands = reject;
    }

    /// Whether a stream session is currently open
    pub fn has_open_stream(&self) -> bool {
        self.state.lock().stream.is_some()
    }

    /// Whether a frame-ready callback is installed
    pub fn has_frame_callback(&self) -> bool {
        self.state.lock().render_update.is_some()
    }

    /// Number of stream openers the engine could still call
    pub fn stream_openers(&self) -> usize {
        self.state.lock().openers.len()
    }

    /// Fire the frame-ready callback as the render thread would
    pub fn frame_ready(&self) {
        let update = self.state.lock().render_update;
        if let Some((update, ctx)) = update {
            unsafe { update(ctx as *mut c_void) };
        }
    }

    /// Play the loaded media to its end
    pub fn finish_playback(&self) {
        self.close_stream();
        self.state.lock().loaded = false;
        self.push(EngineEvent::EndFile {
            reason: EndReason::Eof,
            error: ErrorCode::Success,
        });
        self.push(EngineEvent::Idle);
    }

    /// Report the engine stalling for data, then recovering
    pub fn stall(&self, stalled: bool) {
        self.property_change("paused-for-cache", PropertyValue::Flag(stalled));
    }

    /// Read the open stream to its end in `chunk`-sized requests
    ///
    /// Returns (total bytes read, reported size), or `None` without an open
    /// stream.
    pub fn drain_stream(&self, chunk: usize) -> Option<(u64, i64)> {
        let stream = self.state.lock().stream?;
        let cookie = stream.cookie as *mut c_void;
        let size = unsafe { (stream.size)(cookie) };
        let mut buf = vec![0u8; chunk.max(1)];
        let mut total = 0u64;
        loop {
            let n = unsafe { (stream.read)(cookie, buf.as_mut_ptr().cast(), buf.len() as u64) };
            if n <= 0 {
                break;
            }
            total += n as u64;
        }
        Some((total, size))
    }

    /// Read the open stream to its end, timing each request
    ///
    /// Returns every read result with how long it took, the final `0`
    /// included, or `None` without an open stream.
    pub fn timed_reads(&self, chunk: usize) -> Option<Vec<(i64, Duration)>> {
        let stream = self.state.lock().stream?;
        let cookie = stream.cookie as *mut c_void;
        let mut buf = vec![0u8; chunk.max(1)];
        let mut reads = Vec::new();
        loop {
            let started = Instant::now();
            let n = unsafe { (stream.read)(cookie, buf.as_mut_ptr().cast(), buf.len() as u64) };
            reads.push((n, started.elapsed()));
            if n <= 0 {
                break;
            }
        }
        Some(reads)
    }

    /// Size the open stream reports, if one is open
    pub fn stream_size(&self) -> Option<i64> {
        let stream = self.state.lock().stream?;
        Some(unsafe { (stream.size)(stream.cookie as *mut c_void) })
    }

    fn close_stream(&self) {
        let stream = self.state.lock().stream.take();
        if let Some(stream) = stream {
            unsafe { (stream.close)(stream.cookie as *mut c_void) };
        }
    }

    fn open_stream(&self, uri: &str) -> std::result::Result<(), ErrorCode> {
        let opener = {
            let state = self.state.lock();
            state
                .openers
                .iter()
                .find(|(scheme, _, _)| uri.starts_with(&format!("{}://", scheme)))
                .map(|(_, user_data, open)| (*user_data, *open))
        };
        let Some((user_data, open)) = opener else {
            return Err(ErrorCode::LoadingFailed);
        };

        let uri = CString::new(uri).map_err(|_| ErrorCode::InvalidParameter)?;
        let mut info = mpv_stream_cb_info {
            cookie: std::ptr::null_mut(),
            read_fn: None,
            seek_fn: None,
            size_fn: None,
            close_fn: None,
            cancel_fn: None,
        };
        let rc = unsafe { open(user_data as *mut c_void, uri.as_ptr() as *mut _, &mut info) };
        ErrorCode::from_raw(rc).check()?;

        let (Some(read), Some(size), Some(close)) = (info.read_fn, info.size_fn, info.close_fn) else {
            return Err(ErrorCode::LoadingFailed);
        };
        self.state.lock().stream = Some(OpenStream {
            cookie: info.cookie as usize,
            read,
            size,
            close,
        });
        Ok(())
    }

    fn load(&self, uri: &str) {
        self.close_stream();
        self.push(EngineEvent::StartFile);
        if uri.contains("://") && !uri.starts_with("file://") {
            if let Err(code) = self.open_stream(uri) {
                self.push(EngineEvent::EndFile {
                    reason: EndReason::Error,
                    error: code,
                });
                self.push(EngineEvent::Idle);
                return;
            }
        }
        {
            let mut state = self.state.lock();
            state.loaded = true;
            state.position = 0.0;
        }
        self.push(EngineEvent::FileLoaded);
        self.property_change("duration", PropertyValue::Double(MOCK_LENGTH_SECS));
        self.property_change("seekable", PropertyValue::Flag(true));
        self.property_change("time-pos", PropertyValue::Double(0.0));
        self.push(EngineEvent::PlaybackRestart);
    }
}

impl NativeEngine for MockEngine {
    fn initialize(&self) -> std::result::Result<(), ErrorCode> {
        self.state.lock().initialized = true;
        Ok(())
    }

    fn set_option(&self, name: &str, value: &str) -> std::result::Result<(), ErrorCode> {
        let mut state = self.state.lock();
        if state.initialized {
            return Err(ErrorCode::OptionError);
        }
        state.options.push((name.to_string(), value.to_string()));
        state.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn command(&self, args: &[&str]) -> std::result::Result<(), ErrorCode> {
        {
            let mut state = self.state.lock();
            if state.reject_commands {
                return Err(ErrorCode::Command);
            }
            state.commands.push(args.iter().map(|s| s.to_string()).collect());
        }
        match args {
            ["loadfile", uri, ..] => self.load(uri),
            ["stop"] => {
                self.close_stream();
                let was_loaded = {
                    let mut state = self.state.lock();
                    state.position = 0.0;
                    std::mem::take(&mut state.loaded)
                };
                if was_loaded {
                    self.push(EngineEvent::EndFile {
                        reason: EndReason::Stop,
                        error: ErrorCode::Success,
                    });
                    self.property_change("time-pos", PropertyValue::Unavailable);
                    self.push(EngineEvent::Idle);
                }
            }
            ["seek", offset, mode] => {
                let offset: f64 = offset.parse().map_err(|_| ErrorCode::InvalidParameter)?;
                let position = {
                    let mut state = self.state.lock();
                    let target = match *mode {
                        "absolute-percent" => MOCK_LENGTH_SECS * offset / 100.0,
                        "relative" => state.position + offset,
                        _ => return Err(ErrorCode::InvalidParameter),
                    };
                    state.position = target.clamp(0.0, MOCK_LENGTH_SECS);
                    state.position
                };
                self.property_change("time-pos", PropertyValue::Double(position));
                self.push(EngineEvent::PlaybackRestart);
            }
            _ => return Err(ErrorCode::Command),
        }
        Ok(())
    }

    fn get_property(&self, name: &str) -> std::result::Result<String, ErrorCode> {
        let state = self.state.lock();
        match name {
            "duration" if state.loaded => Ok(format!("{:.6}", MOCK_LENGTH_SECS)),
            "duration" => Err(ErrorCode::PropertyUnavailable),
            _ => state
                .properties
                .get(name)
                .cloned()
                .ok_or(ErrorCode::PropertyNotFound),
        }
    }

    fn set_property(&self, name: &str, value: &str) -> std::result::Result<(), ErrorCode> {
        self.state
            .lock()
            .properties
            .insert(name.to_string(), value.to_string());
        match name {
            "pause" | "mute" => {
                let flag = match value {
                    "yes" => true,
                    "no" => false,
                    _ => return Err(ErrorCode::PropertyFormat),
                };
                self.property_change(name, PropertyValue::Flag(flag));
            }
            "volume" => {
                let volume: f64 = value.parse().map_err(|_| ErrorCode::PropertyFormat)?;
                self.property_change(name, PropertyValue::Double(volume));
            }
            _ => {}
        }
        Ok(())
    }

    fn observe_property(&self, name: &str, _format: PropertyFormat) -> std::result::Result<(), ErrorCode> {
        self.state.lock().observed.push(name.to_string());
        Ok(())
    }

    fn wait_event(&self, timeout: Duration) -> Option<EngineEvent> {
        self.events_rx.recv_timeout(timeout).ok()
    }

    fn wakeup(&self) {}

    unsafe fn add_stream_protocol(
        &self,
        scheme: &str,
        user_data: *mut c_void,
        open: StreamOpenFn,
    ) -> std::result::Result<(), ErrorCode> {
        self.state
            .lock()
            .openers
            .push((scheme.to_string(), user_data as usize, open));
        Ok(())
    }

    unsafe fn create_render_context(
        &self,
        update: RenderUpdateFn,
        ctx: *mut c_void,
    ) -> std::result::Result<(), ErrorCode> {
        self.state.lock().render_update = Some((update, ctx as usize));
        Ok(())
    }

    fn render(&self, frame: &mut FrameTarget) -> std::result::Result<(), ErrorCode> {
        if self.state.lock().fail_draw {
            return Err(ErrorCode::Generic);
        }
        frame.pixels.fill(0x40);
        self.draws.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn report_swap(&self) {
        self.swaps.fetch_add(1, Ordering::SeqCst);
    }

    fn release_callbacks(&self) {
        self.close_stream();
        let mut state = self.state.lock();
        state.render_update = None;
        state.openers.clear();
    }
}

impl Drop for MockCore {
    fn drop(&mut self) {
        self.close_stream();
    }
}

/// Counters and switches shared with a [`MockGpu`]
#[derive(Default)]
pub struct GpuCounters {
    next_id: AtomicU64,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub resets: AtomicUsize,
    pub presents: AtomicUsize,
    pub fail_next_present: AtomicBool,
    pub fail_create: AtomicBool,
}

/// GPU context that presents nowhere
pub struct MockGpu(pub Arc<GpuCounters>);

impl GpuContext for MockGpu {
    fn create_surface(&mut self, region: &SurfaceRegion) -> PlayerResult<SurfaceHandle> {
        if self.0.fail_create.load(Ordering::SeqCst) {
            return Err(PlayerError::SurfaceCreation("mock device unavailable".into()));
        }
        let (w, h) = region.physical_size();
        if w == 0 || h == 0 {
            return Err(PlayerError::SurfaceCreation("zero-size region".into()));
        }
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(SurfaceHandle::from_raw(self.0.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn destroy_surface(&mut self, _surface: SurfaceHandle) {
        self.0.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&mut self) -> PlayerResult<()> {
        self.0.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn make_current(&mut self) -> PlayerResult<()> {
        Ok(())
    }

    fn resize(&mut self, _surface: SurfaceHandle, _width: u32, _height: u32) -> PlayerResult<()> {
        Ok(())
    }

    fn present(&mut self, _surface: SurfaceHandle, _frame: &FrameTarget) -> PlayerResult<()> {
        if self.0.fail_next_present.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::DeviceLost("mock present failure".into()));
        }
        self.0.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A media element over the mock engine and GPU
pub struct Harness {
    pub element: MediaElement,
    pub engine: MockEngine,
    pub gpu: Arc<GpuCounters>,
}

impl Harness {
    pub fn new(auto_play: bool) -> Result<Self> {
        let mut config = Config::default();
        config.player.auto_play = auto_play;
        config.render.frame_interval_ms = 5;
        config.player.property_retry.initial_backoff_ms = 1;
        config.player.property_retry.max_backoff_ms = 4;
        Self::with_config(&config)
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        let engine = MockEngine::new();
        let gpu = Arc::new(GpuCounters::default());
        let handle = EngineHandle::create(
            Box::new(engine.clone()),
            vidpane::engine::RetryPolicy::from(&config.player.property_retry),
        );
        let element = MediaElement::new(handle, Box::new(MockGpu(gpu.clone())), config, || {})?;
        Ok(Self { element, engine, gpu })
    }

    /// Pump until `done` holds or five seconds pass
    pub fn pump_until(&mut self, mut done: impl FnMut(&MediaElement) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            self.element.pump();
            if done(&self.element) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.element.pump_timeout(Duration::from_millis(20));
        }
    }

    /// Pump whatever arrives within `quiet` of the last message
    pub fn settle(&mut self, quiet: Duration) {
        while self.element.pump_timeout(quiet) > 0 {}
    }
}

/// Poll `cond` for up to five seconds
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
