//! Engine handle: lifetime and command surface of one native engine instance
//!
//! The handle is the sole owner of the native instance and of everything the
//! engine holds raw pointers to (stream openers, the frame-ready notifier).
//! On drop the engine lets go of those pointers before they are freed.

pub mod ffi;
pub mod library;
mod native;
mod retry;

pub use ffi::ErrorCode;
pub use library::{LibMpv, MpvLibrary};
pub use native::{EndReason, EngineEvent, NativeEngine, PropertyFormat, PropertyValue};
pub use retry::{Exhausted, RetryPolicy};

use crate::dispatch::{UiDispatcher, UiMessage};
use crate::render::{frame_ready_trampoline, FrameNotifier, FrameSource};
use crate::stream::bridge::open_trampoline;
use crate::stream::StreamOpener;
use crate::surface::FrameTarget;
use crate::utils::config::EngineConfig;
use crate::utils::error::{PlayerError, Result};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the event pump blocks before rechecking its stop flag
const EVENT_WAIT: Duration = Duration::from_millis(250);

struct EventPump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// One native engine instance and the callbacks it holds
pub struct EngineHandle {
    // Shared only with the event pump thread, which is joined on drop.
    // Declared first: destroyed before the keep-alive state below.
    native: Arc<dyn NativeEngine>,
    initialized: AtomicBool,
    options: Mutex<Vec<(String, String)>>,
    loaded_media: Mutex<Option<String>>,
    pump: Mutex<Option<EventPump>>,
    openers: Mutex<Vec<Box<StreamOpener>>>,
    notifier: Mutex<Option<Box<FrameNotifier>>>,
    retry: RetryPolicy,
}

impl EngineHandle {
    /// Take ownership of a freshly created, uninitialized native instance
    pub fn create(native: Box<dyn NativeEngine>, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            native: Arc::from(native),
            initialized: AtomicBool::new(false),
            options: Mutex::new(Vec::new()),
            loaded_media: Mutex::new(None),
            pump: Mutex::new(None),
            openers: Mutex::new(Vec::new()),
            notifier: Mutex::new(None),
            retry,
        })
    }

    /// Load the engine library and create an instance from it
    pub fn open(config: &EngineConfig, retry: RetryPolicy) -> Result<Arc<Self>> {
        let lib = MpvLibrary::shared(config.library_path.as_deref())?;
        let native = LibMpv::create(lib)?;
        Ok(Self::create(Box::new(native), retry))
    }

    /// Start the engine; exactly once, before any command
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(PlayerError::command_error("engine already initialized"));
        }
        self.native
            .initialize()
            .map_err(|code| PlayerError::EngineCommand(format!("initialize: {}", code)))?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("Engine initialized with {} option(s)", self.options.lock().len());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PlayerError::EngineNotInitialized)
        }
    }

    /// Set an engine option; takes effect for options read at startup only
    /// if called before [`EngineHandle::initialize`]
    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.native
            .set_option(name, value)
            .map_err(|code| PlayerError::EngineCommand(format!("option {}={}: {}", name, value, code)))?;
        debug!("Engine option {}={}", name, value);
        self.options.lock().push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Options applied so far, in order
    pub fn options(&self) -> Vec<(String, String)> {
        self.options.lock().clone()
    }

    /// Queue a command; its effects arrive later as events
    ///
    /// Only immediate validation failures are reported here.
    pub fn execute_command(&self, args: &[&str]) -> Result<()> {
        self.require_initialized()?;
        let Some(&name) = args.first() else {
            return Err(PlayerError::InvalidInput("empty command".to_string()));
        };
        self.native
            .command(args)
            .map_err(|code| PlayerError::EngineCommand(format!("{}: {}", args.join(" "), code)))?;
        trace!("Engine command: {:?}", args);

        match name {
            "loadfile" => *self.loaded_media.lock() = args.get(1).map(|s| s.to_string()),
            "stop" => *self.loaded_media.lock() = None,
            _ => {}
        }
        Ok(())
    }

    /// Read a property; `None` while the engine cannot provide it yet
    pub fn get_property(&self, name: &str) -> Result<Option<String>> {
        self.require_initialized()?;
        match self.native.get_property(name) {
            Ok(value) => Ok(Some(value)),
            Err(ErrorCode::PropertyUnavailable) => Ok(None),
            Err(code) => Err(PlayerError::EngineCommand(format!("get {}: {}", name, code))),
        }
    }

    /// Poll [`EngineHandle::get_property`] with bounded backoff
    pub fn get_property_with_retry(&self, name: &str) -> Result<String> {
        let outcome = self.retry.run(|attempt| match self.get_property(name) {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                trace!("Property {} unavailable (attempt {})", name, attempt);
                None
            }
            Err(e) => Some(Err(e)),
        });
        match outcome {
            Ok(result) => result,
            Err(Exhausted { attempts }) => Err(PlayerError::EngineCommand(format!(
                "property {} unavailable after {} attempts",
                name, attempts
            ))),
        }
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<()> {
        self.require_initialized()?;
        self.native
            .set_property(name, value)
            .map_err(|code| PlayerError::EngineCommand(format!("set {}={}: {}", name, value, code)))
    }

    /// Subscribe to change events for `name`
    pub fn observe_property(&self, name: &str, format: PropertyFormat) -> Result<()> {
        self.require_initialized()?;
        self.native
            .observe_property(name, format)
            .map_err(|code| PlayerError::EngineCommand(format!("observe {}: {}", name, code)))
    }

    /// Route engine opens for `opener`'s scheme through the stream bridge
    ///
    /// The opener lives until this handle is dropped and the engine has
    /// released it.
    pub fn register_stream_opener(&self, opener: StreamOpener) -> Result<()> {
        let opener = Box::new(opener);
        let user_data = &*opener as *const StreamOpener as *mut c_void;
        unsafe { self.native.add_stream_protocol(opener.scheme(), user_data, open_trampoline) }
            .map_err(|code| PlayerError::EngineCommand(format!("register {}: {}", opener.scheme(), code)))?;
        info!("Stream opener registered for {}://", opener.scheme());
        self.openers.lock().push(opener);
        Ok(())
    }

    /// Create the render sub-context with `notifier` as its frame-ready callback
    ///
    /// Only one callback may be installed for the life of the instance; the
    /// engine keeps its pointer until the handle is dropped.
    pub fn register_draw_callback(&self, notifier: FrameNotifier) -> Result<()> {
        self.require_initialized()?;
        let mut slot = self.notifier.lock();
        if slot.is_some() {
            return Err(PlayerError::CallbackLifetime(
                "frame-ready callback is already installed".to_string(),
            ));
        }
        let notifier = Box::new(notifier);
        let ctx = &*notifier as *const FrameNotifier as *mut c_void;
        unsafe { self.native.create_render_context(frame_ready_trampoline, ctx) }
            .map_err(|code| PlayerError::EngineCommand(format!("render context: {}", code)))?;
        *slot = Some(notifier);
        debug!("Frame-ready callback installed");
        Ok(())
    }

    /// Render the current frame into `frame`
    pub fn draw(&self, frame: &mut FrameTarget) -> Result<()> {
        self.native
            .render(frame)
            .map_err(|code| PlayerError::EngineCommand(format!("draw {}x{}: {}", frame.width, frame.height, code)))
    }

    /// Tell the engine the drawn frame reached the screen
    pub fn report_frame_presented(&self) {
        self.native.report_swap();
    }

    /// Media passed to the last `loadfile`, until stopped
    pub fn loaded_media(&self) -> Option<String> {
        self.loaded_media.lock().clone()
    }

    /// Forward engine events to `dispatcher` from a dedicated thread
    pub fn start_event_pump(&self, dispatcher: UiDispatcher) -> Result<()> {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return Ok(());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let native = self.native.clone();
        let handle = thread::Builder::new()
            .name("engine-events".to_string())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    let Some(event) = native.wait_event(EVENT_WAIT) else {
                        continue;
                    };
                    let shutdown = event == EngineEvent::Shutdown;
                    if !dispatcher.post(UiMessage::Engine(event)) || shutdown {
                        break;
                    }
                }
                debug!("Engine event pump exiting");
            })
            .map_err(|e| crate::internal_error!("failed to spawn event pump: {}", e))?;
        *pump = Some(EventPump { stop, handle });
        Ok(())
    }

    fn stop_event_pump(&self) {
        let Some(pump) = self.pump.lock().take() else {
            return;
        };
        pump.stop.store(true, Ordering::SeqCst);
        self.native.wakeup();
        if pump.handle.join().is_err() {
            warn!("Engine event pump panicked");
        }
    }
}

impl FrameSource for EngineHandle {
    fn draw(&self, frame: &mut FrameTarget) -> Result<()> {
        EngineHandle::draw(self, frame)
    }

    fn report_frame_presented(&self) {
        EngineHandle::report_frame_presented(self)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop_event_pump();
        self.native.release_callbacks();
        // Nothing native points at these any more
        self.notifier.get_mut().take();
        let openers = std::mem::take(self.openers.get_mut());
        debug!("Released frame notifier and {} stream opener(s)", openers.len());
        drop(openers);
        info!("Engine handle released");
    }
}
