//! Runtime binding to the native engine library
//!
//! The library is opened with libloading on first use and cached for the
//! life of the process; [`LibMpv`] wraps one engine instance created from it.

use super::ffi::*;
use super::native::{EndReason, EngineEvent, NativeEngine, PropertyFormat, PropertyValue};
use crate::surface::FrameTarget;
use crate::utils::error::{PlayerError, Result, ResultExt};
use libloading::Library;
use log::{debug, info, log, Level};
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Resolved entry points; `_lib` keeps them mapped
pub struct MpvLibrary {
    _lib: Library,
    path: PathBuf,
    create: MpvCreateFn,
    initialize: MpvInitializeFn,
    terminate_destroy: MpvTerminateDestroyFn,
    set_option_string: MpvSetOptionStringFn,
    command: MpvCommandFn,
    get_property: MpvGetPropertyFn,
    set_property_string: MpvSetPropertyStringFn,
    observe_property: MpvObservePropertyFn,
    request_log_messages: MpvRequestLogMessagesFn,
    wait_event: MpvWaitEventFn,
    wakeup: MpvWakeupFn,
    free: MpvFreeFn,
    stream_cb_add_ro: MpvStreamCbAddRoFn,
    render_context_create: MpvRenderContextCreateFn,
    render_context_set_update_callback: MpvRenderContextSetUpdateCallbackFn,
    render_context_render: MpvRenderContextRenderFn,
    render_context_report_swap: MpvRenderContextReportSwapFn,
    render_context_free: MpvRenderContextFreeFn,
}

static MPV_LIB: OnceCell<Arc<MpvLibrary>> = OnceCell::new();

impl MpvLibrary {
    unsafe fn load(path: &Path) -> Result<Self> {
        let lib = Library::new(path).engine_err("load engine library")?;
        macro_rules! sym {
            ($ty:ty, $name:literal) => {{
                let symbol: libloading::Symbol<$ty> = lib
                    .get(concat!($name, "\0").as_bytes())
                    .engine_err(concat!("load ", $name))?;
                let value: $ty = *symbol;
                value
            }};
        }
        Ok(MpvLibrary {
            path: path.to_path_buf(),
            create: sym!(MpvCreateFn, "mpv_create"),
            initialize: sym!(MpvInitializeFn, "mpv_initialize"),
            terminate_destroy: sym!(MpvTerminateDestroyFn, "mpv_terminate_destroy"),
            set_option_string: sym!(MpvSetOptionStringFn, "mpv_set_option_string"),
            command: sym!(MpvCommandFn, "mpv_command"),
            get_property: sym!(MpvGetPropertyFn, "mpv_get_property"),
            set_property_string: sym!(MpvSetPropertyStringFn, "mpv_set_property_string"),
            observe_property: sym!(MpvObservePropertyFn, "mpv_observe_property"),
            request_log_messages: sym!(MpvRequestLogMessagesFn, "mpv_request_log_messages"),
            wait_event: sym!(MpvWaitEventFn, "mpv_wait_event"),
            wakeup: sym!(MpvWakeupFn, "mpv_wakeup"),
            free: sym!(MpvFreeFn, "mpv_free"),
            stream_cb_add_ro: sym!(MpvStreamCbAddRoFn, "mpv_stream_cb_add_ro"),
            render_context_create: sym!(MpvRenderContextCreateFn, "mpv_render_context_create"),
            render_context_set_update_callback: sym!(MpvRenderContextSetUpdateCallbackFn, "mpv_render_context_set_update_callback"),
            render_context_render: sym!(MpvRenderContextRenderFn, "mpv_render_context_render"),
            render_context_report_swap: sym!(MpvRenderContextReportSwapFn, "mpv_render_context_report_swap"),
            render_context_free: sym!(MpvRenderContextFreeFn, "mpv_render_context_free"),
            _lib: lib,
        })
    }

    /// Load (once per process) from `explicit` or the default locations
    pub fn shared(explicit: Option<&Path>) -> Result<Arc<MpvLibrary>> {
        MPV_LIB
            .get_or_try_init(|| {
                let mut last_error = None;
                for candidate in library_candidates(explicit) {
                    match unsafe { MpvLibrary::load(&candidate) } {
                        Ok(lib) => {
                            info!("Engine library loaded from {}", candidate.display());
                            return Ok(Arc::new(lib));
                        }
                        Err(e) => {
                            debug!("Engine library candidate {} rejected: {}", candidate.display(), e);
                            last_error = Some(e);
                        }
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    PlayerError::Engine("no engine library candidates".to_string())
                }))
            })
            .cloned()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn candidate_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libmpv-2.dll", "mpv-2.dll", "mpv-1.dll"]
    } else if cfg!(target_os = "macos") {
        &["libmpv.2.dylib", "libmpv.dylib"]
    } else {
        &["libmpv.so.2", "libmpv.so.1", "libmpv.so"]
    }
}

/// Explicit path first, then the build-time library dir, then bare names
fn library_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(dir) = option_env!("VIDPANE_MPV_LIBDIR") {
        for name in candidate_names() {
            candidates.push(Path::new(dir).join(name));
        }
    }
    for name in candidate_names() {
        candidates.push(PathBuf::from(name));
    }
    candidates
}

fn log_level_for(engine_level: c_int) -> Level {
    match engine_level {
        l if l <= 20 => Level::Error,
        l if l <= 30 => Level::Warn,
        l if l <= 40 => Level::Info,
        l if l <= 50 => Level::Debug,
        _ => Level::Trace,
    }
}

fn end_reason(raw: c_int) -> EndReason {
    match raw {
        MPV_END_FILE_REASON_EOF => EndReason::Eof,
        MPV_END_FILE_REASON_STOP => EndReason::Stop,
        MPV_END_FILE_REASON_QUIT => EndReason::Quit,
        MPV_END_FILE_REASON_REDIRECT => EndReason::Redirect,
        _ => EndReason::Error,
    }
}

unsafe fn cstr_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// One native engine instance
pub struct LibMpv {
    lib: Arc<MpvLibrary>,
    handle: *mut mpv_handle,
    render: AtomicPtr<mpv_render_context>,
}

// The client API is thread-safe; render calls are serialized by the caller.
unsafe impl Send for LibMpv {}
unsafe impl Sync for LibMpv {}

impl LibMpv {
    /// Create an uninitialized instance
    pub fn create(lib: Arc<MpvLibrary>) -> Result<Self> {
        let handle = unsafe { (lib.create)() };
        if handle.is_null() {
            return Err(PlayerError::Engine("mpv_create returned null".to_string()));
        }

        let level = if log::max_level() >= log::LevelFilter::Debug { "v" } else { "info" };
        let level = CString::new(level)?;
        unsafe { (lib.request_log_messages)(handle, level.as_ptr()) };

        Ok(Self {
            lib,
            handle,
            render: AtomicPtr::new(ptr::null_mut()),
        })
    }

    fn forward_log(message: &mpv_event_log_message) {
        let prefix = unsafe { cstr_lossy(message.prefix) };
        let text = unsafe { cstr_lossy(message.text) };
        log!(target: "mpv", log_level_for(message.log_level), "[{}] {}", prefix, text.trim_end());
    }

    unsafe fn property_value(prop: &mpv_event_property) -> PropertyValue {
        if prop.data.is_null() {
            return PropertyValue::Unavailable;
        }
        match prop.format {
            MPV_FORMAT_FLAG => PropertyValue::Flag(*(prop.data as *const c_int) != 0),
            MPV_FORMAT_DOUBLE => PropertyValue::Double(*(prop.data as *const f64)),
            MPV_FORMAT_INT64 => PropertyValue::Int(*(prop.data as *const i64)),
            MPV_FORMAT_STRING => PropertyValue::Text(cstr_lossy(*(prop.data as *const *const c_char))),
            _ => PropertyValue::Unavailable,
        }
    }
}

impl NativeEngine for LibMpv {
    fn initialize(&self) -> std::result::Result<(), ErrorCode> {
        ErrorCode::from_raw(unsafe { (self.lib.initialize)(self.handle) }).check()
    }

    fn set_option(&self, name: &str, value: &str) -> std::result::Result<(), ErrorCode> {
        let name = CString::new(name).map_err(|_| ErrorCode::InvalidParameter)?;
        let value = CString::new(value).map_err(|_| ErrorCode::InvalidParameter)?;
        ErrorCode::from_raw(unsafe {
            (self.lib.set_option_string)(self.handle, name.as_ptr(), value.as_ptr())
        })
        .check()
    }

    fn command(&self, args: &[&str]) -> std::result::Result<(), ErrorCode> {
        let owned = args
            .iter()
            .map(|arg| CString::new(*arg))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ErrorCode::InvalidParameter)?;
        let mut argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());
        ErrorCode::from_raw(unsafe { (self.lib.command)(self.handle, argv.as_mut_ptr()) }).check()
    }

    fn get_property(&self, name: &str) -> std::result::Result<String, ErrorCode> {
        let name = CString::new(name).map_err(|_| ErrorCode::InvalidParameter)?;
        let mut out: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            (self.lib.get_property)(
                self.handle,
                name.as_ptr(),
                MPV_FORMAT_STRING,
                &mut out as *mut *mut c_char as *mut c_void,
            )
        };
        ErrorCode::from_raw(rc).check()?;
        if out.is_null() {
            return Err(ErrorCode::PropertyUnavailable);
        }
        let value = unsafe { cstr_lossy(out) };
        unsafe { (self.lib.free)(out as *mut c_void) };
        Ok(value)
    }

    fn set_property(&self, name: &str, value: &str) -> std::result::Result<(), ErrorCode> {
        let name = CString::new(name).map_err(|_| ErrorCode::InvalidParameter)?;
        let value = CString::new(value).map_err(|_| ErrorCode::InvalidParameter)?;
        ErrorCode::from_raw(unsafe {
            (self.lib.set_property_string)(self.handle, name.as_ptr(), value.as_ptr())
        })
        .check()
    }

    fn observe_property(&self, name: &str, format: PropertyFormat) -> std::result::Result<(), ErrorCode> {
        let name = CString::new(name).map_err(|_| ErrorCode::InvalidParameter)?;
        let format = match format {
            PropertyFormat::Flag => MPV_FORMAT_FLAG,
            PropertyFormat::Double => MPV_FORMAT_DOUBLE,
            PropertyFormat::Int => MPV_FORMAT_INT64,
            PropertyFormat::Text => MPV_FORMAT_STRING,
        };
        ErrorCode::from_raw(unsafe { (self.lib.observe_property)(self.handle, 0, name.as_ptr(), format) })
            .check()
    }

    fn wait_event(&self, timeout: Duration) -> Option<EngineEvent> {
        let event = unsafe { (self.lib.wait_event)(self.handle, timeout.as_secs_f64()) };
        if event.is_null() {
            return None;
        }
        let event = unsafe { &*event };
        match event.event_id {
            MPV_EVENT_LOG_MESSAGE if !event.data.is_null() => {
                Self::forward_log(unsafe { &*(event.data as *const mpv_event_log_message) });
                None
            }
            MPV_EVENT_PROPERTY_CHANGE if !event.data.is_null() => {
                let prop = unsafe { &*(event.data as *const mpv_event_property) };
                Some(EngineEvent::PropertyChange {
                    name: unsafe { cstr_lossy(prop.name) },
                    value: unsafe { Self::property_value(prop) },
                })
            }
            MPV_EVENT_END_FILE if !event.data.is_null() => {
                let end = unsafe { &*(event.data as *const mpv_event_end_file) };
                Some(EngineEvent::EndFile {
                    reason: end_reason(end.reason),
                    error: ErrorCode::from_raw(end.error),
                })
            }
            MPV_EVENT_START_FILE => Some(EngineEvent::StartFile),
            MPV_EVENT_FILE_LOADED => Some(EngineEvent::FileLoaded),
            MPV_EVENT_PLAYBACK_RESTART => Some(EngineEvent::PlaybackRestart),
            MPV_EVENT_IDLE => Some(EngineEvent::Idle),
            MPV_EVENT_SHUTDOWN => Some(EngineEvent::Shutdown),
            MPV_EVENT_NONE => None,
            other => {
                debug!("Ignoring engine event {}", other);
                None
            }
        }
    }

    fn wakeup(&self) {
        unsafe { (self.lib.wakeup)(self.handle) }
    }

    unsafe fn add_stream_protocol(
        &self,
        scheme: &str,
        user_data: *mut c_void,
        open: StreamOpenFn,
    ) -> std::result::Result<(), ErrorCode> {
        let scheme = CString::new(scheme).map_err(|_| ErrorCode::InvalidParameter)?;
        ErrorCode::from_raw((self.lib.stream_cb_add_ro)(self.handle, scheme.as_ptr(), user_data, open)).check()
    }

    unsafe fn create_render_context(
        &self,
        update: RenderUpdateFn,
        ctx: *mut c_void,
    ) -> std::result::Result<(), ErrorCode> {
        if !self.render.load(Ordering::SeqCst).is_null() {
            return Err(ErrorCode::InvalidParameter);
        }
        let mut params = [
            mpv_render_param {
                type_: MPV_RENDER_PARAM_API_TYPE,
                data: MPV_RENDER_API_TYPE_SW.as_ptr() as *mut c_void,
            },
            mpv_render_param {
                type_: MPV_RENDER_PARAM_INVALID,
                data: ptr::null_mut(),
            },
        ];
        let mut render: *mut mpv_render_context = ptr::null_mut();
        ErrorCode::from_raw((self.lib.render_context_create)(&mut render, self.handle, params.as_mut_ptr()))
            .check()?;
        (self.lib.render_context_set_update_callback)(render, Some(update), ctx);
        self.render.store(render, Ordering::SeqCst);
        Ok(())
    }

    fn render(&self, frame: &mut FrameTarget) -> std::result::Result<(), ErrorCode> {
        let render = self.render.load(Ordering::SeqCst);
        if render.is_null() {
            return Err(ErrorCode::Uninitialized);
        }
        if frame.is_empty() {
            return Ok(());
        }

        let mut size: [c_int; 2] = [frame.width as c_int, frame.height as c_int];
        let format = match frame.format {
            crate::surface::PixelFormat::Rgb0 => b"rgb0\0".as_ptr(),
            crate::surface::PixelFormat::Bgr0 => b"bgr0\0".as_ptr(),
        };
        let mut stride: usize = frame.stride;
        let mut params = [
            mpv_render_param {
                type_: MPV_RENDER_PARAM_SW_SIZE,
                data: size.as_mut_ptr() as *mut c_void,
            },
            mpv_render_param {
                type_: MPV_RENDER_PARAM_SW_FORMAT,
                data: format as *mut c_void,
            },
            mpv_render_param {
                type_: MPV_RENDER_PARAM_SW_STRIDE,
                data: &mut stride as *mut usize as *mut c_void,
            },
            mpv_render_param {
                type_: MPV_RENDER_PARAM_SW_POINTER,
                data: frame.pixels.as_mut_ptr() as *mut c_void,
            },
            mpv_render_param {
                type_: MPV_RENDER_PARAM_INVALID,
                data: ptr::null_mut(),
            },
        ];
        ErrorCode::from_raw(unsafe { (self.lib.render_context_render)(render, params.as_mut_ptr()) }).check()
    }

    fn report_swap(&self) {
        let render = self.render.load(Ordering::SeqCst);
        if !render.is_null() {
            unsafe { (self.lib.render_context_report_swap)(render) }
        }
    }

    fn release_callbacks(&self) {
        // Freeing the render context drops the update callback with it
        let render = self.render.swap(ptr::null_mut(), Ordering::SeqCst);
        if !render.is_null() {
            unsafe { (self.lib.render_context_free)(render) };
        }
        // Stream openers run only from loadfile; close whatever is open so
        // no session outlives this call
        if let Err(code) = self.command(&["stop"]) {
            debug!("Stop on release: {}", code);
        }
        debug!("Engine callbacks released");
    }
}

impl Drop for LibMpv {
    fn drop(&mut self) {
        // The render context must go before the core it was created from
        let render = self.render.swap(ptr::null_mut(), Ordering::SeqCst);
        unsafe {
            if !render.is_null() {
                (self.lib.render_context_free)(render);
            }
            (self.lib.terminate_destroy)(self.handle);
        }
        debug!("Engine instance destroyed");
    }
}
