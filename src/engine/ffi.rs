//! C ABI of the native engine (libmpv client, stream-cb and render APIs)
//!
//! Only the subset this crate calls is declared. Layouts follow the
//! engine's public headers.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_double, c_int, c_void};
use std::fmt;

pub type mpv_handle = c_void;
pub type mpv_render_context = c_void;

/// Engine error codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    EventQueueFull = -1,
    NoMem = -2,
    Uninitialized = -3,
    InvalidParameter = -4,
    OptionNotFound = -5,
    OptionFormat = -6,
    OptionError = -7,
    PropertyNotFound = -8,
    PropertyFormat = -9,
    PropertyUnavailable = -10,
    PropertyError = -11,
    Command = -12,
    LoadingFailed = -13,
    AoInitFailed = -14,
    VoInitFailed = -15,
    NothingToPlay = -16,
    UnknownFormat = -17,
    Unsupported = -18,
    NotImplemented = -19,
    Generic = -20,
}

impl ErrorCode {
    /// Map a raw return value; positive values count as success
    pub fn from_raw(code: c_int) -> Self {
        match code {
            c if c >= 0 => ErrorCode::Success,
            -1 => ErrorCode::EventQueueFull,
            -2 => ErrorCode::NoMem,
            -3 => ErrorCode::Uninitialized,
            -4 => ErrorCode::InvalidParameter,
            -5 => ErrorCode::OptionNotFound,
            -6 => ErrorCode::OptionFormat,
            -7 => ErrorCode::OptionError,
            -8 => ErrorCode::PropertyNotFound,
            -9 => ErrorCode::PropertyFormat,
            -10 => ErrorCode::PropertyUnavailable,
            -11 => ErrorCode::PropertyError,
            -12 => ErrorCode::Command,
            -13 => ErrorCode::LoadingFailed,
            -14 => ErrorCode::AoInitFailed,
            -15 => ErrorCode::VoInitFailed,
            -16 => ErrorCode::NothingToPlay,
            -17 => ErrorCode::UnknownFormat,
            -18 => ErrorCode::Unsupported,
            -19 => ErrorCode::NotImplemented,
            _ => ErrorCode::Generic,
        }
    }

    pub fn raw(self) -> c_int {
        self as c_int
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// Convert to `Ok(())` or `Err(self)`
    pub fn check(self) -> Result<(), ErrorCode> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Text as the engine describes it
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::EventQueueFull => "event queue full",
            ErrorCode::NoMem => "memory allocation failed",
            ErrorCode::Uninitialized => "core not initialized",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::OptionNotFound => "option not found",
            ErrorCode::OptionFormat => "unsupported format for accessing option",
            ErrorCode::OptionError => "error setting option",
            ErrorCode::PropertyNotFound => "property not found",
            ErrorCode::PropertyFormat => "unsupported format for accessing property",
            ErrorCode::PropertyUnavailable => "property unavailable",
            ErrorCode::PropertyError => "error accessing property",
            ErrorCode::Command => "error running command",
            ErrorCode::LoadingFailed => "loading failed",
            ErrorCode::AoInitFailed => "audio output initialization failed",
            ErrorCode::VoInitFailed => "video output initialization failed",
            ErrorCode::NothingToPlay => "no audio or video data played",
            ErrorCode::UnknownFormat => "unrecognized file format",
            ErrorCode::Unsupported => "not supported",
            ErrorCode::NotImplemented => "operation not implemented",
            ErrorCode::Generic => "something happened",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.raw())
    }
}

impl std::error::Error for ErrorCode {}

// mpv_format
pub const MPV_FORMAT_NONE: c_int = 0;
pub const MPV_FORMAT_STRING: c_int = 1;
pub const MPV_FORMAT_FLAG: c_int = 3;
pub const MPV_FORMAT_INT64: c_int = 4;
pub const MPV_FORMAT_DOUBLE: c_int = 5;

// mpv_event_id
pub const MPV_EVENT_NONE: c_int = 0;
pub const MPV_EVENT_SHUTDOWN: c_int = 1;
pub const MPV_EVENT_LOG_MESSAGE: c_int = 2;
pub const MPV_EVENT_START_FILE: c_int = 6;
pub const MPV_EVENT_END_FILE: c_int = 7;
pub const MPV_EVENT_FILE_LOADED: c_int = 8;
pub const MPV_EVENT_IDLE: c_int = 11;
pub const MPV_EVENT_PLAYBACK_RESTART: c_int = 21;
pub const MPV_EVENT_PROPERTY_CHANGE: c_int = 22;

// mpv_end_file_reason
pub const MPV_END_FILE_REASON_EOF: c_int = 0;
pub const MPV_END_FILE_REASON_STOP: c_int = 2;
pub const MPV_END_FILE_REASON_QUIT: c_int = 3;
pub const MPV_END_FILE_REASON_ERROR: c_int = 4;
pub const MPV_END_FILE_REASON_REDIRECT: c_int = 5;

// mpv_render_param_type
pub const MPV_RENDER_PARAM_INVALID: c_int = 0;
pub const MPV_RENDER_PARAM_API_TYPE: c_int = 1;
pub const MPV_RENDER_PARAM_SW_SIZE: c_int = 17;
pub const MPV_RENDER_PARAM_SW_FORMAT: c_int = 18;
pub const MPV_RENDER_PARAM_SW_STRIDE: c_int = 19;
pub const MPV_RENDER_PARAM_SW_POINTER: c_int = 20;

pub const MPV_RENDER_API_TYPE_SW: &[u8] = b"sw\0";

#[repr(C)]
pub struct mpv_event {
    pub event_id: c_int,
    pub error: c_int,
    pub reply_userdata: u64,
    pub data: *mut c_void,
}

#[repr(C)]
pub struct mpv_event_property {
    pub name: *const c_char,
    pub format: c_int,
    pub data: *mut c_void,
}

#[repr(C)]
pub struct mpv_event_end_file {
    pub reason: c_int,
    pub error: c_int,
    pub playlist_entry_id: i64,
    pub playlist_insert_id: i64,
    pub playlist_insert_num_entries: c_int,
}

#[repr(C)]
pub struct mpv_event_log_message {
    pub prefix: *const c_char,
    pub level: *const c_char,
    pub text: *const c_char,
    pub log_level: c_int,
}

#[repr(C)]
pub struct mpv_render_param {
    pub type_: c_int,
    pub data: *mut c_void,
}

/// Read up to `nbytes` into `buf`; 0 at end of stream, -1 on error
pub type StreamReadFn = unsafe extern "C" fn(cookie: *mut c_void, buf: *mut c_char, nbytes: u64) -> i64;
/// Absolute seek; returns the new offset or a negative error code
pub type StreamSeekFn = unsafe extern "C" fn(cookie: *mut c_void, offset: i64) -> i64;
/// Total size or a negative error code
pub type StreamSizeFn = unsafe extern "C" fn(cookie: *mut c_void) -> i64;
/// Release the session; called exactly once
pub type StreamCloseFn = unsafe extern "C" fn(cookie: *mut c_void);
pub type StreamCancelFn = unsafe extern "C" fn(cookie: *mut c_void);

/// Filled in by a stream opener
#[repr(C)]
pub struct mpv_stream_cb_info {
    pub cookie: *mut c_void,
    pub read_fn: Option<StreamReadFn>,
    pub seek_fn: Option<StreamSeekFn>,
    pub size_fn: Option<StreamSizeFn>,
    pub close_fn: Option<StreamCloseFn>,
    pub cancel_fn: Option<StreamCancelFn>,
}

/// Engine asks to open `uri` under a registered scheme
pub type StreamOpenFn =
    unsafe extern "C" fn(user_data: *mut c_void, uri: *mut c_char, info: *mut mpv_stream_cb_info) -> c_int;

/// Frame-ready notification from the render API
pub type RenderUpdateFn = unsafe extern "C" fn(ctx: *mut c_void);

pub type MpvCreateFn = unsafe extern "C" fn() -> *mut mpv_handle;
pub type MpvInitializeFn = unsafe extern "C" fn(ctx: *mut mpv_handle) -> c_int;
pub type MpvTerminateDestroyFn = unsafe extern "C" fn(ctx: *mut mpv_handle);
pub type MpvSetOptionStringFn =
    unsafe extern "C" fn(ctx: *mut mpv_handle, name: *const c_char, data: *const c_char) -> c_int;
pub type MpvCommandFn = unsafe extern "C" fn(ctx: *mut mpv_handle, args: *mut *const c_char) -> c_int;
pub type MpvGetPropertyFn =
    unsafe extern "C" fn(ctx: *mut mpv_handle, name: *const c_char, format: c_int, data: *mut c_void) -> c_int;
pub type MpvSetPropertyStringFn =
    unsafe extern "C" fn(ctx: *mut mpv_handle, name: *const c_char, data: *const c_char) -> c_int;
pub type MpvObservePropertyFn =
    unsafe extern "C" fn(ctx: *mut mpv_handle, reply_userdata: u64, name: *const c_char, format: c_int) -> c_int;
pub type MpvRequestLogMessagesFn = unsafe extern "C" fn(ctx: *mut mpv_handle, min_level: *const c_char) -> c_int;
pub type MpvWaitEventFn = unsafe extern "C" fn(ctx: *mut mpv_handle, timeout: c_double) -> *mut mpv_event;
pub type MpvWakeupFn = unsafe extern "C" fn(ctx: *mut mpv_handle);
pub type MpvFreeFn = unsafe extern "C" fn(data: *mut c_void);
pub type MpvStreamCbAddRoFn = unsafe extern "C" fn(
    ctx: *mut mpv_handle,
    protocol: *const c_char,
    user_data: *mut c_void,
    open_fn: StreamOpenFn,
) -> c_int;
pub type MpvRenderContextCreateFn = unsafe extern "C" fn(
    res: *mut *mut mpv_render_context,
    mpv: *mut mpv_handle,
    params: *mut mpv_render_param,
) -> c_int;
pub type MpvRenderContextSetUpdateCallbackFn =
    unsafe extern "C" fn(ctx: *mut mpv_render_context, callback: Option<RenderUpdateFn>, callback_ctx: *mut c_void);
pub type MpvRenderContextRenderFn =
    unsafe extern "C" fn(ctx: *mut mpv_render_context, params: *mut mpv_render_param) -> c_int;
pub type MpvRenderContextReportSwapFn = unsafe extern "C" fn(ctx: *mut mpv_render_context);
pub type MpvRenderContextFreeFn = unsafe extern "C" fn(ctx: *mut mpv_render_context);
