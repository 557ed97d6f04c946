//! `extern "C"` callbacks the engine invokes for staged streams
//!
//! The cookie is a `Box<StreamSession>` turned into a raw pointer by
//! [`open_trampoline`] and reclaimed by [`close_trampoline`], so the session
//! lives exactly as long as the engine holds it. Errors never cross the
//! boundary as panics; they become the engine's error sentinels.

use super::{StreamOpener, StreamSession};
use crate::engine::ffi::{mpv_stream_cb_info, ErrorCode};
use crate::utils::ffi::ffi_guard;
use log::{trace, warn};
use std::ffi::{c_char, c_int, c_void, CStr};

/// Engine open request for a registered scheme
///
/// # Safety
///
/// `user_data` must point to a live [`StreamOpener`]; `uri` must be a valid
/// C string and `info` writable, as the engine guarantees.
pub unsafe extern "C" fn open_trampoline(
    user_data: *mut c_void,
    uri: *mut c_char,
    info: *mut mpv_stream_cb_info,
) -> c_int {
    ffi_guard(ErrorCode::Generic.raw(), || {
        if user_data.is_null() || uri.is_null() || info.is_null() {
            return ErrorCode::InvalidParameter.raw();
        }
        let opener = &*(user_data as *const StreamOpener);
        let uri = CStr::from_ptr(uri).to_string_lossy();

        let Some(session) = opener.open(&uri) else {
            warn!("No staged stream for {}", uri);
            return ErrorCode::LoadingFailed.raw();
        };
        trace!("Opening stream session '{}' for {}", session.token(), uri);

        let info = &mut *info;
        info.cookie = Box::into_raw(Box::new(session)) as *mut c_void;
        info.read_fn = Some(read_trampoline);
        info.seek_fn = Some(seek_trampoline);
        info.size_fn = Some(size_trampoline);
        info.close_fn = Some(close_trampoline);
        info.cancel_fn = None;
        ErrorCode::Success.raw()
    })
}

/// # Safety
///
/// `cookie` must come from [`open_trampoline`] and not yet be closed; `buf`
/// must be writable for `nbytes` bytes.
pub unsafe extern "C" fn read_trampoline(cookie: *mut c_void, buf: *mut c_char, nbytes: u64) -> i64 {
    ffi_guard(-1, || {
        if cookie.is_null() || buf.is_null() {
            return -1;
        }
        let session = &mut *(cookie as *mut StreamSession);
        let len = usize::try_from(nbytes).unwrap_or(usize::MAX);
        let buf = std::slice::from_raw_parts_mut(buf as *mut u8, len);
        match session.read(buf) {
            Ok(n) => n as i64,
            Err(e) => {
                warn!("Stream read failed for '{}': {}", session.token(), e);
                -1
            }
        }
    })
}

/// # Safety
///
/// `cookie` must come from [`open_trampoline`] and not yet be closed.
pub unsafe extern "C" fn seek_trampoline(cookie: *mut c_void, offset: i64) -> i64 {
    let generic = ErrorCode::Generic.raw() as i64;
    ffi_guard(generic, || {
        if cookie.is_null() {
            return generic;
        }
        let session = &mut *(cookie as *mut StreamSession);
        match session.seek(offset) {
            Ok(position) => i64::try_from(position).unwrap_or(generic),
            Err(e) => {
                warn!("Stream seek to {} failed for '{}': {}", offset, session.token(), e);
                generic
            }
        }
    })
}

/// # Safety
///
/// `cookie` must come from [`open_trampoline`] and not yet be closed.
pub unsafe extern "C" fn size_trampoline(cookie: *mut c_void) -> i64 {
    let unsupported = ErrorCode::Unsupported.raw() as i64;
    ffi_guard(unsupported, || {
        if cookie.is_null() {
            return unsupported;
        }
        let session = &mut *(cookie as *mut StreamSession);
        match session.size() {
            Ok(size) => i64::try_from(size).unwrap_or(unsupported),
            Err(e) => {
                warn!("Stream size unavailable for '{}': {}", session.token(), e);
                unsupported
            }
        }
    })
}

/// # Safety
///
/// `cookie` must come from [`open_trampoline`]; it is invalid afterwards.
pub unsafe extern "C" fn close_trampoline(cookie: *mut c_void) {
    ffi_guard((), || {
        if !cookie.is_null() {
            drop(Box::from_raw(cookie as *mut StreamSession));
        }
    })
}
