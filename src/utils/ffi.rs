//! Panic containment for `extern "C"` entry points.
//!
//! Every function the native engine calls back into is wrapped in
//! [`ffi_guard`] so a Rust panic never unwinds across the C ABI.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, returning `fallback` if it panics.
///
/// Shared state reached from callbacks uses `parking_lot` locks, which do
/// not poison, so asserting unwind safety here leaves them usable.
pub fn ffi_guard<T, F>(fallback: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_panic) => {
            log::error!("caught panic at native callback boundary");
            fallback
        }
    }
}
