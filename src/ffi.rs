//! FFI bindings for Study Pulse
//!
//! This module provides C-compatible functions for calling the engine from a
//! host app. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `pulse_free_string`.
//!
//! Timestamps cross the boundary as RFC 3339 strings. Passing NULL for a `now`
//! argument uses the current time.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::PulseConfig;
use crate::processor::{events_to_report, InsightProcessor};
use crate::session::SessionSignal;
use crate::store::{FileStore, MemoryStore};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Like `cstr_to_string`, recording an error naming `arg` on failure
unsafe fn required_arg(ptr: *const c_char, arg: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {arg} string pointer"));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse an optional RFC 3339 timestamp; NULL means now
unsafe fn parse_now(ptr: *const c_char) -> Option<DateTime<FixedOffset>> {
    if ptr.is_null() {
        return Some(Utc::now().into());
    }
    let raw = required_arg(ptr, "now")?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(now) => Some(now),
        Err(e) => {
            set_last_error(&format!("Invalid now timestamp {raw:?}: {e}"));
            None
        }
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    let offset = FixedOffset::east_opt(minutes.saturating_mul(60));
    if offset.is_none() {
        set_last_error(&format!("UTC offset out of range: {minutes} minutes"));
    }
    offset
}

// ============================================================================
// Stateless API
// ============================================================================

/// Build a report for `user_id` from a JSON array of events.
///
/// The learner's local calendar follows the offset carried by `now`.
///
/// # Safety
/// - `events_json` and `user_id` must be valid null-terminated C strings.
/// - `now` must be a valid null-terminated RFC 3339 string, or NULL.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_events_to_report(
    events_json: *const c_char,
    user_id: *const c_char,
    now: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(json_str) = required_arg(events_json, "JSON") else {
        return ptr::null_mut();
    };
    let Some(user_str) = required_arg(user_id, "user_id") else {
        return ptr::null_mut();
    };
    let Some(now) = parse_now(now) else {
        return ptr::null_mut();
    };

    match events_to_report(&json_str, &user_str, now) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to an InsightProcessor
pub struct PulseProcessorHandle {
    processor: InsightProcessor,
}

fn into_handle(processor: InsightProcessor) -> *mut PulseProcessorHandle {
    Box::into_raw(Box::new(PulseProcessorHandle { processor }))
}

/// Create an in-memory processor.
///
/// # Safety
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `pulse_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_new(
    max_events_per_user: i32,
    utc_offset_minutes: i32,
) -> *mut PulseProcessorHandle {
    clear_last_error();

    let mut config = PulseConfig::default();
    if max_events_per_user > 0 {
        config.max_events_per_user = max_events_per_user as usize;
    }
    config.utc_offset_minutes = utc_offset_minutes;

    match InsightProcessor::with_config(Arc::new(MemoryStore::new()), &config) {
        Ok(processor) => into_handle(processor),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Create a processor persisting to `data_dir`.
///
/// # Safety
/// - `data_dir` must be a valid null-terminated C string.
/// - Must be freed with `pulse_processor_free`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_open(
    data_dir: *const c_char,
    utc_offset_minutes: i32,
) -> *mut PulseProcessorHandle {
    clear_last_error();

    let Some(dir) = required_arg(data_dir, "data_dir") else {
        return ptr::null_mut();
    };
    let Some(offset) = offset_from_minutes(utc_offset_minutes) else {
        return ptr::null_mut();
    };

    match FileStore::open(&dir) {
        Ok(store) => {
            into_handle(InsightProcessor::new(Arc::new(store)).with_utc_offset(offset))
        }
        Err(e) => {
            set_last_error(&format!("Failed to open data directory {dir}: {e}"));
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new` or
///   `pulse_processor_open`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_free(processor: *mut PulseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Record one event given as JSON and return the stored event as JSON.
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_track_event(
    processor: *mut PulseProcessorHandle,
    event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let Some(json_str) = required_arg(event_json, "JSON") else {
        return ptr::null_mut();
    };

    let stored = handle
        .processor
        .track_event_json(&json_str)
        .and_then(|event| serde_json::to_string(&event).map_err(Into::into));
    match stored {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Forward a lifecycle signal (`focus_gained`, `focus_lost`, `shutdown`).
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `user_id` and `signal` must be valid null-terminated C strings.
/// - `now` must be a valid null-terminated RFC 3339 string, or NULL.
/// - Returns 1 if a session event was recorded, 0 if the signal was a no-op,
///   -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_signal(
    processor: *mut PulseProcessorHandle,
    user_id: *const c_char,
    signal: *const c_char,
    now: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &*processor;

    let Some(user_str) = required_arg(user_id, "user_id") else {
        return -1;
    };
    let Some(signal_str) = required_arg(signal, "signal") else {
        return -1;
    };
    let Some(now) = parse_now(now) else {
        return -1;
    };

    let signal: SessionSignal = match serde_json::from_value(serde_json::Value::String(signal_str))
    {
        Ok(signal) => signal,
        Err(e) => {
            set_last_error(&format!("Unknown session signal: {e}"));
            return -1;
        }
    };

    match handle
        .processor
        .handle_signal(&user_str, signal, now.with_timezone(&Utc))
    {
        Some(_) => 1,
        None => 0,
    }
}

/// Generate insights for `user_id` as a JSON array.
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `user_id` must be a valid null-terminated C string.
/// - `now` must be a valid null-terminated RFC 3339 string, or NULL.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_insights(
    processor: *mut PulseProcessorHandle,
    user_id: *const c_char,
    now: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let Some(user_str) = required_arg(user_id, "user_id") else {
        return ptr::null_mut();
    };
    let Some(now) = parse_now(now) else {
        return ptr::null_mut();
    };

    let insights = handle
        .processor
        .generate_insights(&user_str, now.with_timezone(&Utc));
    match serde_json::to_string(&insights) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Build the full report for `user_id`.
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `user_id` must be a valid null-terminated C string.
/// - `now` must be a valid null-terminated RFC 3339 string, or NULL.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_report(
    processor: *mut PulseProcessorHandle,
    user_id: *const c_char,
    now: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let Some(user_str) = required_arg(user_id, "user_id") else {
        return ptr::null_mut();
    };
    let Some(now) = parse_now(now) else {
        return ptr::null_mut();
    };

    match handle.processor.report(&user_str, now.with_timezone(&Utc)) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Dismiss an insight id for `user_id`.
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `user_id` and `insight_id` must be valid null-terminated C strings.
/// - Returns 1 if newly dismissed, 0 if already dismissed, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_dismiss(
    processor: *mut PulseProcessorHandle,
    user_id: *const c_char,
    insight_id: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &*processor;

    let Some(user_str) = required_arg(user_id, "user_id") else {
        return -1;
    };
    let Some(insight_str) = required_arg(insight_id, "insight_id") else {
        return -1;
    };

    i32::from(handle.processor.dismiss_insight(&user_str, &insight_str))
}

/// Apply the retention window to `user_id`.
///
/// # Safety
/// - `processor` must be a valid processor pointer.
/// - `user_id` must be a valid null-terminated C string.
/// - `now` must be a valid null-terminated RFC 3339 string, or NULL.
/// - Returns the number of events removed, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_prune(
    processor: *mut PulseProcessorHandle,
    user_id: *const c_char,
    now: *const c_char,
) -> i64 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &*processor;

    let Some(user_str) = required_arg(user_id, "user_id") else {
        return -1;
    };
    let Some(now) = parse_now(now) else {
        return -1;
    };

    handle
        .processor
        .prune_user(&user_str, now.with_timezone(&Utc)) as i64
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Pulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Pulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Pulse function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
