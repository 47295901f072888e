//! FFI (Foreign Function Interface) for spintrace
//!
//! A C-compatible API over the trace table and the reader/writer latch.
//!
//! ## Thread Safety
//!
//! Both handles are thread-safe: any number of threads may call
//! `spintrace_trace_*` on the same trace handle, or `spintrace_latch_*` on
//! the same latch handle, concurrently.
//!
//! ## Memory Management
//!
//! - The trace arena is owned by the caller and must outlive the handle.
//! - Strings returned by this API are heap-allocated and must be freed with
//!   `spintrace_free_string`.
//! - Handles must be freed with their respective `*_free` functions.
//!
//! ## Error Handling
//!
//! - Functions return null pointers or `-1` on error.
//! - Use `spintrace_get_last_error` to retrieve the message.
//! - Error messages are thread-local.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::OnceLock;

use libc::{c_char, c_int, c_void, size_t};

use crate::config::TraceConfig;
use crate::error::SpinError;
use crate::latch::ReaderWriterLatch;
use crate::timing::SystemClock;
use crate::trace::{stderr_sink, DumpSink, TraceBuffer};

// Thread-local storage for error messages
thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg);
    });
}

/// Clear the last error
fn clear_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

fn fail(err: SpinError) -> c_int {
    set_error(err.to_string());
    -1
}

// ============================================================================
// String Helpers
// ============================================================================

/// Get the last error message.
///
/// Returns null if no error occurred.
/// The returned string must be freed with `spintrace_free_string`.
#[no_mangle]
pub extern "C" fn spintrace_get_last_error() -> *mut c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(msg) => string_to_c(msg),
        None => ptr::null_mut(),
    })
}

/// Free a string returned by this API.
#[no_mangle]
pub extern "C" fn spintrace_free_string(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

/// Convert a C string to a Rust string.
unsafe fn c_str_to_string(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok().map(|s| s.to_string())
}

/// Convert a Rust string to a C string.
fn string_to_c(s: &str) -> *mut c_char {
    CString::new(s)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Read a four-byte identifier.
unsafe fn read_ident(ident: *const c_char) -> Option<[u8; 4]> {
    if ident.is_null() {
        return None;
    }
    let mut out = [0u8; 4];
    ptr::copy_nonoverlapping(ident.cast::<u8>(), out.as_mut_ptr(), 4);
    Some(out)
}

fn process_sink() -> &'static DumpSink {
    static SINK: OnceLock<DumpSink> = OnceLock::new();
    SINK.get_or_init(stderr_sink)
}

// ============================================================================
// Trace API
// ============================================================================

/// Opaque handle to a trace table
pub struct SpinTrace {
    inner: TraceBuffer<'static, SystemClock>,
}

fn make_trace(addr: *mut c_void, len: size_t, config: TraceConfig) -> *mut SpinTrace {
    // SAFETY: the caller owns `addr..addr + len` for the handle's lifetime.
    match unsafe { TraceBuffer::from_raw_parts(addr.cast::<u8>(), len, config, SystemClock) } {
        Ok(inner) => Box::into_raw(Box::new(SpinTrace { inner })),
        Err(e) => {
            set_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Build a trace table over caller-owned memory with the default configuration.
///
/// Returns null on error.
/// The handle must be freed with `spintrace_trace_free`; the memory stays
/// with the caller.
#[no_mangle]
pub extern "C" fn spintrace_trace_make(addr: *mut c_void, len: size_t) -> *mut SpinTrace {
    clear_error();
    make_trace(addr, len, TraceConfig::default())
}

/// Build a trace table with a JSON configuration.
///
/// Returns null on error.
#[no_mangle]
pub extern "C" fn spintrace_trace_make_json(
    addr: *mut c_void,
    len: size_t,
    config_json: *const c_char,
) -> *mut SpinTrace {
    clear_error();

    let json = match unsafe { c_str_to_string(config_json) } {
        Some(s) => s,
        None => {
            set_error("Null or invalid configuration string".to_string());
            return ptr::null_mut();
        }
    };

    match TraceConfig::from_json_str(&json) {
        Ok(config) => make_trace(addr, len, config),
        Err(e) => {
            set_error(format!("Failed to parse trace configuration: {}", e));
            ptr::null_mut()
        }
    }
}

/// Free a trace handle. The arena itself is not touched.
#[no_mangle]
pub extern "C" fn spintrace_trace_free(trace: *mut SpinTrace) {
    if !trace.is_null() {
        unsafe {
            drop(Box::from_raw(trace));
        }
    }
}

/// Reserve `size` bytes in the trace table.
///
/// Returns null on error.
#[no_mangle]
pub extern "C" fn spintrace_trace_allocate(trace: *const SpinTrace, size: size_t) -> *mut c_void {
    clear_error();

    let Some(trace) = (unsafe { trace.as_ref() }) else {
        set_error("Null trace pointer".to_string());
        return ptr::null_mut();
    };

    match trace.inner.allocate(size) {
        Ok(mut slot) => slot.as_mut_ptr().cast::<c_void>(),
        Err(e) => {
            set_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Reserve `size` bytes unless tracing is halted.
///
/// Returns null while halted (with no error set) or on error.
#[no_mangle]
pub extern "C" fn spintrace_trace_allocate_if(
    trace: *const SpinTrace,
    size: size_t,
) -> *mut c_void {
    clear_error();

    let Some(trace) = (unsafe { trace.as_ref() }) else {
        set_error("Null trace pointer".to_string());
        return ptr::null_mut();
    };

    match trace.inner.allocate_if(size) {
        Ok(Some(mut slot)) => slot.as_mut_ptr().cast::<c_void>(),
        Ok(None) => ptr::null_mut(),
        Err(e) => {
            set_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Write a standard record: four-byte `ident`, `code`, and up to 16 bytes
/// of `info` (may be null).
///
/// Returns the record offset, 0 while halted, or -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_trace_write(
    trace: *const SpinTrace,
    ident: *const c_char,
    code: u32,
    info: *const c_void,
    info_len: size_t,
) -> i64 {
    clear_error();

    let Some(trace) = (unsafe { trace.as_ref() }) else {
        set_error("Null trace pointer".to_string());
        return -1;
    };
    let Some(ident) = (unsafe { read_ident(ident) }) else {
        set_error("Null trace identifier".to_string());
        return -1;
    };
    let info: &[u8] = if info.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(info.cast::<u8>(), info_len) }
    };

    match trace.inner.write(&ident, code, info) {
        Ok(Some(offset)) => offset as i64,
        Ok(None) => 0,
        Err(e) => fail(e) as i64,
    }
}

/// Halt tracing.
#[no_mangle]
pub extern "C" fn spintrace_trace_deactivate(trace: *const SpinTrace) {
    if let Some(trace) = unsafe { trace.as_ref() } {
        trace.inner.deactivate();
    }
}

/// Returns 1 while tracing is active, 0 when halted or on a null handle.
#[no_mangle]
pub extern "C" fn spintrace_trace_is_active(trace: *const SpinTrace) -> c_int {
    match unsafe { trace.as_ref() } {
        Some(trace) => trace.inner.is_active() as c_int,
        None => 0,
    }
}

/// Offset of `addr` within the trace table, or -1 if outside it.
#[no_mangle]
pub extern "C" fn spintrace_trace_offset(trace: *const SpinTrace, addr: *const c_void) -> i64 {
    match unsafe { trace.as_ref() } {
        Some(trace) => trace
            .inner
            .offset_of(addr.cast::<u8>())
            .map(i64::from)
            .unwrap_or(-1),
        None => -1,
    }
}

/// Table counters as JSON.
///
/// Returns null on error.
/// The returned string must be freed with `spintrace_free_string`.
#[no_mangle]
pub extern "C" fn spintrace_trace_stats_json(trace: *const SpinTrace) -> *mut c_char {
    clear_error();

    let Some(trace) = (unsafe { trace.as_ref() }) else {
        set_error("Null trace pointer".to_string());
        return ptr::null_mut();
    };

    match serde_json::to_string(&trace.inner.stats()) {
        Ok(json) => string_to_c(&json),
        Err(e) => {
            set_error(format!("Failed to serialize stats: {}", e));
            ptr::null_mut()
        }
    }
}

/// Dump the trace table to standard error.
///
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_trace_dump(trace: *const SpinTrace) -> c_int {
    clear_error();

    let Some(trace) = (unsafe { trace.as_ref() }) else {
        set_error("Null trace pointer".to_string());
        return -1;
    };

    match trace.inner.dump(process_sink()) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

// ============================================================================
// Latch API
// ============================================================================

/// Opaque handle to a reader/writer latch
pub struct SpinLatch {
    inner: ReaderWriterLatch,
}

/// Create an unheld latch.
///
/// The latch must be freed with `spintrace_latch_free`.
#[no_mangle]
pub extern "C" fn spintrace_latch_new() -> *mut SpinLatch {
    clear_error();
    Box::into_raw(Box::new(SpinLatch {
        inner: ReaderWriterLatch::new(),
    }))
}

/// Free a latch.
#[no_mangle]
pub extern "C" fn spintrace_latch_free(latch: *mut SpinLatch) {
    if !latch.is_null() {
        unsafe {
            drop(Box::from_raw(latch));
        }
    }
}

fn with_latch(
    latch: *const SpinLatch,
    op: impl FnOnce(&ReaderWriterLatch) -> crate::error::Result<()>,
) -> c_int {
    clear_error();

    let Some(latch) = (unsafe { latch.as_ref() }) else {
        set_error("Null latch pointer".to_string());
        return -1;
    };

    match op(&latch.inner) {
        Ok(()) => 0,
        Err(e) => fail(e),
    }
}

fn test_latch(latch: *const SpinLatch, op: impl FnOnce(&ReaderWriterLatch) -> bool) -> c_int {
    match unsafe { latch.as_ref() } {
        Some(latch) => op(&latch.inner) as c_int,
        None => 0,
    }
}

/// Try to obtain shared. Returns 1 on success, 0 otherwise.
#[no_mangle]
pub extern "C" fn spintrace_latch_attempt_shared(latch: *const SpinLatch) -> c_int {
    test_latch(latch, ReaderWriterLatch::attempt_shared)
}

/// Try to obtain exclusive. Returns 1 on success, 0 otherwise.
#[no_mangle]
pub extern "C" fn spintrace_latch_attempt_exclusive(latch: *const SpinLatch) -> c_int {
    test_latch(latch, ReaderWriterLatch::attempt_exclusive)
}

/// Obtain shared, spinning while exclusive reservations exist.
///
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_latch_obtain_shared(latch: *const SpinLatch) -> c_int {
    with_latch(latch, ReaderWriterLatch::obtain_shared)
}

/// Obtain exclusive. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_latch_obtain_exclusive(latch: *const SpinLatch) -> c_int {
    with_latch(latch, ReaderWriterLatch::obtain_exclusive)
}

/// Release shared. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_latch_release_shared(latch: *const SpinLatch) -> c_int {
    with_latch(latch, ReaderWriterLatch::release_shared)
}

/// Release exclusive. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_latch_release_exclusive(latch: *const SpinLatch) -> c_int {
    with_latch(latch, ReaderWriterLatch::release_exclusive)
}

/// Downgrade exclusive to shared. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn spintrace_latch_modify_to_shared(latch: *const SpinLatch) -> c_int {
    with_latch(latch, ReaderWriterLatch::modify_to_shared)
}

/// Upgrade the sole shared hold to exclusive. Returns 1 on success, 0 otherwise.
#[no_mangle]
pub extern "C" fn spintrace_latch_modify_to_exclusive(latch: *const SpinLatch) -> c_int {
    test_latch(latch, ReaderWriterLatch::modify_to_exclusive)
}

#[no_mangle]
pub extern "C" fn spintrace_latch_is_held_shared(latch: *const SpinLatch) -> c_int {
    test_latch(latch, ReaderWriterLatch::is_held_shared)
}

#[no_mangle]
pub extern "C" fn spintrace_latch_is_held_exclusive(latch: *const SpinLatch) -> c_int {
    test_latch(latch, ReaderWriterLatch::is_held_exclusive)
}

/// Raw latch word (reserve count << 16 | share count).
#[no_mangle]
pub extern "C" fn spintrace_latch_word(latch: *const SpinLatch) -> u32 {
    match unsafe { latch.as_ref() } {
        Some(latch) => latch.inner.word().raw(),
        None => 0,
    }
}

// ============================================================================
// Version Info
// ============================================================================

/// Get the spintrace version.
///
/// Returns a static string (do not free).
#[no_mangle]
pub extern "C" fn spintrace_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::trace::{Arena, Record};

    #[test]
    fn test_trace_lifecycle() {
        let mut arena = Arena::new(0x1_0000);
        let addr = arena.as_mut_slice().as_mut_ptr().cast::<c_void>();

        // Create trace
        let trace = spintrace_trace_make(addr, arena.len());
        assert!(!trace.is_null());
        assert_eq!(spintrace_trace_is_active(trace), 1);

        // Allocate and locate a slot
        let slot = spintrace_trace_allocate(trace, 40);
        assert!(!slot.is_null());
        assert_eq!(spintrace_trace_offset(trace, slot), 32);

        // Write a standard record
        let info = b"hello";
        let offset = spintrace_trace_write(
            trace,
            b"TEST".as_ptr().cast::<c_char>(),
            9,
            info.as_ptr().cast::<c_void>(),
            info.len(),
        );
        assert_eq!(offset, 96);

        let stats = spintrace_trace_stats_json(trace);
        let stats_str = unsafe { CStr::from_ptr(stats) }.to_str().unwrap().to_string();
        assert!(stats_str.contains("\"next\":128"));
        spintrace_free_string(stats);

        // Halt
        spintrace_trace_deactivate(trace);
        assert_eq!(spintrace_trace_is_active(trace), 0);
        assert!(spintrace_trace_allocate_if(trace, 32).is_null());

        // Free
        spintrace_trace_free(trace);

        let record = Record::parse(&arena.as_slice()[96..]).unwrap();
        assert_eq!(record.ident_str(), "TEST");
        assert_eq!(record.code(), 9);
    }

    #[test]
    fn test_trace_make_json() {
        let mut arena = Arena::new(4096);
        let addr = arena.as_mut_slice().as_mut_ptr().cast::<c_void>();
        let config = CString::new(r#"{"min_size": 256, "alignment": 16}"#).unwrap();

        let trace = spintrace_trace_make_json(addr, arena.len(), config.as_ptr());
        assert!(!trace.is_null());
        let slot = spintrace_trace_allocate(trace, 1);
        assert_eq!(spintrace_trace_offset(trace, slot), 32);
        assert_eq!(spintrace_trace_offset(trace, spintrace_trace_allocate(trace, 1)), 48);
        spintrace_trace_free(trace);
    }

    #[test]
    fn test_trace_error_handling() {
        // Default minimum size rejects a small region
        let mut arena = Arena::new(4096);
        let addr = arena.as_mut_slice().as_mut_ptr().cast::<c_void>();
        assert!(spintrace_trace_make(addr, arena.len()).is_null());

        let error = spintrace_get_last_error();
        assert!(!error.is_null());
        let message = unsafe { CStr::from_ptr(error) }.to_str().unwrap().to_string();
        assert!(message.contains("Invalid trace arena"));
        spintrace_free_string(error);

        // Null handles
        assert!(spintrace_trace_allocate(ptr::null(), 32).is_null());
        assert_eq!(spintrace_trace_dump(ptr::null()), -1);
        assert!(spintrace_trace_make(ptr::null_mut(), 0x1_0000).is_null());
    }

    #[test]
    fn test_latch_lifecycle() {
        let latch = spintrace_latch_new();
        assert!(!latch.is_null());

        assert_eq!(spintrace_latch_obtain_shared(latch), 0);
        assert_eq!(spintrace_latch_is_held_shared(latch), 1);
        assert_eq!(spintrace_latch_attempt_exclusive(latch), 0);

        assert_eq!(spintrace_latch_modify_to_exclusive(latch), 1);
        assert_eq!(spintrace_latch_is_held_exclusive(latch), 1);
        assert_eq!(spintrace_latch_word(latch), 0x0001_FFFF);

        assert_eq!(spintrace_latch_modify_to_shared(latch), 0);
        assert_eq!(spintrace_latch_release_shared(latch), 0);
        assert_eq!(spintrace_latch_word(latch), 0);

        spintrace_latch_free(latch);
    }

    #[test]
    fn test_latch_usage_error() {
        let latch = spintrace_latch_new();
        assert_eq!(spintrace_latch_release_exclusive(latch), -1);

        let error = spintrace_get_last_error();
        assert!(!error.is_null());
        let message = unsafe { CStr::from_ptr(error) }.to_str().unwrap().to_string();
        assert!(message.contains("release_exclusive"));
        spintrace_free_string(error);

        spintrace_latch_free(latch);
    }

    #[test]
    fn test_version() {
        let version = spintrace_version();
        let version_str = unsafe { CStr::from_ptr(version) }.to_str().unwrap();
        assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
    }
}
