//! Process-wide engine configuration.
//!
//! These setters are global side effects, not tied to any session, and may
//! be called before or after any session exists. Set them once, before the
//! calls that are expected to honor them.

use std::ffi::CString;

/// Sets the process-wide telemetry token. Cannot fail observably; input
/// containing an interior NUL byte is ignored.
pub fn set_telemetry_token(token: &str) {
    let Ok(c_token) = CString::new(token) else {
        return;
    };
    // SAFETY: quill_set_telemetry_token is a simple setter; c_token is
    // valid for the duration of the call.
    unsafe { quill_sys::quill_set_telemetry_token(c_token.as_ptr()) };
}

/// Sets the process-wide pro license key. Cannot fail observably; input
/// containing an interior NUL byte is ignored.
pub fn set_pro_key(key: &str) {
    let Ok(c_key) = CString::new(key) else {
        return;
    };
    // SAFETY: quill_set_pro_key is a simple setter; c_key is valid for the
    // duration of the call.
    unsafe { quill_sys::quill_set_pro_key(c_key.as_ptr()) };
}
