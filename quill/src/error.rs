//! Error types for the quill SDK.

use std::ffi::CStr;

/// Error type for all SDK operations.
///
/// Every native-boundary failure is translated at the point of the call;
/// nothing is retried and nothing is downgraded to a default value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine returned a null handle from init.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// An operation was attempted after the session was closed. The native
    /// boundary is never reached in this case.
    #[error("session is closed")]
    ClosedSession,

    /// A completion (or retrieval) call failed, either with a negative
    /// status code or an `error` field in the response payload.
    #[error("completion failed: {0}")]
    Completion(String),

    /// A transcription call failed.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// An embedding call failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The engine response could not be parsed as well-formed text/JSON.
    #[error("invalid response from engine")]
    InvalidResponse,

    /// Caller input contained an interior NUL byte and cannot cross the
    /// C boundary.
    #[error("null string conversion")]
    Nul(#[from] std::ffi::NulError),

    /// The background worker exited before delivering a result.
    #[error("background worker exited before the call completed")]
    WorkerExited,
}

/// Retrieves the last error message recorded by the engine on this thread.
///
/// Returns `None` when the engine has not recorded a message (or recorded
/// an empty one). Must be called on the thread that performed the failing
/// call, before the next engine call on that thread.
pub fn last_error_message() -> Option<String> {
    // SAFETY: quill_get_last_error returns a valid, possibly empty,
    // NUL-terminated string owned by the thread-local error buffer.
    let ptr = unsafe { quill_sys::quill_get_last_error() };
    if ptr.is_null() {
        return None;
    }
    // SAFETY: ptr is non-null and valid until the next engine call.
    let msg = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string();
    if msg.is_empty() {
        None
    } else {
        Some(msg)
    }
}

/// Builds a failure message from the engine's last error, or the fallback
/// when the engine recorded nothing.
pub(crate) fn last_error_or(fallback: &str) -> String {
    last_error_message().unwrap_or_else(|| fallback.to_string())
}
