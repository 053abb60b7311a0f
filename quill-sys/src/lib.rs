//! Low-level FFI bindings for the quill on-device inference engine.
//!
//! This crate declares the raw C ABI: opaque handles, negative-status return
//! codes, caller-supplied output buffers, and the per-token callback type.
//! Nothing here is safe to call directly — use the `quill` crate, which wraps
//! every operation in RAII handles and Result-based error handling.
//!
//! # Wire contract
//!
//! Request and response payloads are JSON with snake_case keys, written into
//! fixed-capacity caller buffers as NUL-terminated strings. A negative return
//! value means failure; [`quill_get_last_error`] returns a thread-local,
//! possibly empty, human-readable message for the most recent failure on the
//! calling thread.
//!
//! # Linking
//!
//! By default the `stub-engine` feature compiles a deterministic in-process
//! implementation of every symbol, so the crate is self-contained for tests
//! and CI. With `--no-default-features`, `build.rs` links `libquill` from
//! the directory named by the `QUILL_LIB_DIR` environment variable.

use std::os::raw::{c_char, c_int, c_void};

/// Opaque engine session handle. Null means initialization failed.
pub type QuillHandle = *mut c_void;

/// Per-token streaming callback.
///
/// Invoked synchronously by the engine, once per generated token, on the
/// thread executing [`quill_complete`]. `token` is a NUL-terminated UTF-8
/// fragment valid only for the duration of the invocation; `user_data` is
/// the pointer registered with the call.
pub type QuillTokenCallback =
    Option<unsafe extern "C" fn(token: *const c_char, token_id: u32, user_data: *mut c_void)>;

extern "C" {
    /// Creates an engine session from a model path and an optional corpus
    /// directory to index for retrieval. Returns null on failure.
    pub fn quill_init(model_path: *const c_char, corpus_dir: *const c_char) -> QuillHandle;

    /// Destroys a session. Null is a no-op.
    pub fn quill_destroy(handle: QuillHandle);

    /// Returns the last error message recorded on the calling thread.
    /// Never null; empty when no error has been recorded. The pointer is
    /// valid until the next engine call on the same thread.
    pub fn quill_get_last_error() -> *const c_char;

    /// Process-wide telemetry token. Not tied to any session.
    pub fn quill_set_telemetry_token(token: *const c_char);

    /// Process-wide pro license key. Not tied to any session.
    pub fn quill_set_pro_key(key: *const c_char);

    /// Runs a chat completion. `messages_json` is a JSON array of
    /// `{role, content}` objects; `options_json` and `tools_json` may be
    /// null. The response JSON is written into `response_buffer`. Returns
    /// the written length, or a negative status on failure.
    pub fn quill_complete(
        handle: QuillHandle,
        messages_json: *const c_char,
        response_buffer: *mut c_char,
        buffer_size: usize,
        options_json: *const c_char,
        tools_json: *const c_char,
        callback: QuillTokenCallback,
        user_data: *mut c_void,
    ) -> c_int;

    /// Transcribes audio from a file path or a raw PCM buffer (exactly one
    /// of `audio_path` / `pcm_data` is non-null). `prompt` and
    /// `options_json` may be null. The response JSON is written into
    /// `response_buffer`. Returns the written length or a negative status.
    pub fn quill_transcribe(
        handle: QuillHandle,
        audio_path: *const c_char,
        pcm_data: *const u8,
        pcm_len: usize,
        prompt: *const c_char,
        response_buffer: *mut c_char,
        buffer_size: usize,
        options_json: *const c_char,
    ) -> c_int;

    /// Embeds `text` into `embeddings_buffer` (capacity in floats). The
    /// engine-reported dimension is written to `embedding_dim`. Returns the
    /// dimension, or a negative status on failure.
    pub fn quill_embed(
        handle: QuillHandle,
        text: *const c_char,
        embeddings_buffer: *mut f32,
        buffer_capacity: usize,
        embedding_dim: *mut usize,
        normalize: bool,
    ) -> c_int;

    /// Runs a retrieval query against the corpus indexed at init. The
    /// response JSON is written into `response_buffer`. Returns the written
    /// length or a negative status.
    pub fn quill_rag_query(
        handle: QuillHandle,
        query: *const c_char,
        response_buffer: *mut c_char,
        buffer_size: usize,
        top_k: c_int,
    ) -> c_int;

    /// Clears conversational state between calls. Does not abort an
    /// in-flight call.
    pub fn quill_reset(handle: QuillHandle);

    /// Signals the engine to abort an in-flight generation. Safe to call
    /// from another thread while a call is running.
    pub fn quill_stop(handle: QuillHandle);
}

#[cfg(feature = "stub-engine")]
mod stub;
