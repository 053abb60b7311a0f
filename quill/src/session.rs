//! RAII session handle over the engine boundary.
//!
//! A [`Session`] owns exactly one opaque engine handle. Every operation
//! checks liveness before touching the native boundary, serializes its
//! request to the engine's JSON wire format, and translates every failure
//! signal (negative status, `error` payload field, unparseable response)
//! into a typed [`Error`](crate::Error).
//!
//! # Example
//!
//! ```no_run
//! use quill::{CompletionOptions, Session};
//!
//! let session = Session::create("path/to/model.bin", None)?;
//! let result = session.complete_text("Hello!", &CompletionOptions::default())?;
//! println!("{}", result.text);
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! # Concurrency
//!
//! The engine performs its work synchronously on the calling thread, and a
//! single handle is not safe for overlapping invocations. A `Session` can
//! be shared across threads (`Send + Sync`); an internal call guard
//! serializes every native call. [`Session::stop`] is the one exception:
//! it bypasses the guard so it can signal the engine while another call is
//! in flight.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::completion::{CompletionOptions, CompletionResult, Message};
use crate::error::{last_error_or, Error};
use crate::transcription::{TranscriptionOptions, TranscriptionResult};
use crate::Result;

/// Capacity of the response buffer handed to the engine.
const RESPONSE_BUFFER_SIZE: usize = 64 * 1024;

/// Capacity, in floats, of the embedding output buffer.
const EMBEDDING_BUFFER_LEN: usize = 4096;

/// Callback context for one streaming completion call.
///
/// Constructed immediately before the native call and released when the
/// call frame unwinds; the engine never invokes the callback after
/// `quill_complete` returns.
struct TokenCallbackContext<'a> {
    callback: &'a mut dyn FnMut(&str, u32),
}

unsafe extern "C" fn token_callback_bridge(
    token: *const c_char,
    token_id: u32,
    user_data: *mut c_void,
) {
    if token.is_null() || user_data.is_null() {
        return;
    }
    // SAFETY: user_data points at the TokenCallbackContext owned by the
    // in-flight complete call.
    let ctx = unsafe { &mut *(user_data as *mut TokenCallbackContext) };
    // SAFETY: token is a valid NUL-terminated string for this invocation.
    let text = unsafe { CStr::from_ptr(token) }.to_string_lossy();
    (ctx.callback)(&text, token_id);
}

/// Serializes a request value and converts it to a C string.
fn marshal_json<T: Serialize + ?Sized>(value: &T, failure: fn(String) -> Error) -> Result<CString> {
    let json = serde_json::to_string(value)
        .map_err(|_| failure("failed to serialize request".into()))?;
    Ok(CString::new(json)?)
}

/// Reads the engine's NUL-terminated response out of a fixed buffer.
fn buffer_text(buffer: &[u8]) -> Result<&str> {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    std::str::from_utf8(&buffer[..end]).map_err(|_| Error::InvalidResponse)
}

/// Parses a response payload, surfacing a top-level `error` field as the
/// operation's failure even when the native status code reported success.
fn parse_payload<T: DeserializeOwned>(buffer: &[u8], failure: fn(String) -> Error) -> Result<T> {
    let value: Value =
        serde_json::from_str(buffer_text(buffer)?).map_err(|_| Error::InvalidResponse)?;
    if let Some(error) = value.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(failure(message));
    }
    serde_json::from_value(value).map_err(|_| Error::InvalidResponse)
}

/// An initialized engine session.
///
/// Owns the opaque native handle; the handle is released exactly once, on
/// [`close`](Session::close) or drop, whichever comes first. After closing,
/// every operation fails with [`Error::ClosedSession`] without reaching the
/// native boundary.
#[derive(Debug)]
pub struct Session {
    handle: AtomicPtr<c_void>,
    call_lock: Mutex<()>,
}

// SAFETY: the handle may be used from any thread as long as calls do not
// overlap; call_lock serializes every native call, and close requires
// exclusive access.
unsafe impl Send for Session {}
unsafe impl Sync for Session {}

impl Session {
    /// Initializes an engine session from a model path, optionally indexing
    /// a corpus directory for retrieval queries.
    pub fn create(model_path: &str, corpus_dir: Option<&str>) -> Result<Self> {
        let c_model = CString::new(model_path)?;
        let c_corpus = corpus_dir.map(CString::new).transpose()?;
        // SAFETY: CStrings are valid for the duration of the call; a null
        // corpus directory is allowed.
        let handle = unsafe {
            quill_sys::quill_init(
                c_model.as_ptr(),
                c_corpus
                    .as_ref()
                    .map(|c| c.as_ptr())
                    .unwrap_or(std::ptr::null()),
            )
        };
        if handle.is_null() {
            return Err(Error::Initialization(last_error_or(
                "failed to initialize model",
            )));
        }
        log::debug!("initialized engine session for {model_path}");
        Ok(Self {
            handle: AtomicPtr::new(handle),
            call_lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.call_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the live handle, or fails fast when the session is closed.
    fn live(&self) -> Result<*mut c_void> {
        let handle = self.handle.load(Ordering::Acquire);
        if handle.is_null() {
            Err(Error::ClosedSession)
        } else {
            Ok(handle)
        }
    }

    /// Completes a single user prompt with the given options.
    pub fn complete_text(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult> {
        self.complete(&[Message::user(prompt)], options)
    }

    /// Completes a conversation with the given options.
    pub fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionResult> {
        self.complete_with(messages, options, None, None)
    }

    /// Completes a conversation with optional tool definitions and an
    /// optional per-token callback.
    ///
    /// Tool definitions are engine-defined schemas, serialized verbatim.
    /// The callback is invoked synchronously, once per generated token in
    /// generation order, on the thread running this call, and never after
    /// this call returns. It must not panic: the invocation crosses the C
    /// boundary, where unwinding aborts the process.
    pub fn complete_with(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        tools: Option<&[Map<String, Value>]>,
        on_token: Option<&mut dyn FnMut(&str, u32)>,
    ) -> Result<CompletionResult> {
        let _in_flight = self.guard();
        let handle = self.live()?;

        let messages_json = marshal_json(messages, Error::Completion)?;
        let options_json = marshal_json(options, Error::Completion)?;
        let tools_json = tools
            .map(|t| marshal_json(t, Error::Completion))
            .transpose()?;

        let mut buffer = vec![0u8; RESPONSE_BUFFER_SIZE];

        let mut context = on_token.map(|callback| TokenCallbackContext { callback });
        let callback: quill_sys::QuillTokenCallback = context.as_ref().map(|_| {
            token_callback_bridge as unsafe extern "C" fn(*const c_char, u32, *mut c_void)
        });
        let user_data = context
            .as_mut()
            .map(|ctx| ctx as *mut TokenCallbackContext as *mut c_void)
            .unwrap_or(std::ptr::null_mut());

        // SAFETY: handle is live and exclusively held for this call; all
        // pointers, including the callback context, stay valid until the
        // call returns.
        let status = unsafe {
            quill_sys::quill_complete(
                handle,
                messages_json.as_ptr(),
                buffer.as_mut_ptr() as *mut c_char,
                buffer.len(),
                options_json.as_ptr(),
                tools_json
                    .as_ref()
                    .map(|t| t.as_ptr())
                    .unwrap_or(std::ptr::null()),
                callback,
                user_data,
            )
        };
        drop(context);

        if status < 0 {
            return Err(Error::Completion(last_error_or("completion failed")));
        }
        parse_payload(&buffer, Error::Completion)
    }

    /// Transcribes an audio file.
    pub fn transcribe_file(
        &self,
        audio_path: &str,
        prompt: Option<&str>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        self.transcribe_inner(Some(audio_path), None, prompt, options)
    }

    /// Transcribes raw PCM audio.
    pub fn transcribe_pcm(
        &self,
        pcm: &[u8],
        prompt: Option<&str>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        self.transcribe_inner(None, Some(pcm), prompt, options)
    }

    fn transcribe_inner(
        &self,
        audio_path: Option<&str>,
        pcm: Option<&[u8]>,
        prompt: Option<&str>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult> {
        let _in_flight = self.guard();
        let handle = self.live()?;

        let c_path = audio_path.map(CString::new).transpose()?;
        let c_prompt = prompt.map(CString::new).transpose()?;
        let options_json = marshal_json(options, Error::Transcription)?;
        let mut buffer = vec![0u8; RESPONSE_BUFFER_SIZE];

        // A path reference wins: when present, the byte buffer is absent.
        let (pcm_ptr, pcm_len) = match (audio_path.is_some(), pcm) {
            (false, Some(bytes)) => (bytes.as_ptr(), bytes.len()),
            _ => (std::ptr::null(), 0),
        };

        // SAFETY: handle is live and exclusively held; exactly one of
        // c_path / pcm_ptr is non-null; all pointers stay valid for the
        // duration of the call.
        let status = unsafe {
            quill_sys::quill_transcribe(
                handle,
                c_path.as_ref().map(|c| c.as_ptr()).unwrap_or(std::ptr::null()),
                pcm_ptr,
                pcm_len,
                c_prompt
                    .as_ref()
                    .map(|c| c.as_ptr())
                    .unwrap_or(std::ptr::null()),
                buffer.as_mut_ptr() as *mut c_char,
                buffer.len(),
                options_json.as_ptr(),
            )
        };

        if status < 0 {
            return Err(Error::Transcription(last_error_or("transcription failed")));
        }
        parse_payload(&buffer, Error::Transcription)
    }

    /// Embeds `text`, returning a vector of the engine-reported dimension.
    pub fn embed(&self, text: &str, normalize: bool) -> Result<Vec<f32>> {
        let _in_flight = self.guard();
        let handle = self.live()?;

        let c_text = CString::new(text)?;
        let mut buffer = vec![0f32; EMBEDDING_BUFFER_LEN];
        let mut dim: usize = 0;

        // SAFETY: handle is live and exclusively held; the buffer and the
        // dimension out-param are valid for the call.
        let status = unsafe {
            quill_sys::quill_embed(
                handle,
                c_text.as_ptr(),
                buffer.as_mut_ptr(),
                buffer.len(),
                &mut dim,
                normalize,
            )
        };

        if status < 0 {
            return Err(Error::Embedding(last_error_or(
                "failed to generate embedding",
            )));
        }
        if dim > buffer.len() {
            return Err(Error::Embedding(
                "embedding dimension exceeds buffer capacity".into(),
            ));
        }
        buffer.truncate(dim);
        Ok(buffer)
    }

    /// Runs a retrieval query against the corpus indexed at creation.
    ///
    /// The result is the engine's response as a generic JSON tree; its
    /// shape is engine-defined beyond the top-level `error` inspection.
    pub fn rag_query(&self, query: &str, top_k: u32) -> Result<Value> {
        let _in_flight = self.guard();
        let handle = self.live()?;

        let c_query = CString::new(query)?;
        let mut buffer = vec![0u8; RESPONSE_BUFFER_SIZE];

        // SAFETY: handle is live and exclusively held; the buffer is valid
        // for the call.
        let status = unsafe {
            quill_sys::quill_rag_query(
                handle,
                c_query.as_ptr(),
                buffer.as_mut_ptr() as *mut c_char,
                buffer.len(),
                top_k as c_int,
            )
        };

        if status < 0 {
            return Err(Error::Completion(last_error_or("retrieval query failed")));
        }
        parse_payload(&buffer, Error::Completion)
    }

    /// Clears conversational state between calls. Does not abort an
    /// in-flight call.
    pub fn reset(&self) -> Result<()> {
        let _in_flight = self.guard();
        let handle = self.live()?;
        // SAFETY: handle is live and exclusively held.
        unsafe { quill_sys::quill_reset(handle) };
        Ok(())
    }

    /// Signals the engine to abort an in-flight generation.
    ///
    /// Bypasses the call guard so it can run while another call holds it;
    /// `close` requires exclusive access, so a handle observed here cannot
    /// be freed concurrently.
    pub fn stop(&self) -> Result<()> {
        let handle = self.live()?;
        // SAFETY: handle is live; stop only flips the engine's abort flag
        // and is safe to call from another thread during a call.
        unsafe { quill_sys::quill_stop(handle) };
        Ok(())
    }

    /// Releases the native handle. Safe to call multiple times; after the
    /// first close, every operation fails with [`Error::ClosedSession`].
    pub fn close(&mut self) {
        let handle = self.handle.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !handle.is_null() {
            // SAFETY: handle was produced by quill_init and is relinquished
            // exactly once; exclusive access rules out in-flight calls.
            unsafe { quill_sys::quill_destroy(handle) };
            log::debug!("destroyed engine session");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
