//! In-process stub engine.
//!
//! Implements every `quill_*` symbol deterministically so the binding layer
//! can be exercised without the native library. The stub reproduces the
//! engine's observable contract — option defaults, stop-sequence and
//! `max_tokens` truncation, the out-of-band stop flag checked per token,
//! error JSON payloads on logically failed calls, and the thread-local
//! last-error buffer — without doing any inference.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::QuillTokenCallback;

/// Fixed confidence the stub reports for every completion.
const STUB_CONFIDENCE: f64 = 0.875;

/// Embedding dimension the stub reports.
const STUB_EMBEDDING_DIM: usize = 32;

/// Pause between emitted tokens so streaming consumers observe incremental
/// delivery and out-of-band stop requests land mid-generation.
const TOKEN_PACING: Duration = Duration::from_millis(1);

static TELEMETRY_TOKEN: Mutex<Option<String>> = Mutex::new(None);
static PRO_KEY: Mutex<Option<String>> = Mutex::new(None);

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn set_last_error(msg: &str) {
    let sanitized: String = msg.chars().map(|c| if c == '\0' { ' ' } else { c }).collect();
    LAST_ERROR.with(|slot| {
        if let Ok(cstr) = CString::new(sanitized) {
            *slot.borrow_mut() = cstr;
        }
    });
}

struct StubSession {
    corpus_dir: Option<PathBuf>,
    should_stop: AtomicBool,
}

/// Reads a nullable C string. Returns `Err` on invalid UTF-8.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string.
unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Ok(Some(s)),
        Err(_) => Err(()),
    }
}

/// Writes `payload` into the caller buffer as a NUL-terminated string.
/// Returns the written length, or -1 when the buffer is too small.
unsafe fn write_payload(payload: &str, buffer: *mut c_char, capacity: usize) -> c_int {
    if buffer.is_null() || payload.len() + 1 > capacity {
        set_last_error("response exceeds buffer capacity");
        return -1;
    }
    std::ptr::copy_nonoverlapping(payload.as_ptr(), buffer as *mut u8, payload.len());
    *buffer.add(payload.len()) = 0;
    payload.len() as c_int
}

fn session_from(handle: *mut c_void) -> Option<&'static StubSession> {
    if handle.is_null() {
        set_last_error("session not initialized");
        return None;
    }
    // SAFETY: non-null handles originate from quill_init below.
    Some(unsafe { &*(handle as *const StubSession) })
}

#[no_mangle]
pub unsafe extern "C" fn quill_init(
    model_path: *const c_char,
    corpus_dir: *const c_char,
) -> *mut c_void {
    let path = match opt_str(model_path) {
        Ok(Some(p)) if !p.is_empty() => p,
        _ => {
            set_last_error("model path is required");
            return std::ptr::null_mut();
        }
    };
    if !std::path::Path::new(path).is_file() {
        set_last_error(&format!("model file not found: {path}"));
        return std::ptr::null_mut();
    }

    let corpus = match opt_str(corpus_dir) {
        Ok(maybe) => maybe.map(PathBuf::from),
        Err(_) => {
            set_last_error("corpus directory is not valid UTF-8");
            return std::ptr::null_mut();
        }
    };
    if let Some(dir) = &corpus {
        if !dir.is_dir() {
            set_last_error(&format!("corpus directory not found: {}", dir.display()));
            return std::ptr::null_mut();
        }
    }

    let session = Box::new(StubSession {
        corpus_dir: corpus,
        should_stop: AtomicBool::new(false),
    });
    Box::into_raw(session) as *mut c_void
}

#[no_mangle]
pub unsafe extern "C" fn quill_destroy(handle: *mut c_void) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut StubSession));
    }
}

#[no_mangle]
pub unsafe extern "C" fn quill_get_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ptr())
}

#[no_mangle]
pub unsafe extern "C" fn quill_set_telemetry_token(token: *const c_char) {
    if let Ok(Some(token)) = opt_str(token) {
        if let Ok(mut slot) = TELEMETRY_TOKEN.lock() {
            *slot = Some(token.to_string());
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn quill_set_pro_key(key: *const c_char) {
    if let Ok(Some(key)) = opt_str(key) {
        if let Ok(mut slot) = PRO_KEY.lock() {
            *slot = Some(key.to_string());
        }
    }
}

/// Sampling options with the engine-side defaults.
struct Options {
    max_tokens: usize,
    stop: Vec<String>,
    confidence_threshold: f64,
}

fn parse_options(options_json: Option<&str>) -> Options {
    let mut options = Options {
        max_tokens: 100,
        stop: Vec::new(),
        confidence_threshold: 0.0,
    };
    let Some(raw) = options_json else {
        return options;
    };
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return options;
    };
    if let Some(n) = value.get("max_tokens").and_then(Value::as_u64) {
        options.max_tokens = n as usize;
    }
    if let Some(seqs) = value.get("stop").and_then(Value::as_array) {
        options.stop = seqs
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(t) = value.get("confidence_threshold").and_then(Value::as_f64) {
        options.confidence_threshold = t;
    }
    options
}

/// Splits a reply into tokens, one word per token with its trailing space.
fn tokenize(reply: &str) -> Vec<String> {
    let words: Vec<&str> = reply.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i == last {
                (*w).to_string()
            } else {
                format!("{w} ")
            }
        })
        .collect()
}

#[no_mangle]
pub unsafe extern "C" fn quill_complete(
    handle: *mut c_void,
    messages_json: *const c_char,
    response_buffer: *mut c_char,
    buffer_size: usize,
    options_json: *const c_char,
    tools_json: *const c_char,
    callback: QuillTokenCallback,
    user_data: *mut c_void,
) -> c_int {
    let Some(session) = session_from(handle) else {
        return -1;
    };
    session.should_stop.store(false, Ordering::SeqCst);

    let start = Instant::now();

    let messages = match opt_str(messages_json) {
        Ok(Some(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            _ => {
                set_last_error("malformed messages payload");
                return -1;
            }
        },
        _ => {
            set_last_error("messages payload is required");
            return -1;
        }
    };
    if messages.is_empty() {
        // Logical failure on a structurally successful call: the payload
        // carries the error while the status code reports success.
        let payload = json!({"error": "no messages provided"}).to_string();
        return write_payload(&payload, response_buffer, buffer_size);
    }

    let options = parse_options(opt_str(options_json).unwrap_or(None));

    let prompt_tokens: usize = messages
        .iter()
        .filter_map(|m| m.get("content").and_then(Value::as_str))
        .map(|c| c.split_whitespace().count())
        .sum();

    let last_content = messages
        .iter()
        .rev()
        .find_map(|m| m.get("content").and_then(Value::as_str))
        .unwrap_or("");
    let reply = format!("echo: {last_content}");

    let mut tokens = tokenize(&reply);
    if let Some(cut) = tokens
        .iter()
        .position(|t| options.stop.iter().any(|s| t.trim_end() == s.as_str()))
    {
        tokens.truncate(cut);
    }
    tokens.truncate(options.max_tokens);

    let mut emitted: Vec<String> = Vec::with_capacity(tokens.len());
    let mut time_to_first_token = Duration::ZERO;
    for (i, token) in tokens.into_iter().enumerate() {
        if i > 0 {
            std::thread::sleep(TOKEN_PACING);
            if session.should_stop.load(Ordering::SeqCst) {
                break;
            }
        }
        if i == 0 {
            time_to_first_token = start.elapsed();
        }
        if let Some(cb) = callback {
            if let Ok(text) = CString::new(token.clone()) {
                cb(text.as_ptr(), (i + 1) as u32, user_data);
            }
        }
        emitted.push(token);
    }

    let total = start.elapsed();
    let decode = total.saturating_sub(time_to_first_token);
    let per_second = |count: usize, elapsed: Duration| {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    };

    let text: String = emitted.concat();
    let mut payload = json!({
        "text": text,
        "prompt_tokens": prompt_tokens,
        "completion_tokens": emitted.len(),
        "time_to_first_token_ms": time_to_first_token.as_secs_f64() * 1000.0,
        "total_time_ms": total.as_secs_f64() * 1000.0,
        "prefill_tokens_per_second": per_second(prompt_tokens, time_to_first_token),
        "decode_tokens_per_second": per_second(emitted.len(), decode),
        "confidence": STUB_CONFIDENCE,
        "cloud_handoff": STUB_CONFIDENCE < options.confidence_threshold,
    });

    if let Ok(Some(raw)) = opt_str(tools_json) {
        if let Ok(Value::Array(tools)) = serde_json::from_str::<Value>(raw) {
            if let Some(first) = tools.first() {
                let name = first
                    .get("name")
                    .or_else(|| first.pointer("/function/name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unnamed");
                payload["function_calls"] = json!([{
                    "name": name,
                    "arguments": {"query": last_content},
                }]);
            }
        }
    }

    write_payload(&payload.to_string(), response_buffer, buffer_size)
}

#[no_mangle]
pub unsafe extern "C" fn quill_transcribe(
    handle: *mut c_void,
    audio_path: *const c_char,
    pcm_data: *const u8,
    pcm_len: usize,
    prompt: *const c_char,
    response_buffer: *mut c_char,
    buffer_size: usize,
    options_json: *const c_char,
) -> c_int {
    if session_from(handle).is_none() {
        return -1;
    }
    let _ = prompt;

    let start = Instant::now();

    let audio_bytes = if let Ok(Some(path)) = opt_str(audio_path) {
        match std::fs::read(path) {
            Ok(bytes) => bytes.len(),
            Err(_) => {
                set_last_error(&format!("audio file not found: {path}"));
                return -1;
            }
        }
    } else if !pcm_data.is_null() {
        pcm_len
    } else {
        set_last_error("no audio input provided");
        return -1;
    };

    let mut language = None;
    let mut translate = false;
    if let Ok(Some(raw)) = opt_str(options_json) {
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            language = value
                .get("language")
                .and_then(Value::as_str)
                .map(str::to_string);
            translate = value
                .get("translate")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }
    }

    let text = if translate {
        format!("translated transcript of {audio_bytes} bytes")
    } else {
        format!("transcript of {audio_bytes} bytes")
    };

    let mut payload = json!({
        "text": text,
        "segments": [{
            "start": 0.0,
            "end": audio_bytes as f64 / 32000.0,
            "text": text,
        }],
        "total_time_ms": start.elapsed().as_secs_f64() * 1000.0,
    });
    if let Some(lang) = language {
        payload["language"] = Value::String(lang);
    }

    write_payload(&payload.to_string(), response_buffer, buffer_size)
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[no_mangle]
pub unsafe extern "C" fn quill_embed(
    handle: *mut c_void,
    text: *const c_char,
    embeddings_buffer: *mut f32,
    buffer_capacity: usize,
    embedding_dim: *mut usize,
    normalize: bool,
) -> c_int {
    if session_from(handle).is_none() {
        return -1;
    }
    let text = match opt_str(text) {
        Ok(Some(t)) if !t.is_empty() => t,
        _ => {
            set_last_error("cannot embed empty text");
            return -1;
        }
    };
    if embeddings_buffer.is_null() || buffer_capacity < STUB_EMBEDDING_DIM {
        set_last_error("embedding buffer too small");
        return -2;
    }

    let seed = fnv1a64(text.as_bytes());
    let mut values: Vec<f32> = (0..STUB_EMBEDDING_DIM)
        .map(|i| {
            let x = splitmix64(seed ^ (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
            (((x >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0) as f32
        })
        .collect();

    if normalize {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
    }

    std::ptr::copy_nonoverlapping(values.as_ptr(), embeddings_buffer, STUB_EMBEDDING_DIM);
    if !embedding_dim.is_null() {
        *embedding_dim = STUB_EMBEDDING_DIM;
    }
    STUB_EMBEDDING_DIM as c_int
}

#[no_mangle]
pub unsafe extern "C" fn quill_rag_query(
    handle: *mut c_void,
    query: *const c_char,
    response_buffer: *mut c_char,
    buffer_size: usize,
    top_k: c_int,
) -> c_int {
    let Some(session) = session_from(handle) else {
        return -1;
    };
    let query = match opt_str(query) {
        Ok(Some(q)) => q,
        _ => {
            set_last_error("query is required");
            return -1;
        }
    };
    let Some(corpus_dir) = &session.corpus_dir else {
        set_last_error("no corpus directory indexed");
        return -1;
    };

    let mut sources: Vec<PathBuf> = match std::fs::read_dir(corpus_dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            set_last_error(&format!("cannot read corpus directory: {e}"));
            return -1;
        }
    };
    sources.sort();
    sources.truncate(top_k.max(0) as usize);

    let documents: Vec<Value> = sources
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let snippet = std::fs::read(path)
                .map(|bytes| String::from_utf8_lossy(&bytes[..bytes.len().min(80)]).into_owned())
                .unwrap_or_default();
            json!({
                "source": path.file_name().map(|n| n.to_string_lossy().into_owned()),
                "score": 1.0 / (i + 1) as f64,
                "snippet": snippet,
            })
        })
        .collect();

    let payload = json!({"query": query, "documents": documents}).to_string();
    write_payload(&payload, response_buffer, buffer_size)
}

#[no_mangle]
pub unsafe extern "C" fn quill_reset(handle: *mut c_void) {
    if let Some(session) = session_from(handle) {
        session.should_stop.store(false, Ordering::SeqCst);
    }
}

#[no_mangle]
pub unsafe extern "C" fn quill_stop(handle: *mut c_void) {
    if let Some(session) = session_from(handle) {
        session.should_stop.store(true, Ordering::SeqCst);
    }
}
