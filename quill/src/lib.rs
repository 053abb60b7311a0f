//! Safe, idiomatic Rust SDK for the quill on-device inference engine.
//!
//! This crate provides safe wrappers around the low-level FFI bindings in
//! `quill-sys`, offering RAII-based resource management and Result-based
//! error handling for text completion, speech transcription, text
//! embedding, and retrieval-augmented queries.
//!
//! # Example
//!
//! ```no_run
//! use quill::{CompletionOptions, Message, Session};
//!
//! let session = Session::create("path/to/model.bin", None)?;
//! let messages = vec![
//!     Message::system("You are a helpful assistant."),
//!     Message::user("Hello!"),
//! ];
//! let result = session.complete(&messages, &CompletionOptions::default())?;
//! println!("{} ({} tokens)", result.text, result.completion_tokens);
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! # Streaming
//!
//! ```no_run
//! use std::sync::Arc;
//! use quill::{CompletionOptions, Message, Session, WorkerPool};
//!
//! let pool = WorkerPool::new(2);
//! let session = Arc::new(Session::create("path/to/model.bin", None)?);
//! let stream = session.clone().complete_stream(
//!     &pool,
//!     vec![Message::user("Tell me a story.")],
//!     CompletionOptions::default(),
//! );
//! for event in stream {
//!     print!("{}", event?.text);
//! }
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! # Ownership model
//!
//! A [`Session`] exclusively owns one opaque engine handle and releases it
//! on close or drop. Sessions are not clonable; share one across threads
//! with `Arc` — calls are serialized internally, matching the engine's
//! one-call-at-a-time contract.

pub mod completion;
pub mod error;
pub mod session;
pub mod task;
pub mod telemetry;
pub mod transcription;

pub use completion::{CompletionOptions, CompletionResult, Message, Role};
pub use error::{last_error_message, Error};
pub use session::Session;
pub use task::{TaskHandle, TokenEvent, TokenStream, WorkerPool};
pub use telemetry::{set_pro_key, set_telemetry_token};
pub use transcription::{TranscriptionOptions, TranscriptionResult};

pub type Result<T> = std::result::Result<T, Error>;
