//! Background execution for the blocking engine calls.
//!
//! The engine blocks the calling thread for the full duration of every
//! operation, including streaming callbacks. This module moves those calls
//! onto a small worker pool and hands the caller a completion channel:
//! explicit task submission rather than language-level coroutines, so the
//! blocking call and its thread affinity stay visible.
//!
//! Cancellation is delivery-side only. Dropping a [`TaskHandle`] or a
//! [`TokenStream`] stops results from reaching the caller but does not halt
//! the native computation — only [`Session::stop`] signals the engine.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};

use crate::completion::{CompletionOptions, CompletionResult, Message};
use crate::error::Error;
use crate::session::Session;
use crate::transcription::{TranscriptionOptions, TranscriptionResult};
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads executing blocking engine calls.
///
/// Dropping the pool disconnects the job queue, lets the workers drain
/// what is already queued, and joins them.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..threads)
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("quill-worker-{i}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        log::debug!("started worker pool with {threads} threads");
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Submits a blocking job. The returned handle resolves when the job
    /// completes or fails.
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let boxed: Job = Box::new(move || {
            let _ = tx.send(job());
        });
        if let Some(sender) = &self.sender {
            let _ = sender.send(boxed);
        }
        TaskHandle { receiver: rx }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Completion channel for one background call.
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the background call delivers its result.
    pub fn wait(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(Error::WorkerExited),
        }
    }

    /// Polls without blocking. Returns `None` while the call is in flight.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::WorkerExited)),
        }
    }
}

/// One streamed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEvent {
    pub text: String,
    pub token_id: u32,
}

enum StreamItem {
    Token(TokenEvent),
    Failed(Error),
}

/// Lazy, call-scoped sequence of token events from one streamed completion.
///
/// Finite: ends when the underlying call returns or, after yielding the
/// terminal error, when it fails. Not restartable — a new call must be
/// issued to regenerate.
pub struct TokenStream {
    receiver: Receiver<StreamItem>,
    failed: bool,
}

impl Iterator for TokenStream {
    type Item = Result<TokenEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.receiver.recv() {
            Ok(StreamItem::Token(event)) => Some(Ok(event)),
            Ok(StreamItem::Failed(error)) => {
                self.failed = true;
                Some(Err(error))
            }
            Err(_) => None,
        }
    }
}

impl Session {
    /// Non-blocking [`Session::complete`].
    pub fn complete_task(
        self: Arc<Self>,
        pool: &WorkerPool,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> TaskHandle<CompletionResult> {
        pool.submit(move || self.complete(&messages, &options))
    }

    /// Streamed completion: tokens arrive as they are generated, in
    /// generation order, while a worker thread runs the blocking call.
    pub fn complete_stream(
        self: Arc<Self>,
        pool: &WorkerPool,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> TokenStream {
        let (tx, rx) = unbounded();
        let sender = tx.clone();
        let _done: TaskHandle<()> = pool.submit(move || {
            let mut on_token = |text: &str, token_id: u32| {
                let _ = sender.send(StreamItem::Token(TokenEvent {
                    text: text.to_string(),
                    token_id,
                }));
            };
            if let Err(error) = self.complete_with(&messages, &options, None, Some(&mut on_token)) {
                let _ = tx.send(StreamItem::Failed(error));
            }
            Ok(())
        });
        TokenStream {
            receiver: rx,
            failed: false,
        }
    }

    /// Non-blocking [`Session::transcribe_file`].
    pub fn transcribe_file_task(
        self: Arc<Self>,
        pool: &WorkerPool,
        audio_path: String,
        prompt: Option<String>,
        options: TranscriptionOptions,
    ) -> TaskHandle<TranscriptionResult> {
        pool.submit(move || self.transcribe_file(&audio_path, prompt.as_deref(), &options))
    }

    /// Non-blocking [`Session::transcribe_pcm`].
    pub fn transcribe_pcm_task(
        self: Arc<Self>,
        pool: &WorkerPool,
        pcm: Vec<u8>,
        prompt: Option<String>,
        options: TranscriptionOptions,
    ) -> TaskHandle<TranscriptionResult> {
        pool.submit(move || self.transcribe_pcm(&pcm, prompt.as_deref(), &options))
    }

    /// Non-blocking [`Session::embed`].
    pub fn embed_task(
        self: Arc<Self>,
        pool: &WorkerPool,
        text: String,
        normalize: bool,
    ) -> TaskHandle<Vec<f32>> {
        pool.submit(move || self.embed(&text, normalize))
    }

    /// Non-blocking [`Session::rag_query`].
    pub fn rag_query_task(
        self: Arc<Self>,
        pool: &WorkerPool,
        query: String,
        top_k: u32,
    ) -> TaskHandle<serde_json::Value> {
        pool.submit(move || self.rag_query(&query, top_k))
    }
}
