//! Streaming callback bridge and token stream tests.
//!
//! Validates: one callback invocation per token, generation order, no
//! invocations after the call returns, and the call-scoped token stream.

use std::sync::Arc;

use crate::sdk::common::TestEngine;
use quill::{CompletionOptions, Message, WorkerPool};

/// The callback fires exactly once per generated token, in generation
/// order, and the collected fragments reassemble the final text.
#[test]
fn callback_fires_once_per_token_in_order() {
    let engine = TestEngine::new();
    let session = engine.session();

    let mut tokens: Vec<(String, u32)> = Vec::new();
    let mut on_token = |text: &str, id: u32| tokens.push((text.to_string(), id));

    let result = session
        .complete_with(
            &[Message::user("a b c d e")],
            &CompletionOptions::default(),
            None,
            Some(&mut on_token),
        )
        .expect("completion failed");

    assert_eq!(tokens.len(), result.completion_tokens as usize);
    let joined: String = tokens.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(joined, result.text);
    for window in tokens.windows(2) {
        assert!(window[0].1 < window[1].1, "token ids out of order");
    }
}

/// Without a callback the engine performs the same work.
#[test]
fn no_callback_still_completes() {
    let engine = TestEngine::new();
    let session = engine.session();
    let result = session
        .complete_text("quiet run", &CompletionOptions::default())
        .expect("completion failed");
    assert_eq!(result.text, "echo: quiet run");
}

/// The token stream yields every token, then terminates.
#[test]
fn stream_yields_all_tokens_then_ends() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(1);
    let session = Arc::new(engine.session());

    let stream = session.clone().complete_stream(
        &pool,
        vec![Message::user("stream me please")],
        CompletionOptions::default(),
    );

    let events: Vec<_> = stream.collect::<Result<Vec<_>, _>>().expect("stream failed");
    let joined: String = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(joined, "echo: stream me please");
}

/// A failed call surfaces exactly one terminal error on the stream.
#[test]
fn stream_failure_is_terminal() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(1);
    let session = Arc::new(engine.session());

    let mut stream =
        session
            .clone()
            .complete_stream(&pool, Vec::new(), CompletionOptions::default());

    let first = stream.next().expect("expected a terminal item");
    assert!(first.is_err());
    assert!(stream.next().is_none(), "stream must end after the error");
}

/// stop() during a streamed completion aborts generation early.
#[test]
fn stop_during_stream_truncates_generation() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(1);
    let session = Arc::new(engine.session());

    let long_prompt = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let mut stream = session.clone().complete_stream(
        &pool,
        vec![Message::user(long_prompt)],
        CompletionOptions::default(),
    );

    let first = stream.next().expect("expected at least one token");
    assert!(first.is_ok());
    session.stop().expect("stop failed");

    let mut count = 1;
    for event in stream {
        event.expect("unexpected stream error");
        count += 1;
    }
    assert!(count < 101, "stop did not truncate generation: {count} tokens");
}

/// Dropping a stream mid-generation stops delivery but leaves the session
/// usable for the next call.
#[test]
fn dropped_stream_leaves_session_usable() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(1);
    let session = Arc::new(engine.session());

    let long_prompt = (0..20).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let mut stream = session.clone().complete_stream(
        &pool,
        vec![Message::user(long_prompt)],
        CompletionOptions::default(),
    );
    assert!(stream.next().expect("expected a token").is_ok());
    drop(stream);

    let result = session
        .complete_text("after drop", &CompletionOptions::default())
        .expect("session unusable after dropped stream");
    assert_eq!(result.text, "echo: after drop");
}
