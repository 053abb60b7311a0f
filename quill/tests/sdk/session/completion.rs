//! Blocking completion tests: marshaling, result fields, error payloads,
//! tool passthrough, and same-session serialization.

use std::sync::Arc;

use crate::sdk::common::TestEngine;
use quill::{CompletionOptions, Error, Message};
use serde_json::{json, Map, Value};

/// A plain prompt returns non-empty text and positive token counts.
#[test]
fn complete_returns_text_and_counts() {
    let engine = TestEngine::new();
    let session = engine.session();

    let result = session
        .complete_text("Hello there", &CompletionOptions::default())
        .expect("completion failed");

    assert_eq!(result.text, "echo: Hello there");
    assert!(result.completion_tokens > 0);
    assert!(result.prompt_tokens > 0);
    assert!(!result.needs_cloud_handoff);
}

/// Conversation order is preserved: the reply tracks the latest user turn.
#[test]
fn complete_uses_latest_turn() {
    let engine = TestEngine::new();
    let session = engine.session();

    let messages = vec![
        Message::system("Be terse."),
        Message::user("first question"),
        Message::assistant("first answer"),
        Message::user("second question"),
    ];
    let result = session
        .complete(&messages, &CompletionOptions::default())
        .expect("completion failed");
    assert!(result.text.contains("second question"));
}

/// An `error` field in the response payload is surfaced as a typed
/// failure even though the native status code reported success.
#[test]
fn error_payload_surfaces_as_completion_error() {
    let engine = TestEngine::new();
    let session = engine.session();

    match session.complete(&[], &CompletionOptions::default()) {
        Err(Error::Completion(msg)) => assert!(msg.contains("no messages"), "got: {msg}"),
        other => panic!("expected completion failure, got {other:?}"),
    }
}

/// max_tokens caps the number of generated tokens.
#[test]
fn max_tokens_truncates_generation() {
    let engine = TestEngine::new();
    let session = engine.session();

    let options = CompletionOptions {
        max_tokens: 3,
        ..CompletionOptions::default()
    };
    let result = session
        .complete_text("one two three four five six", &options)
        .expect("completion failed");
    assert_eq!(result.completion_tokens, 3);
}

/// A stop sequence halts generation before the matching token.
#[test]
fn stop_sequence_halts_generation() {
    let engine = TestEngine::new();
    let session = engine.session();

    let options = CompletionOptions {
        stop_sequences: vec!["HALT".into()],
        ..CompletionOptions::default()
    };
    let result = session
        .complete_text("alpha beta HALT gamma", &options)
        .expect("completion failed");
    assert!(!result.text.contains("HALT"), "got: {}", result.text);
    assert!(result.text.contains("beta"));
}

/// Tool definitions pass through as opaque generic records and come back
/// as function_calls on the result.
#[test]
fn tools_round_trip_into_function_calls() {
    let engine = TestEngine::new();
    let session = engine.session();

    let tool: Map<String, Value> = json!({
        "name": "search",
        "description": "Search the corpus",
        "parameters": {"type": "object", "properties": {"q": {"type": "string"}}},
    })
    .as_object()
    .cloned()
    .expect("tool literal is an object");

    let result = session
        .complete_with(
            &[Message::user("look this up")],
            &CompletionOptions::default(),
            Some(&[tool]),
            None,
        )
        .expect("completion failed");

    let calls = result.function_calls.expect("expected function calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["name"], "search");
    assert!(calls[0]["arguments"].is_object());
}

/// A confidence threshold above the engine's reported confidence requests
/// cloud handoff.
#[test]
fn confidence_threshold_triggers_cloud_handoff() {
    let engine = TestEngine::new();
    let session = engine.session();

    let options = CompletionOptions {
        confidence_threshold: 0.99,
        ..CompletionOptions::default()
    };
    let result = session
        .complete_text("hard question", &options)
        .expect("completion failed");
    assert!(result.needs_cloud_handoff);
    assert!(result.confidence < 0.99);
}

/// Two sequential completions on one session both succeed.
#[test]
fn sequential_completions_share_a_session() {
    let engine = TestEngine::new();
    let session = engine.session();

    let options = CompletionOptions::default();
    let first = session.complete_text("one", &options).expect("first call");
    let second = session.complete_text("two", &options).expect("second call");
    assert_eq!(first.text, "echo: one");
    assert_eq!(second.text, "echo: two");
}

/// Concurrent callers on a shared session are serialized by the call
/// guard; both complete successfully.
#[test]
fn shared_session_serializes_concurrent_calls() {
    let engine = TestEngine::new();
    let session = Arc::new(engine.session());

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let session = Arc::clone(&session);
                scope.spawn(move || {
                    session.complete_text(&format!("caller {i}"), &CompletionOptions::default())
                })
            })
            .collect();
        for handle in handles {
            let result = handle.join().expect("thread panicked");
            assert!(result.is_ok());
        }
    });
}
