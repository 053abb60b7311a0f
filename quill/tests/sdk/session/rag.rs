//! Retrieval query tests against a corpus indexed at session creation.

use crate::sdk::common::TestEngine;
use quill::Error;

/// A retrieval query returns the engine's document list as a generic
/// JSON tree.
#[test]
fn rag_query_returns_documents() {
    let engine = TestEngine::new();
    let session = engine.session_with_corpus();

    let value = session.rag_query("embeddings", 5).expect("query failed");
    let documents = value["documents"].as_array().expect("documents array");
    assert_eq!(documents.len(), 3);
    for doc in documents {
        assert!(doc["source"].is_string());
        assert!(doc["score"].is_number());
    }
}

/// Sequential queries with top_k 5 then 0 both succeed; the second
/// returns an empty result set.
#[test]
fn top_k_zero_returns_empty_result_set() {
    let engine = TestEngine::new();
    let session = engine.session_with_corpus();

    let first = session.rag_query("retrieval", 5).expect("first query failed");
    assert!(!first["documents"].as_array().expect("array").is_empty());

    let second = session.rag_query("retrieval", 0).expect("second query failed");
    assert!(second["documents"].as_array().expect("array").is_empty());
}

/// top_k caps the number of returned documents.
#[test]
fn top_k_caps_documents() {
    let engine = TestEngine::new();
    let session = engine.session_with_corpus();

    let value = session.rag_query("notes", 2).expect("query failed");
    assert_eq!(value["documents"].as_array().expect("array").len(), 2);
}

/// Querying a session created without a corpus is a typed failure.
#[test]
fn query_without_corpus_fails() {
    let engine = TestEngine::new();
    let session = engine.session();

    match session.rag_query("anything", 5) {
        Err(Error::Completion(msg)) => assert!(msg.contains("corpus"), "got: {msg}"),
        other => panic!("expected retrieval failure, got {other:?}"),
    }
}
