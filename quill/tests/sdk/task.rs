//! Background adapter tests: worker pool, task handles, and thread
//! hand-off.

use std::sync::Arc;
use std::time::Duration;

use crate::sdk::common::TestEngine;
use quill::{CompletionOptions, Message, WorkerPool};

/// A background task delivers the same result as the blocking call.
#[test]
fn embed_task_delivers_result() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(2);
    let session = Arc::new(engine.session());

    let handle = session
        .clone()
        .embed_task(&pool, "hello world".into(), true);
    let background = handle.wait().expect("background embed failed");
    let blocking = session.embed("hello world", true).expect("embed failed");
    assert_eq!(background, blocking);
}

/// Jobs run on a worker thread, not the caller's.
#[test]
fn jobs_run_off_the_caller_thread() {
    let pool = WorkerPool::new(1);
    let caller = std::thread::current().id();
    let worker = pool
        .submit(move || Ok(std::thread::current().id()))
        .wait()
        .expect("job failed");
    assert_ne!(caller, worker);
}

/// try_wait polls without blocking and eventually observes the result.
#[test]
fn try_wait_polls_in_flight_tasks() {
    let pool = WorkerPool::new(1);
    let handle = pool.submit(|| {
        std::thread::sleep(Duration::from_millis(100));
        Ok(42)
    });
    assert!(handle.try_wait().is_none(), "task resolved too early");

    std::thread::sleep(Duration::from_millis(300));
    match handle.try_wait() {
        Some(Ok(n)) => assert_eq!(n, 42),
        other => panic!("expected completed task, got {other:?}"),
    }
}

/// Dropping the pool drains queued jobs and joins the workers; handles
/// obtained before the drop still deliver.
#[test]
fn pool_drop_drains_queued_jobs() {
    let pool = WorkerPool::new(1);
    let handles: Vec<_> = (0..4usize).map(|i| pool.submit(move || Ok(i))).collect();
    drop(pool);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().expect("job failed"), i);
    }
}

/// Completion and retrieval tasks resolve against a shared session.
#[test]
fn completion_and_rag_tasks_share_a_session() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(2);
    let session = Arc::new(engine.session_with_corpus());

    let completion = session.clone().complete_task(
        &pool,
        vec![Message::user("background hello")],
        CompletionOptions::default(),
    );
    let retrieval = session.clone().rag_query_task(&pool, "notes".into(), 3);

    let result = completion.wait().expect("completion task failed");
    assert_eq!(result.text, "echo: background hello");

    let value = retrieval.wait().expect("retrieval task failed");
    assert_eq!(value["documents"].as_array().expect("array").len(), 3);
}

/// A task against a session that closes afterwards still resolved from a
/// live handle; a task submitted after close fails with ClosedSession.
#[test]
fn tasks_after_close_fail_closed() {
    let engine = TestEngine::new();
    let pool = WorkerPool::new(1);
    let session = Arc::new(engine.session());

    let ok = session
        .clone()
        .complete_task(&pool, vec![Message::user("hi")], CompletionOptions::default())
        .wait();
    assert!(ok.is_ok());

    // Arc holds the session open; emulate teardown via a fresh session
    // that is closed before submission.
    let mut closing = engine.session();
    closing.close();
    let closed = Arc::new(closing);
    let failed = closed
        .complete_task(&pool, vec![Message::user("hi")], CompletionOptions::default())
        .wait();
    assert!(matches!(failed, Err(quill::Error::ClosedSession)));
}
