use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::engine::errors::RegistryError;
use crate::engine::registry::{ResultSetRegistry, RetentionPolicy};
use crate::engine::types::{Endpoint, ExecutionFailure, FailureKind, ResultStatus};
use crate::logging::init_for_tests;

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]))
}

#[test]
fn create_starts_in_progress_without_endpoints() {
    init_for_tests();
    let registry = ResultSetRegistry::default();

    let result_set = registry.create("h1", schema()).expect("create");

    assert_eq!(result_set.status, ResultStatus::InProgress);
    assert!(result_set.endpoints().is_empty());
    assert_eq!(result_set.schema, schema());
    assert_eq!(registry.len(), 1);
}

#[test]
fn get_unknown_handle_is_not_found() {
    init_for_tests();
    let registry = ResultSetRegistry::default();

    let err = registry.get("nope").expect_err("unknown");

    assert!(matches!(err, RegistryError::UnknownHandle(h) if h == "nope"));
}

#[test]
fn duplicate_handle_is_rejected() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("h1", schema()).expect("create");

    let err = registry.create("h1", schema()).expect_err("duplicate");

    assert!(matches!(err, RegistryError::DuplicateHandle(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn endpoints_are_observed_in_append_order_and_never_change() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("h1", schema()).expect("create");

    registry
        .append_endpoint("h1", Endpoint::resolver("t1"))
        .expect("append t1");
    let first_poll = registry.get("h1").expect("get").endpoints().to_vec();

    registry
        .append_endpoint("h1", Endpoint::resolver("t2"))
        .expect("append t2");
    registry
        .append_endpoint("h1", Endpoint::external("t3", "http://example/t3"))
        .expect("append t3");
    let second_poll = registry.get("h1").expect("get").endpoints().to_vec();

    assert_eq!(first_poll.len(), 1);
    assert_eq!(second_poll.len(), 3);
    assert_eq!(second_poll[..first_poll.len()], first_poll[..]);
    let tickets: Vec<_> = second_poll.iter().map(|e| e.ticket.as_str()).collect();
    assert_eq!(tickets, vec!["t1", "t2", "t3"]);
}

#[test]
fn complete_seals_endpoints() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("h1", schema()).expect("create");
    registry
        .append_endpoint("h1", Endpoint::resolver("t1"))
        .expect("append");

    let completed = registry.complete("h1").expect("complete");
    assert_eq!(completed.status, ResultStatus::Completed);

    let err = registry
        .append_endpoint("h1", Endpoint::resolver("t2"))
        .expect_err("sealed");
    assert!(matches!(err, RegistryError::Sealed { .. }));
    assert_eq!(registry.get("h1").expect("get").endpoints().len(), 1);
}

#[test]
fn complete_is_idempotent() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("h1", schema()).expect("create");

    registry.complete("h1").expect("first complete");
    let again = registry.complete("h1").expect("second complete");

    assert_eq!(again.status, ResultStatus::Completed);
}

#[test]
fn terminal_states_cannot_be_left() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("done", schema()).expect("create");
    registry.create("broken", schema()).expect("create");
    registry.complete("done").expect("complete");
    registry
        .fail("broken", ExecutionFailure::new(FailureKind::Engine, "boom"))
        .expect("fail");

    let err = registry
        .fail("done", ExecutionFailure::new(FailureKind::Engine, "late"))
        .expect_err("completed -> failed");
    assert!(matches!(
        err,
        RegistryError::InvalidTransition {
            from: ResultStatus::Completed,
            to: ResultStatus::Failed,
            ..
        }
    ));

    let err = registry.complete("broken").expect_err("failed -> completed");
    assert!(matches!(
        err,
        RegistryError::InvalidTransition {
            from: ResultStatus::Failed,
            to: ResultStatus::Completed,
            ..
        }
    ));
}

#[test]
fn failed_result_set_hides_endpoints_and_keeps_reason() {
    init_for_tests();
    let registry = ResultSetRegistry::default();
    registry.create("h1", schema()).expect("create");
    registry
        .append_endpoint("h1", Endpoint::resolver("t1"))
        .expect("append");

    registry
        .fail("h1", ExecutionFailure::new(FailureKind::Engine, "disk on fire"))
        .expect("fail");

    let result_set = registry.get("h1").expect("get");
    assert_eq!(result_set.status, ResultStatus::Failed);
    assert!(result_set.endpoints().is_empty());
    assert!(result_set.summary().endpoints.is_empty());
    let error = result_set.error.expect("error recorded");
    assert_eq!(error.kind, FailureKind::Engine);
    assert_eq!(error.message, "disk on fire");
}

#[test]
fn lru_policy_evicts_oldest_terminal_entries_only() {
    init_for_tests();
    let registry = ResultSetRegistry::new(RetentionPolicy::Lru(NonZeroUsize::new(2).unwrap()));

    registry.create("running", schema()).expect("create");
    registry.create("a", schema()).expect("create");
    registry.complete("a").expect("complete");
    registry.create("b", schema()).expect("create");
    registry.complete("b").expect("complete");
    registry.create("c", schema()).expect("create");

    // "running" is older than "a" but still in progress, so "a" goes first.
    assert!(registry.get("running").is_ok());
    assert!(matches!(
        registry.get("a"),
        Err(RegistryError::UnknownHandle(_))
    ));
    assert!(registry.get("c").is_ok());
}

#[test]
fn idle_policy_expires_terminal_entries() {
    init_for_tests();
    let registry = ResultSetRegistry::new(RetentionPolicy::Idle(Duration::from_millis(20)));
    registry.create("done", schema()).expect("create");
    registry.complete("done").expect("complete");
    registry.create("running", schema()).expect("create");

    std::thread::sleep(Duration::from_millis(40));

    assert!(matches!(
        registry.get("done"),
        Err(RegistryError::UnknownHandle(_))
    ));
    assert_eq!(
        registry.get("running").expect("in-progress entries are kept").status,
        ResultStatus::InProgress
    );
}

#[test]
fn concurrent_readers_see_whole_endpoints() {
    init_for_tests();
    let registry = Arc::new(ResultSetRegistry::default());
    registry.create("h1", schema()).expect("create");

    let writer = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || {
            for i in 0..200 {
                registry
                    .append_endpoint("h1", Endpoint::resolver(format!("t{i}")))
                    .expect("append");
            }
            registry.complete("h1").expect("complete");
        })
    };

    let mut last_len = 0;
    loop {
        let snapshot = registry.get("h1").expect("get");
        let endpoints = snapshot.endpoints();
        assert!(endpoints.len() >= last_len);
        for (i, endpoint) in endpoints.iter().enumerate() {
            assert_eq!(endpoint.ticket, format!("t{i}"));
            assert_eq!(endpoint.locations, vec![String::new()]);
        }
        last_len = endpoints.len();
        if snapshot.status == ResultStatus::Completed {
            break;
        }
    }
    writer.join().expect("writer");
    assert_eq!(last_len, 200);
}
