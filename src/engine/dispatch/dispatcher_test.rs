use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arrow_array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tokio::sync::Notify;

use crate::engine::GlideService;
use crate::engine::dispatch::Dispatch;
use crate::engine::errors::GlideError;
use crate::engine::export::{ObjectStoreResultStore, SignedUrl, UrlSigner};
use crate::engine::query_engine::QueryEngine;
use crate::engine::query_engine::test_support::{
    FailingEngine, ScriptedEngine, collect_frames, int_batch, int_values, wait_terminal,
};
use crate::engine::types::{FailureKind, PreferredFormat, Query, QueryType, ResultStatus};
use crate::logging::init_for_tests;
use crate::shared::ids::SequentialIds;

fn store() -> Arc<ObjectStoreResultStore> {
    Arc::new(ObjectStoreResultStore::in_memory(UrlSigner::new(
        "secret",
        "http://localhost:8000",
    )))
}

fn service(engine: Arc<dyn QueryEngine>, partition_rows: usize) -> GlideService {
    GlideService::builder(engine, store())
        .ids(Arc::new(SequentialIds::new("id")))
        .partition_rows(partition_rows)
        .build()
}

fn three_batches() -> Vec<RecordBatch> {
    vec![int_batch(0..4), int_batch(4..5), int_batch(5..10)]
}

async fn drain_deferred(service: &GlideService, handle: &str) -> Vec<RecordBatch> {
    let rs = wait_terminal(service, handle).await;
    assert_eq!(rs.status, ResultStatus::Completed);
    let mut batches = Vec::new();
    for endpoint in rs.endpoints() {
        assert!(endpoint.is_resolver());
        let (_, frames) = service.get_stream(&endpoint.ticket).expect("stream");
        batches.extend(collect_frames(frames).await);
    }
    batches
}

#[tokio::test]
async fn direct_mode_streams_inline_and_completes_registry_entry() {
    init_for_tests();
    let service = service(Arc::new(ScriptedEngine::new(three_batches())), 0);

    let Dispatch::Direct { handle, frames, .. } = service
        .submit_query(&Query::sql("SELECT v").with_direct(true))
        .await
        .expect("submit")
    else {
        panic!("expected direct dispatch");
    };

    assert_eq!(
        service.result_set(&handle).unwrap().status,
        ResultStatus::InProgress
    );
    let batches = collect_frames(frames).await;
    assert_eq!(int_values(&batches), (0..10).collect::<Vec<_>>());

    let rs = service.result_set(&handle).unwrap();
    assert_eq!(rs.status, ResultStatus::Completed);
    assert!(rs.endpoints().is_empty());
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test]
async fn deferred_stream_returns_in_progress_then_one_resolver_endpoint() {
    init_for_tests();
    let service = service(Arc::new(ScriptedEngine::new(three_batches())), 0);

    let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
    else {
        panic!("expected deferred dispatch");
    };
    assert_eq!(rs.status, ResultStatus::InProgress);
    assert!(rs.endpoints().is_empty());

    let done = wait_terminal(&service, &rs.handle).await;
    assert_eq!(done.endpoints().len(), 1);
    let batches = drain_deferred(&service, &rs.handle).await;
    assert_eq!(int_values(&batches), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn direct_and_deferred_deliver_the_same_rows() {
    init_for_tests();
    for partition_rows in [0, 3] {
        let service = service(Arc::new(ScriptedEngine::new(three_batches())), partition_rows);

        let Dispatch::Direct { frames, .. } = service
            .submit_query(&Query::sql("SELECT v").with_direct(true))
            .await
            .unwrap()
        else {
            panic!("expected direct dispatch");
        };
        let direct = int_values(&collect_frames(frames).await);

        let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
        else {
            panic!("expected deferred dispatch");
        };
        let deferred = int_values(&drain_deferred(&service, &rs.handle).await);

        assert_eq!(direct, deferred, "partition_rows={partition_rows}");
    }
}

#[tokio::test]
async fn partitioned_stream_appends_endpoints_in_order() {
    init_for_tests();
    let service = service(Arc::new(ScriptedEngine::new(three_batches())), 4);

    let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
    else {
        panic!("expected deferred dispatch");
    };
    let done = wait_terminal(&service, &rs.handle).await;
    let tickets: Vec<&str> = done.endpoints().iter().map(|e| e.ticket.as_str()).collect();
    // 10 rows at 4 per partition.
    assert_eq!(tickets.len(), 3);

    let mut sizes = Vec::new();
    for ticket in tickets {
        let (_, frames) = service.get_stream(ticket).unwrap();
        sizes.push(collect_frames(frames).await.iter().map(|b| b.num_rows()).sum::<usize>());
    }
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[tokio::test]
async fn deferred_bulk_file_appends_signed_url() {
    init_for_tests();
    let store = store();
    let service = GlideService::builder(Arc::new(ScriptedEngine::new(three_batches())), store.clone())
        .ids(Arc::new(SequentialIds::new("id")))
        .build();

    let query = Query::sql("SELECT v").with_format(PreferredFormat::BulkFile);
    let Dispatch::Deferred(rs) = service.submit_query(&query).await.unwrap() else {
        panic!("expected deferred dispatch");
    };
    assert!(rs.endpoints().is_empty());

    let done = wait_terminal(&service, &rs.handle).await;
    assert_eq!(done.status, ResultStatus::Completed);
    assert_eq!(done.endpoints().len(), 1);
    let endpoint = &done.endpoints()[0];
    assert!(!endpoint.is_resolver());
    assert!(service.get_stream(&endpoint.ticket).is_err());

    let url = &endpoint.locations[0];
    let (_, query) = url.split_once('?').unwrap();
    let key = url
        .split_once("/objects/")
        .unwrap()
        .1
        .split_once('?')
        .unwrap()
        .0;
    let mut signed = SignedUrl {
        key: key.to_string(),
        expires: 0,
        signature: String::new(),
    };
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", v)) => signed.expires = v.parse().unwrap(),
            Some(("signature", v)) => signed.signature = v.to_string(),
            _ => {}
        }
    }
    let bytes: Bytes = store.open_signed(&signed).await.expect("object");
    let batches: Vec<RecordBatch> = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .unwrap()
        .build()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(int_values(&batches), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn mid_stream_failure_fails_result_set_without_endpoints() {
    init_for_tests();
    for partition_rows in [0, 2] {
        let service = service(
            Arc::new(ScriptedEngine::new(three_batches()).failing_after(1)),
            partition_rows,
        );

        let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
        else {
            panic!("expected deferred dispatch");
        };
        let done = wait_terminal(&service, &rs.handle).await;

        assert_eq!(done.status, ResultStatus::Failed, "partition_rows={partition_rows}");
        assert!(done.endpoints().is_empty());
        let failure = done.error.expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::Engine);
        assert!(failure.message.contains("scripted failure"));
    }
}

#[tokio::test]
async fn partitions_published_before_a_failure_stop_resolving() {
    init_for_tests();
    let service = service(
        Arc::new(ScriptedEngine::new(three_batches()).failing_after(1)),
        2,
    );

    let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
    else {
        panic!("expected deferred dispatch");
    };
    assert_eq!(rs.handle, "id-1");
    let done = wait_terminal(&service, &rs.handle).await;
    assert_eq!(done.status, ResultStatus::Failed);

    // The first batch filled two partitions, published as id-2 and id-3.
    for ticket in ["id-2", "id-3"] {
        assert!(matches!(
            service.get_stream(ticket).err(),
            Some(GlideError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn execution_error_fails_deferred_and_direct() {
    init_for_tests();
    let service = service(Arc::new(FailingEngine), 0);

    let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
    else {
        panic!("expected deferred dispatch");
    };
    assert_eq!(
        wait_terminal(&service, &rs.handle).await.status,
        ResultStatus::Failed
    );

    let err = service
        .submit_query(&Query::sql("SELECT v").with_direct(true))
        .await
        .err()
        .expect("direct failure");
    assert!(matches!(err, GlideError::EngineFailure(_)));
    // Both submissions were registered; both ended failed.
    assert_eq!(service.registry().len(), 2);
}

#[tokio::test]
async fn malformed_plan_is_rejected_before_registration() {
    init_for_tests();
    let engine = Arc::new(ScriptedEngine::new(three_batches()));
    let service = service(engine.clone(), 0);

    for payload in ["", "not-hex"] {
        let query = Query {
            query: payload.into(),
            query_type: QueryType::Plan,
            allow_direct: false,
            preferred_format: PreferredFormat::Stream,
        };
        let err = service.submit_query(&query).await.err().expect("rejected");
        assert!(matches!(err, GlideError::InvalidRequest(_)));
    }
    let err = service
        .submit_query(&Query::sql("   "))
        .await
        .err()
        .expect("rejected");
    assert!(matches!(err, GlideError::InvalidRequest(_)));

    assert!(service.registry().is_empty());
    assert_eq!(engine.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_prepared_handle_is_not_found() {
    init_for_tests();
    let service = service(Arc::new(ScriptedEngine::new(three_batches())), 0);
    let query = Query {
        query: "ps-missing".into(),
        query_type: QueryType::Prepared,
        allow_direct: true,
        preferred_format: PreferredFormat::Stream,
    };
    let err = service.submit_query(&query).await.err().expect("rejected");
    assert!(matches!(err, GlideError::NotFound(_)));
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn dropping_direct_stream_marks_cancelled() {
    init_for_tests();
    let service = service(Arc::new(ScriptedEngine::new(three_batches())), 0);

    let Dispatch::Direct { handle, frames, .. } = service
        .submit_query(&Query::sql("SELECT v").with_direct(true))
        .await
        .unwrap()
    else {
        panic!("expected direct dispatch");
    };
    drop(frames);

    let rs = service.result_set(&handle).unwrap();
    assert_eq!(rs.status, ResultStatus::Failed);
    assert_eq!(rs.error.unwrap().kind, FailureKind::Cancelled);
    assert_eq!(service.in_flight(), 0);
}

#[tokio::test]
async fn held_execution_can_be_cancelled() {
    init_for_tests();
    let gate = Arc::new(Notify::new());
    let service = service(
        Arc::new(ScriptedEngine::new(three_batches()).held_by(gate.clone())),
        0,
    );

    let Dispatch::Deferred(rs) = service.submit_query(&Query::sql("SELECT v")).await.unwrap()
    else {
        panic!("expected deferred dispatch");
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.in_flight(), 1);

    let cancelled = service.cancel(&rs.handle).await.expect("cancel");
    assert_eq!(cancelled.status, ResultStatus::Failed);
    assert_eq!(cancelled.error.unwrap().kind, FailureKind::Cancelled);
    assert!(matches!(
        service.cancel(&rs.handle).await,
        Err(GlideError::Conflict(_))
    ));
    gate.notify_one();
}
