use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow_array::{Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::stream;
use tokio::sync::Notify;

use crate::engine::errors::EngineError;
use crate::engine::query_engine::{
    BatchStream, Catalog, CatalogFilter, DbSchema, QueryEngine, TableInfo, TableType,
};
use crate::engine::types::Statement;

pub fn int_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
}

pub fn int_batch(values: std::ops::Range<i64>) -> RecordBatch {
    RecordBatch::try_new(
        int_schema(),
        vec![Arc::new(Int64Array::from_iter_values(values))],
    )
    .expect("batch")
}

pub fn int_values(batches: &[RecordBatch]) -> Vec<i64> {
    let mut out: Vec<i64> = batches
        .iter()
        .flat_map(|b| {
            b.column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("int64 column")
                .values()
                .to_vec()
        })
        .collect();
    out.sort_unstable();
    out
}

/// Answers every statement with the same schema and batches.
pub struct ScriptedEngine {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    fail_after: Option<usize>,
    hold: Option<Arc<Notify>>,
    pub executions: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            schema: int_schema(),
            batches,
            fail_after: None,
            hold: None,
            executions: AtomicUsize::new(0),
        }
    }

    /// Yields `n` batches and then an execution error.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// `execute` waits on `gate` before returning.
    pub fn held_by(mut self, gate: Arc<Notify>) -> Self {
        self.hold = Some(gate);
        self
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn describe(&self, _statement: &Statement) -> Result<SchemaRef, EngineError> {
        Ok(self.schema.clone())
    }

    async fn execute(&self, _statement: &Statement) -> Result<BatchStream, EngineError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.hold {
            gate.notified().await;
        }
        let mut items: Vec<Result<RecordBatch, EngineError>> =
            self.batches.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(EngineError::Execution("scripted failure".into())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn catalogs(&self) -> Result<Vec<Catalog>, EngineError> {
        Ok(vec![Catalog {
            catalog_name: "scripted".into(),
        }])
    }

    async fn db_schemas(&self, _filter: &CatalogFilter) -> Result<Vec<DbSchema>, EngineError> {
        Ok(Vec::new())
    }

    async fn tables(&self, _filter: &CatalogFilter) -> Result<Vec<TableInfo>, EngineError> {
        Ok(Vec::new())
    }

    async fn table_types(&self) -> Result<Vec<TableType>, EngineError> {
        Ok(Vec::new())
    }
}

/// Describes fine, fails to execute.
pub struct FailingEngine;

#[async_trait]
impl QueryEngine for FailingEngine {
    async fn describe(&self, _statement: &Statement) -> Result<SchemaRef, EngineError> {
        Ok(int_schema())
    }

    async fn execute(&self, _statement: &Statement) -> Result<BatchStream, EngineError> {
        Err(EngineError::Execution("engine unavailable".into()))
    }

    async fn catalogs(&self) -> Result<Vec<Catalog>, EngineError> {
        Err(EngineError::Execution("engine unavailable".into()))
    }

    async fn db_schemas(&self, _filter: &CatalogFilter) -> Result<Vec<DbSchema>, EngineError> {
        Err(EngineError::Execution("engine unavailable".into()))
    }

    async fn tables(&self, _filter: &CatalogFilter) -> Result<Vec<TableInfo>, EngineError> {
        Err(EngineError::Execution("engine unavailable".into()))
    }

    async fn table_types(&self) -> Result<Vec<TableType>, EngineError> {
        Err(EngineError::Execution("engine unavailable".into()))
    }
}

pub async fn collect_frames(mut frames: crate::shared::response::FrameStream) -> Vec<RecordBatch> {
    use futures::StreamExt;

    let mut bytes = Vec::new();
    while let Some(frame) = frames.next().await {
        bytes.extend_from_slice(&frame.expect("frame"));
    }
    arrow_ipc::reader::StreamReader::try_new(std::io::Cursor::new(bytes), None)
        .expect("arrow stream")
        .collect::<Result<Vec<_>, _>>()
        .expect("batches")
}

/// Polls until the result set leaves `in-progress`.
pub async fn wait_terminal(
    service: &crate::engine::GlideService,
    handle: &str,
) -> crate::engine::types::ResultSet {
    for _ in 0..400 {
        let rs = service.result_set(handle).expect("result set");
        if rs.status.is_terminal() {
            return rs;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("result set {handle} never finished");
}
