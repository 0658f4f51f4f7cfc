use std::sync::Arc;

use arrow_schema::SchemaRef;
use arrow_array::RecordBatch;
use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::channels::StreamChannelStore;
use crate::engine::dispatch::partition::Partitioner;
use crate::engine::dispatch::task::{TaskSlot, TaskTracker};
use crate::engine::errors::{ExportError, GlideError};
use crate::engine::export::BulkExporter;
use crate::engine::prepared::PreparedStatementStore;
use crate::engine::query_engine::QueryEngine;
use crate::engine::registry::ResultSetRegistry;
use crate::engine::types::{
    Endpoint, ExecutionFailure, FailureKind, PreferredFormat, Query, QueryType, ResultSet,
    Statement,
};
use crate::shared::ids::IdGenerator;
use crate::shared::response::{FrameStream, encode_stream};

/// Outcome of a submission.
pub enum Dispatch {
    /// Result bytes to send as the response body, tagged with the registry handle.
    Direct {
        handle: String,
        schema: SchemaRef,
        frames: FrameStream,
    },
    /// Snapshot taken right after registration: in progress, no endpoints.
    Deferred(ResultSet),
}

/// Decides between direct and deferred execution and drives the engine accordingly.
#[derive(Clone)]
pub struct ExecutionDispatcher {
    pub(crate) engine: Arc<dyn QueryEngine>,
    pub(crate) registry: Arc<ResultSetRegistry>,
    pub(crate) channels: Arc<StreamChannelStore>,
    pub(crate) exporter: Arc<BulkExporter>,
    pub(crate) prepared: Arc<PreparedStatementStore>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) tasks: Arc<TaskTracker>,
    /// Zero publishes a deferred stream as a single channel.
    pub(crate) partition_rows: usize,
}

impl ExecutionDispatcher {
    /// Turns a submitted query into something the engine can run.
    pub fn resolve_statement(&self, query: &Query) -> Result<Statement, GlideError> {
        match query.query_type {
            QueryType::Sql => {
                if query.query.trim().is_empty() {
                    return Err(GlideError::InvalidRequest("Empty SQL query".into()));
                }
                Ok(Statement::Sql(query.query.clone()))
            }
            QueryType::Plan => Statement::from_hex_plan(&query.query),
            QueryType::Prepared => self.prepared.resolve(query.query.trim()),
        }
    }

    pub async fn submit(&self, query: &Query) -> Result<Dispatch, GlideError> {
        let statement = self.resolve_statement(query)?;
        let schema = self.engine.describe(&statement).await?;

        let handle = self.ids.next_id();
        let created = self.registry.create(&handle, schema.clone())?;
        info!(
            target: "glide::dispatch",
            handle = %handle,
            kind = %statement.kind(),
            direct = query.allow_direct,
            format = ?query.preferred_format,
            "Query accepted"
        );

        if query.allow_direct {
            return self.run_direct(handle, schema, statement).await;
        }

        let this = self.clone();
        let task_handle = handle.clone();
        let format = query.preferred_format;
        self.tasks.spawn(&handle, async move {
            this.run_deferred(&task_handle, statement, schema, format)
                .await
        });
        Ok(Dispatch::Deferred(created))
    }

    async fn run_direct(
        &self,
        handle: String,
        schema: SchemaRef,
        statement: Statement,
    ) -> Result<Dispatch, GlideError> {
        let batches = match self.engine.execute(&statement).await {
            Ok(batches) => batches,
            Err(err) => {
                let _ = self
                    .registry
                    .fail(&handle, ExecutionFailure::new(FailureKind::Engine, &err));
                return Err(err.into());
            }
        };

        let slot = self.tasks.register(&handle);
        let token = slot.token().clone();
        let guard = DirectGuard {
            handle: handle.clone(),
            tasks: Arc::clone(&self.tasks),
            slot: Some(slot),
        };
        let frames = watch_direct(encode_stream(schema.clone(), batches), guard, token);
        Ok(Dispatch::Direct {
            handle,
            schema,
            frames,
        })
    }

    async fn run_deferred(
        &self,
        handle: &str,
        statement: Statement,
        schema: SchemaRef,
        format: PreferredFormat,
    ) -> Result<(), ExecutionFailure> {
        let batches = self
            .engine
            .execute(&statement)
            .await
            .map_err(|e| ExecutionFailure::new(FailureKind::Engine, e))?;

        match format {
            PreferredFormat::BulkFile => {
                let ticket = self.ids.next_id();
                let url = self
                    .exporter
                    .export(handle, &ticket, schema, batches)
                    .await
                    .map_err(|e| {
                        e.log_error();
                        export_failure(e)
                    })?;
                self.append(handle, Endpoint::external(ticket, url))?;
            }
            PreferredFormat::Stream => {
                // The engine is drained here, so an execution error fails the result set
                // before a single-channel result has appended anything.
                let max_rows = match self.partition_rows {
                    0 => usize::MAX,
                    rows => rows,
                };
                let mut batches = batches;
                let mut partitioner = Partitioner::new(max_rows);
                let mut emitted = 0;
                while let Some(batch) = batches.next().await {
                    let batch = batch.map_err(|e| ExecutionFailure::new(FailureKind::Engine, e))?;
                    for partition in partitioner.push(batch) {
                        self.publish(handle, &schema, partition)?;
                        emitted += 1;
                    }
                }
                match partitioner.finish() {
                    Some(rest) => self.publish(handle, &schema, rest)?,
                    // An empty result still gets one endpoint so readers learn the schema.
                    None if emitted == 0 => self.publish(handle, &schema, Vec::new())?,
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Registers a one-shot channel and exposes it as a resolver endpoint.
    fn publish(
        &self,
        handle: &str,
        schema: &SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<(), ExecutionFailure> {
        let ticket = self.ids.next_id();
        self.channels
            .register(handle, &ticket, schema.clone(), batches)
            .map_err(|e| ExecutionFailure::new(FailureKind::Internal, e))?;
        self.append(handle, Endpoint::resolver(ticket))
    }

    fn append(&self, handle: &str, endpoint: Endpoint) -> Result<(), ExecutionFailure> {
        let count = self
            .registry
            .append_endpoint(handle, endpoint)
            .map_err(|e| ExecutionFailure::new(FailureKind::Internal, e))?;
        debug!(target: "glide::dispatch", handle, endpoints = count, "Endpoint published");
        Ok(())
    }
}

fn export_failure(err: ExportError) -> ExecutionFailure {
    match err {
        ExportError::Source(e) => ExecutionFailure::new(FailureKind::Engine, e),
        other => ExecutionFailure::new(FailureKind::Export, other),
    }
}

/// Records the outcome of a direct response in the registry once the body ends.
struct DirectGuard {
    handle: String,
    tasks: Arc<TaskTracker>,
    slot: Option<TaskSlot>,
}

impl DirectGuard {
    fn is_running(&self) -> bool {
        self.slot.is_some()
    }

    fn finish(&mut self, outcome: Result<(), ExecutionFailure>) {
        if let Some(slot) = self.slot.take() {
            self.tasks.finish(&self.handle, outcome);
            drop(slot);
        }
    }
}

impl Drop for DirectGuard {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(target: "glide::dispatch", handle = %self.handle, "Direct stream dropped before completion");
            self.finish(Err(ExecutionFailure::cancelled()));
        }
    }
}

/// Passes frames through untouched, stopping early on cancellation. Dropping the
/// returned stream drops the engine cursor and marks the result set cancelled.
fn watch_direct(frames: FrameStream, guard: DirectGuard, token: CancellationToken) -> FrameStream {
    Box::pin(stream::unfold(
        (frames, guard, token),
        |(mut frames, mut guard, token)| async move {
            if !guard.is_running() {
                return None;
            }
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    guard.finish(Err(ExecutionFailure::cancelled()));
                    return None;
                }
                next = frames.next() => next,
            };
            match next {
                Some(Ok(frame)) => Some((Ok(frame), (frames, guard, token))),
                Some(Err(err)) => {
                    guard.finish(Err(ExecutionFailure::new(FailureKind::Engine, &err)));
                    Some((Err(err), (frames, guard, token)))
                }
                None => {
                    guard.finish(Ok(()));
                    None
                }
            }
        },
    ))
}
