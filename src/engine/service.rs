use std::sync::Arc;
use std::time::Duration;

use arrow_schema::SchemaRef;
use tracing::{info, warn};

use crate::engine::channels::StreamChannelStore;
use crate::engine::dispatch::{Dispatch, ExecutionDispatcher, TaskTracker};
use crate::engine::errors::GlideError;
use crate::engine::export::{BulkExporter, ResultStore};
use crate::engine::prepared::PreparedStatementStore;
use crate::engine::query_engine::{
    Catalog, CatalogFilter, DbSchema, QueryEngine, TableInfo, TableType,
};
use crate::engine::registry::{ResultSetRegistry, RetentionPolicy};
use crate::engine::resolver::EndpointResolver;
use crate::engine::types::{Query, QueryType, ResultSet};
use crate::shared::config::Settings;
use crate::shared::ids::{IdGenerator, RandomIds};
use crate::shared::response::FrameStream;

/// How long `cancel` waits for the execution to record its cancellation.
const CANCEL_WAIT: Duration = Duration::from_secs(2);

/// Everything the front door talks to, wired together.
pub struct GlideService {
    dispatcher: ExecutionDispatcher,
    resolver: EndpointResolver,
}

pub struct GlideServiceBuilder {
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn ResultStore>,
    ids: Arc<dyn IdGenerator>,
    retention: RetentionPolicy,
    partition_rows: usize,
    key_prefix: String,
    url_ttl: Duration,
}

impl GlideServiceBuilder {
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn partition_rows(mut self, rows: usize) -> Self {
        self.partition_rows = rows;
        self
    }

    pub fn bulk_keys(mut self, key_prefix: impl Into<String>, url_ttl: Duration) -> Self {
        self.key_prefix = key_prefix.into();
        self.url_ttl = url_ttl;
        self
    }

    pub fn build(self) -> GlideService {
        let channels = Arc::new(StreamChannelStore::new());
        let registry = Arc::new(
            ResultSetRegistry::new(self.retention).with_listener(channels.clone()),
        );
        let tasks = Arc::new(TaskTracker::new(Arc::clone(&registry), Arc::clone(&channels)));
        let dispatcher = ExecutionDispatcher {
            engine: Arc::clone(&self.engine),
            registry,
            channels: Arc::clone(&channels),
            exporter: Arc::new(BulkExporter::new(self.store, self.key_prefix, self.url_ttl)),
            prepared: Arc::new(PreparedStatementStore::new(Arc::clone(&self.ids))),
            ids: self.ids,
            tasks,
            partition_rows: self.partition_rows,
        };
        GlideService {
            resolver: EndpointResolver::new(channels, self.engine),
            dispatcher,
        }
    }
}

impl GlideService {
    pub fn builder(engine: Arc<dyn QueryEngine>, store: Arc<dyn ResultStore>) -> GlideServiceBuilder {
        GlideServiceBuilder {
            engine,
            store,
            ids: Arc::new(RandomIds::default()),
            retention: RetentionPolicy::Unbounded,
            partition_rows: 0,
            key_prefix: "results".to_string(),
            url_ttl: Duration::from_secs(3600),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self::builder(engine, store)
            .retention(RetentionPolicy::from_config(&settings.registry))
            .partition_rows(settings.dispatch.partition_rows)
            .bulk_keys(settings.bulk.key_prefix.clone(), settings.bulk.url_ttl())
            .build()
    }

    pub async fn submit_query(&self, query: &Query) -> Result<Dispatch, GlideError> {
        self.dispatcher.submit(query).await
    }

    pub fn result_set(&self, handle: &str) -> Result<ResultSet, GlideError> {
        Ok(self.dispatcher.registry.get(handle)?)
    }

    /// Cancels in-flight execution of `handle`. Terminal result sets are a conflict.
    ///
    /// Returns once the execution has recorded its cancellation. A direct response whose
    /// body is not being read cannot observe the cancellation; after `CANCEL_WAIT` its
    /// still in-progress snapshot is returned.
    pub async fn cancel(&self, handle: &str) -> Result<ResultSet, GlideError> {
        let current = self.dispatcher.registry.get(handle)?;
        if current.status.is_terminal() {
            return Err(GlideError::Conflict(format!(
                "Result set {handle} is already {}",
                current.status
            )));
        }
        match self.dispatcher.tasks.cancel(handle, CANCEL_WAIT).await {
            None => {
                return Err(GlideError::Conflict(format!(
                    "Result set {handle} has no running execution"
                )));
            }
            Some(true) => {}
            Some(false) => {
                warn!(target: "glide::dispatch", handle, "Cancellation requested but not yet observed");
            }
        }
        Ok(self.dispatcher.registry.get(handle)?)
    }

    pub fn get_stream(&self, ticket: &str) -> Result<(SchemaRef, FrameStream), GlideError> {
        self.resolver.get_stream(ticket)
    }

    /// Resolves and describes `query`, returning a handle usable as `query_type=prepared`.
    pub async fn prepare(&self, query: &Query) -> Result<(String, SchemaRef), GlideError> {
        if query.query_type == QueryType::Prepared {
            return Err(GlideError::InvalidRequest(
                "A prepared statement cannot wrap another prepared statement".into(),
            ));
        }
        let statement = self.dispatcher.resolve_statement(query)?;
        let schema = self.dispatcher.engine.describe(&statement).await?;
        let handle = self.dispatcher.prepared.register(statement);
        Ok((handle, schema))
    }

    pub async fn catalogs(&self) -> Result<Vec<Catalog>, GlideError> {
        self.resolver.catalogs().await
    }

    pub async fn db_schemas(&self, filter: &CatalogFilter) -> Result<Vec<DbSchema>, GlideError> {
        self.resolver.db_schemas(filter).await
    }

    pub async fn tables(&self, filter: &CatalogFilter) -> Result<Vec<TableInfo>, GlideError> {
        self.resolver.tables(filter).await
    }

    pub async fn table_types(&self) -> Result<Vec<TableType>, GlideError> {
        self.resolver.table_types().await
    }

    pub fn registry(&self) -> &ResultSetRegistry {
        &self.dispatcher.registry
    }

    pub fn in_flight(&self) -> usize {
        self.dispatcher.tasks.in_flight()
    }

    pub fn shutdown(&self) {
        info!(target: "glide::dispatch", in_flight = self.in_flight(), "Shutting down executions");
        self.dispatcher.tasks.cancel_all();
    }
}
