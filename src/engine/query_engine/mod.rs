pub mod catalog;
pub mod datafusion_engine;

use std::pin::Pin;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::{self, Stream};

use crate::engine::errors::EngineError;
use crate::engine::types::Statement;

pub use catalog::{Catalog, CatalogFilter, DbSchema, TableInfo, TableType};
pub use datafusion_engine::DataFusionEngine;

/// Lazy sequence of record batches produced by the engine.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RecordBatch, EngineError>> + Send>>;

/// The relational engine this server fronts.
///
/// `describe` must not run the statement body; the schema it returns is the schema every
/// batch of `execute` conforms to.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn describe(&self, statement: &Statement) -> Result<SchemaRef, EngineError>;

    async fn execute(&self, statement: &Statement) -> Result<BatchStream, EngineError>;

    async fn catalogs(&self) -> Result<Vec<Catalog>, EngineError>;

    async fn db_schemas(&self, filter: &CatalogFilter) -> Result<Vec<DbSchema>, EngineError>;

    async fn tables(&self, filter: &CatalogFilter) -> Result<Vec<TableInfo>, EngineError>;

    async fn table_types(&self) -> Result<Vec<TableType>, EngineError>;
}

/// Wraps already materialized batches as a `BatchStream`.
pub fn batches_stream(batches: Vec<RecordBatch>) -> BatchStream {
    Box::pin(stream::iter(batches.into_iter().map(Ok)))
}

#[cfg(test)]
pub(crate) mod test_support;
