use std::sync::Arc;

use arrow_schema::SchemaRef;
use tracing::debug;

use crate::engine::channels::StreamChannelStore;
use crate::engine::errors::GlideError;
use crate::engine::query_engine::{
    Catalog, CatalogFilter, DbSchema, QueryEngine, TableInfo, TableType,
};
use crate::shared::response::{FrameStream, encode_stream};

/// Serves ticket-addressed stream fetches and metadata listings.
#[derive(Clone)]
pub struct EndpointResolver {
    channels: Arc<StreamChannelStore>,
    engine: Arc<dyn QueryEngine>,
}

impl EndpointResolver {
    pub fn new(channels: Arc<StreamChannelStore>, engine: Arc<dyn QueryEngine>) -> Self {
        Self { channels, engine }
    }

    /// Takes the channel behind `ticket` and encodes it. Tickets of bulk endpoints were
    /// never registered as channels and are reported as not found.
    pub fn get_stream(&self, ticket: &str) -> Result<(SchemaRef, FrameStream), GlideError> {
        let (schema, batches) = self.channels.take(ticket)?;
        debug!(target: "glide::resolver", ticket, "Streaming channel");
        Ok((schema.clone(), encode_stream(schema, batches)))
    }

    pub async fn catalogs(&self) -> Result<Vec<Catalog>, GlideError> {
        Ok(self.engine.catalogs().await?)
    }

    pub async fn db_schemas(&self, filter: &CatalogFilter) -> Result<Vec<DbSchema>, GlideError> {
        Ok(self.engine.db_schemas(filter).await?)
    }

    pub async fn tables(&self, filter: &CatalogFilter) -> Result<Vec<TableInfo>, GlideError> {
        Ok(self.engine.tables(filter).await?)
    }

    pub async fn table_types(&self) -> Result<Vec<TableType>, GlideError> {
        Ok(self.engine.table_types().await?)
    }
}
