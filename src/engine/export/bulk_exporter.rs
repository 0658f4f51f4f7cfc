use std::sync::Arc;
use std::time::Duration;

use arrow_schema::SchemaRef;
use bytes::Bytes;
use futures::StreamExt;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::engine::errors::ExportError;
use crate::engine::export::store::ResultStore;
use crate::engine::query_engine::BatchStream;

/// Writes complete results as Parquet objects and hands back expiring fetch URLs.
pub struct BulkExporter {
    store: Arc<dyn ResultStore>,
    key_prefix: String,
    url_ttl: Duration,
}

impl BulkExporter {
    pub fn new(store: Arc<dyn ResultStore>, key_prefix: impl Into<String>, url_ttl: Duration) -> Self {
        let key_prefix: String = key_prefix.into();
        Self {
            store,
            key_prefix: key_prefix.trim_matches('/').to_string(),
            url_ttl,
        }
    }

    /// `{prefix}/{handle}/{ticket}.parquet`
    pub fn object_key(&self, handle: &str, ticket: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("{handle}/{ticket}.parquet")
        } else {
            format!("{}/{handle}/{ticket}.parquet", self.key_prefix)
        }
    }

    /// Drains `batches` into one Parquet object and returns its signed URL.
    pub async fn export(
        &self,
        handle: &str,
        ticket: &str,
        schema: SchemaRef,
        batches: BatchStream,
    ) -> Result<String, ExportError> {
        let key = self.object_key(handle, ticket);
        let (bytes, rows) = write_parquet(schema, batches).await?;
        let size = bytes.len();

        self.store.put(&key, bytes).await?;
        let url = self.store.presign_get(&key, self.url_ttl).await?;

        info!(target: "glide::export", handle, key = %key, rows, size, "Bulk file exported");
        Ok(url)
    }
}

/// Encodes a batch stream as an in-memory Parquet file, returning it with its row count.
pub async fn write_parquet(
    schema: SchemaRef,
    mut batches: BatchStream,
) -> Result<(Bytes, usize), ExportError> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(Vec::with_capacity(64 * 1024), schema, Some(props))?;
    let mut rows = 0;
    while let Some(batch) = batches.next().await {
        let batch = batch?;
        rows += batch.num_rows();
        writer.write(&batch)?;
    }
    let buffer = writer.into_inner()?;
    Ok((Bytes::from(buffer), rows))
}
