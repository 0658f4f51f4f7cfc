use std::io::Cursor;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::client::errors::ClientError;
use crate::engine::errors::GlideError;
use crate::engine::types::{ARROW_STREAM_MIME, PARQUET_MIME};

/// Decodes a result body according to its content type.
pub fn decode_body(
    content_type: &str,
    body: Bytes,
) -> Result<(SchemaRef, Vec<RecordBatch>), ClientError> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime {
        ARROW_STREAM_MIME => {
            let reader = StreamReader::try_new(Cursor::new(body), None)?;
            let schema = reader.schema();
            let batches = reader.collect::<Result<Vec<_>, _>>()?;
            Ok((schema, batches))
        }
        PARQUET_MIME => {
            let builder = ParquetRecordBatchReaderBuilder::try_new(body)?;
            let schema = Arc::clone(builder.schema());
            let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
            Ok((schema, batches))
        }
        other => Err(GlideError::ProtocolMismatch(format!(
            "Unsupported result content type '{other}'"
        ))
        .into()),
    }
}
