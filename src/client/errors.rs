use arrow_schema::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::engine::errors::GlideError;
use crate::engine::types::ExecutionFailure;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("Reading response failed: {0}")]
    Body(#[from] hyper::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow decoding failed: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet decoding failed: {0}")]
    Parquet(#[from] ParquetError),

    #[error(transparent)]
    Glide(#[from] GlideError),

    #[error("Result set {handle} failed{}", .error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Failed {
        handle: String,
        error: Option<ExecutionFailure>,
    },
}
