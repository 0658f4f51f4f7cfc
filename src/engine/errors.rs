use arrow_schema::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::engine::types::ResultStatus;
use crate::shared::response::StatusCode;

/// Request-level failures, one variant per class a caller can observe.
#[derive(Debug, Error)]
pub enum GlideError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl GlideError {
    pub fn status(&self) -> StatusCode {
        match self {
            GlideError::InvalidRequest(_) => StatusCode::BadRequest,
            GlideError::NotFound(_) => StatusCode::NotFound,
            GlideError::Conflict(_) => StatusCode::Conflict,
            GlideError::EngineFailure(_) | GlideError::ProtocolMismatch(_) => {
                StatusCode::InternalError
            }
        }
    }

    pub fn log_error(&self) {
        match self {
            GlideError::InvalidRequest(e) | GlideError::NotFound(e) | GlideError::Conflict(e) => {
                debug!(target: "glide::http", "Request rejected: {}", e);
            }
            GlideError::EngineFailure(e) => {
                error!(target: "glide::http", "Engine failure: {}", e);
            }
            GlideError::ProtocolMismatch(e) => {
                warn!(target: "glide::http", "Protocol mismatch: {}", e);
            }
        }
    }
}

/// Errors raised by the query engine collaborator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),
}

impl From<EngineError> for GlideError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Planning(msg) | EngineError::InvalidPlan(msg) => {
                GlideError::InvalidRequest(msg)
            }
            other => GlideError::EngineFailure(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown result set handle: {0}")]
    UnknownHandle(String),

    #[error("Result set handle already exists: {0}")]
    DuplicateHandle(String),

    #[error("Result set {handle}: cannot move from {from} to {to}")]
    InvalidTransition {
        handle: String,
        from: ResultStatus,
        to: ResultStatus,
    },

    #[error("Result set {handle} is {status}; endpoints can no longer be appended")]
    Sealed {
        handle: String,
        status: ResultStatus,
    },
}

impl From<RegistryError> for GlideError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownHandle(_) => GlideError::NotFound(err.to_string()),
            RegistryError::DuplicateHandle(_) => GlideError::EngineFailure(err.to_string()),
            RegistryError::InvalidTransition { .. } | RegistryError::Sealed { .. } => {
                GlideError::Conflict(err.to_string())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Unknown ticket: {0}")]
    UnknownTicket(String),

    #[error("Ticket {0} has already been consumed")]
    AlreadyConsumed(String),

    #[error("Ticket {0} is already registered")]
    DuplicateTicket(String),
}

impl From<ChannelError> for GlideError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::UnknownTicket(_) | ChannelError::AlreadyConsumed(_) => {
                GlideError::NotFound(err.to_string())
            }
            ChannelError::DuplicateTicket(_) => GlideError::EngineFailure(err.to_string()),
        }
    }
}

/// Errors from the wire encoder. Raised between frames, never in the middle of one.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Arrow IPC encoding failed: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Batch does not match stream schema: {0}")]
    SchemaMismatch(String),

    #[error("Batch source failed: {0}")]
    Source(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signed URL expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Parquet write failed: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("Batch source failed: {0}")]
    Source(#[from] EngineError),
}

impl ExportError {
    pub fn log_error(&self) {
        match self {
            ExportError::Parquet(e) => {
                error!(target: "glide::export", "Parquet write failed: {}", e);
                debug!(target: "glide::export", "Parquet error details: {:?}", e);
            }
            ExportError::Store(e) => {
                error!(target: "glide::export", "Store write failed: {}", e);
                debug!(target: "glide::export", "Store error details: {:?}", e);
            }
            ExportError::Source(e) => {
                error!(target: "glide::export", "Batch source failed: {}", e);
            }
        }
    }
}
