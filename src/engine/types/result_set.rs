use arrow_schema::SchemaRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::response::arrow::schema_to_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::InProgress)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultStatus::InProgress => "in-progress",
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An addressable partition of a result.
///
/// An empty location means "fetch through `/get_stream` with the ticket"; anything else is
/// a URL the client follows directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ticket: String,
    pub locations: Vec<String>,
}

impl Endpoint {
    pub fn resolver(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            locations: vec![String::new()],
        }
    }

    pub fn external(ticket: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            locations: vec![url.into()],
        }
    }

    pub fn is_resolver(&self) -> bool {
        self.locations.first().is_none_or(|loc| loc.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Engine,
    Export,
    Cancelled,
    Internal,
}

/// Why a result set ended up `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl ToString) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Execution cancelled")
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Lifecycle record of a submitted query. Owned by the registry; callers get clones.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub handle: String,
    pub status: ResultStatus,
    pub schema: SchemaRef,
    pub(crate) endpoints: Vec<Endpoint>,
    pub error: Option<ExecutionFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultSet {
    pub fn new(handle: impl Into<String>, schema: SchemaRef) -> Self {
        let now = Utc::now();
        Self {
            handle: handle.into(),
            status: ResultStatus::InProgress,
            schema,
            endpoints: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Endpoints a client may consume. A failed result exposes none, even if some
    /// partitions were appended before the failure.
    pub fn endpoints(&self) -> &[Endpoint] {
        match self.status {
            ResultStatus::Failed => &[],
            _ => &self.endpoints,
        }
    }

    pub fn summary(&self) -> ResultSetSummary {
        ResultSetSummary {
            handle: self.handle.clone(),
            status: self.status,
            schema: schema_to_hex(&self.schema),
            endpoints: self.endpoints().to_vec(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire shape of a result set, as returned by `POST /query` and `GET /result_set/{handle}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSetSummary {
    pub handle: String,
    pub status: ResultStatus,
    /// Hex-encoded Arrow IPC schema message.
    pub schema: String,
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub error: Option<ExecutionFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
