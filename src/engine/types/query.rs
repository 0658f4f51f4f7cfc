use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::errors::GlideError;

pub const ARROW_STREAM_MIME: &str = "application/vnd.apache.arrow.stream";
pub const PARQUET_MIME: &str = "application/vnd.apache.parquet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Sql,
    Plan,
    Prepared,
}

impl FromStr for QueryType {
    type Err = GlideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(QueryType::Sql),
            "plan" => Ok(QueryType::Plan),
            "prepared" => Ok(QueryType::Prepared),
            other => Err(GlideError::InvalidRequest(format!(
                "Unknown query_type '{other}' (expected sql, plan or prepared)"
            ))),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Sql => "sql",
            QueryType::Plan => "plan",
            QueryType::Prepared => "prepared",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreferredFormat {
    #[default]
    #[serde(rename = "stream")]
    Stream,
    #[serde(rename = "bulk-file")]
    BulkFile,
}

impl FromStr for PreferredFormat {
    type Err = GlideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "stream" | ARROW_STREAM_MIME => Ok(PreferredFormat::Stream),
            "bulk-file" | "bulk" | "parquet" | PARQUET_MIME => Ok(PreferredFormat::BulkFile),
            other => Err(GlideError::InvalidRequest(format!(
                "Unknown preferred_format '{other}'"
            ))),
        }
    }
}

/// A validated query submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// SQL text, hex-encoded serialized plan, or a prepared statement handle.
    pub query: String,
    pub query_type: QueryType,
    pub allow_direct: bool,
    pub preferred_format: PreferredFormat,
}

impl Query {
    pub fn sql(text: impl Into<String>) -> Self {
        Self {
            query: text.into(),
            query_type: QueryType::Sql,
            allow_direct: false,
            preferred_format: PreferredFormat::Stream,
        }
    }

    pub fn with_direct(mut self, allow_direct: bool) -> Self {
        self.allow_direct = allow_direct;
        self
    }

    pub fn with_format(mut self, format: PreferredFormat) -> Self {
        self.preferred_format = format;
        self
    }
}

/// What the engine actually runs: a query resolved down to SQL text or plan bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Sql(String),
    Plan(Bytes),
}

impl Statement {
    pub fn kind(&self) -> QueryType {
        match self {
            Statement::Sql(_) => QueryType::Sql,
            Statement::Plan(_) => QueryType::Plan,
        }
    }

    /// Decodes a hex plan payload. Empty or non-hex input is an invalid request.
    pub fn from_hex_plan(payload: &str) -> Result<Self, GlideError> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Err(GlideError::InvalidRequest("Empty plan payload".into()));
        }
        let bytes = hex::decode(trimmed)
            .map_err(|e| GlideError::InvalidRequest(format!("Plan payload is not valid hex: {e}")))?;
        Ok(Statement::Plan(Bytes::from(bytes)))
    }
}
