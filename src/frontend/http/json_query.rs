use serde::{Deserialize, Serialize};

use crate::engine::errors::GlideError;
use crate::engine::types::{PreferredFormat, Query, QueryType};

/// Body of `POST /query` and `POST /prepared_statement`.
///
/// Either `query` (SQL text or a prepared handle) or `plan` (hex-encoded DataFusion plan
/// bytes) carries the payload. `query_type` is inferred from which one is set.
/// Substrait plans are not executed; a `substrait` field is rejected rather than misread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing)]
    pub substrait: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(default)]
    pub allow_direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<String>,
}

impl QueryRequest {
    pub fn sql(text: impl Into<String>) -> Self {
        Self {
            query: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn plan(hex_plan: impl Into<String>) -> Self {
        Self {
            plan: Some(hex_plan.into()),
            ..Self::default()
        }
    }

    pub fn prepared(handle: impl Into<String>) -> Self {
        Self {
            query: Some(handle.into()),
            query_type: Some(QueryType::Prepared.to_string()),
            ..Self::default()
        }
    }

    pub fn direct(mut self, allow_direct: bool) -> Self {
        self.allow_direct = allow_direct;
        self
    }

    pub fn format(mut self, format: PreferredFormat) -> Self {
        self.preferred_format = Some(
            match format {
                PreferredFormat::Stream => "stream",
                PreferredFormat::BulkFile => "bulk-file",
            }
            .to_string(),
        );
        self
    }

    /// Validates the request shape. Nothing is registered or executed here.
    pub fn into_query(self) -> Result<Query, GlideError> {
        if self.substrait.is_some() {
            return Err(GlideError::InvalidRequest(
                "Substrait plans are not supported; send a hex DataFusion plan in 'plan'".into(),
            ));
        }
        let query_type = match self.query_type.as_deref() {
            Some(kind) => Some(kind.parse::<QueryType>()?),
            None => None,
        };

        let (query_type, payload) = match (query_type, self.query, self.plan) {
            (_, Some(_), Some(_)) => {
                return Err(GlideError::InvalidRequest(
                    "Only one of 'query' and 'plan' may be set".into(),
                ));
            }
            (None, Some(text), None) => (QueryType::Sql, text),
            (None, None, Some(plan)) => (QueryType::Plan, plan),
            (Some(QueryType::Plan), query, plan) => match plan.or(query) {
                Some(plan) => (QueryType::Plan, plan),
                None => return Err(missing_payload()),
            },
            (Some(kind), Some(text), None) => (kind, text),
            (Some(kind), None, Some(_)) => {
                return Err(GlideError::InvalidRequest(format!(
                    "query_type '{kind}' expects its payload in 'query', not 'plan'"
                )));
            }
            (_, None, None) => return Err(missing_payload()),
        };

        let preferred_format = match self.preferred_format.as_deref() {
            Some(format) => format.parse()?,
            None => PreferredFormat::default(),
        };

        Ok(Query {
            query: payload,
            query_type,
            allow_direct: self.allow_direct,
            preferred_format,
        })
    }
}

fn missing_payload() -> GlideError {
    GlideError::InvalidRequest("Request needs a 'query' or 'plan' field".into())
}

/// Response of `POST /prepared_statement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedStatementResponse {
    pub handle: String,
    /// Hex-encoded Arrow IPC schema message.
    pub schema: String,
}
