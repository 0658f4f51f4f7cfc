use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::engine::errors::GlideError;

/// `GET /get_stream?ticket=...`
#[derive(Debug, Default, Deserialize)]
pub struct TicketParams {
    #[serde(default)]
    pub ticket: String,
}

/// Query half of a signed download URL.
#[derive(Debug, Default, Deserialize)]
pub struct SignedParams {
    pub expires: Option<i64>,
    #[serde(default)]
    pub signature: String,
}

/// Deserializes a request's query string. No query at all yields the all-default value.
pub fn parse_params<T: DeserializeOwned>(query: Option<&str>) -> Result<T, GlideError> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| GlideError::InvalidRequest(format!("Invalid query string: {e}")))
}

/// Percent-decodes one path segment. Unlike form values, `+` stays literal.
pub fn decode_segment(segment: &str) -> Result<Cow<'_, str>, GlideError> {
    urlencoding::decode(segment)
        .map_err(|e| GlideError::InvalidRequest(format!("Path is not valid UTF-8: {e}")))
}
