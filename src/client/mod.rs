//! HTTP client for the result-distribution protocol: submit, poll, fetch every
//! endpoint and concatenate the batches.

mod decode;
mod errors;

use std::time::Duration;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::engine::query_engine::{Catalog, DbSchema, TableInfo, TableType};
use crate::engine::types::{Endpoint, ResultSetSummary, ResultStatus};
use crate::frontend::http::dispatcher::HANDLE_HEADER;
use crate::frontend::http::json_query::{PreparedStatementResponse, QueryRequest};
use crate::shared::response::arrow::schema_from_hex;

pub use decode::decode_body;
pub use errors::ClientError;

/// What the server answered to a submission.
pub enum Submission {
    Direct {
        handle: Option<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    },
    Deferred(ResultSetSummary),
}

/// A fully collected result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub handle: Option<String>,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl QueryResult {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

pub struct GlideClient {
    base_url: String,
    auth_token: Option<String>,
    poll_interval: Duration,
    http: Client<HttpConnector, Full<Bytes>>,
}

struct Fetched {
    content_type: String,
    handle: Option<String>,
    body: Bytes,
}

impl GlideClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            poll_interval: Duration::from_millis(50),
            http: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.auth_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn submit(&self, request: &QueryRequest) -> Result<Submission, ClientError> {
        let body = serde_json::to_vec(request)?;
        let fetched = self
            .send(Method::POST, &self.url("/query"), Some(body), true)
            .await?;
        if fetched.content_type.starts_with("application/json") {
            return Ok(Submission::Deferred(serde_json::from_slice(&fetched.body)?));
        }
        let (schema, batches) = decode_body(&fetched.content_type, fetched.body)?;
        Ok(Submission::Direct {
            handle: fetched.handle,
            schema,
            batches,
        })
    }

    /// Submits and waits for the complete result, whichever way it is delivered.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult, ClientError> {
        match self.submit(request).await? {
            Submission::Direct {
                handle,
                schema,
                batches,
            } => Ok(QueryResult {
                handle,
                schema,
                batches,
            }),
            Submission::Deferred(summary) => self.collect(summary).await,
        }
    }

    /// Polls `summary` until it is terminal, fetching each endpoint once as it appears.
    pub async fn collect(&self, mut summary: ResultSetSummary) -> Result<QueryResult, ClientError> {
        let mut consumed = 0;
        let mut batches = Vec::new();
        loop {
            if summary.status == ResultStatus::Failed {
                return Err(ClientError::Failed {
                    handle: summary.handle,
                    error: summary.error,
                });
            }
            for endpoint in summary.endpoints.iter().skip(consumed) {
                let (_, fetched) = self.fetch_endpoint(endpoint).await?;
                batches.extend(fetched);
                consumed += 1;
            }
            if summary.status == ResultStatus::Completed {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
            summary = self.result_set(&summary.handle).await?;
        }
        debug!(target: "glide::client", handle = %summary.handle, endpoints = consumed, "Result collected");
        Ok(QueryResult {
            handle: Some(summary.handle),
            schema: std::sync::Arc::new(schema_from_hex(&summary.schema)?),
            batches,
        })
    }

    pub async fn result_set(&self, handle: &str) -> Result<ResultSetSummary, ClientError> {
        self.get_json(&format!("/result_set/{}", urlencoding::encode(handle)))
            .await
    }

    pub async fn cancel(&self, handle: &str) -> Result<ResultSetSummary, ClientError> {
        let url = self.url(&format!("/result_set/{}", urlencoding::encode(handle)));
        let fetched = self.send(Method::DELETE, &url, None, true).await?;
        Ok(serde_json::from_slice(&fetched.body)?)
    }

    /// Follows `locations[0]` when set, otherwise streams the ticket from this server.
    pub async fn fetch_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(SchemaRef, Vec<RecordBatch>), ClientError> {
        let fetched = match endpoint.locations.first().filter(|l| !l.is_empty()) {
            Some(location) => self.send(Method::GET, location, None, false).await?,
            None => {
                let url = self.url(&format!(
                    "/get_stream?ticket={}",
                    urlencoding::encode(&endpoint.ticket)
                ));
                self.send(Method::GET, &url, None, true).await?
            }
        };
        decode_body(&fetched.content_type, fetched.body)
    }

    pub async fn prepare(
        &self,
        request: &QueryRequest,
    ) -> Result<PreparedStatementResponse, ClientError> {
        let body = serde_json::to_vec(request)?;
        let fetched = self
            .send(Method::POST, &self.url("/prepared_statement"), Some(body), true)
            .await?;
        Ok(serde_json::from_slice(&fetched.body)?)
    }

    pub async fn catalogs(&self) -> Result<Vec<Catalog>, ClientError> {
        self.get_json("/catalogs").await
    }

    pub async fn db_schemas(&self) -> Result<Vec<DbSchema>, ClientError> {
        self.get_json("/db_schemas").await
    }

    pub async fn tables(&self, table_name_filter: Option<&str>) -> Result<Vec<TableInfo>, ClientError> {
        match table_name_filter {
            Some(pattern) => {
                self.get_json(&format!(
                    "/tables?table_name_filter_pattern={}",
                    urlencoding::encode(pattern)
                ))
                .await
            }
            None => self.get_json("/tables").await,
        }
    }

    pub async fn table_types(&self) -> Result<Vec<TableType>, ClientError> {
        self.get_json("/table_types").await
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, ClientError> {
        let fetched = self
            .send(Method::GET, &self.url(path_and_query), None, true)
            .await?;
        Ok(serde_json::from_slice(&fetched.body)?)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        authenticate: bool,
    ) -> Result<Fetched, ClientError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        let mut request = Request::new(Full::new(Bytes::from(body.unwrap_or_default())));
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.auth_token.as_ref().filter(|_| authenticate) {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }

        let response = self.http.request(request).await?;
        let status = response.status();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let handle = header(HANDLE_HEADER);
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(Fetched {
            content_type,
            handle,
            body,
        })
    }
}
