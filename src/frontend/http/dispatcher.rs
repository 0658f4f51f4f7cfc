use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, info, warn};

use crate::engine::dispatch::Dispatch;
use crate::engine::errors::{GlideError, StoreError};
use crate::engine::export::SignedUrl;
use crate::engine::query_engine::CatalogFilter;
use crate::engine::types::{ARROW_STREAM_MIME, PARQUET_MIME};
use crate::frontend::context::FrontendContext;
use crate::frontend::http::json_query::{PreparedStatementResponse, QueryRequest};
use crate::frontend::http::params::{SignedParams, TicketParams, parse_params};
use crate::shared::response::arrow::schema_to_hex;
use crate::shared::response::json::to_json_bytes;
use crate::shared::response::{FrameStream, StatusCode, response_error_bytes};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type HttpBody = UnsyncBoxBody<Bytes, BoxError>;
pub type HttpResult = Result<Response<HttpBody>, Infallible>;

pub const HANDLE_HEADER: &str = "x-glide-handle";
const JSON_MIME: &str = "application/json";

fn full(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn respond(status: StatusCode, content_type: &'static str, body: HttpBody) -> Response<HttpBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status.into();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json_response<T: Serialize>(value: &T) -> HttpResult {
    Ok(respond(StatusCode::Ok, JSON_MIME, full(to_json_bytes(value))))
}

pub fn error_response(status: StatusCode, message: &str) -> HttpResult {
    Ok(respond(
        status,
        JSON_MIME,
        full(response_error_bytes(status, message)),
    ))
}

fn glide_error(err: GlideError) -> HttpResult {
    err.log_error();
    error_response(err.status(), &err.to_string())
}

/// Streams Arrow frames as the body. Frames are pulled only as hyper writes them out.
fn arrow_response(frames: FrameStream, handle: Option<&str>) -> HttpResult {
    let body = StreamBody::new(frames.map(|frame| match frame {
        Ok(bytes) => Ok(Frame::data(bytes)),
        Err(err) => {
            warn!(target: "glide::http", error = %err, "Aborting stream response");
            Err(Box::new(err) as BoxError)
        }
    }));
    let mut response = respond(StatusCode::Ok, ARROW_STREAM_MIME, body.boxed_unsync());
    if let Some(value) = handle.and_then(|h| HeaderValue::from_str(h).ok()) {
        response.headers_mut().insert(HANDLE_HEADER, value);
    }
    Ok(response)
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Incoming>) -> Result<T, GlideError> {
    let body = req
        .collect()
        .await
        .map_err(|e| GlideError::InvalidRequest(format!("Failed to read body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&body)
        .map_err(|e| GlideError::InvalidRequest(format!("Invalid JSON body: {e}")))
}

pub async fn handle_query(req: Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let request: QueryRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => return glide_error(e),
    };
    let query = match request.into_query() {
        Ok(query) => query,
        Err(e) => return glide_error(e),
    };

    match ctx.service.submit_query(&query).await {
        Ok(Dispatch::Direct { handle, frames, .. }) => {
            debug!(target: "glide::http", handle = %handle, "Streaming direct result");
            arrow_response(frames, Some(&handle))
        }
        Ok(Dispatch::Deferred(result_set)) => json_response(&result_set.summary()),
        Err(e) => glide_error(e),
    }
}

pub fn handle_get_result_set(handle: &str, ctx: &FrontendContext) -> HttpResult {
    match ctx.service.result_set(handle) {
        Ok(result_set) => json_response(&result_set.summary()),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_cancel(handle: &str, ctx: &FrontendContext) -> HttpResult {
    match ctx.service.cancel(handle).await {
        Ok(result_set) => {
            info!(target: "glide::http", handle, "Result set cancelled by client");
            json_response(&result_set.summary())
        }
        Err(e) => glide_error(e),
    }
}

pub fn handle_get_stream(req: &Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let ticket = match parse_params::<TicketParams>(req.uri().query()) {
        Ok(params) if !params.ticket.is_empty() => params.ticket,
        Ok(_) => return error_response(StatusCode::BadRequest, "Missing 'ticket' parameter"),
        Err(e) => return glide_error(e),
    };
    match ctx.service.get_stream(&ticket) {
        Ok((_, frames)) => arrow_response(frames, None),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_object(key: &str, req: &Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let Ok(SignedParams {
        expires: Some(expires),
        signature,
    }) = parse_params::<SignedParams>(req.uri().query())
    else {
        return error_response(StatusCode::Forbidden, "Missing or invalid 'expires'");
    };
    let signed = SignedUrl {
        key: key.to_string(),
        expires,
        signature,
    };

    match ctx.objects.open_signed(&signed).await {
        Ok(bytes) => {
            debug!(target: "glide::http", key, size = bytes.len(), "Serving bulk object");
            Ok(respond(StatusCode::Ok, PARQUET_MIME, full(bytes)))
        }
        Err(e) => {
            let status = match &e {
                StoreError::InvalidSignature | StoreError::Expired => StatusCode::Forbidden,
                StoreError::NotFound(_) => StatusCode::NotFound,
                StoreError::InvalidKey(_) => StatusCode::BadRequest,
                _ => StatusCode::InternalError,
            };
            if status == StatusCode::InternalError {
                warn!(target: "glide::http", key, error = %e, "Bulk object read failed");
            }
            error_response(status, &e.to_string())
        }
    }
}

fn catalog_filter(req: &Request<Incoming>) -> Result<CatalogFilter, GlideError> {
    parse_params(req.uri().query())
}

pub async fn handle_catalogs(ctx: &FrontendContext) -> HttpResult {
    match ctx.service.catalogs().await {
        Ok(catalogs) => json_response(&catalogs),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_db_schemas(req: &Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let filter = match catalog_filter(req) {
        Ok(filter) => filter,
        Err(e) => return glide_error(e),
    };
    match ctx.service.db_schemas(&filter).await {
        Ok(schemas) => json_response(&schemas),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_tables(req: &Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let filter = match catalog_filter(req) {
        Ok(filter) => filter,
        Err(e) => return glide_error(e),
    };
    match ctx.service.tables(&filter).await {
        Ok(tables) => json_response(&tables),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_table_types(ctx: &FrontendContext) -> HttpResult {
    match ctx.service.table_types().await {
        Ok(types) => json_response(&types),
        Err(e) => glide_error(e),
    }
}

pub async fn handle_prepared_statement(req: Request<Incoming>, ctx: &FrontendContext) -> HttpResult {
    let request: QueryRequest = match read_json(req).await {
        Ok(request) => request,
        Err(e) => return glide_error(e),
    };
    let prepared = match request.into_query() {
        Ok(query) => ctx.service.prepare(&query).await,
        Err(e) => Err(e),
    };
    match prepared {
        Ok((handle, schema)) => json_response(&PreparedStatementResponse {
            handle,
            schema: schema_to_hex(&schema),
        }),
        Err(e) => glide_error(e),
    }
}

pub fn handle_health() -> HttpResult {
    json_response(&serde_json::json!({ "status": "ok" }))
}
