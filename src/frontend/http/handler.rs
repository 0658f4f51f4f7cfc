use hyper::header::AUTHORIZATION;
use hyper::{Method, Request, body::Incoming};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::frontend::context::FrontendContext;
use crate::shared::response::StatusCode;

use super::dispatcher::{
    HttpResult, error_response, handle_cancel, handle_catalogs, handle_db_schemas,
    handle_get_result_set, handle_get_stream, handle_health, handle_object,
    handle_prepared_statement, handle_query, handle_table_types, handle_tables,
};
use super::params::decode_segment;

struct HttpHandler {
    ctx: Arc<FrontendContext>,
}

impl HttpHandler {
    fn new(ctx: Arc<FrontendContext>) -> Self {
        Self { ctx }
    }

    /// Signed downloads carry their own credentials; health checks need none.
    fn needs_auth(path: &str) -> bool {
        path != "/health" && !path.starts_with("/objects/")
    }

    fn is_authorized(&self, req: &Request<Incoming>) -> bool {
        let Some(token) = &self.ctx.auth_token else {
            return true;
        };
        let Some(presented) = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        bool::from(presented.as_bytes().ct_eq(token.as_bytes()))
    }

    async fn handle(&self, req: Request<Incoming>) -> HttpResult {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        debug!(target: "glide::http", %method, path = %path, "Request");

        if path != "/health" && self.ctx.server_state.is_shutting_down() {
            return error_response(StatusCode::ServiceUnavailable, "Server is shutting down");
        }
        if Self::needs_auth(&path) && !self.is_authorized(&req) {
            return error_response(StatusCode::Unauthorized, "Unauthorized");
        }

        let ctx = self.ctx.as_ref();
        match path.as_str() {
            "/query" | "/get_glide_info" => match method {
                Method::POST => handle_query(req, ctx).await,
                _ => method_not_allowed(),
            },
            "/prepared_statement" => match method {
                Method::POST => handle_prepared_statement(req, ctx).await,
                _ => method_not_allowed(),
            },
            "/get_stream" => match method {
                Method::GET => handle_get_stream(&req, ctx),
                _ => method_not_allowed(),
            },
            "/catalogs" => match method {
                Method::GET => handle_catalogs(ctx).await,
                _ => method_not_allowed(),
            },
            "/db_schemas" => match method {
                Method::GET => handle_db_schemas(&req, ctx).await,
                _ => method_not_allowed(),
            },
            "/tables" => match method {
                Method::GET => handle_tables(&req, ctx).await,
                _ => method_not_allowed(),
            },
            "/table_types" => match method {
                Method::GET => handle_table_types(ctx).await,
                _ => method_not_allowed(),
            },
            "/health" => match method {
                Method::GET => handle_health(),
                _ => method_not_allowed(),
            },
            p if p.starts_with("/result_set/") => {
                let handle = match decode_segment(p.trim_start_matches("/result_set/")) {
                    Ok(handle) => handle.into_owned(),
                    Err(_) => return error_response(StatusCode::BadRequest, "Invalid handle"),
                };
                if handle.is_empty() || handle.contains('/') {
                    return error_response(StatusCode::NotFound, "Not Found");
                }
                match method {
                    Method::GET => handle_get_result_set(&handle, ctx),
                    Method::DELETE => handle_cancel(&handle, ctx).await,
                    _ => method_not_allowed(),
                }
            }
            p if p.starts_with("/objects/") => {
                let key = match decode_segment(p.trim_start_matches("/objects/")) {
                    Ok(key) => key.into_owned(),
                    Err(_) => return error_response(StatusCode::BadRequest, "Invalid object key"),
                };
                match method {
                    Method::GET => handle_object(&key, &req, ctx).await,
                    _ => method_not_allowed(),
                }
            }
            _ => error_response(StatusCode::NotFound, "Not Found"),
        }
    }
}

fn method_not_allowed() -> HttpResult {
    error_response(StatusCode::MethodNotAllowed, "Method Not Allowed")
}

pub async fn handle_request(req: Request<Incoming>, ctx: Arc<FrontendContext>) -> HttpResult {
    HttpHandler::new(ctx).handle(req).await
}
