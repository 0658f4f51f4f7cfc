use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::frontend::context::FrontendContext;
use crate::shared::config::ServerConfig;

use super::handler::handle_request;

pub async fn run_http_server(ctx: Arc<FrontendContext>, cfg: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = cfg.http_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(target: "glide::http", "HTTP server running at http://{addr}/query");
    serve(listener, ctx, cfg.keep_alive, cfg.max_connections).await
}

/// Accepts connections on `listener` until the server state signals shutdown.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<FrontendContext>,
    keep_alive: bool,
    max_connections: usize,
) -> anyhow::Result<()> {
    // 0 means unlimited
    let connection_semaphore =
        (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));

    loop {
        if ctx.server_state.is_shutting_down() {
            break;
        }

        let permit = match &connection_semaphore {
            Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => break,
            },
            None => None,
        };

        let accept_result = tokio::select! {
            result = listener.accept() => result,
            _ = ctx.server_state.wait_for_shutdown() => {
                info!(target: "glide::http", "HTTP server shutting down, stopping accept loop");
                break;
            }
        };

        let (stream, peer_addr) = match accept_result {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(target: "glide::http", "Failed to accept HTTP connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let ctx = Arc::clone(&ctx);

        tokio::spawn(async move {
            ctx.server_state.connection_opened();
            let mut builder = hyper::server::conn::http1::Builder::new();
            builder.keep_alive(keep_alive);

            let service_ctx = Arc::clone(&ctx);
            if let Err(err) = builder
                .serve_connection(
                    io,
                    service_fn(move |req| handle_request(req, Arc::clone(&service_ctx))),
                )
                .await
            {
                let text = err.to_string();
                if !text.contains("connection closed")
                    && !text.contains("broken pipe")
                    && !text.contains("Connection reset")
                {
                    warn!(target: "glide::http", peer = %peer_addr, "Error serving connection: {:?}", err);
                }
            }
            ctx.server_state.connection_closed();
            drop(permit);
        });
    }

    if ctx.server_state.active_connections() > 0 {
        info!(target: "glide::http", "HTTP server waiting for active connections to complete...");
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    }
    info!(target: "glide::http", "HTTP server shutdown complete");
    Ok(())
}
