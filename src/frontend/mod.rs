pub mod context;
pub mod http;
pub mod server_state;

use std::sync::Arc;

use context::FrontendContext;
use tracing::info;

use crate::shared::config::Settings;

pub async fn start_all(settings: &Settings) -> anyhow::Result<()> {
    let ctx = FrontendContext::from_settings(settings).await?;

    let signal_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "glide::http", "Shutdown signal received");
            signal_ctx.server_state.signal_shutdown();
        }
    });

    let result = http::listener::run_http_server(Arc::clone(&ctx), &settings.server).await;
    ctx.service.shutdown();
    result
}
