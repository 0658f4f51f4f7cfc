use glide::frontend::start_all;
use glide::logging;
use glide::shared::config::CONFIG;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(&CONFIG.logging)?;
    info!("Glide is starting...");
    start_all(&CONFIG).await?;
    Ok(())
}
