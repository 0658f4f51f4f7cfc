use std::sync::Arc;

use crate::engine::GlideService;
use crate::engine::export::ObjectStoreResultStore;
use crate::engine::query_engine::DataFusionEngine;
use crate::frontend::server_state::ServerState;
use crate::shared::config::Settings;

#[derive(Clone)]
pub struct FrontendContext {
    pub service: Arc<GlideService>,
    /// Backs `GET /objects/{key}`; the same store the bulk exporter writes to.
    pub objects: Arc<ObjectStoreResultStore>,
    pub server_state: Arc<ServerState>,
    pub auth_token: Option<String>,
}

impl FrontendContext {
    pub fn new(
        service: Arc<GlideService>,
        objects: Arc<ObjectStoreResultStore>,
        auth_token: &str,
    ) -> Arc<Self> {
        let auth_token = (!auth_token.is_empty()).then(|| auth_token.to_string());
        Arc::new(Self {
            service,
            objects,
            server_state: Arc::new(ServerState::new()),
            auth_token,
        })
    }

    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Arc<Self>> {
        let engine = Arc::new(DataFusionEngine::from_config(&settings.engine).await?);
        let objects = Arc::new(ObjectStoreResultStore::from_config(
            &settings.bulk,
            &settings.server.public_url,
        )?);
        let service = GlideService::from_settings(settings, engine, objects.clone());
        Ok(Self::new(
            Arc::new(service),
            objects,
            &settings.server.auth_token,
        ))
    }
}
