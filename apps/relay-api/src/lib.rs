pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod tts;
pub mod upstream;

use std::sync::Arc;

use config::Config;
use gateway::lifecycle::{LifecycleController, LifecycleSettings};
use gateway::registry::ConnectionRegistry;
use tts::TtsGateway;
use upstream::UpstreamConnector;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub lifecycle: Arc<LifecycleController>,
    pub tts: Arc<TtsGateway>,
}

impl AppState {
    /// Wire the registry, lifecycle controller, and TTS gateway together.
    pub fn new(
        config: &Config,
        connector: Arc<dyn UpstreamConnector>,
        tts: Arc<TtsGateway>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.subscriber_queue_capacity));
        let readout_gateway = config.tts_auto_render.then(|| tts.clone());
        let lifecycle = Arc::new(LifecycleController::new(
            registry.clone(),
            connector,
            readout_gateway,
            LifecycleSettings::from_config(config),
        ));

        Self {
            registry,
            lifecycle,
            tts,
        }
    }
}
