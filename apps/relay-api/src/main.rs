use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::config::Config;
use relay_api::tts::{GoogleTranslateSynthesizer, TtsGateway};
use relay_api::upstream::relay::WebcastRelayConnector;
use relay_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let public_dir = config.public_dir.clone();

    let connector = Arc::new(WebcastRelayConnector::new(config.webcast_relay_url.clone()));

    let synthesizer = GoogleTranslateSynthesizer::new(config.tts_endpoint.clone())
        .expect("failed to build speech client");
    let tts = Arc::new(
        TtsGateway::new(
            Arc::new(synthesizer),
            config.tts_cache_capacity,
            config.tts_cache_ttl,
        )
        .with_audio_wait(config.tts_render_timeout),
    );

    tracing::info!(
        relay = %config.webcast_relay_url,
        policy = %config.corroboration_policy,
        connect_timeout = ?config.connect_timeout,
        auto_readout = config.tts_auto_render,
        "relay-api configured"
    );

    let state = AppState::new(&config, connector, tts);
    let lifecycle = state.lifecycle.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(relay_api::routes::router())
        .fallback_service(ServeDir::new(public_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let stopped = lifecycle.stop_all().await;
            tracing::info!(count = stopped.len(), "shutting down");
        })
        .await
        .expect("server error");
}
