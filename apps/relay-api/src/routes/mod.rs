pub mod connections;
pub mod extract;
pub mod health;
pub mod tts;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(connections::router())
        .merge(crate::gateway::server::router())
        .merge(tts::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Connections
        connections::start,
        connections::stop,
        connections::comments,
        connections::gifts,
        connections::stats,
        connections::status,
        connections::stop_all,
        // Events
        crate::gateway::server::subscribe,
        // TTS
        tts::list_voices,
        tts::speak,
        tts::audio,
        tts::stream,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            // Events
            crate::gateway::events::Comment,
            crate::gateway::events::Gift,
            crate::gateway::events::Like,
            crate::gateway::events::Follow,
            crate::gateway::events::Share,
            crate::gateway::events::RoomStats,
            crate::gateway::session::ConnectionState,
            crate::gateway::session::SessionSnapshot,
            // Route request/response types
            health::HealthResponse,
            connections::StartResponse,
            connections::StopResponse,
            connections::CommentsResponse,
            connections::GiftsResponse,
            connections::StatsResponse,
            connections::StatusResponse,
            connections::StopAllResponse,
            tts::VoicesResponse,
            tts::SpeakRequest,
            tts::SpeakResponse,
            crate::tts::voices::VoiceInfo,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Connections", description = "Broadcaster session lifecycle and buffers"),
        (name = "Events", description = "Live event stream"),
        (name = "TTS", description = "Text-to-speech rendering"),
    )
)]
pub struct ApiDoc;
