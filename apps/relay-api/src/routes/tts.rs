//! Text-to-speech endpoints.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::routes::extract::ApiJson;
use crate::tts::voices::{self, VoiceInfo};
use crate::tts::{RenderOptions, AUDIO_FORMAT};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tts/voices", get(list_voices))
        .route("/tts/speak", post(speak))
        .route("/tts/audio/{key}", get(audio))
        .route("/tts/stream", get(stream))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoicesResponse {
    pub success: bool,
    pub voices: Vec<VoiceInfo>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeakRequest {
    pub text: Option<String>,
    pub voice_id: Option<String>,
    pub speed: Option<f32>,
    pub volume: Option<f32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpeakResponse {
    pub success: bool,
    pub audio_url: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub text: Option<String>,
    pub lang: Option<String>,
}

fn mp3(audio: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Body::from(audio),
    )
        .into_response()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[utoipa::path(
    get,
    path = "/tts/voices",
    tag = "TTS",
    responses((status = 200, description = "Available voices", body = VoicesResponse)),
)]
pub async fn list_voices() -> Json<VoicesResponse> {
    Json(VoicesResponse {
        success: true,
        voices: voices::catalog(),
    })
}

#[utoipa::path(
    post,
    path = "/tts/speak",
    tag = "TTS",
    request_body = SpeakRequest,
    responses(
        (status = 200, description = "Rendered clip reference", body = SpeakResponse),
        (status = 400, description = "Missing text or voiceId, or a malformed body", body = ApiErrorBody),
        (status = 500, description = "Rendering failed", body = ApiErrorBody),
    ),
)]
pub async fn speak(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SpeakRequest>,
) -> Result<Json<SpeakResponse>, ApiError> {
    let (Some(text), Some(voice)) = (non_blank(req.text), non_blank(req.voice_id)) else {
        return Err(ApiError::bad_request("Text and voiceId are required"));
    };

    let defaults = RenderOptions::default();
    let options = RenderOptions {
        speed: req.speed.unwrap_or(defaults.speed),
        volume: req.volume.unwrap_or(defaults.volume),
    };

    let reference = state.tts.render(&text, &voice, options).await?;
    Ok(Json(SpeakResponse {
        success: true,
        audio_url: reference.url,
        format: reference.format,
    }))
}

#[utoipa::path(
    get,
    path = "/tts/audio/{key}",
    tag = "TTS",
    params(("key" = String, Path, description = "Content key from a rendered clip reference")),
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 404, description = "Not rendered or expired", body = ApiErrorBody),
    ),
)]
pub async fn audio(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    state
        .tts
        .audio(&key)
        .await
        .map(mp3)
        .ok_or_else(|| ApiError::not_found("Audio not found"))
}

#[utoipa::path(
    get,
    path = "/tts/stream",
    tag = "TTS",
    params(
        ("text" = String, Query, description = "Text to speak"),
        ("lang" = Option<String>, Query, description = "Voice or language code (defaults to es)"),
    ),
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 400, description = "Missing text", body = ApiErrorBody),
        (status = 500, description = "Rendering failed", body = ApiErrorBody),
    ),
)]
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let text = non_blank(query.text).ok_or_else(|| ApiError::bad_request("Text is required"))?;
    let voice = non_blank(query.lang).unwrap_or_else(|| voices::DEFAULT_LANGUAGE.to_string());

    let audio = state
        .tts
        .render_bytes(&text, &voice, RenderOptions::default())
        .await?;
    tracing::debug!(bytes = audio.len(), format = AUDIO_FORMAT, "streamed speech");
    Ok(mp3(audio))
}
