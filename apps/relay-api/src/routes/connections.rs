//! Broadcaster connection endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::{Comment, Gift, RoomStats};
use crate::gateway::lifecycle::StartOutcome;
use crate::gateway::session::{Session, SessionSnapshot};
use crate::routes::extract::BroadcasterName;
use crate::AppState;

const NO_SESSION: &str = "No active connection";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connections/status", get(status))
        .route("/connections/stop-all", post(stop_all))
        .route("/connections/{username}/start", post(start))
        .route("/connections/{username}/stop", post(stop))
        .route("/connections/{username}/comments", get(comments))
        .route("/connections/{username}/gifts", get(gifts))
        .route("/connections/{username}/stats", get(stats))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub username: String,
    pub stats: RoomStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentsResponse {
    pub success: bool,
    pub comments: Vec<Comment>,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GiftsResponse {
    pub success: bool,
    pub gifts: Vec<Gift>,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub success: bool,
    pub stats: RoomStats,
    pub is_connected: bool,
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub success: bool,
    pub users: Vec<SessionSnapshot>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopAllResponse {
    pub success: bool,
    pub message: String,
    pub stopped: Vec<String>,
}

fn session_for(state: &AppState, username: &str) -> Result<Arc<Session>, ApiError> {
    state
        .registry
        .get(username)
        .map_err(|_| ApiError::not_found(NO_SESSION).with_username(username))
}

// ---------------------------------------------------------------------------
// POST /connections/:username/start
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/connections/{username}/start",
    tag = "Connections",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Session is live (or already was)", body = StartResponse),
        (status = 400, description = "Empty username", body = ApiErrorBody),
        (status = 500, description = "Broadcaster not live, timed out, or unreachable", body = ApiErrorBody),
    ),
)]
pub async fn start(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> Result<Json<StartResponse>, ApiError> {
    let outcome = state.lifecycle.start(&username).await?;

    let message = match outcome {
        StartOutcome::AlreadyActive(_) => "Already connected".to_string(),
        StartOutcome::Connected(_) => format!("Connected to @{username}"),
    };

    Ok(Json(StartResponse {
        success: true,
        message,
        stats: outcome.stats(),
        username,
    }))
}

// ---------------------------------------------------------------------------
// POST /connections/:username/stop
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/connections/{username}/stop",
    tag = "Connections",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Stopped, or `success: false` when there was nothing to stop", body = StopResponse),
        (status = 400, description = "Empty username", body = ApiErrorBody),
    ),
)]
pub async fn stop(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> Json<StopResponse> {
    let stopped = state.lifecycle.stop(&username).await;

    Json(StopResponse {
        success: stopped,
        message: if stopped {
            format!("Disconnected from @{username}")
        } else {
            NO_SESSION.to_string()
        },
        username,
    })
}

// ---------------------------------------------------------------------------
// GET /connections/:username/comments
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/connections/{username}/comments",
    tag = "Connections",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Most recent comments, oldest first", body = CommentsResponse),
        (status = 404, description = "No session", body = ApiErrorBody),
    ),
)]
pub async fn comments(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> Result<Json<CommentsResponse>, ApiError> {
    let session = session_for(&state, &username)?;
    Ok(Json(CommentsResponse {
        success: true,
        comments: session.recent_comments(),
        username,
    }))
}

// ---------------------------------------------------------------------------
// GET /connections/:username/gifts
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/connections/{username}/gifts",
    tag = "Connections",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Most recent gifts, oldest first", body = GiftsResponse),
        (status = 404, description = "No session", body = ApiErrorBody),
    ),
)]
pub async fn gifts(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> Result<Json<GiftsResponse>, ApiError> {
    let session = session_for(&state, &username)?;
    Ok(Json(GiftsResponse {
        success: true,
        gifts: session.recent_gifts(),
        username,
    }))
}

// ---------------------------------------------------------------------------
// GET /connections/:username/stats
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/connections/{username}/stats",
    tag = "Connections",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Latest room snapshot", body = StatsResponse),
        (status = 404, description = "No session", body = ApiErrorBody),
    ),
)]
pub async fn stats(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> Result<Json<StatsResponse>, ApiError> {
    let session = session_for(&state, &username)?;
    Ok(Json(StatsResponse {
        success: true,
        stats: session.stats(),
        is_connected: session.is_live(),
        username,
    }))
}

// ---------------------------------------------------------------------------
// GET /connections/status
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/connections/status",
    tag = "Connections",
    responses(
        (status = 200, description = "Every monitored broadcaster", body = StatusResponse),
    ),
)]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut users: Vec<SessionSnapshot> = state.registry.list_all().collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));

    Json(StatusResponse {
        success: true,
        count: users.len(),
        users,
    })
}

// ---------------------------------------------------------------------------
// POST /connections/stop-all
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/connections/stop-all",
    tag = "Connections",
    responses(
        (status = 200, description = "Every session torn down", body = StopAllResponse),
    ),
)]
pub async fn stop_all(State(state): State<AppState>) -> Json<StopAllResponse> {
    let mut stopped = state.lifecycle.stop_all().await;
    stopped.sort();
    tracing::info!(count = stopped.len(), "stopped all sessions");

    Json(StopAllResponse {
        success: true,
        message: "All connections closed".to_string(),
        stopped,
    })
}
