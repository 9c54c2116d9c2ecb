//! Request extractors shared by the route modules.

use axum::extract::{FromRequest, FromRequestParts, Path};
use axum::http::request::Parts;
use axum::Json;

use crate::error::ApiError;

/// Broadcaster username taken from the `{username}` path segment.
///
/// Surrounding whitespace and one leading `@` are removed, so `"@Foo "` and
/// `"Foo"` name the same session. Case is preserved. An empty result is
/// rejected with `400`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterName(pub String);

pub fn normalize_username(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    (!name.is_empty()).then(|| name.to_string())
}

impl<S> FromRequestParts<S> for BroadcasterName
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::bad_request("Username is required").with_username(""))?;

        normalize_username(&raw)
            .map(BroadcasterName)
            .ok_or_else(|| ApiError::bad_request("Username is required").with_username(""))
    }
}

/// JSON request body whose rejections use the `ApiError` shape (`400`).
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
