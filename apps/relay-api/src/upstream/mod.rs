//! Upstream connection adapter: one real-time platform connection per broadcaster.
//!
//! The platform client is reached through two small traits so the lifecycle
//! controller never depends on a concrete transport. Raw payloads travel as
//! untyped JSON and are turned into [`NormalizedEvent`]s by [`normalize`].
//!
//! [`NormalizedEvent`]: crate::gateway::events::NormalizedEvent

pub mod gifts;
pub mod normalize;
pub mod relay;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the queue carrying raw events from the adapter to its session worker.
pub const RAW_EVENT_CAPACITY: usize = 1024;

/// Event kinds the adapter subscribes to on the platform connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Chat,
    Gift,
    Like,
    Follow,
    Share,
    RoomUser,
    Connected,
    StreamEnd,
    Disconnected,
    Error,
}

impl RawEventKind {
    /// Every kind the adapter registers a handler for.
    pub const ALL: [RawEventKind; 10] = [
        Self::Chat,
        Self::Gift,
        Self::Like,
        Self::Follow,
        Self::Share,
        Self::RoomUser,
        Self::Connected,
        Self::StreamEnd,
        Self::Disconnected,
        Self::Error,
    ];

    /// Parse the platform's event name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "chat" => Some(Self::Chat),
            "gift" => Some(Self::Gift),
            "like" => Some(Self::Like),
            "follow" => Some(Self::Follow),
            "share" => Some(Self::Share),
            "roomUser" => Some(Self::RoomUser),
            "connected" => Some(Self::Connected),
            "streamEnd" => Some(Self::StreamEnd),
            "disconnected" => Some(Self::Disconnected),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Gift => "gift",
            Self::Like => "like",
            Self::Follow => "follow",
            Self::Share => "share",
            Self::RoomUser => "roomUser",
            Self::Connected => "connected",
            Self::StreamEnd => "streamEnd",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// One event as delivered by the platform, before normalization.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub payload: Value,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

/// Failure reported by the platform client. The text is all the caller gets;
/// its shape varies between releases.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Coerce an error payload of any shape into a message.
///
/// Strings are used as-is, objects contribute their `message` (or are
/// rendered as JSON), and null becomes a generic placeholder.
pub fn describe_error(payload: &Value) -> String {
    match payload {
        Value::Null => "Unknown error".to_string(),
        Value::String(s) if s.trim().is_empty() => "Unknown error".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").or_else(|| map.get("error")) {
            Some(Value::String(msg)) if !msg.trim().is_empty() => msg.clone(),
            Some(nested @ Value::Object(_)) => describe_error(nested),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}

/// A live connection handle for one broadcaster.
#[async_trait]
pub trait UpstreamConnection: Send + Sync {
    /// Open the platform connection. Resolution is not a trustworthy success
    /// signal on its own; callers corroborate with observed events.
    async fn connect(&self) -> Result<(), UpstreamError>;

    /// Close the connection. Safe to call more than once.
    async fn disconnect(&self) -> Result<(), UpstreamError>;
}

/// A constructed (not yet connected) connection plus its event subscription.
pub struct UpstreamLink {
    pub connection: Arc<dyn UpstreamConnection>,
    pub events: mpsc::Receiver<RawEvent>,
}

/// Factory for per-broadcaster connections.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Construct a connection for `username` with handlers registered for
    /// every [`RawEventKind`]. Does not connect.
    async fn open(&self, username: &str) -> Result<UpstreamLink, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_error_handles_every_shape() {
        assert_eq!(describe_error(&json!("boom")), "boom");
        assert_eq!(describe_error(&json!({ "message": "roomId not found" })), "roomId not found");
        assert_eq!(
            describe_error(&json!({ "error": { "message": "nested" } })),
            "nested"
        );
        assert_eq!(describe_error(&json!({ "code": 7 })), r#"{"code":7}"#);
        assert_eq!(describe_error(&Value::Null), "Unknown error");
        assert_eq!(describe_error(&json!("  ")), "Unknown error");
        assert_eq!(describe_error(&json!(404)), "404");
    }

    #[test]
    fn event_kind_names_round_trip() {
        for kind in RawEventKind::ALL {
            assert_eq!(RawEventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RawEventKind::parse("member"), None);
    }
}
