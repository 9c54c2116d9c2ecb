//! Normalized live events and the `{type, data, timestamp}` wire envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A chat comment left in the broadcaster's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user: String,
    pub text: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    /// Server-rendered readout of this comment, when the TTS gateway produced one in time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// A gift sent to the broadcaster, resolved against the gift catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: String,
    pub user: String,
    pub gift_name: String,
    pub gift_id: u64,
    pub repeat_count: u64,
    /// Diamond value of a single gift (multiply by `repeat_count` for the total).
    pub diamond_count: u64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
}

impl Gift {
    pub fn total_diamonds(&self) -> u64 {
        self.diamond_count.saturating_mul(self.repeat_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user: String,
    pub like_count: u64,
    pub total_like_count: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub user: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub user: String,
    pub timestamp: i64,
}

/// Latest room snapshot. Each field is overwritten by the platform's value, never summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub viewer_count: u64,
    pub like_count: u64,
    pub total_viewer_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Connected,
    Disconnected,
}

/// Connection status change for a broadcaster, as seen by viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSignal {
    #[serde(skip)]
    pub status: SignalStatus,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Normalized event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    Comment(Comment),
    Gift(Gift),
    Like(Like),
    Follow(Follow),
    Share(Share),
    RoomStats { stats: RoomStats, timestamp: i64 },
    ConnectionSignal { signal: ConnectionSignal, timestamp: i64 },
}

impl NormalizedEvent {
    pub fn connected(username: &str) -> Self {
        Self::signal(SignalStatus::Connected, username)
    }

    pub fn disconnected(username: &str) -> Self {
        Self::signal(SignalStatus::Disconnected, username)
    }

    fn signal(status: SignalStatus, username: &str) -> Self {
        Self::ConnectionSignal {
            signal: ConnectionSignal {
                status,
                username: username.to_string(),
            },
            timestamp: relay_common::now_millis(),
        }
    }

    /// Wire `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Comment(_) => EventKind::COMMENT,
            Self::Gift(_) => EventKind::GIFT,
            Self::Like(_) => EventKind::LIKE,
            Self::Follow(_) => EventKind::FOLLOW,
            Self::Share(_) => EventKind::SHARE,
            Self::RoomStats { .. } => EventKind::ROOM_STATS,
            Self::ConnectionSignal { signal, .. } => match signal.status {
                SignalStatus::Connected => EventKind::CONNECTED,
                SignalStatus::Disconnected => EventKind::DISCONNECTED,
            },
        }
    }

    /// Capture time in milliseconds since the epoch.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Comment(c) => c.timestamp,
            Self::Gift(g) => g.timestamp,
            Self::Like(l) => l.timestamp,
            Self::Follow(f) => f.timestamp,
            Self::Share(s) => s.timestamp,
            Self::RoomStats { timestamp, .. } | Self::ConnectionSignal { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Whether this event is audience traffic, i.e. proof that the room is actually streaming.
    pub fn is_traffic(&self) -> bool {
        !matches!(self, Self::ConnectionSignal { .. })
    }

    pub fn to_wire(&self) -> WireEvent {
        let data = match self {
            Self::Comment(c) => serde_json::to_value(c),
            Self::Gift(g) => serde_json::to_value(g),
            Self::Like(l) => serde_json::to_value(l),
            Self::Follow(f) => serde_json::to_value(f),
            Self::Share(s) => serde_json::to_value(s),
            Self::RoomStats { stats, .. } => serde_json::to_value(stats),
            Self::ConnectionSignal { signal, .. } => serde_json::to_value(signal),
        }
        .unwrap_or_default();

        WireEvent {
            kind: self.kind(),
            data,
            timestamp: self.timestamp(),
        }
    }
}

/// Wire `type` values.
pub struct EventKind;

impl EventKind {
    pub const COMMENT: &'static str = "comment";
    pub const GIFT: &'static str = "gift";
    pub const LIKE: &'static str = "like";
    pub const FOLLOW: &'static str = "follow";
    pub const SHARE: &'static str = "share";
    pub const ROOM_STATS: &'static str = "roomStats";
    pub const CONNECTED: &'static str = "connected";
    pub const DISCONNECTED: &'static str = "disconnected";
    pub const ERROR: &'static str = "error";
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// One push-channel message: `{"type": ..., "data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
    pub timestamp: i64,
}

impl WireEvent {
    /// Terminal error sent to a subscriber that cannot be served.
    pub fn error(message: &str) -> Self {
        Self {
            kind: EventKind::ERROR,
            data: serde_json::json!({ "message": message }),
            timestamp: relay_common::now_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
