//! Pure translation of raw platform payloads into [`NormalizedEvent`]s.
//!
//! Payload shapes drift between platform releases, so every field is read
//! through a fallback chain of JSON pointers and missing values degrade to
//! placeholders instead of failing the event.

use serde_json::Value;

use super::gifts;
use super::{RawEvent, RawEventKind};
use crate::gateway::events::{Comment, Follow, Gift, Like, NormalizedEvent, RoomStats, Share};

/// Placeholder for an event whose author could not be identified.
pub const UNKNOWN_USER: &str = "Usuario";

const USER_POINTERS: &[&str] = &["/user/uniqueId", "/uniqueId", "/nickname"];
const PICTURE_POINTERS: &[&str] = &["/user/profilePicture/urls/0", "/profilePictureUrl"];

/// First non-blank string found at `pointers`, in order.
pub fn first_str(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| payload.pointer(p))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First value at `pointers` readable as an unsigned integer. Numeric strings
/// are accepted; zero counts as missing so the chain keeps looking.
pub fn first_u64(payload: &Value, pointers: &[&str]) -> Option<u64> {
    pointers
        .iter()
        .filter_map(|p| payload.pointer(p))
        .filter_map(as_u64)
        .find(|n| *n > 0)
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn user_of(payload: &Value) -> String {
    first_str(payload, USER_POINTERS).unwrap_or_else(|| UNKNOWN_USER.to_string())
}

fn picture_of(payload: &Value) -> Option<String> {
    first_str(payload, PICTURE_POINTERS)
}

/// A chat message. Blank text yields no event.
pub fn comment(payload: &Value, timestamp: i64) -> Option<Comment> {
    let text = first_str(payload, &["/comment", "/text"])?;
    Some(Comment {
        user: user_of(payload),
        text,
        timestamp,
        profile_pic_url: picture_of(payload),
        audio_url: None,
    })
}

pub fn gift(payload: &Value, timestamp: i64) -> Gift {
    let user = user_of(payload);
    let resolved = gifts::resolve(payload);
    let repeat_count = first_u64(payload, &["/repeatCount", "/repeat_count"]).unwrap_or(1);

    Gift {
        id: format!("{user}-{}-{timestamp}", resolved.gift_id),
        user,
        gift_name: resolved.name,
        gift_id: resolved.gift_id,
        repeat_count,
        diamond_count: resolved.diamonds,
        timestamp,
        profile_pic_url: picture_of(payload),
    }
}

pub fn like(payload: &Value, timestamp: i64) -> Like {
    Like {
        user: user_of(payload),
        like_count: first_u64(payload, &["/likeCount"]).unwrap_or(1),
        total_like_count: first_u64(payload, &["/totalLikeCount"]).unwrap_or(0),
        timestamp,
    }
}

pub fn follow(payload: &Value, timestamp: i64) -> Follow {
    Follow {
        user: user_of(payload),
        timestamp,
        profile_pic_url: picture_of(payload),
    }
}

pub fn share(payload: &Value, timestamp: i64) -> Share {
    Share {
        user: user_of(payload),
        timestamp,
    }
}

/// Viewer snapshot carried by a `roomUser` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerSnapshot {
    pub viewer_count: u64,
    pub total_viewer_count: u64,
}

impl ViewerSnapshot {
    /// Overwrite the viewer fields of `stats`; likes are untouched.
    pub fn apply(&self, stats: &mut RoomStats) {
        stats.viewer_count = self.viewer_count;
        stats.total_viewer_count = self.total_viewer_count;
    }
}

pub fn viewers(payload: &Value) -> ViewerSnapshot {
    let top_viewers = payload
        .get("topViewers")
        .and_then(Value::as_array)
        .map(|v| v.len() as u64)
        .unwrap_or(0);

    ViewerSnapshot {
        viewer_count: first_u64(payload, &["/viewerCount"]).unwrap_or(0),
        total_viewer_count: first_u64(payload, &["/totalViewerCount"]).unwrap_or(top_viewers),
    }
}

/// Details of the platform's own `connected` confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectedInfo {
    pub room_id: Option<String>,
    pub viewer_count: Option<u64>,
}

pub fn connected(payload: &Value) -> ConnectedInfo {
    let room_id = first_str(payload, &["/roomId"]).or_else(|| {
        payload
            .get("roomId")
            .and_then(Value::as_u64)
            .map(|n| n.to_string())
    });

    ConnectedInfo {
        room_id,
        viewer_count: first_u64(payload, &["/roomInfo/user_count", "/viewerCount"]),
    }
}

/// Translate a raw audience event into its normalized form.
///
/// Lifecycle kinds (`connected`, `streamEnd`, `disconnected`, `error`) and
/// `roomUser` snapshots are handled by the session worker and yield `None`
/// here, as does a chat message without text.
pub fn audience_event(raw: &RawEvent, timestamp: i64) -> Option<NormalizedEvent> {
    let payload = &raw.payload;
    match raw.kind {
        RawEventKind::Chat => comment(payload, timestamp).map(NormalizedEvent::Comment),
        RawEventKind::Gift => Some(NormalizedEvent::Gift(gift(payload, timestamp))),
        RawEventKind::Like => Some(NormalizedEvent::Like(like(payload, timestamp))),
        RawEventKind::Follow => Some(NormalizedEvent::Follow(follow(payload, timestamp))),
        RawEventKind::Share => Some(NormalizedEvent::Share(share(payload, timestamp))),
        RawEventKind::RoomUser
        | RawEventKind::Connected
        | RawEventKind::StreamEnd
        | RawEventKind::Disconnected
        | RawEventKind::Error => None,
    }
}
