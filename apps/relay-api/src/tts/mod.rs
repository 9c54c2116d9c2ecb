//! Text-to-speech rendering gateway.
//!
//! Comments are turned into short MP3 readouts by a [`SpeechSynthesizer`]. The
//! [`TtsGateway`] caches rendered audio by content so repeated phrases (and
//! concurrent requests for the same phrase) hit the synthesizer once.

pub mod gateway;
pub mod synth;
pub mod voices;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use gateway::TtsGateway;
pub use synth::{GoogleTranslateSynthesizer, SpeechSynthesizer};

/// Container format of every rendered clip.
pub const AUDIO_FORMAT: &str = "mp3";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("text is empty")]
    EmptyText,
    #[error("speech request failed: {0}")]
    Request(String),
    #[error("speech service responded with status {0}")]
    Status(u16),
    #[error("speech service returned no audio")]
    EmptyAudio,
    #[error("rendering timed out")]
    Timeout,
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status(status.as_u16()),
            None if err.is_timeout() => Self::Timeout,
            None => Self::Request(err.to_string()),
        }
    }
}

/// Playback hints. Part of the cache key, so two renders differing only in
/// speed are distinct clips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RenderOptions {
    pub speed: f32,
    pub volume: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 1.0,
        }
    }
}

/// Where a rendered clip can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AudioReference {
    pub key: String,
    pub url: String,
    pub format: String,
}

impl AudioReference {
    pub fn for_key(key: String) -> Self {
        Self {
            url: format!("/tts/audio/{key}"),
            key,
            format: AUDIO_FORMAT.to_string(),
        }
    }
}
