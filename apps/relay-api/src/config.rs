use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::corroboration::CorroborationPolicy;

/// Relay API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// WebSocket relay that forwards the platform's push events.
    pub webcast_relay_url: String,
    /// Primary deadline for an upstream `connect()`.
    pub connect_timeout: Duration,
    /// Window in which corroborating activity can still confirm an attempt.
    pub corroboration_grace: Duration,
    pub corroboration_policy: CorroborationPolicy,
    /// Frames buffered per viewer before the viewer is dropped as too slow.
    pub subscriber_queue_capacity: usize,
    pub tts_endpoint: String,
    /// Voice used for automatic comment readouts.
    pub tts_default_voice: String,
    /// Attach a server-rendered readout to every comment.
    pub tts_auto_render: bool,
    /// How long an audio request waits for a readout that is still rendering.
    pub tts_render_timeout: Duration,
    pub tts_cache_capacity: u64,
    pub tts_cache_ttl: Duration,
    /// Directory served for every path no route matches.
    pub public_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            webcast_relay_url: "ws://127.0.0.1:8081/webcast".to_string(),
            connect_timeout: Duration::from_secs(30),
            corroboration_grace: Duration::from_secs(10),
            corroboration_policy: CorroborationPolicy::Permissive,
            subscriber_queue_capacity: 256,
            tts_endpoint: "https://translate.google.com/translate_tts".to_string(),
            tts_default_voice: "es".to_string(),
            tts_auto_render: true,
            tts_render_timeout: Duration::from_millis(3000),
            tts_cache_capacity: 512,
            tts_cache_ttl: Duration::from_secs(3600),
            public_dir: PathBuf::from("public"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset or unparsable values keep their
    /// default (unparsable ones are logged).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            webcast_relay_url: string_var("WEBCAST_RELAY_URL")
                .unwrap_or(defaults.webcast_relay_url),
            connect_timeout: parsed_var("CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            corroboration_grace: parsed_var("CORROBORATION_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.corroboration_grace),
            corroboration_policy: parsed_var("CORROBORATION_POLICY")
                .unwrap_or(defaults.corroboration_policy),
            subscriber_queue_capacity: parsed_var("SUBSCRIBER_QUEUE_CAPACITY")
                .unwrap_or(defaults.subscriber_queue_capacity),
            tts_endpoint: string_var("TTS_ENDPOINT").unwrap_or(defaults.tts_endpoint),
            tts_default_voice: string_var("TTS_DEFAULT_VOICE")
                .unwrap_or(defaults.tts_default_voice),
            tts_auto_render: parsed_var("TTS_AUTO_RENDER").unwrap_or(defaults.tts_auto_render),
            tts_render_timeout: parsed_var("TTS_RENDER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tts_render_timeout),
            tts_cache_capacity: parsed_var("TTS_CACHE_CAPACITY")
                .unwrap_or(defaults.tts_cache_capacity),
            tts_cache_ttl: parsed_var("TTS_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.tts_cache_ttl),
            public_dir: string_var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
        }
    }
}

fn string_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parsed_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = string_var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(var = name, value = %raw, %err, "ignoring invalid config value");
            None
        }
    }
}
