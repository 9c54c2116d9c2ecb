#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use relay_api::config::Config;
use relay_api::tts::{RenderError, RenderOptions, SpeechSynthesizer, TtsGateway};
use relay_api::upstream::{
    RawEvent, RawEventKind, UpstreamConnection, UpstreamConnector, UpstreamError, UpstreamLink,
    RAW_EVENT_CAPACITY,
};
use relay_api::AppState;

/// Short deadlines so corroboration scenarios finish quickly.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
pub const GRACE_PERIOD: Duration = Duration::from_millis(300);

/// What a scripted upstream connection does for one username.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub connect_delay: Duration,
    pub connect_error: Option<String>,
    /// Events emitted once `connect()` is called. Each delay is relative to
    /// the previous event.
    pub events: Vec<(Duration, RawEvent)>,
}

impl Script {
    pub fn resolves() -> Self {
        Self::default()
    }

    pub fn rejects(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// `connect()` never settles within a test.
    pub fn hangs() -> Self {
        Self {
            connect_delay: Duration::from_secs(3600),
            ..Self::default()
        }
    }

    pub fn then(mut self, after: Duration, event: RawEvent) -> Self {
        self.events.push((after, event));
        self
    }
}

/// In-memory stand-in for the platform: connections follow a per-username script.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<String, Script>>,
    senders: Mutex<HashMap<String, mpsc::Sender<RawEvent>>>,
    pub opened: AtomicUsize,
    pub disconnects: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, username: &str, script: Script) {
        self.scripts.lock().insert(username.to_string(), script);
    }

    /// Inject an event on `username`'s most recent connection.
    pub async fn push(&self, username: &str, event: RawEvent) {
        let sender = self
            .senders
            .lock()
            .get(username)
            .cloned()
            .expect("no connection opened for username");
        sender.send(event).await.expect("session worker is gone");
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for ScriptedConnector {
    async fn open(&self, username: &str) -> Result<UpstreamLink, UpstreamError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .get(username)
            .cloned()
            .unwrap_or_else(Script::resolves);

        let (tx, events) = mpsc::channel(RAW_EVENT_CAPACITY);
        self.senders.lock().insert(username.to_string(), tx.clone());

        Ok(UpstreamLink {
            connection: Arc::new(ScriptedConnection {
                script,
                events: tx,
                disconnects: self.disconnects.clone(),
            }),
            events,
        })
    }
}

struct ScriptedConnection {
    script: Script,
    events: mpsc::Sender<RawEvent>,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamConnection for ScriptedConnection {
    async fn connect(&self) -> Result<(), UpstreamError> {
        let events = self.events.clone();
        let scripted = self.script.events.clone();
        tokio::spawn(async move {
            for (after, event) in scripted {
                tokio::time::sleep(after).await;
                if events.send(event).await.is_err() {
                    return;
                }
            }
        });

        tokio::time::sleep(self.script.connect_delay).await;
        match &self.script.connect_error {
            Some(message) => Err(UpstreamError::new(message.clone())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), UpstreamError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Synthesizer that "renders" text as its own bytes after an optional delay.
#[derive(Default)]
pub struct EchoSynth {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for EchoSynth {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        _options: RenderOptions,
    ) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Bytes::from(format!("{language}:{text}")))
    }
}

pub fn test_config() -> Config {
    Config {
        connect_timeout: CONNECT_TIMEOUT,
        corroboration_grace: GRACE_PERIOD,
        subscriber_queue_capacity: 64,
        tts_auto_render: false,
        tts_render_timeout: Duration::from_millis(200),
        ..Config::default()
    }
}

pub fn test_tts(synth: Arc<EchoSynth>) -> Arc<TtsGateway> {
    Arc::new(TtsGateway::new(synth, 64, Duration::from_secs(60)))
}

/// Build an AppState around a scripted connector.
pub fn test_state_with(config: Config, connector: Arc<ScriptedConnector>) -> AppState {
    AppState::new(&config, connector, test_tts(Arc::new(EchoSynth::default())))
}

pub fn test_state(connector: Arc<ScriptedConnector>) -> AppState {
    test_state_with(test_config(), connector)
}

pub fn test_app(connector: Arc<ScriptedConnector>) -> (Router, AppState) {
    let state = test_state(connector);
    let app = relay_api::routes::router().with_state(state.clone());
    (app, state)
}

// ---------------------------------------------------------------------------
// Raw event builders
// ---------------------------------------------------------------------------

pub fn chat(user: &str, text: &str) -> RawEvent {
    RawEvent::new(RawEventKind::Chat, json!({ "uniqueId": user, "comment": text }))
}

pub fn gift(user: &str, gift_id: u64, repeat: u64) -> RawEvent {
    RawEvent::new(
        RawEventKind::Gift,
        json!({ "uniqueId": user, "giftId": gift_id, "repeatCount": repeat }),
    )
}

pub fn room_user(viewers: u64, top_viewers: usize) -> RawEvent {
    let top: Vec<Value> = (0..top_viewers).map(|i| json!({ "rank": i })).collect();
    RawEvent::new(
        RawEventKind::RoomUser,
        json!({ "viewerCount": viewers, "topViewers": top }),
    )
}

pub fn platform_connected() -> RawEvent {
    RawEvent::new(RawEventKind::Connected, json!({ "roomId": "7301" }))
}

pub fn stream_end() -> RawEvent {
    RawEvent::new(RawEventKind::StreamEnd, Value::Null)
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
