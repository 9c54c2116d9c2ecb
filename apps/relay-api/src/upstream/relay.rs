//! WebSocket relay adapter.
//!
//! Dials `{base}?uniqueId=<username>` on a webcast relay that forwards the
//! platform's push events as JSON text frames of the form
//! `{"event": "<kind>", "data": {...}}` (`type` is accepted in place of `event`).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use super::{
    RawEvent, RawEventKind, UpstreamConnection, UpstreamConnector, UpstreamError, UpstreamLink,
    RAW_EVENT_CAPACITY,
};

pub struct WebcastRelayConnector {
    base_url: String,
}

impl WebcastRelayConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UpstreamConnector for WebcastRelayConnector {
    async fn open(&self, username: &str) -> Result<UpstreamLink, UpstreamError> {
        let url = reqwest::Url::parse_with_params(&self.base_url, &[("uniqueId", username)])
            .map_err(|e| UpstreamError::new(format!("invalid relay url: {e}")))?;

        let (tx, events) = mpsc::channel(RAW_EVENT_CAPACITY);
        let connection = RelayConnection {
            url: url.to_string(),
            username: username.to_string(),
            events: tx,
            reader: Mutex::new(None),
            shutdown: Mutex::new(None),
        };

        Ok(UpstreamLink {
            connection: std::sync::Arc::new(connection),
            events,
        })
    }
}

struct RelayConnection {
    url: String,
    username: String,
    events: mpsc::Sender<RawEvent>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl UpstreamConnection for RelayConnection {
    async fn connect(&self) -> Result<(), UpstreamError> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(handshake_error)?;

        tracing::debug!(
            username = %self.username,
            status = %response.status(),
            "relay websocket established"
        );

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let events = self.events.clone();
        let username = self.username.clone();

        let handle = tokio::spawn(async move {
            let (mut write, mut read) = stream.split();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Some(event) = parse_frame(text.as_str()) else {
                                continue;
                            };
                            if events.send(event).await.is_err() {
                                // Worker is gone; nobody is listening.
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(%username, ?frame, "relay closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::warn!(%username, ?err, "relay read failed");
                            break;
                        }
                        None => break,
                    }
                }
            }

            let _ = events
                .send(RawEvent::new(RawEventKind::Disconnected, Value::Null))
                .await;
        });

        *self.shutdown.lock() = Some(shutdown_tx);
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), UpstreamError> {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| UpstreamError::new(format!("relay reader failed: {e}")))?;
        }
        Ok(())
    }
}

fn handshake_error(err: tungstenite::Error) -> UpstreamError {
    match err {
        tungstenite::Error::Http(response) => {
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            UpstreamError::new(format!("{} {}", response.status().as_u16(), body.trim()))
        }
        other => UpstreamError::new(format!("relay connection failed: {other}")),
    }
}

/// Parse one relay text frame. Malformed frames and unknown kinds yield `None`.
pub fn parse_frame(text: &str) -> Option<RawEvent> {
    let mut frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => {
            tracing::debug!(?err, "dropping malformed relay frame");
            return None;
        }
    };

    let name = frame
        .get("event")
        .or_else(|| frame.get("type"))
        .and_then(Value::as_str)?
        .to_string();

    let Some(kind) = RawEventKind::parse(&name) else {
        tracing::debug!(event = %name, "dropping unsubscribed relay event");
        return None;
    };

    let payload = frame
        .as_object_mut()
        .and_then(|obj| obj.remove("data"))
        .unwrap_or(Value::Null);
    Some(RawEvent::new(kind, payload))
}
