//! Starting and stopping broadcaster sessions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::oneshot;

use super::corroboration::{CorroborationPolicy, FailureKind};
use super::events::{NormalizedEvent, RoomStats};
use super::fanout::EventBroadcaster;
use super::registry::{ConnectionRegistry, RegistryError};
use super::session::Session;
use super::worker::{Readout, SessionWorker};
use crate::config::Config;
use crate::tts::TtsGateway;
use crate::upstream::UpstreamConnector;

/// Timing and policy knobs for connection attempts.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub connect_timeout: Duration,
    pub grace_period: Duration,
    pub policy: CorroborationPolicy,
    /// Upper bound on an adapter's `disconnect()` during teardown.
    pub teardown_timeout: Duration,
    /// How long `stop` waits for the worker to confirm teardown.
    pub stop_timeout: Duration,
    pub readout_voice: String,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            grace_period: config.corroboration_grace,
            policy: config.corroboration_policy,
            teardown_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(10),
            readout_voice: config.tts_default_voice.clone(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session already existed; no new connection was made.
    AlreadyActive(RoomStats),
    Connected(RoomStats),
}

impl StartOutcome {
    pub fn stats(&self) -> RoomStats {
        match self {
            Self::AlreadyActive(stats) | Self::Connected(stats) => *stats,
        }
    }
}

/// A start attempt that did not produce a live session. The session is
/// already gone from the registry when this is returned.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StartFailure {
    pub username: String,
    pub kind: FailureKind,
    /// User-facing text.
    pub message: String,
    /// Raw upstream error text, if any.
    pub detail: Option<String>,
}

impl StartFailure {
    pub fn new(username: &str, kind: FailureKind, detail: Option<String>) -> Self {
        Self {
            username: username.to_string(),
            message: kind.user_message(username),
            kind,
            detail,
        }
    }
}

/// Owns the start/stop protocol for every broadcaster.
pub struct LifecycleController {
    registry: Arc<ConnectionRegistry>,
    broadcaster: EventBroadcaster,
    connector: Arc<dyn UpstreamConnector>,
    tts: Option<Arc<TtsGateway>>,
    settings: LifecycleSettings,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        connector: Arc<dyn UpstreamConnector>,
        tts: Option<Arc<TtsGateway>>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            broadcaster: EventBroadcaster::new(registry.clone()),
            registry,
            connector,
            tts,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Start monitoring `username` and wait until the attempt is decided.
    ///
    /// Idempotent: an existing session is reported with its current stats.
    pub async fn start(&self, username: &str) -> Result<StartOutcome, StartFailure> {
        let (session, inbox) = match self.registry.create(username) {
            Ok(created) => created,
            Err(RegistryError::AlreadyExists { stats, .. }) => {
                tracing::debug!(%username, "start for an already active session");
                return Ok(StartOutcome::AlreadyActive(stats));
            }
            Err(err @ RegistryError::NotFound { .. }) => {
                return Err(StartFailure::new(
                    username,
                    FailureKind::Unknown,
                    Some(err.to_string()),
                ));
            }
        };

        let link = match self.connector.open(username).await {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(%username, error = %err, "could not construct upstream connection");
                self.registry.remove_session(&session);
                let kind = FailureKind::classify(&err.message);
                return Err(StartFailure::new(username, kind, Some(err.message)));
            }
        };

        let readout = self.tts.clone().map(|gateway| Readout {
            gateway,
            voice: self.settings.readout_voice.clone(),
        });

        let worker = SessionWorker::new(
            session.clone(),
            self.registry.clone(),
            self.broadcaster.clone(),
            link.connection,
            link.events,
            inbox,
            readout,
            self.settings.clone(),
        );

        let (started_tx, started_rx) = oneshot::channel();
        tokio::spawn(worker.run(started_tx));

        match started_rx.await {
            Ok(Ok(stats)) => Ok(StartOutcome::Connected(stats)),
            Ok(Err(failure)) => Err(failure),
            Err(_) => {
                tracing::error!(%username, "session worker exited without reporting");
                self.force_remove(&session);
                Err(StartFailure::new(username, FailureKind::Unknown, None))
            }
        }
    }

    /// Stop monitoring `username`. Returns `false` if there was no session.
    pub async fn stop(&self, username: &str) -> bool {
        let Ok(session) = self.registry.get(username) else {
            return false;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if !session.request_stop(Some(ack_tx)) {
            tracing::warn!(%username, "session worker unreachable, removing directly");
            self.force_remove(&session);
            return true;
        }

        match tokio::time::timeout(self.settings.stop_timeout, ack_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(%username, "session worker did not confirm stop");
                self.force_remove(&session);
            }
        }

        tracing::info!(%username, "session stopped");
        true
    }

    /// Stop every session. Returns the usernames that were stopped.
    pub async fn stop_all(&self) -> Vec<String> {
        let usernames = self.registry.usernames();
        let results = join_all(usernames.iter().map(|username| self.stop(username))).await;

        usernames
            .into_iter()
            .zip(results)
            .filter_map(|(username, stopped)| stopped.then_some(username))
            .collect()
    }

    fn force_remove(&self, session: &Arc<Session>) {
        if self.registry.remove_session(session) {
            self.broadcaster
                .deliver(session, &NormalizedEvent::disconnected(session.username()));
        }
        session.channels().close_all();
    }
}
