//! The per-session worker task.
//!
//! Each session gets exactly one worker. It owns the upstream connection,
//! drives the connect attempt through corroboration, then processes that
//! broadcaster's raw events one at a time until the stream ends or a stop
//! command arrives. Teardown always runs on the way out.

use std::sync::Arc;

use relay_common::id::{prefix, prefixed_ulid};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};

use super::corroboration::{Corroborator, FailureKind, Verdict};
use super::events::{Comment, NormalizedEvent, RoomStats};
use super::fanout::EventBroadcaster;
use super::lifecycle::{LifecycleSettings, StartFailure};
use super::registry::ConnectionRegistry;
use super::session::{ConnectionState, Session, SessionCommand};
use crate::tts::gateway::readout_text;
use crate::tts::{RenderOptions, TtsGateway};
use crate::upstream::{
    describe_error, normalize, RawEvent, RawEventKind, UpstreamConnection, UpstreamError,
};

/// Result of a start attempt, reported back to the caller that spawned the worker.
pub type StartReport = Result<RoomStats, StartFailure>;

/// Server-side readout of chat comments.
#[derive(Clone)]
pub struct Readout {
    pub gateway: Arc<TtsGateway>,
    pub voice: String,
}

/// Whether the worker keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    End,
}

enum ConnectOutcome {
    /// Went live; the event that corroborated it (if any) still needs handling.
    Live(Option<RawEvent>),
    Failed(StartFailure),
    Stopped(Option<oneshot::Sender<()>>),
}

/// The spawned `connect()` call. Kept across phases because traffic can make
/// the session live before connect resolves.
struct ConnectTask {
    handle: JoinHandle<Result<(), UpstreamError>>,
    pending: bool,
}

pub struct SessionWorker {
    session: Arc<Session>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: EventBroadcaster,
    connection: Arc<dyn UpstreamConnection>,
    events: mpsc::Receiver<RawEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    readout: Option<Readout>,
    settings: LifecycleSettings,
    attempt: String,
}

impl SessionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<Session>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: EventBroadcaster,
        connection: Arc<dyn UpstreamConnection>,
        events: mpsc::Receiver<RawEvent>,
        commands: mpsc::Receiver<SessionCommand>,
        readout: Option<Readout>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            session,
            registry,
            broadcaster,
            connection,
            events,
            commands,
            readout,
            settings,
            attempt: prefixed_ulid(prefix::ATTEMPT),
        }
    }

    fn username(&self) -> &str {
        self.session.username()
    }

    pub async fn run(mut self, started: oneshot::Sender<StartReport>) {
        let connection = self.connection.clone();
        let mut connect = ConnectTask {
            handle: tokio::spawn(async move { connection.connect().await }),
            pending: true,
        };

        tracing::info!(
            username = %self.username(),
            attempt = %self.attempt,
            policy = %self.settings.policy,
            "connecting to broadcaster"
        );

        let ack = match self.connect_phase(&mut connect).await {
            ConnectOutcome::Live(trigger) => {
                self.go_live();
                let _ = started.send(Ok(self.session.stats()));

                let mut ack = None;
                let mut flow = Flow::Continue;
                match trigger {
                    // Already announced by `go_live`.
                    Some(raw) if raw.kind == RawEventKind::Connected => {
                        self.apply_confirmation(&raw);
                    }
                    Some(raw) => flow = self.handle_event(raw).await,
                    None => {}
                }
                if flow == Flow::Continue {
                    ack = self.live_phase(&mut connect).await;
                }
                ack
            }
            ConnectOutcome::Failed(failure) => {
                tracing::warn!(
                    username = %self.username(),
                    attempt = %self.attempt,
                    kind = ?failure.kind,
                    detail = ?failure.detail,
                    "connection attempt failed"
                );
                // Tear down before answering so the caller never sees a stale entry.
                self.teardown(&mut connect).await;
                let _ = started.send(Err(failure));
                return;
            }
            ConnectOutcome::Stopped(ack) => {
                self.teardown(&mut connect).await;
                let _ = started.send(Err(StartFailure::new(
                    self.username(),
                    FailureKind::Cancelled,
                    None,
                )));
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return;
            }
        };

        self.teardown(&mut connect).await;
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    async fn connect_phase(&mut self, connect: &mut ConnectTask) -> ConnectOutcome {
        let mut corroborator = Corroborator::new(self.settings.policy);
        let primary = Instant::now() + self.settings.connect_timeout;
        let mut primary_elapsed = false;
        let mut grace: Option<Instant> = None;
        let mut grace_elapsed = false;

        loop {
            tokio::select! {
                result = &mut connect.handle, if connect.pending => {
                    connect.pending = false;
                    match result {
                        Ok(Ok(())) => {
                            tracing::debug!(username = %self.username(), "connect resolved");
                            corroborator.on_connect_resolved();
                        }
                        Ok(Err(err)) => {
                            tracing::warn!(username = %self.username(), error = %err, "connect rejected");
                            corroborator.on_connect_failed(&err.message);
                        }
                        Err(err) => {
                            tracing::error!(username = %self.username(), ?err, "connect task failed");
                            corroborator.on_connect_failed(&err.to_string());
                        }
                    }
                }
                _ = sleep_until(primary), if !primary_elapsed => {
                    primary_elapsed = true;
                    tracing::debug!(username = %self.username(), "connect deadline elapsed");
                    corroborator.on_primary_timeout();
                }
                _ = sleep_until(grace.unwrap_or(primary)), if grace.is_some() && !grace_elapsed => {
                    grace_elapsed = true;
                    corroborator.on_grace_timeout();
                }
                Some(raw) = self.events.recv() => match raw.kind {
                    RawEventKind::Error => {
                        let message = describe_error(&raw.payload);
                        tracing::warn!(username = %self.username(), %message, "upstream error while connecting");
                        corroborator.on_error_signal(&message);
                    }
                    RawEventKind::StreamEnd | RawEventKind::Disconnected => {
                        tracing::info!(username = %self.username(), kind = raw.kind.as_str(), "stream ended while connecting");
                        corroborator.on_ended(&format!("{}: stream is not live", raw.kind.as_str()));
                    }
                    _ => {
                        // Any audience event or the platform's own confirmation.
                        corroborator.on_corroborated();
                        if corroborator.verdict() == Verdict::Live {
                            return ConnectOutcome::Live(Some(raw));
                        }
                    }
                },
                command = self.commands.recv() => {
                    let respond_to = match command {
                        Some(SessionCommand::Stop { respond_to }) => respond_to,
                        None => None,
                    };
                    tracing::info!(username = %self.username(), "stop requested while connecting");
                    return ConnectOutcome::Stopped(respond_to);
                }
            }

            match corroborator.verdict() {
                Verdict::Pending => {}
                Verdict::AwaitGrace => {
                    if grace.is_none() {
                        tracing::debug!(username = %self.username(), "waiting for corroborating activity");
                        grace = Some(Instant::now() + self.settings.grace_period);
                    }
                }
                Verdict::Live => return ConnectOutcome::Live(None),
                Verdict::Failed { kind, detail } => {
                    return ConnectOutcome::Failed(StartFailure::new(self.username(), kind, detail));
                }
            }
        }
    }

    fn go_live(&self) {
        let report = self.session.mark_live();
        tracing::info!(
            username = %self.username(),
            attempt = %self.attempt,
            subscribers = report.delivered,
            "session is live"
        );
    }

    async fn live_phase(&mut self, connect: &mut ConnectTask) -> Option<oneshot::Sender<()>> {
        loop {
            tokio::select! {
                result = &mut connect.handle, if connect.pending => {
                    connect.pending = false;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::warn!(username = %self.username(), error = %err, "late connect error on a live session");
                        }
                        Err(err) => {
                            tracing::error!(username = %self.username(), ?err, "connect task failed");
                        }
                    }
                }
                raw = self.events.recv() => match raw {
                    Some(raw) => {
                        if self.handle_event(raw).await == Flow::End {
                            return None;
                        }
                    }
                    None => {
                        tracing::warn!(username = %self.username(), "upstream event stream closed");
                        return None;
                    }
                },
                command = self.commands.recv() => {
                    tracing::info!(username = %self.username(), "stop requested");
                    return match command {
                        Some(SessionCommand::Stop { respond_to }) => respond_to,
                        None => None,
                    };
                }
            }
        }
    }

    async fn handle_event(&self, raw: RawEvent) -> Flow {
        let timestamp = relay_common::now_millis();
        let username = self.username();

        match raw.kind {
            RawEventKind::RoomUser => {
                let snapshot = normalize::viewers(&raw.payload);
                let stats = self.session.update_stats(|stats| snapshot.apply(stats));
                self.broadcaster
                    .deliver(&self.session, &NormalizedEvent::RoomStats { stats, timestamp });
            }
            RawEventKind::Connected => {
                self.apply_confirmation(&raw);
                self.broadcaster
                    .deliver(&self.session, &NormalizedEvent::connected(username));
            }
            RawEventKind::Error => {
                tracing::warn!(%username, message = %describe_error(&raw.payload), "upstream error");
            }
            RawEventKind::StreamEnd | RawEventKind::Disconnected => {
                tracing::info!(%username, kind = raw.kind.as_str(), "upstream stream ended");
                return Flow::End;
            }
            RawEventKind::Chat
            | RawEventKind::Gift
            | RawEventKind::Like
            | RawEventKind::Follow
            | RawEventKind::Share => {
                if let Some(event) = normalize::audience_event(&raw, timestamp) {
                    self.relay(event).await;
                }
            }
        }

        Flow::Continue
    }

    /// Record an audience event in the session and fan it out.
    async fn relay(&self, mut event: NormalizedEvent) {
        let username = self.username();

        match &mut event {
            NormalizedEvent::Comment(comment) => {
                tracing::debug!(%username, user = %comment.user, "comment");
                comment.audio_url = self.reserve_readout(comment).await;
                self.session.record_comment(comment.clone());
            }
            NormalizedEvent::Gift(gift) => {
                tracing::debug!(
                    %username,
                    user = %gift.user,
                    gift = %gift.gift_name,
                    repeat = gift.repeat_count,
                    diamonds = gift.total_diamonds(),
                    "gift"
                );
                self.session.record_gift(gift.clone());
            }
            NormalizedEvent::Like(like) => {
                let total = like.total_like_count;
                if total > 0 {
                    self.session.update_stats(|stats| stats.like_count = total);
                }
            }
            NormalizedEvent::Follow(follow) => {
                tracing::debug!(%username, user = %follow.user, "follow");
            }
            _ => {}
        }

        self.broadcaster.deliver(&self.session, &event);
    }

    fn apply_confirmation(&self, raw: &RawEvent) {
        let info = normalize::connected(&raw.payload);
        tracing::info!(username = %self.username(), room_id = ?info.room_id, "platform confirmed connection");
        if let Some(viewers) = info.viewer_count {
            self.session.update_stats(|stats| stats.viewer_count = viewers);
        }
    }

    /// Reserve the comment's readout clip and return its URL. Rendering runs in
    /// the background; the audio endpoint waits for it if asked early.
    async fn reserve_readout(&self, comment: &Comment) -> Option<String> {
        let readout = self.readout.as_ref()?;
        let text = readout_text(&comment.user, &comment.text);

        match readout
            .gateway
            .reserve(&text, &readout.voice, RenderOptions::default())
            .await
        {
            Ok(reference) => Some(reference.url),
            Err(err) => {
                tracing::warn!(username = %self.username(), %err, "comment readout rejected");
                None
            }
        }
    }

    async fn teardown(&mut self, connect: &mut ConnectTask) {
        let username = self.username().to_string();
        self.session
            .set_connection_state(ConnectionState::Disconnected);
        self.broadcaster
            .deliver(&self.session, &NormalizedEvent::disconnected(&username));

        if connect.pending {
            connect.handle.abort();
            connect.pending = false;
        }

        match timeout(self.settings.teardown_timeout, self.connection.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(%username, error = %err, "upstream disconnect failed"),
            Err(_) => tracing::warn!(%username, "upstream disconnect timed out"),
        }

        self.registry.remove_session(&self.session);
        let closed = self.session.channels().close_all();
        tracing::info!(%username, attempt = %self.attempt, subscribers = closed, "session torn down");
    }
}
