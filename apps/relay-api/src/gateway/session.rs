//! Per-broadcaster session state.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use relay_common::id::{prefix, prefixed_ulid};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use super::buffer::RingBuffer;
use super::events::{Comment, Gift, NormalizedEvent, RoomStats};
use super::fanout::{FanOut, OutputChannels, OutputFrame};

/// Capacity of the control queue between HTTP handlers and the session worker.
const COMMAND_CAPACITY: usize = 8;

/// Where a session is in its connection lifecycle. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Live,
    Disconnected,
}

/// Control messages handled by the session worker.
#[derive(Debug)]
pub enum SessionCommand {
    /// Disconnect upstream and tear the session down. The worker answers on
    /// `respond_to` once the adapter has been disposed.
    Stop {
        respond_to: Option<oneshot::Sender<()>>,
    },
}

/// Mutable part of a session, guarded by one short-lived lock.
#[derive(Debug)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub comments: RingBuffer<Comment>,
    pub gifts: RingBuffer<Gift>,
    pub stats: RoomStats,
}

/// Point-in-time summary used for status reporting.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub username: String,
    pub state: ConnectionState,
    pub is_connected: bool,
    pub stats: RoomStats,
    pub comments_count: usize,
    pub gifts_count: usize,
}

/// A freshly accepted viewer subscription.
pub struct Subscription {
    pub id: String,
    pub receiver: mpsc::Receiver<OutputFrame>,
}

/// One monitored broadcaster.
///
/// The upstream adapter is not stored here: it is owned by the session's
/// worker task, which is reached through the command queue.
pub struct Session {
    username: String,
    state: Mutex<SessionState>,
    channels: Mutex<OutputChannels>,
    commands: mpsc::Sender<SessionCommand>,
    subscriber_capacity: usize,
}

impl Session {
    /// Allocate a session in `Connecting`, returning it with the worker's command inbox.
    pub fn new(
        username: impl Into<String>,
        subscriber_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<SessionCommand>) {
        let (commands, inbox) = mpsc::channel(COMMAND_CAPACITY);
        let session = Arc::new(Self {
            username: username.into(),
            state: Mutex::new(SessionState {
                connection: ConnectionState::Connecting,
                comments: RingBuffer::default(),
                gifts: RingBuffer::default(),
                stats: RoomStats::default(),
            }),
            channels: Mutex::new(OutputChannels::new()),
            commands,
            subscriber_capacity: subscriber_capacity.max(1),
        });
        (session, inbox)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_live(&self) -> bool {
        self.connection_state() == ConnectionState::Live
    }

    pub fn set_connection_state(&self, connection: ConnectionState) {
        self.state.lock().connection = connection;
    }

    /// Move to `Live` and send `connected` to the current subscribers.
    ///
    /// Both happen under the channel lock, so a concurrent [`subscribe`] gets
    /// exactly one `connected` frame: either the replayed one or this one.
    ///
    /// [`subscribe`]: Session::subscribe
    pub fn mark_live(&self) -> FanOut {
        let mut channels = self.channels.lock();
        self.state.lock().connection = ConnectionState::Live;
        let frame: OutputFrame = Arc::new(NormalizedEvent::connected(&self.username).to_wire());
        channels.fan_out(&frame)
    }

    pub fn stats(&self) -> RoomStats {
        self.state.lock().stats
    }

    /// Apply a snapshot update to the room stats and return the result.
    pub fn update_stats(&self, update: impl FnOnce(&mut RoomStats)) -> RoomStats {
        let mut state = self.state.lock();
        update(&mut state.stats);
        state.stats
    }

    pub fn record_comment(&self, comment: Comment) {
        self.state.lock().comments.push(comment);
    }

    pub fn record_gift(&self, gift: Gift) {
        self.state.lock().gifts.push(gift);
    }

    pub fn recent_comments(&self) -> Vec<Comment> {
        self.state.lock().comments.to_vec()
    }

    pub fn recent_gifts(&self) -> Vec<Gift> {
        self.state.lock().gifts.to_vec()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            username: self.username.clone(),
            state: state.connection,
            is_connected: state.connection == ConnectionState::Live,
            stats: state.stats,
            comments_count: state.comments.len(),
            gifts_count: state.gifts.len(),
        }
    }

    /// Lock the output channel set.
    pub fn channels(&self) -> MutexGuard<'_, OutputChannels> {
        self.channels.lock()
    }

    /// Register a new output channel.
    ///
    /// A session that is already live queues a synthetic `connected` signal
    /// ahead of any organic event, so a late viewer does not wait for traffic.
    pub fn subscribe(&self) -> Subscription {
        let id = prefixed_ulid(prefix::SUBSCRIBER);
        let (sender, receiver) = mpsc::channel(self.subscriber_capacity);

        let mut channels = self.channels.lock();
        match self.connection_state() {
            // Teardown already closed (or is about to close) every channel;
            // dropping the sender ends this stream right away.
            ConnectionState::Disconnected => {}
            ConnectionState::Live => {
                let frame: OutputFrame =
                    Arc::new(NormalizedEvent::connected(&self.username).to_wire());
                // A fresh queue always has room for one frame.
                let _ = sender.try_send(frame);
                channels.add(id.clone(), sender);
            }
            ConnectionState::Connecting => channels.add(id.clone(), sender),
        }

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.channels.lock().remove(subscriber_id)
    }

    /// Ask the worker to stop. Returns `false` if the worker is already gone
    /// or its queue is full.
    pub fn request_stop(&self, respond_to: Option<oneshot::Sender<()>>) -> bool {
        self.commands
            .try_send(SessionCommand::Stop { respond_to })
            .is_ok()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::buffer::RECENT_CAPACITY;

    fn comment(i: usize) -> Comment {
        Comment {
            user: format!("user{i}"),
            text: format!("message {i}"),
            timestamp: i as i64,
            profile_pic_url: None,
            audio_url: None,
        }
    }

    #[test]
    fn new_session_starts_connecting() {
        let (session, _inbox) = Session::new("streamer", 16);
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        let snap = session.snapshot();
        assert!(!snap.is_connected);
        assert_eq!(snap.comments_count, 0);
    }

    #[test]
    fn comment_buffer_is_bounded_to_most_recent() {
        let (session, _inbox) = Session::new("streamer", 16);
        for i in 0..(RECENT_CAPACITY + 20) {
            session.record_comment(comment(i));
        }

        let comments = session.recent_comments();
        assert_eq!(comments.len(), RECENT_CAPACITY);
        assert_eq!(comments[0].text, "message 20");
        assert_eq!(comments.last().unwrap().text, format!("message {}", RECENT_CAPACITY + 19));
    }

    #[test]
    fn subscribe_to_live_session_replays_connected_first() {
        let (session, _inbox) = Session::new("streamer", 16);
        session.set_connection_state(ConnectionState::Live);

        let mut sub = session.subscribe();
        let first = sub.receiver.try_recv().unwrap();
        assert_eq!(first.kind, "connected");
        assert_eq!(first.data["username"], "streamer");
        assert!(session.channels().contains(&sub.id));
    }

    #[test]
    fn mark_live_announces_once_per_subscriber() {
        let (session, _inbox) = Session::new("streamer", 16);
        let mut early = session.subscribe();

        let report = session.mark_live();
        assert_eq!(report.delivered, 1);
        assert!(session.is_live());

        let mut late = session.subscribe();
        for receiver in [&mut early.receiver, &mut late.receiver] {
            assert_eq!(receiver.try_recv().unwrap().kind, "connected");
            assert!(receiver.try_recv().is_err());
        }
    }

    #[test]
    fn debug_names_the_broadcaster() {
        let (session, _inbox) = Session::new("streamer", 16);
        let rendered = format!("{session:?}");
        assert!(rendered.contains("streamer"));
        assert!(rendered.contains("Connecting"));
    }

    #[test]
    fn subscribe_while_connecting_queues_nothing() {
        let (session, _inbox) = Session::new("streamer", 16);
        let mut sub = session.subscribe();
        assert!(sub.receiver.try_recv().is_err());
        assert!(session.unsubscribe(&sub.id));
        assert!(!session.unsubscribe(&sub.id));
    }

    #[test]
    fn stats_are_overwritten_not_accumulated() {
        let (session, _inbox) = Session::new("streamer", 16);
        session.update_stats(|s| s.viewer_count = 50);
        let stats = session.update_stats(|s| s.viewer_count = 12);
        assert_eq!(stats.viewer_count, 12);
    }

    #[test]
    fn subscribe_after_teardown_ends_immediately() {
        let (session, _inbox) = Session::new("streamer", 16);
        session.set_connection_state(ConnectionState::Disconnected);

        let mut sub = session.subscribe();
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(session.channels().is_empty());
    }

    #[tokio::test]
    async fn request_stop_reaches_inbox() {
        let (session, mut inbox) = Session::new("streamer", 16);
        assert!(session.request_stop(None));
        assert!(matches!(
            inbox.recv().await,
            Some(SessionCommand::Stop { respond_to: None })
        ));

        drop(inbox);
        assert!(!session.request_stop(None));
    }
}
