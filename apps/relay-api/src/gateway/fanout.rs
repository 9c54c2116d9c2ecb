//! Fan-out of normalized events to a broadcaster's subscribed output channels.
//!
//! Each viewer subscription owns a bounded `mpsc` queue. Delivery is a
//! non-blocking `try_send`: a closed or full queue counts as a failed write and
//! the channel is dropped from the set on the spot. Nothing is retried and the
//! producer never sees the failure.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::events::{NormalizedEvent, WireEvent};
use super::registry::ConnectionRegistry;
use super::session::Session;

/// A serialized-ready message shared by every subscriber of a broadcast.
pub type OutputFrame = Arc<WireEvent>;

/// Result of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub pruned: usize,
}

/// The set of live subscriber queues for one session, keyed by subscriber id.
#[derive(Default)]
pub struct OutputChannels {
    senders: HashMap<String, mpsc::Sender<OutputFrame>>,
}

impl OutputChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscriber_id: String, sender: mpsc::Sender<OutputFrame>) {
        self.senders.insert(subscriber_id, sender);
    }

    pub fn remove(&mut self, subscriber_id: &str) -> bool {
        self.senders.remove(subscriber_id).is_some()
    }

    pub fn contains(&self, subscriber_id: &str) -> bool {
        self.senders.contains_key(subscriber_id)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Write `frame` to every channel, removing the ones that reject it.
    pub fn fan_out(&mut self, frame: &OutputFrame) -> FanOut {
        let mut report = FanOut::default();
        self.senders.retain(|_, sender| match sender.try_send(frame.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(_) => {
                report.pruned += 1;
                false
            }
        });
        report
    }

    /// Drop every sender, which ends each subscriber's stream. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let n = self.senders.len();
        self.senders.clear();
        n
    }
}

/// Delivers events to the subscribers of a username.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Look up the username's session and deliver `event` to its channels.
    ///
    /// Returns `None` when no session is registered for the username.
    pub fn broadcast(&self, username: &str, event: &NormalizedEvent) -> Option<FanOut> {
        let session = self.registry.get(username).ok()?;
        Some(self.deliver(&session, event))
    }

    /// Deliver `event` to a session the caller already holds.
    pub fn deliver(&self, session: &Session, event: &NormalizedEvent) -> FanOut {
        let frame: OutputFrame = Arc::new(event.to_wire());
        let report = session.channels().fan_out(&frame);
        if report.pruned > 0 {
            tracing::debug!(
                username = %session.username(),
                kind = event.kind(),
                pruned = report.pruned,
                "dropped output channels that rejected a write"
            );
        }
        report
    }
}
