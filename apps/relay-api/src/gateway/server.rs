//! Server-sent-events subscription endpoint.
//!
//! `GET /connections/{username}/events` holds the response open and writes one
//! `data: {type, data, timestamp}` frame per relayed event. The stream ends
//! when the viewer disconnects or the session is torn down.

use std::convert::Infallible;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::routes::extract::BroadcasterName;
use crate::AppState;

use super::events::WireEvent;
use super::fanout::OutputFrame;
use super::session::{Session, Subscription};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Sent to a subscriber whose username has no session.
pub const NO_SESSION_MESSAGE: &str = "No active connection";

pub fn router() -> Router<AppState> {
    Router::new().route("/connections/{username}/events", get(subscribe))
}

/// Removes the subscriber's channel when the response stream is dropped.
struct SubscriptionGuard {
    session: Weak<Session>,
    subscriber_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            if session.unsubscribe(&self.subscriber_id) {
                tracing::debug!(
                    username = %session.username(),
                    subscriber = %self.subscriber_id,
                    "subscriber left"
                );
            }
        }
    }
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

#[utoipa::path(
    get,
    path = "/connections/{username}/events",
    tag = "Events",
    params(("username" = String, Path, description = "Broadcaster username, with or without '@'")),
    responses(
        (status = 200, description = "Server-sent stream of `{type, data, timestamp}` envelopes", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Empty username", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn subscribe(
    State(state): State<AppState>,
    BroadcasterName(username): BroadcasterName,
) -> impl IntoResponse {
    let stream = match state.registry.get(&username) {
        Ok(session) => {
            let subscription = session.subscribe();
            tracing::debug!(
                %username,
                subscriber = %subscription.id,
                subscribers = session.channels().len(),
                "subscriber joined"
            );
            session_stream(&session, subscription)
        }
        Err(_) => {
            tracing::debug!(%username, "subscription for unknown session");
            no_session_stream()
        }
    };

    (
        [("x-accel-buffering", "no")],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)),
    )
}

fn session_stream(session: &Arc<Session>, subscription: Subscription) -> EventStream {
    let guard = SubscriptionGuard {
        session: Arc::downgrade(session),
        subscriber_id: subscription.id,
    };

    stream::unfold((subscription.receiver, guard), |(mut receiver, guard)| async move {
        let frame = receiver.recv().await?;
        Some((Ok(to_sse(&frame)), (receiver, guard)))
    })
    .boxed()
}

fn no_session_stream() -> EventStream {
    let frame = WireEvent::error(NO_SESSION_MESSAGE);
    stream::once(async move { Ok(Event::default().data(frame.to_json())) }).boxed()
}

fn to_sse(frame: &OutputFrame) -> Event {
    Event::default().data(frame.to_json())
}
