//! Observer endpoints: status snapshot, event stream, cancel and log.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::server::peer::Peer;
use crate::server::AppState;
use crate::session::{Snapshot, Subscription};

pub async fn info(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.session.snapshot())
}

pub async fn log(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.session.log_entries())
}

/// Cancel the current transfer. Always succeeds and reports the new phase.
pub async fn cancel(State(state): State<AppState>, Peer(peer): Peer) -> Json<Value> {
    let phase = state.session.cancel(&peer);
    Json(json!({ "status": phase }))
}

/// Server-sent events: the current snapshot first, then one event per
/// status change, with comment heartbeats while idle.
pub async fn events(
    State(state): State<AppState>,
    Peer(peer): Peer,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.session.subscribe();
    tracing::debug!(peer = %peer, subscriber = subscription.id(), "observer connected");

    let initial = state
        .session
        .snapshot_json()
        .map(|json| Ok(Event::default().data(json)));

    Sse::new(stream::iter(initial).chain(updates(subscription, state.config.heartbeat())))
}

fn updates(
    subscription: Subscription,
    heartbeat: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Dropping the stream (peer gone) drops the subscription, which unsubscribes
    stream::unfold(
        (subscription, ticker),
        |(mut subscription, mut ticker)| async move {
            let event = tokio::select! {
                update = subscription.recv() => Event::default().data(update?),
                _ = ticker.tick() => Event::default().comment("heartbeat"),
            };
            Some((Ok(event), (subscription, ticker)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AppConfig;
    use crate::session::{Mode, Phase, Session};

    fn state() -> AppState {
        let config = AppConfig::default();
        let session = Session::new(Mode::Send, "/srv/a.bin", config.session_limits());
        AppState::new(session, config)
    }

    #[tokio::test]
    async fn cancel_reports_cancelled() {
        let state = state();
        let Json(body) = cancel(State(state.clone()), Peer("10.0.0.5".into())).await;

        assert_eq!(body["status"], "cancelled");
        assert_eq!(state.session.phase(), Phase::Cancelled);
    }

    #[tokio::test]
    async fn updates_carry_published_snapshots() {
        let state = state();
        let subscription = state.session.subscribe();
        let mut stream = Box::pin(updates(subscription, Duration::from_secs(60)));

        state.session.log("ping");
        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(state.session.subscriber_count(), 1);

        drop(stream);
        assert_eq!(state.session.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn idle_stream_emits_heartbeat() {
        let state = state();
        let subscription = state.session.subscribe();
        let mut stream = Box::pin(updates(subscription, Duration::from_millis(20)));

        let next = tokio::time::timeout(Duration::from_secs(2), stream.next()).await;
        assert!(matches!(next, Ok(Some(Ok(_)))));
    }
}
