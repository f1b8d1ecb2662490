//! Server-Sent Events stream of located results
//!
//! Each connection is one registry subscriber. It first receives the recent
//! history, then every new result as a `located` event. Disconnecting drops
//! the stream and with it the registration.

use crate::subscribers::ChannelSubscriber;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

/// GET /feed - SSE stream of located images
pub async fn located_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscriber, rx) = ChannelSubscriber::channel(state.subscriber_buffer);
    let (backlog, guard) = state.registry.subscribe(Arc::new(subscriber));

    info!(
        subscriber = %guard.id(),
        "Feed subscriber connected, replaying {} results",
        backlog.len()
    );

    skyloc_common::sse::json_event_stream("located", backlog, rx, guard)
}
