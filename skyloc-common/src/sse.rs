//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for skyloc services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::ops::Deref;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Create an SSE stream that replays `backlog` and then forwards everything
/// received on `rx`, one JSON-encoded `event_name` event per item
///
/// `guard` lives exactly as long as the stream: when the client disconnects
/// axum drops the stream and with it the guard, which is where callers hook
/// their unsubscribe.
///
/// # Example
/// ```rust,ignore
/// let (subscriber, rx) = ChannelSubscriber::channel(64);
/// let (backlog, guard) = registry.subscribe(Arc::new(subscriber));
/// skyloc_common::sse::json_event_stream("located", backlog, rx, guard)
/// ```
pub fn json_event_stream<T, G>(
    event_name: &'static str,
    backlog: Vec<T>,
    rx: mpsc::Receiver<T>,
    guard: G,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Deref + Send + 'static,
    T::Target: Serialize,
    G: Send + 'static,
{
    event_stream(event_name, backlog, rx, guard, HEARTBEAT_INTERVAL)
}

fn event_stream<T, G>(
    event_name: &'static str,
    backlog: Vec<T>,
    mut rx: mpsc::Receiver<T>,
    guard: G,
    heartbeat: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Deref + Send + 'static,
    T::Target: Serialize,
    G: Send + 'static,
{
    info!("New SSE client connected to {} events", event_name);

    let stream = async_stream::stream! {
        let _guard = guard;

        // Send initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        for item in backlog {
            if let Some(event) = encode(event_name, &*item) {
                yield Ok(event);
            }
        }

        while let Some(item) = rx.recv().await {
            if let Some(event) = encode(event_name, &*item) {
                yield Ok(event);
            }
        }
        debug!("SSE: {} source closed, ending stream", event_name);
    };

    // Idle connections get a heartbeat comment; any event resets the timer
    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat"))
}

fn encode<T: Serialize + ?Sized>(event_name: &'static str, item: &T) -> Option<Event> {
    match serde_json::to_string(item) {
        Ok(json) => Some(Event::default().event(event_name).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize {} event: {}", event_name, e);
            None
        }
    }
}
