//! Server-Sent Events (SSE) stream for real-time updates.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use plugwatch_app::ports::PlugDriver;

use crate::state::AppState;

/// `GET /api/events/stream` — SSE stream of coordinator events.
///
/// Each event is sent as a JSON `data:` frame, with the event type as the
/// SSE event name. A client that falls behind the bus capacity loses the
/// oldest events; the gap is logged and the stream carries on.
pub async fn stream<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let event_rx = state.coordinator.subscribe();
    let event_stream = BroadcastStream::new(event_rx).filter_map(|result| match result {
        Ok(event) => match serde_json::to_value(&event) {
            Ok(json) => {
                let name = json["type"].as_str().unwrap_or("event").to_string();
                Some(Ok(Event::default().event(name).data(json.to_string())))
            }
            Err(err) => {
                tracing::warn!(%err, "failed to serialize event to JSON for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(
                skipped = n,
                "SSE subscriber lagged, some events were dropped"
            );
            None
        }
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
