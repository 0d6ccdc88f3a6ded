//! Server-sent event stream
//!
//! Bridges the in-process event bus onto an SSE response. A subscriber
//! that falls behind the broadcast backlog skips the missed events and
//! continues; the stream ends when the bus closes.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::state::AppState;

/// Stream every bus event as SSE, tagged with the event kind.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.runtime.bus().subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.kind()).json_data(&event) {
                    Ok(sse) => return Some((Ok::<_, Infallible>(sse), rx)),
                    Err(e) => {
                        debug!(error = %e, "event not serializable; skipped");
                        continue;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "sse subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
