use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use fleetci_core::access::Principal;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::realtime::{self, Broadcaster};
use crate::state::AppState;

/// Unregisters a connection when the response stream is dropped.
pub(crate) struct Registration {
    broadcaster: Broadcaster,
    identity: String,
    conn_id: u64,
}

impl Registration {
    pub(crate) fn new(broadcaster: Broadcaster, identity: String, conn_id: u64) -> Self {
        Self {
            broadcaster,
            identity,
            conn_id,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.broadcaster.unregister(&self.identity, self.conn_id);
    }
}

/// GET /api/events: SSE stream of push events for the calling identity.
///
/// Each event's SSE `event:` name is its `type`; the `data:` line carries the
/// full `{type, data, timestamp}` envelope.
pub async fn sse_events(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> impl axum::response::IntoResponse {
    let (tx, rx) = realtime::channel();
    let conn_id = app.broadcaster.register(&principal.identity, tx);
    let registration = Registration::new(app.broadcaster.clone(), principal.identity, conn_id);

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &registration;
        let data = serde_json::to_string(&*event).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(Event::default().event(event.kind.as_str()).data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
