//! Push-event fan-out to connected dashboards.
//!
//! Each connection (SSE stream or WebSocket) registers a bounded
//! `mpsc::Sender` under its identity. Delivery never awaits a consumer:
//! a full channel drops that one event for that one connection, a closed
//! channel is pruned from the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Per-connection buffer. A consumer this far behind starts losing events.
pub const CHANNEL_CAPACITY: usize = 64;

pub const CONNECTED: &str = "connected";
pub const RUNS_UPDATE: &str = "runs_update";
pub const WORKFLOW_TRIGGERED: &str = "workflow_triggered";
pub const WORKFLOW_CANCELLED: &str = "workflow_cancelled";
pub const BULK_TRIGGERED: &str = "bulk_triggered";
pub const SCHEDULED_FIRED: &str = "scheduled_fired";
pub const SCHEDULED_FAILED: &str = "scheduled_failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl PushEvent {
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

pub type EventSender = mpsc::Sender<Arc<PushEvent>>;
pub type EventReceiver = mpsc::Receiver<Arc<PushEvent>>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}

struct Registration {
    conn_id: u64,
    sender: EventSender,
}

/// Identity → transport registry. Cheap to clone; all clones share one map.
#[derive(Clone, Default)]
pub struct Broadcaster {
    connections: Arc<Mutex<HashMap<String, Registration>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.connections.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register `sender` for `identity`, replacing any earlier connection of
    /// the same identity, and greet it with a `connected` event.
    ///
    /// Returns the connection id to pass to [`Broadcaster::unregister`].
    pub fn register(&self, identity: &str, sender: EventSender) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = self
            .lock()
            .insert(identity.to_string(), Registration { conn_id, sender })
            .is_some();
        debug!(identity, conn_id, replaced, "connection registered");
        self.send_to(
            identity,
            PushEvent::new(CONNECTED, serde_json::json!({ "identity": identity })),
        );
        conn_id
    }

    /// Remove `identity` only if it is still registered under `conn_id`.
    pub fn unregister(&self, identity: &str, conn_id: u64) -> bool {
        let mut connections = self.lock();
        if connections.get(identity).map(|r| r.conn_id) == Some(conn_id) {
            connections.remove(identity);
            debug!(identity, conn_id, "connection unregistered");
            true
        } else {
            false
        }
    }

    /// Deliver to every registered connection. Returns how many accepted it.
    pub fn broadcast(&self, event: PushEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        self.lock().retain(|identity, reg| {
            match reg.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(identity = %identity, kind = %event.kind, "slow consumer, event dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(identity = %identity, "pruning closed connection");
                    false
                }
            }
        });
        delivered
    }

    /// Deliver to one identity. Returns false if it is not connected or the
    /// event could not be queued.
    pub fn send_to(&self, identity: &str, event: PushEvent) -> bool {
        let mut connections = self.lock();
        let Some(reg) = connections.get(identity) else {
            return false;
        };
        match reg.sender.try_send(Arc::new(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(identity, "slow consumer, targeted event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                connections.remove(identity);
                false
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }
}
