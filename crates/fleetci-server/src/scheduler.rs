//! One-shot deferred dispatches.
//!
//! Every entry owns a spawned timer task. The table lock serializes the two
//! ways an entry can leave it: the timer removing it at fire time, or
//! [`Scheduler::cancel`] removing it. Whichever removes first wins, so a
//! dispatch is either fired or cancelled, never both.

use crate::aggregator::bounded;
use crate::realtime::{Broadcaster, PushEvent, SCHEDULED_FAILED, SCHEDULED_FIRED};
use chrono::{DateTime, Utc};
use fleetci_core::error::{FleetError, Result};
use fleetci_core::types::{DispatchInputs, ScheduledDispatch, WorkflowRef};
use gh_actions::Gateway;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{info, warn};

struct Entry {
    dispatch: ScheduledDispatch,
    timer: AbortHandle,
}

type Table = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(table: &Table) -> MutexGuard<'_, HashMap<String, Entry>> {
    table.lock().unwrap_or_else(|p| p.into_inner())
}

fn take(table: &Table, id: &str) -> Option<Entry> {
    lock(table).remove(id)
}

#[derive(Clone)]
pub struct Scheduler {
    gateway: Arc<dyn Gateway>,
    broadcaster: Broadcaster,
    call_timeout: Duration,
    entries: Table,
}

/// What a caller asks to have dispatched later.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub workflow: WorkflowRef,
    pub git_ref: String,
    pub inputs: DispatchInputs,
    pub fire_at: DateTime<Utc>,
    pub owner: String,
}

impl Scheduler {
    pub fn new(gateway: Arc<dyn Gateway>, broadcaster: Broadcaster, call_timeout: Duration) -> Self {
        Self {
            gateway,
            broadcaster,
            call_timeout,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm a timer for `request.fire_at`. Must be called inside a Tokio
    /// runtime.
    pub fn schedule(&self, request: ScheduleRequest) -> Result<ScheduledDispatch> {
        let now = Utc::now();
        if request.fire_at <= now {
            return Err(FleetError::InvalidInput(format!(
                "fire_at {} is not in the future",
                request.fire_at.to_rfc3339()
            )));
        }
        let delay = (request.fire_at - now).to_std().unwrap_or_default();

        let dispatch = ScheduledDispatch {
            id: uuid::Uuid::new_v4().to_string(),
            workflow: request.workflow,
            git_ref: request.git_ref,
            inputs: request.inputs,
            fire_at: request.fire_at,
            owner: request.owner,
            created_at: now,
        };

        // Insert under the same lock the timer must take, so it cannot look
        // for its entry before the entry exists.
        let mut entries = lock(&self.entries);
        let timer = tokio::spawn(self.clone().fire_after(dispatch.id.clone(), delay));
        entries.insert(
            dispatch.id.clone(),
            Entry {
                dispatch: dispatch.clone(),
                timer: timer.abort_handle(),
            },
        );
        drop(entries);

        info!(
            schedule_id = %dispatch.id,
            workflow = %dispatch.workflow.label(),
            fire_at = %dispatch.fire_at,
            owner = %dispatch.owner,
            "dispatch scheduled"
        );
        Ok(dispatch)
    }

    async fn fire_after(self, id: String, delay: Duration) {
        tokio::time::sleep(delay).await;
        let Some(entry) = take(&self.entries, &id) else {
            return;
        };
        let dispatch = entry.dispatch;
        let wf = &dispatch.workflow;

        let result = bounded(
            self.call_timeout,
            self.gateway.dispatch(
                &wf.owner,
                &wf.repo,
                &wf.workflow_id,
                &dispatch.git_ref,
                &dispatch.inputs,
            ),
        )
        .await;

        let event = match result {
            Ok(()) => {
                info!(schedule_id = %id, workflow = %wf.label(), "scheduled dispatch fired");
                PushEvent::new(SCHEDULED_FIRED, serde_json::json!({ "schedule": dispatch }))
            }
            Err(e) => {
                warn!(schedule_id = %id, workflow = %wf.label(), error = %e, "scheduled dispatch failed");
                PushEvent::new(
                    SCHEDULED_FAILED,
                    serde_json::json!({ "schedule": dispatch, "error": e.to_string() }),
                )
            }
        };
        self.broadcaster.broadcast(event);
    }

    /// Disarm and remove. Unknown, already-cancelled and already-fired ids
    /// are all `ScheduleNotFound`.
    pub fn cancel(&self, id: &str) -> Result<ScheduledDispatch> {
        let entry =
            take(&self.entries, id).ok_or_else(|| FleetError::ScheduleNotFound(id.to_string()))?;
        entry.timer.abort();
        info!(schedule_id = %id, "scheduled dispatch cancelled");
        Ok(entry.dispatch)
    }

    /// Pending dispatches, soonest first.
    pub fn list(&self) -> Vec<ScheduledDispatch> {
        let mut pending: Vec<_> = lock(&self.entries)
            .values()
            .map(|e| e.dispatch.clone())
            .collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
