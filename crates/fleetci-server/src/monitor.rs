//! Fixed-interval re-aggregation that pushes active runs to every
//! connected dashboard.

use crate::aggregator::{active_runs, Aggregator};
use crate::realtime::{Broadcaster, PushEvent, RUNS_UPDATE};
use chrono::Utc;
use fleetci_core::cache::RunCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still in flight.
    Busy,
    /// The platform rate-limited the pass; nothing was stored or sent.
    RateLimited,
    /// Aggregation succeeded but no run is active.
    Quiet,
    /// `runs_update` went out to this many connections.
    Broadcast(usize),
}

#[derive(Clone)]
pub struct RunMonitor {
    aggregator: Aggregator,
    cache: Arc<RunCache>,
    broadcaster: Broadcaster,
    interval: Duration,
    active_window: Duration,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl RunMonitor {
    pub fn new(
        aggregator: Aggregator,
        cache: Arc<RunCache>,
        broadcaster: Broadcaster,
        interval: Duration,
        active_window: Duration,
    ) -> Self {
        Self {
            aggregator,
            cache,
            broadcaster,
            interval,
            active_window,
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// One pass: aggregate, refresh the cache, push the active subset.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("previous monitor tick still running, skipping");
            return TickOutcome::Busy;
        };

        let aggregate = self.aggregator.collect().await;
        if aggregate.rate_limited {
            warn!(
                failures = aggregate.failures.len(),
                "rate limited during monitor tick, dropping it"
            );
            return TickOutcome::RateLimited;
        }

        let partial = !aggregate.failures.is_empty();
        let snapshot = aggregate.into_snapshot();
        if partial {
            debug!("partial monitor pass, cache left as is");
        } else {
            let cache = Arc::clone(&self.cache);
            let to_store = snapshot.clone();
            match tokio::task::spawn_blocking(move || cache.put(to_store)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "cache write failed"),
                Err(e) => warn!(error = %e, "cache write task failed"),
            }
        }

        let now = Utc::now();
        let builds = active_runs(&snapshot.builds, now, self.active_window);
        let releases = active_runs(&snapshot.releases, now, self.active_window);
        if builds.is_empty() && releases.is_empty() {
            debug!("no active runs");
            return TickOutcome::Quiet;
        }

        let event = PushEvent::new(
            RUNS_UPDATE,
            serde_json::json!({ "builds": builds, "releases": releases }),
        );
        let delivered = self.broadcaster.broadcast(event);
        debug!(
            builds = builds.len(),
            releases = releases.len(),
            delivered,
            "pushed active runs"
        );
        TickOutcome::Broadcast(delivered)
    }

    /// Run [`RunMonitor::tick`] forever on the configured interval. The first
    /// pass happens one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs(), "run monitor started");
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
