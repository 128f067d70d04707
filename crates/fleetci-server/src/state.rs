use crate::aggregator::Aggregator;
use crate::monitor::RunMonitor;
use crate::realtime::Broadcaster;
use crate::scheduler::Scheduler;
use fleetci_core::access::AccessControl;
use fleetci_core::cache::RunCache;
use fleetci_core::config::Config;
use gh_actions::{Gateway, GithubClient};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state passed to all route handlers.
///
/// Every registry lives here, owned by the one server instance; handlers
/// and background tasks reach them through clones of this struct.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub access: Arc<AccessControl>,
    pub gateway: Arc<dyn Gateway>,
    pub cache: Arc<RunCache>,
    pub aggregator: Aggregator,
    pub broadcaster: Broadcaster,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn Gateway>, cache: RunCache) -> Self {
        let call_timeout = config.github.request_timeout();
        let broadcaster = Broadcaster::new();
        let aggregator = Aggregator::new(
            Arc::clone(&gateway),
            config.workflows.clone(),
            config.aggregation.clone(),
            call_timeout,
        );
        let scheduler = Scheduler::new(Arc::clone(&gateway), broadcaster.clone(), call_timeout);
        Self {
            access: Arc::new(AccessControl::from_config(&config)),
            config: Arc::new(config),
            gateway,
            cache: Arc::new(cache),
            aggregator,
            broadcaster,
            scheduler,
        }
    }

    /// State backed by the GitHub API and the configured cache file.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let token = config.github.token();
        if token.is_none() {
            tracing::warn!(
                env = %config.github.token_env,
                "no GitHub token set, API calls are unauthenticated"
            );
        }
        let client = GithubClient::new(
            &config.github.api_url,
            token.as_deref(),
            config.github.request_timeout(),
        )?;
        let cache = RunCache::with_file(&config.cache.path, config.cache.ttl());
        Ok(Self::new(config, Arc::new(client), cache))
    }

    pub fn call_timeout(&self) -> Duration {
        self.config.github.request_timeout()
    }

    pub fn monitor(&self) -> RunMonitor {
        RunMonitor::new(
            self.aggregator.clone(),
            Arc::clone(&self.cache),
            self.broadcaster.clone(),
            self.config.realtime.interval(),
            self.config.realtime.active_window(),
        )
    }
}
