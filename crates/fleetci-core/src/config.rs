use crate::error::{FleetError, Result};
use crate::types::{Action, Role, RoleSet, WorkflowKind, WorkflowRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// GithubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GithubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// AggregationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Most recent runs fetched per workflow.
    #[serde(default = "default_max_runs")]
    pub max_runs: u32,
    #[serde(default = "default_workflow_concurrency")]
    pub workflow_concurrency: usize,
    #[serde(default = "default_job_concurrency")]
    pub job_concurrency: usize,
}

fn default_max_runs() -> u32 {
    15
}

fn default_workflow_concurrency() -> usize {
    10
}

fn default_job_concurrency() -> usize {
    20
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_runs: default_max_runs(),
            workflow_concurrency: default_workflow_concurrency(),
            job_concurrency: default_job_concurrency(),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".fleetci/cache.json")
}

fn default_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_secs: default_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// RealtimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Runs created within this window count as active even once completed.
    #[serde(default = "default_active_window")]
    pub active_window_secs: u64,
    /// How long a WebSocket client has to send its auth frame.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
}

fn default_interval() -> u64 {
    120
}

fn default_active_window() -> u64 {
    300
}

fn default_auth_timeout() -> u64 {
    10
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            active_window_secs: default_active_window(),
            auth_timeout_secs: default_auth_timeout(),
        }
    }
}

impl RealtimeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Teams and users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub apps: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeMap<Action, RoleSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub identity: String,
    pub role: Role,
    #[serde(default)]
    pub teams: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub workflows: Vec<WorkflowRef>,
    #[serde(default)]
    pub teams: BTreeMap<String, TeamConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl Config {
    /// Parse and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(data)?;
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(FleetError::Config(problems.join("\n")));
        }
        Ok(config)
    }

    /// Collect every structural problem; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.aggregation.max_runs == 0 {
            problems.push("aggregation.max_runs must be greater than zero".to_string());
        }
        if self.aggregation.workflow_concurrency == 0 || self.aggregation.job_concurrency == 0 {
            problems.push("aggregation concurrency limits must be greater than zero".to_string());
        }
        if self.cache.ttl_secs == 0 {
            problems.push("cache.ttl_secs must be greater than zero".to_string());
        }
        if self.realtime.interval_secs == 0 {
            problems.push("realtime.interval_secs must be greater than zero".to_string());
        }

        let mut seen_workflows = HashSet::new();
        for (i, wf) in self.workflows.iter().enumerate() {
            if wf.owner.is_empty()
                || wf.repo.is_empty()
                || wf.workflow_id.is_empty()
                || wf.app_name.is_empty()
            {
                problems.push(format!("workflows[{i}] has an empty field"));
            }
            if !seen_workflows.insert((&wf.owner, &wf.repo, &wf.workflow_id)) {
                problems.push(format!("workflow {} is listed twice", wf.label()));
            }
        }

        let mut seen_users = HashSet::new();
        for user in &self.users {
            if !seen_users.insert(user.identity.as_str()) {
                problems.push(format!("user '{}' is listed twice", user.identity));
            }
            for team in &user.teams {
                if !self.teams.contains_key(team) {
                    problems.push(format!(
                        "user '{}' references unknown team '{team}'",
                        user.identity
                    ));
                }
            }
        }

        problems
    }

    /// Configured workflows of one kind, in config order.
    pub fn workflows_of(&self, kind: WorkflowKind) -> impl Iterator<Item = &WorkflowRef> {
        self.workflows.iter().filter(move |w| w.kind == kind)
    }

    pub fn find_workflow(&self, repo: &str, workflow_id: &str) -> Option<&WorkflowRef> {
        self.workflows
            .iter()
            .find(|w| w.repo == repo && w.workflow_id == workflow_id)
    }

    pub fn workflow_for_app(&self, app: &str, kind: WorkflowKind) -> Option<&WorkflowRef> {
        self.workflows
            .iter()
            .find(|w| w.app_name == app && w.kind == kind)
    }

    /// First team (by name) whose apps include `app`.
    pub fn team_for_app(&self, app: &str) -> Option<&str> {
        self.teams
            .iter()
            .find(|(_, t)| t.apps.contains(app))
            .map(|(name, _)| name.as_str())
    }

    /// Every team owning an app that has a workflow in `repo`.
    pub fn teams_for_repo(&self, repo: &str) -> BTreeSet<&str> {
        self.workflows
            .iter()
            .filter(|w| w.repo == repo)
            .filter_map(|w| self.team_for_app(&w.app_name))
            .collect()
    }
}
