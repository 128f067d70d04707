use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Inputs passed to a workflow dispatch.
pub type DispatchInputs = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// WorkflowKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Build,
    Release,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKind::Build => "build",
            WorkflowKind::Release => "release",
        }
    }

    /// The action a caller must be permitted to perform to dispatch this kind.
    pub fn trigger_action(self) -> Action {
        match self {
            WorkflowKind::Build => Action::TriggerBuild,
            WorkflowKind::Release => Action::TriggerRelease,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = crate::error::FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(WorkflowKind::Build),
            "release" => Ok(WorkflowKind::Release),
            _ => Err(crate::error::FleetError::InvalidInput(format!(
                "unknown workflow kind '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus / Conclusion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Error,
}

impl RunStatus {
    /// Map a status string reported by the automation platform.
    ///
    /// `waiting`, `requested` and `pending` are pre-start states and fold
    /// into `Queued`; anything unrecognised is treated as `Error`.
    pub fn from_remote(s: &str) -> Self {
        match s {
            "queued" | "waiting" | "requested" | "pending" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Error,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    None,
}

impl Conclusion {
    /// `timed_out` and `startup_failure` count as failures; `skipped`,
    /// `neutral`, `action_required` and a missing value carry no outcome.
    pub fn from_remote(s: Option<&str>) -> Self {
        match s {
            Some("success") => Conclusion::Success,
            Some("failure" | "timed_out" | "startup_failure") => Conclusion::Failure,
            Some("cancelled") => Conclusion::Cancelled,
            _ => Conclusion::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub owner: String,
    pub repo: String,
    pub workflow_id: String,
    #[serde(rename = "app")]
    pub app_name: String,
    pub kind: WorkflowKind,
}

impl WorkflowRef {
    /// `owner/repo/workflow_id`, used as a log field and error label.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.owner, self.repo, self.workflow_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub number: u32,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Conclusion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Conclusion,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: u64,
    pub app_name: String,
    pub kind: WorkflowKind,
    pub repo: String,
    pub version: String,
    pub branch: String,
    pub commit_sha: String,
    pub commit_message: Option<String>,
    pub status: RunStatus,
    pub conclusion: Conclusion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triggered_by: String,
    pub run_number: u64,
    pub attempt: u32,
    pub jobs: Vec<JobRecord>,
    /// Set when the record is degraded because its jobs could not be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDispatch {
    pub id: String,
    pub workflow: WorkflowRef,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub inputs: DispatchInputs,
    pub fire_at: DateTime<Utc>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Role / Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Developer,
    Lead,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Developer => "developer",
            Role::Lead => "lead",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutating actions that are gated per team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TriggerBuild,
    TriggerRelease,
    CancelRun,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::TriggerBuild => "trigger_build",
            Action::TriggerRelease => "trigger_release",
            Action::CancelRun => "cancel_run",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of roles, displayed as `lead, admin`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<none>");
        }
        let names: Vec<&str> = self.0.iter().map(|r| r.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}
