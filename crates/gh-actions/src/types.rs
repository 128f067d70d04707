//! Wire types for the subset of the GitHub Actions REST API we consume.
//!
//! Fields the API may omit or null out are `Option`/`#[serde(default)]` so a
//! sparse payload still decodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One workflow run as reported by `GET .../workflows/{id}/runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// The run-name, which carries the structured identity.
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: String,
    pub run_number: u64,
    #[serde(default)]
    pub run_attempt: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub triggering_actor: Option<Actor>,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RawRun {
    /// The name shown for the run: its run-name, else the workflow name.
    pub fn display_name(&self) -> &str {
        self.display_title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// Who started this attempt, falling back to the original actor.
    pub fn triggered_by(&self) -> Option<&str> {
        self.triggering_actor
            .as_ref()
            .or(self.actor.as_ref())
            .map(|a| a.login.as_str())
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit.as_ref().and_then(|c| c.message.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    pub number: u32,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJob {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunsPage {
    #[serde(default)]
    pub workflow_runs: Vec<RawRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobsPage {
    #[serde(default)]
    pub jobs: Vec<RawJob>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
    pub inputs: &'a crate::Inputs,
}
