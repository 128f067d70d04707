//! Record builders shared by unit tests in this crate.

use crate::types::{Conclusion, RunRecord, RunStatus, WorkflowKind};
use chrono::{TimeZone, Utc};

pub(crate) fn run(id: u64, status: RunStatus, conclusion: Conclusion) -> RunRecord {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(id as i64);
    RunRecord {
        id,
        app_name: "svc".into(),
        kind: WorkflowKind::Build,
        repo: "svc".into(),
        version: format!("v{id}"),
        branch: "main".into(),
        commit_sha: "abc1234".into(),
        commit_message: Some("fix things".into()),
        status,
        conclusion,
        created_at: at,
        updated_at: at,
        triggered_by: "alice".into(),
        run_number: id,
        attempt: 1,
        jobs: Vec::new(),
        error: None,
    }
}
