//! Run display-name grammar.
//!
//! Runs carry structured identity in their display name:
//!
//! ```text
//! build:    <branch>-<app>-build-<version>
//! release:  <branch>-<app>-release-<version>-<commit>
//! ```
//!
//! `<app>` is the single hyphen-free token immediately before the marker;
//! `<branch>` is everything before it and may itself contain hyphens. The
//! earliest marker occurrence that leaves a non-empty branch and app wins,
//! so a version may contain the marker text. `<commit>` is the final
//! hyphen-separated token and must be at least seven lowercase hex digits.
//!
//! A parsed branch of `prod` (any case) is reported as `main`.

use crate::types::WorkflowKind;
use serde::Serialize;

const MIN_COMMIT_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRunName {
    pub app_name: String,
    pub branch: String,
    pub version: String,
    pub commit: Option<String>,
}

/// Parse a run display name. Returns `None` when the name does not follow
/// the grammar for `kind`; callers then fall back to remote metadata.
pub fn parse(name: &str, kind: WorkflowKind) -> Option<ParsedRunName> {
    let marker = match kind {
        WorkflowKind::Build => "-build-",
        WorkflowKind::Release => "-release-",
    };

    for (pos, _) in name.match_indices(marker) {
        let prefix = &name[..pos];
        let rest = &name[pos + marker.len()..];

        let Some((branch, app)) = split_branch_app(prefix) else {
            continue;
        };
        let Some((version, commit)) = split_version(rest, kind) else {
            continue;
        };

        return Some(ParsedRunName {
            app_name: app.to_string(),
            branch: alias_branch(branch),
            version: version.to_string(),
            commit: commit.map(str::to_string),
        });
    }
    None
}

/// `feature-x-svc` → (`feature-x`, `svc`).
fn split_branch_app(prefix: &str) -> Option<(&str, &str)> {
    let (branch, app) = prefix.rsplit_once('-')?;
    if branch.is_empty() || app.is_empty() {
        return None;
    }
    Some((branch, app))
}

fn split_version(rest: &str, kind: WorkflowKind) -> Option<(&str, Option<&str>)> {
    match kind {
        WorkflowKind::Build => {
            if rest.is_empty() {
                None
            } else {
                Some((rest, None))
            }
        }
        WorkflowKind::Release => {
            let (version, commit) = rest.rsplit_once('-')?;
            if version.is_empty() || !is_commit(commit) {
                return None;
            }
            Some((version, Some(commit)))
        }
    }
}

fn is_commit(token: &str) -> bool {
    token.len() >= MIN_COMMIT_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn alias_branch(branch: &str) -> String {
    if branch.eq_ignore_ascii_case("prod") {
        "main".to_string()
    } else {
        branch.to_string()
    }
}
