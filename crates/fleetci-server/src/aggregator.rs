//! Bounded-concurrency collection of run state across every configured
//! workflow, merged into uniform [`RunRecord`]s.
//!
//! Workflows are fetched in chunks of `workflow_concurrency`; inside one
//! workflow the runs are processed in chunks of `job_concurrency`, each chunk
//! awaited as a whole before the next starts. Job fetches additionally share
//! one semaphore, so the number of in-flight job calls never exceeds
//! `job_concurrency` even when several workflows (or several aggregation
//! passes) run at once.
//!
//! Failures are isolated: a failed job fetch degrades its one record to
//! `status = error, jobs = []`; a failed run listing drops that workflow and
//! is reported in [`Aggregate::failures`].

use chrono::{DateTime, Utc};
use fleetci_core::cache::CacheSnapshot;
use fleetci_core::config::AggregationConfig;
use fleetci_core::parser;
use fleetci_core::types::{
    Conclusion, JobRecord, RunRecord, RunStatus, StepRecord, WorkflowKind, WorkflowRef,
};
use futures::future::join_all;
use gh_actions::{Gateway, GatewayError, RawJob, RawRun};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowFailure {
    pub workflow: String,
    pub error: String,
    pub rate_limited: bool,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub builds: Vec<RunRecord>,
    pub releases: Vec<RunRecord>,
    pub failures: Vec<WorkflowFailure>,
    /// True if any call in the pass was answered with a rate-limit error.
    pub rate_limited: bool,
}

impl Aggregate {
    pub fn into_snapshot(self) -> CacheSnapshot {
        CacheSnapshot::new(self.builds, self.releases)
    }
}

struct WorkflowRuns {
    records: Vec<RunRecord>,
    rate_limited: bool,
}

#[derive(Clone)]
pub struct Aggregator {
    gateway: Arc<dyn Gateway>,
    workflows: Arc<Vec<WorkflowRef>>,
    settings: AggregationConfig,
    call_timeout: Duration,
    job_permits: Arc<Semaphore>,
}

impl Aggregator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        workflows: Vec<WorkflowRef>,
        settings: AggregationConfig,
        call_timeout: Duration,
    ) -> Self {
        let permits = settings.job_concurrency.max(1);
        Self {
            gateway,
            workflows: Arc::new(workflows),
            settings,
            call_timeout,
            job_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Fetch every configured workflow and merge by kind, newest first.
    pub async fn collect(&self) -> Aggregate {
        let mut out = Aggregate::default();
        let chunk_size = self.settings.workflow_concurrency.max(1);

        for chunk in self.workflows.chunks(chunk_size) {
            let results = join_all(chunk.iter().map(|wf| self.collect_workflow(wf))).await;
            for (wf, result) in chunk.iter().zip(results) {
                match result {
                    Ok(runs) => {
                        out.rate_limited |= runs.rate_limited;
                        match wf.kind {
                            WorkflowKind::Build => out.builds.extend(runs.records),
                            WorkflowKind::Release => out.releases.extend(runs.records),
                        }
                    }
                    Err(e) => {
                        warn!(workflow = %wf.label(), error = %e, "listing runs failed");
                        out.rate_limited |= e.is_rate_limited();
                        out.failures.push(WorkflowFailure {
                            workflow: wf.label(),
                            error: e.to_string(),
                            rate_limited: e.is_rate_limited(),
                        });
                    }
                }
            }
        }

        sort_newest_first(&mut out.builds);
        sort_newest_first(&mut out.releases);
        debug!(
            builds = out.builds.len(),
            releases = out.releases.len(),
            failures = out.failures.len(),
            "aggregation pass complete"
        );
        out
    }

    async fn collect_workflow(&self, wf: &WorkflowRef) -> Result<WorkflowRuns, GatewayError> {
        let runs = self
            .bounded(self.gateway.list_runs(
                &wf.owner,
                &wf.repo,
                &wf.workflow_id,
                self.settings.max_runs,
            ))
            .await?;

        let mut records = Vec::with_capacity(runs.len());
        let mut rate_limited = false;
        let chunk_size = self.settings.job_concurrency.max(1);
        for chunk in runs.chunks(chunk_size) {
            let jobs = join_all(chunk.iter().map(|run| self.fetch_jobs(wf, run.id))).await;
            for (run, jobs) in chunk.iter().zip(jobs) {
                if let Err(e) = &jobs {
                    warn!(workflow = %wf.label(), run_id = run.id, error = %e, "job fetch failed");
                    rate_limited |= e.is_rate_limited();
                }
                records.push(build_record(wf, run, jobs));
            }
        }
        Ok(WorkflowRuns {
            records,
            rate_limited,
        })
    }

    async fn fetch_jobs(&self, wf: &WorkflowRef, run_id: u64) -> Result<Vec<RawJob>, GatewayError> {
        // The semaphore is never closed.
        let _permit = self
            .job_permits
            .acquire()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.bounded(self.gateway.list_jobs(&wf.owner, &wf.repo, run_id))
            .await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        bounded(self.call_timeout, call).await
    }
}

/// Treat a gateway call that outlives `limit` as failed.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(GatewayError::Timeout(limit)))
}

/// Stable sort: runs created at the same instant keep their merge order.
fn sort_newest_first(records: &mut [RunRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Resolve one record. Each identity field is taken from the parsed display
/// name first, then from the platform's own metadata, then synthesized.
pub fn build_record(
    wf: &WorkflowRef,
    run: &RawRun,
    jobs: Result<Vec<RawJob>, GatewayError>,
) -> RunRecord {
    let parsed = parser::parse(run.display_name(), wf.kind);

    let app_name = parsed
        .as_ref()
        .map(|p| p.app_name.clone())
        .unwrap_or_else(|| wf.app_name.clone());
    let branch = parsed
        .as_ref()
        .map(|p| p.branch.clone())
        .or_else(|| run.head_branch.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let version = parsed
        .as_ref()
        .map(|p| p.version.clone())
        .unwrap_or_else(|| format!("{}-{}", wf.kind, run.run_number));
    let commit_sha = parsed
        .as_ref()
        .and_then(|p| p.commit.clone())
        .unwrap_or_else(|| run.head_sha.clone());

    let (status, jobs, error) = match jobs {
        Ok(jobs) => (
            RunStatus::from_remote(run.status.as_deref().unwrap_or("")),
            jobs.iter().map(job_record).collect(),
            None,
        ),
        Err(e) => (RunStatus::Error, Vec::new(), Some(e.to_string())),
    };

    RunRecord {
        id: run.id,
        app_name,
        kind: wf.kind,
        repo: wf.repo.clone(),
        version,
        branch,
        commit_sha,
        commit_message: run.commit_message().map(str::to_string),
        status,
        conclusion: Conclusion::from_remote(run.conclusion.as_deref()),
        created_at: run.created_at,
        updated_at: run.updated_at,
        triggered_by: run.triggered_by().unwrap_or("unknown").to_string(),
        run_number: run.run_number,
        attempt: run.run_attempt.unwrap_or(1),
        jobs,
        error,
    }
}

fn job_record(job: &RawJob) -> JobRecord {
    JobRecord {
        id: job.id,
        name: job.name.clone(),
        status: RunStatus::from_remote(&job.status),
        conclusion: Conclusion::from_remote(job.conclusion.as_deref()),
        started_at: job.started_at,
        completed_at: job.completed_at,
        steps: job
            .steps
            .iter()
            .map(|s| StepRecord {
                number: s.number,
                name: s.name.clone(),
                status: RunStatus::from_remote(&s.status),
                conclusion: Conclusion::from_remote(s.conclusion.as_deref()),
            })
            .collect(),
    }
}

/// Runs that are still moving, or were created within `window` of `now`.
pub fn active_runs(records: &[RunRecord], now: DateTime<Utc>, window: Duration) -> Vec<RunRecord> {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    records
        .iter()
        .filter(|r| r.is_active() || now.signed_duration_since(r.created_at) < window)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_job, raw_run, wf, FakeGateway};
    use std::collections::HashSet;

    fn settings(job_concurrency: usize) -> AggregationConfig {
        AggregationConfig {
            max_runs: 15,
            workflow_concurrency: 10,
            job_concurrency,
        }
    }

    fn aggregator(gateway: Arc<FakeGateway>, workflows: Vec<WorkflowRef>, k: usize) -> Aggregator {
        Aggregator::new(gateway, workflows, settings(k), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn one_failed_job_fetch_degrades_one_record() {
        let build = wf("web", WorkflowKind::Build);
        let gateway = Arc::new(FakeGateway::default());
        let runs: Vec<_> = (1..=15)
            .map(|i| raw_run(i, &format!("main-web-build-1.0.{i}"), i as i64))
            .collect();
        gateway.set_runs(&build, runs);
        for i in 1..=15 {
            gateway.set_jobs(i, vec![raw_job(i * 100, "compile")]);
        }
        gateway.fail_jobs(7, GatewayError::Http {
            status: 500,
            message: "boom".into(),
        });

        let out = aggregator(gateway, vec![build], 10).collect().await;
        assert_eq!(out.builds.len(), 15);
        let errored: Vec<_> = out.builds.iter().filter(|r| r.status == RunStatus::Error).collect();
        assert_eq!(errored.len(), 1);
        let bad = errored[0];
        assert_eq!(bad.id, 7);
        assert!(bad.jobs.is_empty());
        assert_eq!(bad.app_name, "web");
        assert_eq!(bad.branch, "main");
        assert_eq!(bad.version, "1.0.7");
        assert!(bad.error.is_some());
        assert!(out
            .builds
            .iter()
            .filter(|r| r.id != 7)
            .all(|r| r.jobs.len() == 1 && r.status == RunStatus::Completed));
        assert!(!out.rate_limited);
    }

    #[tokio::test]
    async fn job_fetches_never_exceed_limit() {
        let workflows = vec![
            wf("web", WorkflowKind::Build),
            wf("api", WorkflowKind::Build),
            wf("web", WorkflowKind::Release),
        ];
        let gateway = Arc::new(FakeGateway::default().with_job_delay(Duration::from_millis(5)));
        let mut id = 0;
        for w in &workflows {
            let runs: Vec<_> = (0..15)
                .map(|_| {
                    id += 1;
                    raw_run(id, "nameless", id as i64)
                })
                .collect();
            gateway.set_runs(w, runs);
        }

        let out = aggregator(gateway.clone(), workflows, 4).collect().await;
        assert_eq!(out.builds.len() + out.releases.len(), 45);
        assert!(gateway.max_in_flight_jobs() <= 4, "peak {}", gateway.max_in_flight_jobs());
        assert!(gateway.max_in_flight_jobs() >= 1);
    }

    #[tokio::test]
    async fn merges_kinds_separately_newest_first() {
        let web = wf("web", WorkflowKind::Build);
        let api = wf("api", WorkflowKind::Build);
        let rel = wf("web", WorkflowKind::Release);
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_runs(&web, vec![raw_run(1, "x", 10), raw_run(2, "x", 30)]);
        gateway.set_runs(&api, vec![raw_run(3, "x", 20), raw_run(4, "x", 30)]);
        gateway.set_runs(&rel, vec![raw_run(5, "x", 5)]);

        let out = aggregator(gateway, vec![web, api, rel], 10).collect().await;
        // 2 and 4 share a timestamp; merge order (web before api) is kept.
        assert_eq!(out.builds.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 4, 3, 1]);
        assert_eq!(out.releases.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5]);
    }

    #[tokio::test]
    async fn failed_listing_is_isolated_and_reported() {
        let web = wf("web", WorkflowKind::Build);
        let api = wf("api", WorkflowKind::Build);
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_runs(&web, vec![raw_run(1, "x", 1)]);
        gateway.fail_runs(&api, GatewayError::RateLimited {
            retry_after_secs: Some(30),
        });

        let out = aggregator(gateway, vec![web, api.clone()], 10).collect().await;
        assert_eq!(out.builds.len(), 1);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].workflow, api.label());
        assert!(out.failures[0].rate_limited);
        assert!(out.rate_limited);
    }

    #[tokio::test]
    async fn rate_limited_job_fetch_flags_the_pass() {
        let web = wf("web", WorkflowKind::Build);
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_runs(&web, vec![raw_run(1, "x", 1)]);
        gateway.fail_jobs(1, GatewayError::RateLimited {
            retry_after_secs: None,
        });
        let out = aggregator(gateway, vec![web], 10).collect().await;
        assert!(out.rate_limited);
        assert_eq!(out.builds[0].status, RunStatus::Error);
    }

    #[test]
    fn parsed_fields_win_over_remote_metadata() {
        let rel = wf("web", WorkflowKind::Release);
        let mut run = raw_run(9, "prod-storefront-release-2.0.0-abcdef1", 0);
        run.head_branch = Some("release/2.0".into());
        let record = build_record(&rel, &run, Ok(vec![]));
        assert_eq!(record.app_name, "storefront");
        assert_eq!(record.branch, "main");
        assert_eq!(record.version, "2.0.0");
        assert_eq!(record.commit_sha, "abcdef1");
    }

    #[test]
    fn unparsed_name_falls_back_to_remote_then_default() {
        let build = wf("web", WorkflowKind::Build);
        let mut run = raw_run(9, "Build #12", 0);
        run.run_number = 12;
        run.head_branch = Some("develop".into());
        run.head_sha = "0123456789abcdef".into();
        let record = build_record(&build, &run, Ok(vec![]));
        assert_eq!(record.app_name, "web");
        assert_eq!(record.branch, "develop");
        assert_eq!(record.version, "build-12");
        assert_eq!(record.commit_sha, "0123456789abcdef");

        run.head_branch = None;
        assert_eq!(build_record(&build, &run, Ok(vec![])).branch, "unknown");
    }

    #[test]
    fn job_and_step_order_is_preserved() {
        let build = wf("web", WorkflowKind::Build);
        let run = raw_run(1, "x", 0);
        let mut second = raw_job(2, "test");
        second.steps = vec![
            gh_actions::RawStep {
                number: 1,
                name: "checkout".into(),
                status: "completed".into(),
                conclusion: Some("success".into()),
            },
            gh_actions::RawStep {
                number: 2,
                name: "run".into(),
                status: "in_progress".into(),
                conclusion: None,
            },
        ];
        let record = build_record(&build, &run, Ok(vec![raw_job(3, "lint"), second]));
        assert_eq!(record.jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![3, 2]);
        let steps: Vec<_> = record.jobs[1].steps.iter().map(|s| s.number).collect();
        assert_eq!(steps, vec![1, 2]);
        assert_eq!(record.jobs[1].steps[1].status, RunStatus::InProgress);
    }

    #[test]
    fn active_filter_includes_recent_completions() {
        let build = wf("web", WorkflowKind::Build);
        let now = Utc::now();
        let mut old_done = build_record(&build, &raw_run(1, "x", 0), Ok(vec![]));
        old_done.created_at = now - chrono::Duration::minutes(30);
        let mut recent_done = old_done.clone();
        recent_done.id = 2;
        recent_done.created_at = now - chrono::Duration::minutes(2);
        let mut old_running = old_done.clone();
        old_running.id = 3;
        old_running.status = RunStatus::InProgress;
        let mut old_queued = old_done.clone();
        old_queued.id = 4;
        old_queued.status = RunStatus::Queued;

        let active = active_runs(
            &[old_done, recent_done, old_running, old_queued],
            now,
            Duration::from_secs(300),
        );
        let ids: HashSet<u64> = active.iter().map(|r| r.id).collect();
        assert_eq!(ids, HashSet::from([2, 3, 4]));
    }
}
