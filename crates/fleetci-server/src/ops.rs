//! The dashboard's operations, independent of the HTTP layer.
//!
//! Reads (`dashboard`, `logs`, `list_scheduled`) only need an authenticated
//! principal and may look at any team. Mutations authorize the principal
//! against the team that owns the target app before calling the platform.

use crate::aggregator::{bounded, WorkflowFailure};
use crate::error::ServiceError;
use crate::realtime::{PushEvent, BULK_TRIGGERED, WORKFLOW_CANCELLED, WORKFLOW_TRIGGERED};
use crate::scheduler::ScheduleRequest;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use fleetci_core::access::Principal;
use fleetci_core::cache::CacheSnapshot;
use fleetci_core::error::FleetError;
use fleetci_core::metrics::{self, Metrics};
use fleetci_core::types::{
    Action, DispatchInputs, RunRecord, ScheduledDispatch, WorkflowKind, WorkflowRef,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

type OpResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub builds: Vec<RunRecord>,
    pub releases: Vec<RunRecord>,
    pub metrics: Metrics,
    /// When the underlying snapshot was taken.
    pub cached_at: DateTime<Utc>,
    /// Workflows whose runs could not be listed in a fresh pass.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<WorkflowFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    pub repo: String,
    pub workflow_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub inputs: DispatchInputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkRequest {
    pub team: String,
    pub apps: Vec<String>,
    pub branch: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItem {
    pub app: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobLog {
    pub job_id: u64,
    pub job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleTriggerRequest {
    pub repo: String,
    pub workflow_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub fire_at: DateTime<Utc>,
    #[serde(default)]
    pub inputs: DispatchInputs,
}

impl AppState {
    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current runs, optionally narrowed to one team's apps and one branch.
    pub async fn dashboard(&self, team: Option<&str>, branch: Option<&str>) -> OpResult<Dashboard> {
        let apps = match team {
            Some(name) => Some(self.access.team(name)?.apps.clone()),
            None => None,
        };

        let (snapshot, failures) = match self.cached_snapshot().await {
            Some(snapshot) => (snapshot, Vec::new()),
            None => self.refresh().await,
        };

        let keep = |r: &RunRecord| {
            apps.as_ref().map_or(true, |a| a.contains(&r.app_name))
                && branch.map_or(true, |b| r.branch == b)
        };
        let builds: Vec<_> = snapshot.builds.into_iter().filter(|r| keep(r)).collect();
        let releases: Vec<_> = snapshot.releases.into_iter().filter(|r| keep(r)).collect();
        let metrics = metrics::summarize(&builds, &releases);

        Ok(Dashboard {
            builds,
            releases,
            metrics,
            cached_at: snapshot.timestamp,
            failures,
        })
    }

    async fn cached_snapshot(&self) -> Option<CacheSnapshot> {
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.get()).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "cache read task failed");
                None
            }
        }
    }

    /// Aggregate now and store the result. A rate-limited pass, or one where
    /// any workflow could not be listed, is served but not cached, so the
    /// next read retries instead of hiding the gap behind a hit.
    async fn refresh(&self) -> (CacheSnapshot, Vec<WorkflowFailure>) {
        let aggregate = self.aggregator.collect().await;
        let rate_limited = aggregate.rate_limited;
        let failures = aggregate.failures.clone();
        let snapshot = aggregate.into_snapshot();
        if rate_limited {
            warn!("rate limited during aggregation, result not cached");
            return (snapshot, failures);
        }
        if !failures.is_empty() {
            warn!(failures = failures.len(), "partial aggregation, result not cached");
            return (snapshot, failures);
        }

        let cache = Arc::clone(&self.cache);
        let to_store = snapshot.clone();
        match tokio::task::spawn_blocking(move || cache.put(to_store)).await {
            Ok(Ok(stored)) => (stored, failures),
            Ok(Err(e)) => {
                warn!(error = %e, "cache write failed");
                (snapshot, failures)
            }
            Err(e) => {
                warn!(error = %e, "cache write task failed");
                (snapshot, failures)
            }
        }
    }

    async fn invalidate_cache(&self) {
        let cache = Arc::clone(&self.cache);
        if let Err(e) = tokio::task::spawn_blocking(move || cache.invalidate()).await {
            warn!(error = %e, "cache invalidate task failed");
        }
    }

    /// Per-job logs of one run. A failure to fetch one job's log is reported
    /// in that job's entry.
    pub async fn logs(&self, repo: &str, run_id: u64) -> OpResult<Vec<JobLog>> {
        let owner = self.repo_owner(repo)?;
        let timeout = self.call_timeout();
        let jobs = bounded(timeout, self.gateway.list_jobs(owner, repo, run_id)).await?;

        let mut out = Vec::with_capacity(jobs.len());
        for chunk in jobs.chunks(self.config.aggregation.job_concurrency.max(1)) {
            let fetched = join_all(
                chunk
                    .iter()
                    .map(|job| bounded(timeout, self.gateway.fetch_log(owner, repo, job.id))),
            )
            .await;
            for (job, result) in chunk.iter().zip(fetched) {
                let (logs, error) = match result {
                    Ok(bytes) => (Some(String::from_utf8_lossy(&bytes).into_owned()), None),
                    Err(e) => {
                        warn!(repo, run_id, job_id = job.id, error = %e, "log fetch failed");
                        (None, Some(e.to_string()))
                    }
                };
                out.push(JobLog {
                    job_id: job.id,
                    job_name: job.name.clone(),
                    logs,
                    error,
                });
            }
        }
        Ok(out)
    }

    pub fn list_scheduled(&self) -> Vec<ScheduledDispatch> {
        self.scheduler.list()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn trigger_workflow(
        &self,
        principal: &Principal,
        request: TriggerRequest,
    ) -> OpResult<WorkflowRef> {
        require_ref(&request.git_ref)?;
        let wf = self.authorize_workflow(principal, &request.repo, &request.workflow_id)?;

        bounded(
            self.call_timeout(),
            self.gateway.dispatch(
                &wf.owner,
                &wf.repo,
                &wf.workflow_id,
                &request.git_ref,
                &request.inputs,
            ),
        )
        .await?;

        info!(
            identity = %principal.identity,
            workflow = %wf.label(),
            git_ref = %request.git_ref,
            "workflow triggered"
        );
        self.invalidate_cache().await;
        self.broadcaster.broadcast(PushEvent::new(
            WORKFLOW_TRIGGERED,
            serde_json::json!({
                "repo": wf.repo,
                "workflow_id": wf.workflow_id,
                "app": wf.app_name,
                "kind": wf.kind,
                "ref": request.git_ref,
                "triggered_by": principal.identity,
            }),
        ));
        Ok(wf)
    }

    /// Dispatch the build workflow of each app in `request.apps`. One bad app
    /// fails only its own item; results keep the request order.
    pub async fn trigger_bulk(
        &self,
        principal: &Principal,
        request: BulkRequest,
    ) -> OpResult<Vec<BulkItem>> {
        if request.team.trim().is_empty() {
            return Err(FleetError::InvalidInput("team is required".into()).into());
        }
        require_ref(&request.branch)?;
        self.access
            .authorize(principal, &request.team, Action::TriggerBuild)?;
        let team_apps = &self.access.team(&request.team)?.apps;

        let mut inputs = DispatchInputs::new();
        inputs.insert("branch".into(), request.branch.clone());
        if let Some(version) = request.version.as_ref().filter(|v| !v.is_empty()) {
            inputs.insert("version".into(), version.clone());
        }

        let timeout = self.call_timeout();
        let team_name = request.team.as_str();
        let branch = request.branch.as_str();
        let mut results = Vec::with_capacity(request.apps.len());
        let chunk_size = self.config.aggregation.workflow_concurrency.max(1);
        for chunk in request.apps.chunks(chunk_size) {
            let outcomes = join_all(chunk.iter().map(|app| {
                let inputs = &inputs;
                async move {
                    if !team_apps.contains(app) {
                        return Err(format!("app '{app}' does not belong to team '{team_name}'"));
                    }
                    let Some(wf) = self.config.workflow_for_app(app, WorkflowKind::Build) else {
                        return Err(format!("no build workflow configured for '{app}'"));
                    };
                    bounded(
                        timeout,
                        self.gateway
                            .dispatch(&wf.owner, &wf.repo, &wf.workflow_id, branch, inputs),
                    )
                    .await
                    .map_err(|e| e.to_string())
                }
            }))
            .await;

            for (app, outcome) in chunk.iter().zip(outcomes) {
                results.push(match outcome {
                    Ok(()) => BulkItem {
                        app: app.clone(),
                        ok: true,
                        error: None,
                    },
                    Err(error) => {
                        warn!(app = %app, error = %error, "bulk dispatch item failed");
                        BulkItem {
                            app: app.clone(),
                            ok: false,
                            error: Some(error),
                        }
                    }
                });
            }
        }

        let succeeded = results.iter().filter(|r| r.ok).count();
        info!(
            identity = %principal.identity,
            team = %request.team,
            branch = %request.branch,
            succeeded,
            failed = results.len() - succeeded,
            "bulk trigger finished"
        );
        if succeeded > 0 {
            self.invalidate_cache().await;
        }
        self.broadcaster.broadcast(PushEvent::new(
            BULK_TRIGGERED,
            serde_json::json!({
                "team": request.team,
                "branch": request.branch,
                "version": request.version,
                "results": results,
                "triggered_by": principal.identity,
            }),
        ));
        Ok(results)
    }

    /// Cancel a run. The caller needs `cancel_run` on at least one team that
    /// owns an app built from `repo`.
    pub async fn cancel_workflow(
        &self,
        principal: &Principal,
        repo: &str,
        run_id: u64,
    ) -> OpResult<()> {
        let owner = self.repo_owner(repo)?;
        self.access.authorize_any(
            principal,
            self.config.teams_for_repo(repo),
            Action::CancelRun,
        )?;

        bounded(self.call_timeout(), self.gateway.cancel(owner, repo, run_id)).await?;

        info!(identity = %principal.identity, repo, run_id, "run cancelled");
        self.invalidate_cache().await;
        self.broadcaster.broadcast(PushEvent::new(
            WORKFLOW_CANCELLED,
            serde_json::json!({
                "repo": repo,
                "run_id": run_id,
                "cancelled_by": principal.identity,
            }),
        ));
        Ok(())
    }

    /// Defer a dispatch until `request.fire_at`, under the same permission
    /// an immediate trigger would need.
    pub fn schedule_trigger(
        &self,
        principal: &Principal,
        request: ScheduleTriggerRequest,
    ) -> OpResult<ScheduledDispatch> {
        require_ref(&request.git_ref)?;
        let workflow = self.authorize_workflow(principal, &request.repo, &request.workflow_id)?;
        let scheduled = self.scheduler.schedule(ScheduleRequest {
            workflow,
            git_ref: request.git_ref,
            inputs: request.inputs,
            fire_at: request.fire_at,
            owner: principal.identity.clone(),
        })?;
        Ok(scheduled)
    }

    pub fn cancel_scheduled(&self, principal: &Principal, id: &str) -> OpResult<ScheduledDispatch> {
        let cancelled = self.scheduler.cancel(id)?;
        info!(identity = %principal.identity, schedule_id = %id, "schedule cancelled by user");
        Ok(cancelled)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Resolve `(repo, workflow_id)` and check the principal may trigger it.
    fn authorize_workflow(
        &self,
        principal: &Principal,
        repo: &str,
        workflow_id: &str,
    ) -> OpResult<WorkflowRef> {
        let wf = self
            .config
            .find_workflow(repo, workflow_id)
            .ok_or_else(|| FleetError::WorkflowNotFound(format!("{repo}/{workflow_id}")))?;
        let team = self.config.team_for_app(&wf.app_name).ok_or_else(|| {
            FleetError::TeamNotFound(format!("no team owns app '{}'", wf.app_name))
        })?;
        self.access
            .authorize(principal, team, wf.kind.trigger_action())?;
        Ok(wf.clone())
    }

    fn repo_owner(&self, repo: &str) -> OpResult<&str> {
        self.config
            .workflows
            .iter()
            .find(|w| w.repo == repo)
            .map(|w| w.owner.as_str())
            .ok_or_else(|| {
                FleetError::WorkflowNotFound(format!("no workflow configured for repo '{repo}'"))
                    .into()
            })
    }
}

fn require_ref(git_ref: &str) -> Result<(), FleetError> {
    if git_ref.trim().is_empty() {
        return Err(FleetError::InvalidInput("ref must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::channel;
    use crate::testing::{principal, raw_job, raw_run, FakeGateway};
    use fleetci_core::cache::RunCache;
    use fleetci_core::config::Config;
    use fleetci_core::types::{Role, RunStatus};
    use gh_actions::GatewayError;
    use std::time::Duration;

    const CONFIG: &str = r#"
workflows:
  - { owner: acme, repo: web, workflow_id: build.yml, app: web, kind: build }
  - { owner: acme, repo: web, workflow_id: release.yml, app: web, kind: release }
  - { owner: acme, repo: admin, workflow_id: build.yml, app: admin, kind: build }
  - { owner: acme, repo: api, workflow_id: build.yml, app: api, kind: build }
teams:
  frontend:
    apps: [web, admin, docs]
    permissions:
      trigger_build: [developer, lead, admin]
      trigger_release: [lead, admin]
      cancel_run: [lead, admin]
  backend:
    apps: [api]
    permissions:
      trigger_build: [developer, lead, admin]
      cancel_run: [lead, admin]
users:
  - { identity: dev, role: developer, teams: [frontend] }
  - { identity: lead, role: lead, teams: [frontend] }
  - { identity: viewer, role: viewer, teams: [frontend, backend] }
"#;

    fn state(gateway: Arc<FakeGateway>) -> AppState {
        AppState::new(
            Config::from_yaml(CONFIG).unwrap(),
            gateway,
            RunCache::in_memory(Duration::from_secs(300)),
        )
    }

    fn dev() -> Principal {
        principal("dev", Role::Developer, &["frontend"])
    }

    fn lead() -> Principal {
        principal("lead", Role::Lead, &["frontend"])
    }

    fn trigger(repo: &str, workflow_id: &str) -> TriggerRequest {
        TriggerRequest {
            repo: repo.into(),
            workflow_id: workflow_id.into(),
            git_ref: "main".into(),
            inputs: DispatchInputs::new(),
        }
    }

    fn fleet(err: ServiceError) -> FleetError {
        match err {
            ServiceError::Fleet(e) => e,
            other => panic!("expected a fleet error, got {other:?}"),
        }
    }

    fn seed_runs(gateway: &FakeGateway) {
        let web = crate::testing::wf("web", WorkflowKind::Build);
        let api = crate::testing::wf("api", WorkflowKind::Build);
        let mut failed = raw_run(2, "develop-web-build-1.1.0", 20);
        failed.conclusion = Some("failure".into());
        gateway.set_runs(&web, vec![raw_run(1, "main-web-build-1.0.0", 10), failed]);
        gateway.set_runs(&api, vec![raw_run(3, "main-api-build-3.0.0", 30)]);
    }

    #[tokio::test]
    async fn dashboard_aggregates_then_serves_from_cache() {
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        let state = state(Arc::clone(&gateway));

        let first = state.dashboard(None, None).await.unwrap();
        assert_eq!(first.builds.len(), 3);
        assert_eq!(first.builds[0].id, 3);
        assert_eq!(first.metrics.total_runs, 3);
        assert_eq!(first.metrics.failed_runs, 1);
        let calls = gateway.list_calls();

        let second = state.dashboard(None, None).await.unwrap();
        assert_eq!(second.builds, first.builds);
        assert_eq!(gateway.list_calls(), calls);
    }

    #[tokio::test]
    async fn partial_pass_is_not_cached_and_failure_stays_visible() {
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        let api = crate::testing::wf("api", WorkflowKind::Build);
        gateway.fail_runs(
            &api,
            GatewayError::Http {
                status: 500,
                message: "boom".into(),
            },
        );
        let state = state(Arc::clone(&gateway));

        let first = state.dashboard(None, None).await.unwrap();
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.builds.len(), 2);
        assert!(state.cache.get().is_none());

        let second = state.dashboard(None, None).await.unwrap();
        assert_eq!(second.failures.len(), 1);

        gateway.clear_run_failures();
        let recovered = state.dashboard(None, None).await.unwrap();
        assert!(recovered.failures.is_empty());
        assert_eq!(recovered.builds.len(), 3);
        assert!(state.cache.get().is_some());
    }

    #[tokio::test]
    async fn dashboard_filters_by_team_and_branch() {
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        let state = state(gateway);

        let backend = state.dashboard(Some("backend"), None).await.unwrap();
        assert_eq!(backend.builds.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);

        let frontend_main = state.dashboard(Some("frontend"), Some("main")).await.unwrap();
        assert_eq!(frontend_main.builds.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(frontend_main.metrics.total_runs, 1);
        assert_eq!(frontend_main.metrics.success_rate, 100.0);

        let err = state.dashboard(Some("nope"), None).await.unwrap_err();
        assert!(matches!(fleet(err), FleetError::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn developer_may_build_but_not_release() {
        let gateway = Arc::new(FakeGateway::default());
        let state = state(Arc::clone(&gateway));

        let wf = state.trigger_workflow(&dev(), trigger("web", "build.yml")).await.unwrap();
        assert_eq!(wf.kind, WorkflowKind::Build);
        assert_eq!(gateway.dispatched().len(), 1);

        let err = state
            .trigger_workflow(&dev(), trigger("web", "release.yml"))
            .await
            .unwrap_err();
        match fleet(err) {
            FleetError::RoleNotPermitted { required, .. } => {
                assert_eq!(required.iter().collect::<Vec<_>>(), vec![Role::Lead, Role::Admin]);
            }
            other => panic!("expected RoleNotPermitted, got {other:?}"),
        }
        assert_eq!(gateway.dispatched().len(), 1);
    }

    #[tokio::test]
    async fn non_member_is_forbidden() {
        let state = state(Arc::new(FakeGateway::default()));
        let err = state
            .trigger_workflow(&dev(), trigger("api", "build.yml"))
            .await
            .unwrap_err();
        assert!(matches!(fleet(err), FleetError::NotTeamMember { .. }));
    }

    #[tokio::test]
    async fn unknown_workflow_and_empty_ref_are_rejected() {
        let state = state(Arc::new(FakeGateway::default()));
        let err = state
            .trigger_workflow(&lead(), trigger("web", "deploy.yml"))
            .await
            .unwrap_err();
        assert!(matches!(fleet(err), FleetError::WorkflowNotFound(_)));

        let mut empty_ref = trigger("web", "build.yml");
        empty_ref.git_ref = " ".into();
        let err = state.trigger_workflow(&lead(), empty_ref).await.unwrap_err();
        assert!(matches!(fleet(err), FleetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn trigger_propagates_gateway_failure_and_broadcasts_on_success() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_dispatch(
            "web",
            "release.yml",
            GatewayError::Http {
                status: 422,
                message: "Unexpected inputs provided".into(),
            },
        );
        let state = state(Arc::clone(&gateway));
        let (tx, mut rx) = channel();
        state.broadcaster.register("lead", tx);
        rx.recv().await.unwrap();

        let err = state
            .trigger_workflow(&lead(), trigger("web", "release.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Gateway(GatewayError::Http { status: 422, .. })));
        assert!(rx.try_recv().is_err());

        state.trigger_workflow(&lead(), trigger("web", "build.yml")).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, WORKFLOW_TRIGGERED);
        assert_eq!(event.data["triggered_by"], "lead");
    }

    #[tokio::test]
    async fn trigger_invalidates_cache() {
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        let state = state(Arc::clone(&gateway));
        state.dashboard(None, None).await.unwrap();
        assert!(state.cache.get().is_some());

        state.trigger_workflow(&dev(), trigger("web", "build.yml")).await.unwrap();
        assert!(state.cache.get().is_none());
    }

    #[tokio::test]
    async fn cancel_removes_cache_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runs.json");
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        let state = AppState::new(
            Config::from_yaml(CONFIG).unwrap(),
            gateway,
            RunCache::with_file(&path, Duration::from_secs(300)),
        );
        state.dashboard(None, None).await.unwrap();
        assert!(path.exists());

        state.cancel_workflow(&lead(), "web", 1).await.unwrap();
        assert!(!path.exists());
        assert!(state.cache.get().is_none());
    }

    #[tokio::test]
    async fn bulk_reports_each_app() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_dispatch(
            "admin",
            "build.yml",
            GatewayError::Http {
                status: 500,
                message: "boom".into(),
            },
        );
        let state = state(Arc::clone(&gateway));

        let results = state
            .trigger_bulk(
                &dev(),
                BulkRequest {
                    team: "frontend".into(),
                    apps: vec!["web".into(), "api".into(), "admin".into(), "docs".into()],
                    branch: "develop".into(),
                    version: Some("1.2.0".into()),
                },
            )
            .await
            .unwrap();

        let oks: Vec<_> = results.iter().map(|r| (r.app.as_str(), r.ok)).collect();
        assert_eq!(
            oks,
            vec![("web", true), ("api", false), ("admin", false), ("docs", false)]
        );
        assert!(results[1].error.as_deref().unwrap().contains("does not belong"));
        assert!(results[2].error.as_deref().unwrap().contains("boom"));
        assert!(results[3].error.as_deref().unwrap().contains("no build workflow"));

        let sent = gateway.dispatched();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].git_ref, "develop");
        assert_eq!(sent[0].inputs["branch"], "develop");
        assert_eq!(sent[0].inputs["version"], "1.2.0");
    }

    #[tokio::test]
    async fn bulk_validates_team_first() {
        let state = state(Arc::new(FakeGateway::default()));
        let request = |team: &str| BulkRequest {
            team: team.into(),
            apps: vec!["web".into()],
            branch: "main".into(),
            version: None,
        };

        let err = state.trigger_bulk(&dev(), request("")).await.unwrap_err();
        assert!(matches!(fleet(err), FleetError::InvalidInput(_)));
        let err = state.trigger_bulk(&dev(), request("infra")).await.unwrap_err();
        assert!(matches!(fleet(err), FleetError::TeamNotFound(_)));
        let viewer = principal("viewer", Role::Viewer, &["frontend", "backend"]);
        let err = state.trigger_bulk(&viewer, request("frontend")).await.unwrap_err();
        assert!(fleet(err).is_forbidden());
    }

    #[tokio::test]
    async fn cancel_requires_cancel_permission() {
        let gateway = Arc::new(FakeGateway::default());
        let state = state(Arc::clone(&gateway));

        let err = state.cancel_workflow(&dev(), "web", 42).await.unwrap_err();
        assert!(fleet(err).is_forbidden());

        state.cancel_workflow(&lead(), "web", 42).await.unwrap();
        assert_eq!(*gateway.cancelled.lock().unwrap(), vec![("web".to_string(), 42)]);

        let err = state.cancel_workflow(&lead(), "unknown", 1).await.unwrap_err();
        assert!(matches!(fleet(err), FleetError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_surfaces_gateway_error() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_cancel(GatewayError::Http {
            status: 409,
            message: "Cannot cancel a workflow run that is completed.".into(),
        });
        let state = state(gateway);
        let err = state.cancel_workflow(&lead(), "web", 7).await.unwrap_err();
        assert!(err.to_string().contains("Cannot cancel"));
    }

    #[tokio::test]
    async fn logs_isolate_per_job_failures() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_jobs(9, vec![raw_job(91, "build"), raw_job(92, "test")]);
        gateway.set_log(91, "compiling...\n");
        let state = state(Arc::clone(&gateway));

        let logs = state.logs("web", 9).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].job_name, "build");
        assert_eq!(logs[0].logs.as_deref(), Some("compiling...\n"));
        assert!(logs[1].logs.is_none());
        assert!(logs[1].error.as_deref().unwrap().contains("404"));

        gateway.fail_jobs(
            10,
            GatewayError::RateLimited {
                retry_after_secs: None,
            },
        );
        let err = state.logs("web", 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Gateway(GatewayError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn schedule_checks_permission_and_time() {
        let state = state(Arc::new(FakeGateway::default()));
        let request = |secs: i64, workflow_id: &str| ScheduleTriggerRequest {
            repo: "web".into(),
            workflow_id: workflow_id.into(),
            git_ref: "main".into(),
            fire_at: Utc::now() + chrono::Duration::seconds(secs),
            inputs: DispatchInputs::new(),
        };

        let err = state
            .schedule_trigger(&dev(), request(600, "release.yml"))
            .unwrap_err();
        assert!(fleet(err).is_forbidden());
        let err = state.schedule_trigger(&lead(), request(-1, "release.yml")).unwrap_err();
        assert!(matches!(fleet(err), FleetError::InvalidInput(_)));

        let scheduled = state.schedule_trigger(&lead(), request(600, "release.yml")).unwrap();
        assert_eq!(scheduled.owner, "lead");
        assert_eq!(state.list_scheduled().len(), 1);

        state.cancel_scheduled(&dev(), &scheduled.id).unwrap();
        let err = state.cancel_scheduled(&dev(), &scheduled.id).unwrap_err();
        assert!(matches!(fleet(err), FleetError::ScheduleNotFound(_)));
        assert!(state.list_scheduled().is_empty());
    }

    #[tokio::test]
    async fn degraded_record_survives_into_dashboard() {
        let gateway = Arc::new(FakeGateway::default());
        seed_runs(&gateway);
        gateway.fail_jobs(1, GatewayError::Timeout(Duration::from_secs(30)));
        let state = state(gateway);
        let dash = state.dashboard(None, None).await.unwrap();
        let degraded = dash.builds.iter().find(|r| r.id == 1).unwrap();
        assert_eq!(degraded.status, RunStatus::Error);
        assert!(degraded.jobs.is_empty());
    }
}
