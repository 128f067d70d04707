//! In-memory [`Gateway`] and record builders shared by the unit tests.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use fleetci_core::access::Principal;
use fleetci_core::types::{Role, WorkflowKind, WorkflowRef};
use futures::future::BoxFuture;
use futures::FutureExt;
use gh_actions::{Actor, Gateway, GatewayError, Inputs, RawJob, RawRun};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn wf(app: &str, kind: WorkflowKind) -> WorkflowRef {
    WorkflowRef {
        owner: "acme".into(),
        repo: app.into(),
        workflow_id: format!("{kind}.yml"),
        app_name: app.into(),
        kind,
    }
}

/// A completed, successful run created `minutes` after [`base_time`].
pub fn raw_run(id: u64, display_title: &str, minutes: i64) -> RawRun {
    let created = base_time() + chrono::Duration::minutes(minutes);
    RawRun {
        id,
        name: Some("CI".into()),
        display_title: Some(display_title.into()),
        head_branch: Some("main".into()),
        head_sha: "0123456789abcdef0123".into(),
        run_number: id,
        run_attempt: Some(1),
        status: Some("completed".into()),
        conclusion: Some("success".into()),
        created_at: created,
        updated_at: created,
        actor: Some(Actor {
            login: "alice".into(),
        }),
        triggering_actor: None,
        head_commit: None,
        html_url: None,
    }
}

pub fn raw_job(id: u64, name: &str) -> RawJob {
    RawJob {
        id,
        name: name.into(),
        status: "completed".into(),
        conclusion: Some("success".into()),
        started_at: None,
        completed_at: None,
        steps: Vec::new(),
    }
}

pub fn principal(identity: &str, role: Role, teams: &[&str]) -> Principal {
    Principal {
        identity: identity.into(),
        role,
        teams: teams.iter().map(|t| t.to_string()).collect(),
    }
}

/// `GatewayError` holds a `reqwest::Error` and is not `Clone`; the fake
/// hands out a fresh copy of each canned failure.
fn replay(e: &GatewayError) -> GatewayError {
    match e {
        GatewayError::RateLimited { retry_after_secs } => GatewayError::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        GatewayError::Http { status, message } => GatewayError::Http {
            status: *status,
            message: message.clone(),
        },
        GatewayError::Timeout(d) => GatewayError::Timeout(*d),
        other => GatewayError::Decode(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub repo: String,
    pub workflow_id: String,
    pub git_ref: String,
    pub inputs: Inputs,
}

#[derive(Default)]
pub struct FakeGateway {
    runs: Mutex<HashMap<String, Vec<RawRun>>>,
    run_failures: Mutex<HashMap<String, GatewayError>>,
    jobs: Mutex<HashMap<u64, Vec<RawJob>>>,
    job_failures: Mutex<HashMap<u64, GatewayError>>,
    logs: Mutex<HashMap<u64, String>>,
    dispatch_failures: Mutex<HashMap<String, GatewayError>>,
    cancel_failure: Mutex<Option<GatewayError>>,
    pub dispatched: Mutex<Vec<Dispatched>>,
    pub cancelled: Mutex<Vec<(String, u64)>>,
    list_calls: AtomicUsize,
    job_delay: Option<Duration>,
    runs_delay: Option<Duration>,
    in_flight_jobs: AtomicUsize,
    peak_jobs: AtomicUsize,
}

fn key(repo: &str, workflow_id: &str) -> String {
    format!("{repo}/{workflow_id}")
}

impl FakeGateway {
    pub fn with_job_delay(mut self, delay: Duration) -> Self {
        self.job_delay = Some(delay);
        self
    }

    pub fn with_runs_delay(mut self, delay: Duration) -> Self {
        self.runs_delay = Some(delay);
        self
    }

    pub fn set_runs(&self, wf: &WorkflowRef, runs: Vec<RawRun>) {
        self.runs
            .lock()
            .unwrap()
            .insert(key(&wf.repo, &wf.workflow_id), runs);
    }

    pub fn fail_runs(&self, wf: &WorkflowRef, err: GatewayError) {
        self.run_failures
            .lock()
            .unwrap()
            .insert(key(&wf.repo, &wf.workflow_id), err);
    }

    pub fn clear_run_failures(&self) {
        self.run_failures.lock().unwrap().clear();
    }

    pub fn set_jobs(&self, run_id: u64, jobs: Vec<RawJob>) {
        self.jobs.lock().unwrap().insert(run_id, jobs);
    }

    pub fn fail_jobs(&self, run_id: u64, err: GatewayError) {
        self.job_failures.lock().unwrap().insert(run_id, err);
    }

    pub fn set_log(&self, job_id: u64, text: &str) {
        self.logs.lock().unwrap().insert(job_id, text.to_string());
    }

    pub fn fail_dispatch(&self, repo: &str, workflow_id: &str, err: GatewayError) {
        self.dispatch_failures
            .lock()
            .unwrap()
            .insert(key(repo, workflow_id), err);
    }

    pub fn fail_cancel(&self, err: GatewayError) {
        *self.cancel_failure.lock().unwrap() = Some(err);
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_jobs(&self) -> usize {
        self.peak_jobs.load(Ordering::SeqCst)
    }
}

impl Gateway for FakeGateway {
    fn list_runs<'a>(
        &'a self,
        _owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        max_count: u32,
    ) -> BoxFuture<'a, gh_actions::Result<Vec<RawRun>>> {
        async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.runs_delay {
                tokio::time::sleep(delay).await;
            }
            let k = key(repo, workflow_id);
            if let Some(e) = self.run_failures.lock().unwrap().get(&k) {
                return Err(replay(e));
            }
            let mut runs = self.runs.lock().unwrap().get(&k).cloned().unwrap_or_default();
            runs.truncate(max_count as usize);
            Ok(runs)
        }
        .boxed()
    }

    fn list_jobs<'a>(
        &'a self,
        _owner: &'a str,
        _repo: &'a str,
        run_id: u64,
    ) -> BoxFuture<'a, gh_actions::Result<Vec<RawJob>>> {
        async move {
            let now = self.in_flight_jobs.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_jobs.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.job_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight_jobs.fetch_sub(1, Ordering::SeqCst);
            if let Some(e) = self.job_failures.lock().unwrap().get(&run_id) {
                return Err(replay(e));
            }
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .get(&run_id)
                .cloned()
                .unwrap_or_default())
        }
        .boxed()
    }

    fn dispatch<'a>(
        &'a self,
        _owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        git_ref: &'a str,
        inputs: &'a Inputs,
    ) -> BoxFuture<'a, gh_actions::Result<()>> {
        async move {
            if let Some(e) = self
                .dispatch_failures
                .lock()
                .unwrap()
                .get(&key(repo, workflow_id))
            {
                return Err(replay(e));
            }
            self.dispatched.lock().unwrap().push(Dispatched {
                repo: repo.into(),
                workflow_id: workflow_id.into(),
                git_ref: git_ref.into(),
                inputs: inputs.clone(),
            });
            Ok(())
        }
        .boxed()
    }

    fn cancel<'a>(
        &'a self,
        _owner: &'a str,
        repo: &'a str,
        run_id: u64,
    ) -> BoxFuture<'a, gh_actions::Result<()>> {
        async move {
            if let Some(e) = self.cancel_failure.lock().unwrap().as_ref() {
                return Err(replay(e));
            }
            self.cancelled.lock().unwrap().push((repo.into(), run_id));
            Ok(())
        }
        .boxed()
    }

    fn fetch_log<'a>(
        &'a self,
        _owner: &'a str,
        _repo: &'a str,
        job_id: u64,
    ) -> BoxFuture<'a, gh_actions::Result<Bytes>> {
        async move {
            self.logs
                .lock()
                .unwrap()
                .get(&job_id)
                .map(|text| Bytes::from(text.clone()))
                .ok_or(GatewayError::Http {
                    status: 404,
                    message: "Not Found".into(),
                })
        }
        .boxed()
    }
}
