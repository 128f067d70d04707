use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::types::{DispatchBody, JobsPage, RawJob, RawRun, RunsPage};
use crate::{Inputs, Result};

const API_VERSION: &str = "2022-11-28";
/// GitHub caps `per_page` at 100.
const MAX_PAGE: u32 = 100;

/// [`Gateway`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GithubClient {
    /// Build a client for `base_url` (e.g. `https://api.github.com`).
    ///
    /// `timeout` bounds every request, including the body read.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| GatewayError::Decode(format!("invalid token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("fleetci/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))?;
        check_status(resp).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = self.send(req).await?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn list_runs_impl(
        &self,
        owner: &str,
        repo: &str,
        workflow_id: &str,
        max_count: u32,
    ) -> Result<Vec<RawRun>> {
        let per_page = max_count.clamp(1, MAX_PAGE).to_string();
        let req = self
            .request(
                Method::GET,
                &format!("/repos/{owner}/{repo}/actions/workflows/{workflow_id}/runs"),
            )
            .query(&[("per_page", per_page.as_str())]);
        let page: RunsPage = self.get_json(req).await?;
        let mut runs = page.workflow_runs;
        runs.truncate(max_count as usize);
        debug!(owner, repo, workflow_id, count = runs.len(), "listed runs");
        Ok(runs)
    }

    async fn list_jobs_impl(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<RawJob>> {
        let req = self
            .request(
                Method::GET,
                &format!("/repos/{owner}/{repo}/actions/runs/{run_id}/jobs"),
            )
            .query(&[("per_page", MAX_PAGE.to_string())]);
        let page: JobsPage = self.get_json(req).await?;
        Ok(page.jobs)
    }

    async fn dispatch_impl(
        &self,
        owner: &str,
        repo: &str,
        workflow_id: &str,
        git_ref: &str,
        inputs: &Inputs,
    ) -> Result<()> {
        let req = self
            .request(
                Method::POST,
                &format!("/repos/{owner}/{repo}/actions/workflows/{workflow_id}/dispatches"),
            )
            .json(&DispatchBody { git_ref, inputs });
        self.send(req).await?;
        debug!(owner, repo, workflow_id, git_ref, "dispatched workflow");
        Ok(())
    }

    async fn cancel_impl(&self, owner: &str, repo: &str, run_id: u64) -> Result<()> {
        let req = self.request(
            Method::POST,
            &format!("/repos/{owner}/{repo}/actions/runs/{run_id}/cancel"),
        );
        self.send(req).await?;
        debug!(owner, repo, run_id, "cancelled run");
        Ok(())
    }

    async fn fetch_log_impl(&self, owner: &str, repo: &str, job_id: u64) -> Result<Bytes> {
        // The API answers with a redirect to short-lived blob storage; reqwest
        // follows it and drops the Authorization header on the cross-host hop.
        let req = self.request(
            Method::GET,
            &format!("/repos/{owner}/{repo}/actions/jobs/{job_id}/logs"),
        );
        let resp = self.send(req).await?;
        resp.bytes()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))
    }
}

impl Gateway for GithubClient {
    fn list_runs<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        max_count: u32,
    ) -> BoxFuture<'a, Result<Vec<RawRun>>> {
        self.list_runs_impl(owner, repo, workflow_id, max_count)
            .boxed()
    }

    fn list_jobs<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        run_id: u64,
    ) -> BoxFuture<'a, Result<Vec<RawJob>>> {
        self.list_jobs_impl(owner, repo, run_id).boxed()
    }

    fn dispatch<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        git_ref: &'a str,
        inputs: &'a Inputs,
    ) -> BoxFuture<'a, Result<()>> {
        self.dispatch_impl(owner, repo, workflow_id, git_ref, inputs)
            .boxed()
    }

    fn cancel<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        run_id: u64,
    ) -> BoxFuture<'a, Result<()>> {
        self.cancel_impl(owner, repo, run_id).boxed()
    }

    fn fetch_log<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        job_id: u64,
    ) -> BoxFuture<'a, Result<Bytes>> {
        self.fetch_log_impl(owner, repo, job_id).boxed()
    }
}

/// Map non-success responses to [`GatewayError`].
///
/// GitHub signals an exhausted primary rate limit with 403 and
/// `x-ratelimit-remaining: 0`, and a secondary limit with 429 or 403 plus
/// `retry-after`.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let headers = resp.headers();
    let retry_after = header_u64(headers, "retry-after");
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (exhausted || retry_after.is_some()))
    {
        let retry_after_secs = retry_after.or_else(|| {
            header_u64(headers, "x-ratelimit-reset").map(|reset| {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                reset.saturating_sub(now)
            })
        });
        return Err(GatewayError::RateLimited { retry_after_secs });
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(text);
    Err(GatewayError::Http {
        status: status.as_u16(),
        message,
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
