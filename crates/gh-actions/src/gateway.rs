use bytes::Bytes;
use futures::future::BoxFuture;

use crate::types::{RawJob, RawRun};
use crate::{Inputs, Result};

/// The operations fleetci needs from the automation platform.
///
/// Every method is a suspension point and may fail with a
/// [`GatewayError`](crate::GatewayError); callers decide whether a failure
/// degrades one record or propagates.
pub trait Gateway: Send + Sync {
    /// Most recent runs of a workflow, newest first, at most `max_count`.
    fn list_runs<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        max_count: u32,
    ) -> BoxFuture<'a, Result<Vec<RawRun>>>;

    /// Jobs of a run, in the order the platform reports them.
    fn list_jobs<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        run_id: u64,
    ) -> BoxFuture<'a, Result<Vec<RawJob>>>;

    fn dispatch<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        workflow_id: &'a str,
        git_ref: &'a str,
        inputs: &'a Inputs,
    ) -> BoxFuture<'a, Result<()>>;

    fn cancel<'a>(&'a self, owner: &'a str, repo: &'a str, run_id: u64)
        -> BoxFuture<'a, Result<()>>;

    /// Plain-text log of one job.
    fn fetch_log<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        job_id: u64,
    ) -> BoxFuture<'a, Result<Bytes>>;
}
