//! `gh-actions`: the source gateway fleetci uses to talk to GitHub Actions.
//!
//! ```text
//! Gateway trait   ← list runs / list jobs / dispatch / cancel / fetch log
//!     │
//!     ▼
//! GithubClient    ← reqwest over the REST API, bounded by a request timeout
//!     │              maps 403/429 rate-limit answers to GatewayError::RateLimited
//!     ▼
//! RawRun / RawJob ← wire types, decoded leniently
//! ```
//!
//! Consumers hold an `Arc<dyn Gateway>` so tests can substitute a fake.

pub mod client;
pub mod error;
pub mod gateway;
pub mod types;


pub use client::GithubClient;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use types::{Actor, HeadCommit, RawJob, RawRun, RawStep};

/// Workflow dispatch inputs (`workflow_dispatch` accepts string values).
pub type Inputs = std::collections::BTreeMap<String, String>;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
