use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limited by GitHub{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("GitHub API returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode GitHub response: {0}")]
    Decode(String),
}

fn retry_hint(secs: &Option<u64>) -> String {
    match secs {
        Some(s) => format!(" (retry in {s}s)"),
        None => String::new(),
    }
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited { .. })
    }

    /// Whether the same call may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::RateLimited { .. }
            | GatewayError::Timeout(_)
            | GatewayError::Transport(_) => true,
            GatewayError::Http { status, .. } => *status >= 500,
            GatewayError::Decode(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(timeout)
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err)
        }
    }
}
