use crate::types::{Conclusion, RunRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_runs: usize,
    /// Percentage of runs concluding in success, one decimal place.
    pub success_rate: f64,
    pub active_runs: usize,
    pub failed_runs: usize,
}

/// Summary statistics over the builds and releases lists.
pub fn summarize(builds: &[RunRecord], releases: &[RunRecord]) -> Metrics {
    let all = || builds.iter().chain(releases.iter());

    let total_runs = builds.len() + releases.len();
    let success = all()
        .filter(|r| r.conclusion == Conclusion::Success)
        .count();
    let success_rate = if total_runs == 0 {
        0.0
    } else {
        (success as f64 * 1000.0 / total_runs as f64).round() / 10.0
    };

    Metrics {
        total_runs,
        success_rate,
        active_runs: all().filter(|r| r.is_active()).count(),
        failed_runs: all()
            .filter(|r| r.conclusion == Conclusion::Failure)
            .count(),
    }
}
