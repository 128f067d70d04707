use crate::output::{print_json, print_table};
use anyhow::Result;
use fleetci_core::types::RunRecord;
use fleetci_server::AppState;
use std::path::Path;

pub fn run(config_path: &Path, team: Option<&str>, branch: Option<&str>, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    let dashboard = rt.block_on(async {
        let state = AppState::from_config(config)?;
        let dashboard = state.dashboard(team, branch).await?;
        Ok::<_, anyhow::Error>(dashboard)
    })?;

    if json {
        return print_json(&dashboard);
    }

    println!("BUILDS");
    print_table(HEADERS, dashboard.builds.iter().map(row).collect());
    println!("\nRELEASES");
    print_table(HEADERS, dashboard.releases.iter().map(row).collect());

    let m = dashboard.metrics;
    println!(
        "\n{} runs, {}% success, {} active, {} failed (as of {})",
        m.total_runs,
        m.success_rate,
        m.active_runs,
        m.failed_runs,
        dashboard.cached_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for failure in &dashboard.failures {
        eprintln!("warning: {}: {}", failure.workflow, failure.error);
    }
    Ok(())
}

const HEADERS: &[&str] = &["APP", "BRANCH", "VERSION", "STATUS", "CONCLUSION", "BY", "CREATED"];

fn row(r: &RunRecord) -> Vec<String> {
    vec![
        r.app_name.clone(),
        r.branch.clone(),
        r.version.clone(),
        serde_label(&r.status),
        serde_label(&r.conclusion),
        r.triggered_by.clone(),
        r.created_at.format("%Y-%m-%d %H:%M").to_string(),
    ]
}

/// The wire spelling of a unit enum, e.g. `in_progress`.
fn serde_label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
