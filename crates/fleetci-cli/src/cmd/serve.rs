use anyhow::Result;
use fleetci_server::AppState;
use std::path::Path;

pub fn run(config_path: &Path, port: u16) -> Result<()> {
    let config = super::load_config(config_path)?;
    tracing::info!(
        config = %config_path.display(),
        workflows = config.workflows.len(),
        teams = config.teams.len(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(config)?;
        fleetci_server::serve(state, port).await
    })
}
