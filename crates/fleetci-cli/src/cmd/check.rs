use crate::output::{print_json, print_table};
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;

    if json {
        return print_json(&serde_json::json!({
            "ok": true,
            "workflows": config.workflows,
            "teams": config.teams.keys().collect::<Vec<_>>(),
            "users": config.users.len(),
        }));
    }

    let rows = config
        .workflows
        .iter()
        .map(|w| {
            vec![
                w.app_name.clone(),
                w.kind.to_string(),
                format!("{}/{}", w.owner, w.repo),
                w.workflow_id.clone(),
                config.team_for_app(&w.app_name).unwrap_or("-").to_string(),
            ]
        })
        .collect();
    print_table(&["APP", "KIND", "REPO", "WORKFLOW", "TEAM"], rows);
    println!(
        "\n{} workflows, {} teams, {} users: configuration OK",
        config.workflows.len(),
        config.teams.len(),
        config.users.len()
    );
    Ok(())
}
