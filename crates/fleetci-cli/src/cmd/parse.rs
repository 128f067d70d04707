use crate::output::print_json;
use anyhow::Result;
use fleetci_core::parser;
use fleetci_core::types::WorkflowKind;

pub fn run(name: &str, kind: WorkflowKind, json: bool) -> Result<()> {
    let parsed = parser::parse(name, kind);

    if json {
        return print_json(&serde_json::json!({
            "name": name,
            "kind": kind,
            "parsed": parsed,
        }));
    }

    match parsed {
        Some(p) => {
            println!("app:     {}", p.app_name);
            println!("branch:  {}", p.branch);
            println!("version: {}", p.version);
            println!("commit:  {}", p.commit.as_deref().unwrap_or("-"));
        }
        None => println!("no match: '{name}' is not a {kind} run name"),
    }
    Ok(())
}
