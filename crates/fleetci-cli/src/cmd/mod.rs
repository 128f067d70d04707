pub mod check;
pub mod dashboard;
pub mod parse;
pub mod serve;

use anyhow::{Context, Result};
use fleetci_core::config::Config;
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}
