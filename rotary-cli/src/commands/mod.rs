pub mod config;
pub mod prune;
pub mod rotate;

use std::path::Path;

use anyhow::{Context, Result};
use rotary_core::{config as core_config, Config};

/// Load `path`, or `~/.rotary/config.yaml` when no path was given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => core_config::load_from(path)
            .with_context(|| format!("failed to load config '{}'", path.display())),
        None => core_config::load().context("failed to load ~/.rotary/config.yaml"),
    }
}
