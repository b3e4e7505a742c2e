//! Shared CLI helpers used across multiple command handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use convoclaw::config::Config;

/// Expand `~/` prefix to the user's home directory.
pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(stripped) = text.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if text == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

/// Config file the CLI reads: `--config` if given, else the default path.
pub(crate) fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(expand_tilde).unwrap_or_else(Config::path)
}

/// Load the effective configuration, environment overrides included.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit);
    Config::load_from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
