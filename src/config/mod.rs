//! Configuration management for ConvoClaw
//!
//! This module provides configuration loading, saving and validation.
//! Configuration is loaded from `~/.convoclaw/config.json` with environment
//! variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{ConvoError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

impl Config {
    /// Returns the ConvoClaw configuration directory path (~/.convoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".convoclaw")
    }

    /// Returns the path to the config file (~/.convoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables override config values using the pattern
    /// `CONVOCLAW_SECTION_KEY`.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: CONVOCLAW_SECTION_SUBSECTION_KEY
    fn apply_env_overrides(&mut self) {
        // Agent defaults
        if let Ok(val) = std::env::var("CONVOCLAW_AGENTS_DEFAULTS_MODEL") {
            self.agents.defaults.model = val;
        }
        if let Ok(val) = std::env::var("CONVOCLAW_AGENTS_DEFAULTS_SYSTEM_PROMPT") {
            self.agents.defaults.system_prompt = Some(val);
        }
        env_parse("CONVOCLAW_AGENTS_DEFAULTS_MAX_TOKENS", &mut self.agents.defaults.max_tokens);
        env_parse("CONVOCLAW_AGENTS_DEFAULTS_TEMPERATURE", &mut self.agents.defaults.temperature);
        env_parse(
            "CONVOCLAW_AGENTS_DEFAULTS_CONTEXT_WINDOW",
            &mut self.agents.defaults.context_window,
        );
        env_parse(
            "CONVOCLAW_AGENTS_DEFAULTS_MAX_HISTORY_TURNS",
            &mut self.agents.defaults.max_history_turns,
        );
        env_parse(
            "CONVOCLAW_AGENTS_DEFAULTS_AGENT_TIMEOUT_SECS",
            &mut self.agents.defaults.agent_timeout_secs,
        );

        // Compaction
        env_parse("CONVOCLAW_COMPACTION_ENABLED", &mut self.compaction.enabled);
        env_parse("CONVOCLAW_COMPACTION_HISTORY_SHARE", &mut self.compaction.history_share);
        env_parse("CONVOCLAW_COMPACTION_MIN_MESSAGES", &mut self.compaction.min_messages);
        env_parse(
            "CONVOCLAW_COMPACTION_KEEP_LAST_MESSAGES",
            &mut self.compaction.keep_last_messages,
        );
        env_parse(
            "CONVOCLAW_COMPACTION_PRUNE_MIN_MESSAGES",
            &mut self.compaction.prune_min_messages,
        );
        env_parse(
            "CONVOCLAW_COMPACTION_SUMMARY_MAX_TOKENS",
            &mut self.compaction.summary_max_tokens,
        );
        env_parse("CONVOCLAW_COMPACTION_TIMEOUT_SECS", &mut self.compaction.timeout_secs);

        // Logging
        if let Ok(val) = std::env::var("CONVOCLAW_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CONVOCLAW_LOGGING_FILE") {
            self.logging.file = Some(val);
        }
    }

    /// Check value ranges the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConvoError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let share = self.compaction.history_share;
        if !(share > 0.0 && share <= 1.0) {
            return Err(ConvoError::Config(format!(
                "compaction.history_share must be in (0, 1], got {}",
                share
            )));
        }
        if self.compaction.keep_last_messages == 0 {
            return Err(ConvoError::Config(
                "compaction.keep_last_messages must be at least 1".to_string(),
            ));
        }
        if self.agents.defaults.context_window == 0 {
            return Err(ConvoError::Config(
                "agents.defaults.context_window must be greater than 0".to_string(),
            ));
        }
        if self.compaction.timeout_secs == 0 {
            return Err(ConvoError::Config(
                "compaction.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Overwrite `target` with the parsed value of `key`, ignoring unparsable input.
fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *target = v;
        }
    }
}
