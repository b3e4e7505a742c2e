//! Configuration types for ConvoClaw
//!
//! Every section uses `#[serde(default)]`, so a partial config file only
//! needs the fields it changes.

use serde::{Deserialize, Serialize};

use crate::agent::pruner::PruneConfig;

/// Main configuration struct for ConvoClaw
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, window, turn limits)
    pub agents: AgentConfig,
    /// Context compaction configuration
    pub compaction: CompactionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Context window of the model, in tokens
    pub context_window: usize,
    /// User turns of history sent per request. 0 = unlimited.
    pub max_history_turns: usize,
    /// Maximum wall-clock time (seconds) for a single provider call in a turn.
    pub agent_timeout_secs: u64,
    /// System prompt placed first in every request
    pub system_prompt: Option<String>,
}

/// Default model compile-time configuration.
/// Set `CONVOCLAW_DEFAULT_MODEL` at compile time to override.
const COMPILE_TIME_DEFAULT_MODEL: &str = match option_env!("CONVOCLAW_DEFAULT_MODEL") {
    Some(v) => v,
    None => "claude-sonnet-4-5-20250929",
};

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: COMPILE_TIME_DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            context_window: 200_000,
            max_history_turns: 0,
            agent_timeout_secs: 300,
            system_prompt: None,
        }
    }
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// Context compaction and pruning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether automatic background compaction is enabled.
    pub enabled: bool,
    /// Fraction (0.0-1.0] of the context window history may occupy before
    /// compaction triggers; also the pruning budget share.
    pub history_share: f64,
    /// Compaction only considers sessions with more messages than this.
    pub min_messages: usize,
    /// Messages kept verbatim after a compaction.
    pub keep_last_messages: usize,
    /// Pruning never shrinks a request's history below this many messages.
    pub prune_min_messages: usize,
    /// Upper bound on the generated summary length.
    pub summary_max_tokens: u32,
    /// Deadline for the summarization call.
    pub timeout_secs: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_share: 0.75,
            min_messages: 50,
            keep_last_messages: 4,
            prune_min_messages: 4,
            summary_max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

impl CompactionConfig {
    /// Pruning limits derived from this section.
    pub fn prune_config(&self) -> PruneConfig {
        PruneConfig {
            max_history_share: self.history_share,
            min_messages: self.prune_min_messages,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line text, grep-friendly
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Append logs to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
