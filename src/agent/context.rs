//! Request assembly for one conversation turn.
//!
//! The `ContextBuilder` owns the system prompt and turns stored history, the
//! session summary and the new user message into the request sent to the
//! provider. History passes through the turn limiter, the token pruner and
//! the history repair, in that order, so the payload is always structurally
//! valid whatever limiting and pruning did to tool-call groups.

use super::pruner::{prune_history, PruneConfig};
use super::repair::sanitize_history;
use super::tokens::TokenCalibration;
use super::turns::limit_history_turns;
use crate::config::Config;
use crate::session::Message;

/// Default system prompt for the ConvoClaw assistant
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are ConvoClaw, a helpful conversational assistant.

Be concise but helpful. Earlier parts of long conversations may be provided as a summary."#;

/// Header of the synthetic user message carrying the session summary.
pub const SUMMARY_HEADER: &str = "[Previous conversation summary]";

/// Assistant reply acknowledging the summary.
pub const SUMMARY_ACK: &str = "Understood. I have the context of our earlier conversation.";

/// Limits applied to history while assembling a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyConfig {
    /// Keep at most this many user turns (0 = unlimited)
    pub max_history_turns: usize,
    /// Provider context window in tokens
    pub context_window: usize,
    /// Token-budget pruning limits
    pub prune: PruneConfig,
    /// Provider-reported size of the previous request, if any
    pub calibration: Option<TokenCalibration>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AssemblyConfig {
    /// Limits from the agent and compaction sections of `config`.
    ///
    /// # Example
    /// ```
    /// use convoclaw::agent::AssemblyConfig;
    /// use convoclaw::config::Config;
    ///
    /// let cfg = AssemblyConfig::from_config(&Config::default());
    /// assert_eq!(cfg.context_window, 200_000);
    /// assert_eq!(cfg.max_history_turns, 0);
    /// assert!(cfg.calibration.is_none());
    /// ```
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_history_turns: config.agents.defaults.max_history_turns,
            context_window: config.agents.defaults.context_window,
            prune: config.compaction.prune_config(),
            calibration: None,
        }
    }

    /// Use `calibration` when estimating history size.
    pub fn with_calibration(mut self, calibration: Option<TokenCalibration>) -> Self {
        self.calibration = calibration;
        self
    }

    /// Token budget for history.
    pub fn history_budget(&self) -> usize {
        self.prune.budget_for(self.context_window)
    }
}

/// Builds the message list for a provider call.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    /// Create a new context builder with the default system prompt.
    ///
    /// # Example
    /// ```rust
    /// use convoclaw::agent::ContextBuilder;
    ///
    /// let builder = ContextBuilder::new();
    /// let system = builder.build_system_message();
    /// assert!(system.content.contains("ConvoClaw"));
    /// ```
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Set a custom system prompt.
    ///
    /// # Example
    /// ```rust
    /// use convoclaw::agent::ContextBuilder;
    ///
    /// let builder = ContextBuilder::new()
    ///     .with_system_prompt("You are a helpful assistant.");
    /// assert_eq!(builder.system_prompt(), "You are a helpful assistant.");
    /// ```
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Builder for `config`, honoring its system prompt override.
    pub fn from_config(config: &Config) -> Self {
        match &config.agents.defaults.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => Self::new().with_system_prompt(prompt),
            _ => Self::new(),
        }
    }

    /// Build the system message.
    pub fn build_system_message(&self) -> Message {
        Message::system(&self.system_prompt)
    }

    /// Build the full message list for one turn.
    ///
    /// The list is:
    /// 1. System message
    /// 2. Summary framing, when `summary` is non-empty: a user message
    ///    carrying the summary and an assistant acknowledgement
    /// 3. History, limited to `max_history_turns`, pruned to the token
    ///    budget and repaired
    /// 4. The new user message (empty input is omitted)
    ///
    /// # Example
    /// ```rust
    /// use convoclaw::agent::{AssemblyConfig, ContextBuilder};
    /// use convoclaw::session::Message;
    ///
    /// let builder = ContextBuilder::new();
    /// let history = vec![
    ///     Message::user("Hello"),
    ///     Message::assistant("Hi there!"),
    /// ];
    /// let messages = builder.build_messages(
    ///     &history,
    ///     Some("User's name is Linh."),
    ///     "How are you?",
    ///     &AssemblyConfig::default(),
    /// );
    /// // system + summary pair + 2 history + new user
    /// assert_eq!(messages.len(), 6);
    /// assert!(messages[1].content.contains("Linh"));
    /// ```
    pub fn build_messages(
        &self,
        history: &[Message],
        summary: Option<&str>,
        user_message: &str,
        config: &AssemblyConfig,
    ) -> Vec<Message> {
        let mut messages = vec![self.build_system_message()];

        if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
            messages.push(Message::user(&format!("{}\n{}", SUMMARY_HEADER, summary)));
            messages.push(Message::assistant(SUMMARY_ACK));
        }

        let limited = limit_history_turns(history, config.max_history_turns);
        let pruned = prune_history(
            limited,
            config.history_budget(),
            &config.prune,
            config.calibration.as_ref(),
        );
        messages.extend(sanitize_history(&pruned));

        if !user_message.is_empty() {
            messages.push(Message::user(user_message));
        }
        messages
    }

    /// Get the current system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
