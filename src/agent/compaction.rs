//! Background summarization of long conversations.
//!
//! When a session's history outgrows its share of the context window, the
//! [`CompactionController`] asks the provider to summarize everything but
//! the most recent messages, stores the summary on the session and
//! truncates the history. The summary is then framed into every later
//! request by the context builder.
//!
//! At most one compaction runs per session at a time: the controller takes
//! a non-blocking lock from its [`ConcurrencyGuard`] and holds it until the
//! compaction finishes, whichever way it finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::guard::ConcurrencyGuard;
use super::tokens::{TokenCalibration, TokenEstimator};
use crate::config::CompactionConfig;
use crate::error::{ConvoError, ProviderError, Result};
use crate::log_component;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, Role, SessionStore};
use crate::utils::sanitize::sanitize_response;
use crate::utils::string::{preview, single_line};

/// System prompt for summarization requests.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You maintain the long-term memory of a chat assistant. \
Summarize the conversation you are given so the assistant can continue it without the \
original messages. Keep names, facts, decisions, open questions and commitments. \
Write plain prose, no preamble.";

/// Sampling temperature for summaries.
const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Characters of a tool result kept in the transcript.
const TOOL_RESULT_PREVIEW_CHARS: usize = 300;

/// Characters of tool-call arguments kept in the transcript.
const TOOL_ARGS_PREVIEW_CHARS: usize = 120;

/// Result of [`CompactionController::maybe_compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionTrigger {
    /// Compaction disabled, or history within limits.
    NotNeeded,
    /// Another compaction of this session holds the lock.
    AlreadyRunning,
    /// A background compaction was started.
    Scheduled,
}

/// Result of one locked compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// History already no longer than `keep_last_messages`.
    NothingToCompact,
    /// Summary stored and history truncated.
    Compacted {
        /// Messages folded into the summary
        summarized: usize,
        /// Messages left in the history
        kept: usize,
        /// Session's compaction counter after this run
        compaction_count: u32,
    },
}

/// Render `messages` into a summarization prompt.
///
/// Assistant text is sanitized first so leaked reasoning or tool markup does
/// not end up in the summary; tool calls and results are shortened.
///
/// # Examples
/// ```
/// use convoclaw::agent::compaction::build_summary_prompt;
/// use convoclaw::session::{Message, ToolCall};
///
/// let msgs = vec![
///     Message::user("What's the weather?"),
///     Message::assistant_with_tools("", vec![ToolCall::new("c1", "weather", r#"{"city":"Hanoi"}"#)]),
///     Message::tool_result("c1", "31C, humid"),
///     Message::assistant("<think>easy</think>Hot and humid."),
/// ];
/// let prompt = build_summary_prompt(&msgs, Some("User lives in Hanoi."));
/// assert!(prompt.contains("User lives in Hanoi."));
/// assert!(prompt.contains("user: What's the weather?"));
/// assert!(prompt.contains(r#"[called weather({"city":"Hanoi"})]"#));
/// assert!(prompt.contains("tool: 31C, humid"));
/// assert!(prompt.contains("assistant: Hot and humid."));
/// assert!(!prompt.contains("easy"));
/// ```
pub fn build_summary_prompt(messages: &[Message], previous_summary: Option<&str>) -> String {
    let mut transcript = String::new();
    for msg in messages {
        let mut line = match msg.role {
            Role::Assistant => sanitize_response(&msg.content),
            Role::Tool => preview(&single_line(&msg.content), TOOL_RESULT_PREVIEW_CHARS),
            Role::User | Role::System => msg.content.trim().to_string(),
        };
        for call in msg.tool_calls.iter().flatten() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!(
                "[called {}({})]",
                call.name,
                preview(&single_line(&call.arguments), TOOL_ARGS_PREVIEW_CHARS)
            ));
        }
        if line.is_empty() {
            continue;
        }
        transcript.push_str(&format!("{}: {}\n", msg.role, line));
    }

    let mut prompt = String::new();
    if let Some(previous) = previous_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("Summary of the conversation so far:\n");
        prompt.push_str(previous.trim());
        prompt.push_str("\n\nUpdate it with the messages below into a single new summary.\n\n");
    } else {
        prompt.push_str("Summarize the following conversation.\n\n");
    }
    prompt.push_str(&transcript);
    prompt
}

/// History size, in tokens, above which a session in a `context_window`
/// token window gets compacted.
pub fn threshold_tokens(config: &CompactionConfig, context_window: usize) -> f64 {
    context_window as f64 * config.history_share
}

/// Whether `history` is long enough, both in messages and in estimated
/// tokens, to be worth summarizing.
///
/// # Examples
/// ```
/// use convoclaw::agent::compaction::needs_compaction;
/// use convoclaw::config::CompactionConfig;
/// use convoclaw::session::Message;
///
/// let config = CompactionConfig::default(); // min 50 messages, share 0.75
/// let history: Vec<Message> = (0..60).map(|i| Message::user(&format!("message {}", i))).collect();
/// assert!(needs_compaction(&history, None, &config, 500));
/// assert!(!needs_compaction(&history, None, &config, 200_000));
/// assert!(!needs_compaction(&history[..50], None, &config, 10));
/// ```
pub fn needs_compaction(
    history: &[Message],
    calibration: Option<&TokenCalibration>,
    config: &CompactionConfig,
    context_window: usize,
) -> bool {
    history.len() > config.min_messages
        && TokenEstimator::estimate(history, calibration) as f64
            > threshold_tokens(config, context_window)
}

/// Decides when a session needs summarizing and runs the summarization.
pub struct CompactionController {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn LLMProvider>,
    guard: ConcurrencyGuard,
    config: CompactionConfig,
    context_window: usize,
    model: Option<String>,
    tasks: Mutex<JoinSet<()>>,
}

impl CompactionController {
    /// Create a controller with its own guard.
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn LLMProvider>,
        config: CompactionConfig,
        context_window: usize,
    ) -> Self {
        Self {
            store,
            provider,
            guard: ConcurrencyGuard::new(),
            config,
            context_window,
            model: None,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Share a guard with other controllers of the same sessions.
    pub fn with_guard(mut self, guard: ConcurrencyGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Summarize with `model` instead of the provider's default.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// The guard serializing compactions.
    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// History size, in tokens, above which compaction triggers.
    pub fn threshold_tokens(&self) -> f64 {
        threshold_tokens(&self.config, self.context_window)
    }

    /// See [`needs_compaction`].
    pub fn should_compact(
        &self,
        history: &[Message],
        calibration: Option<&TokenCalibration>,
    ) -> bool {
        needs_compaction(history, calibration, &self.config, self.context_window)
    }

    /// Start a background compaction of `key` if one is needed and none is
    /// running.
    ///
    /// Never waits for the summarization itself; failures of the background
    /// run are logged and leave the session untouched.
    pub async fn maybe_compact(self: &Arc<Self>, key: &str) -> Result<CompactionTrigger> {
        if !self.config.enabled {
            return Ok(CompactionTrigger::NotNeeded);
        }

        let history = self.store.get_history(key).await?;
        let calibration = self.store.get_calibration(key).await?;
        if !self.should_compact(&history, calibration.as_ref()) {
            return Ok(CompactionTrigger::NotNeeded);
        }

        let Some(permit) = self.guard.try_acquire(key).await else {
            debug!(session = %key, "Compaction already running, skipping");
            return Ok(CompactionTrigger::AlreadyRunning);
        };

        let controller = Arc::clone(self);
        let key = key.to_string();
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Compaction task panicked");
            }
        }
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = controller.run_locked(&key).await {
                error!(session = %key, error = %e, "Compaction failed, session left unchanged");
            }
        });

        Ok(CompactionTrigger::Scheduled)
    }

    /// Compact `key` now, waiting for any running compaction of it first.
    ///
    /// # Errors
    ///
    /// Provider failures, timeouts and empty summaries are returned; the
    /// session is left unchanged in all of those cases.
    pub async fn compact_now(&self, key: &str) -> Result<CompactionOutcome> {
        let _permit = self.guard.acquire(key).await;
        self.run_locked(key).await
    }

    /// Wait for all background compactions to finish.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Compaction task panicked");
            }
        }
    }

    /// Number of background compactions not yet reaped.
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// The compaction itself. Callers must hold the guard for `key`.
    async fn run_locked(&self, key: &str) -> Result<CompactionOutcome> {
        let history = self.store.get_history(key).await?;
        let keep = self.config.keep_last_messages;
        if history.len() <= keep {
            debug!(session = %key, messages = history.len(), "Nothing to compact");
            return Ok(CompactionOutcome::NothingToCompact);
        }

        let split = history.len() - keep;
        let previous = self.store.get_summary(key).await?;
        let prompt = build_summary_prompt(&history[..split], previous.as_deref());
        log_component!(
            info,
            "compaction",
            "Summarizing session history",
            session = key,
            messages = split,
            prompt_bytes = prompt.len()
        );

        let request = vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(&prompt)];
        let options = ChatOptions::new()
            .with_temperature(SUMMARY_TEMPERATURE)
            .with_max_tokens(self.config.summary_max_tokens);
        let call = self
            .provider
            .chat(request, vec![], self.model.as_deref(), options);

        let response = match tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            call,
        )
        .await
        {
            Ok(response) => response?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "summarization exceeded {}s",
                    self.config.timeout_secs
                ))
                .into())
            }
        };

        let summary = sanitize_response(&response.content);
        if summary.is_empty() {
            return Err(ConvoError::Compaction(
                "provider returned an empty summary".to_string(),
            ));
        }

        // Only the summarized prefix is replaced; turns appended while the
        // provider was working stay in the history.
        let (kept, compaction_count) = self.store.apply_compaction(key, &summary, split).await?;
        self.store.save(key).await?;

        log_component!(
            info,
            "compaction",
            "Compaction applied",
            session = key,
            summarized = split,
            kept = kept,
            summary_bytes = summary.len(),
            compaction_count = compaction_count
        );

        Ok(CompactionOutcome::Compacted {
            summarized: split,
            kept,
            compaction_count,
        })
    }
}
