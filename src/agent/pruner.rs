//! Token-budget pruning of request history.
//!
//! Drops the oldest messages until the history fits its share of the
//! context window. An assistant message with tool calls is always dropped
//! together with the tool results that follow it, so pruning never splits a
//! call from its results.

use tracing::debug;

use super::tokens::{TokenCalibration, TokenEstimator};
use crate::session::{Message, Role};

/// Pruning limits.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneConfig {
    /// Fraction of the context window history may use (0.0, 1.0]
    pub max_history_share: f64,
    /// Never prune below this many messages
    pub min_messages: usize,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            max_history_share: 0.75,
            min_messages: 4,
        }
    }
}

impl PruneConfig {
    /// Token budget for history in a window of `context_window` tokens.
    ///
    /// # Example
    /// ```
    /// use convoclaw::agent::pruner::PruneConfig;
    ///
    /// assert_eq!(PruneConfig::default().budget_for(1000), 750);
    /// ```
    pub fn budget_for(&self, context_window: usize) -> usize {
        (context_window as f64 * self.max_history_share).floor() as usize
    }
}

/// End index (exclusive) of the chunk starting at `start`.
fn chunk_end(messages: &[Message], start: usize) -> usize {
    let mut end = start + 1;
    if messages[start].role == Role::Assistant && messages[start].has_tool_calls() {
        while end < messages.len() && messages[end].is_tool_result() {
            end += 1;
        }
    }
    end
}

/// Drop whole chunks from the oldest end until `messages` fits `token_budget`.
///
/// Stops early, returning a history that may still exceed the budget, when
/// dropping the next chunk would leave fewer than `config.min_messages`
/// messages or would remove the most recent message. The calibration scale
/// is derived once from the unpruned input.
pub fn prune_history(
    messages: &[Message],
    token_budget: usize,
    config: &PruneConfig,
    calibration: Option<&TokenCalibration>,
) -> Vec<Message> {
    let scale = TokenEstimator::scale(messages, calibration);
    let sizes: Vec<usize> = messages.iter().map(TokenEstimator::estimate_message).collect();
    let mut remaining: usize = sizes.iter().sum();
    let mut start = 0;

    while start < messages.len() && TokenEstimator::apply_scale(remaining, scale) > token_budget {
        let end = chunk_end(messages, start);
        if end >= messages.len() || messages.len() - end < config.min_messages {
            debug!(
                kept = messages.len() - start,
                estimate = TokenEstimator::apply_scale(remaining, scale),
                budget = token_budget,
                "History over budget at pruning floor"
            );
            break;
        }
        remaining -= sizes[start..end].iter().sum::<usize>();
        start = end;
    }

    if start > 0 {
        debug!(
            dropped = start,
            kept = messages.len() - start,
            budget = token_budget,
            "Pruned history to fit token budget"
        );
    }

    messages[start..].to_vec()
}
