//! Tool-call/tool-result pairing repair.
//!
//! Providers reject requests where an assistant tool call has no matching
//! tool result, or where a tool result answers a call that is not
//! immediately before it. Truncation, pruning and compaction can all produce
//! such histories, so every request passes through [`sanitize_history`]
//! before it is sent.
//!
//! Repair never fails: unmatched results are dropped and missing results are
//! filled with a placeholder.

use tracing::warn;

use crate::session::{Message, Role};

/// Content of a synthesized tool result for a call whose result was lost.
pub const MISSING_TOOL_RESULT: &str = "[Tool result missing — session was compacted]";

/// Outcome of [`repair_history`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRepair {
    /// The repaired history
    pub messages: Vec<Message>,
    /// Tool results removed because nothing asked for them
    pub dropped: usize,
    /// Placeholder tool results inserted for unanswered calls
    pub synthesized: usize,
}

impl HistoryRepair {
    /// Whether the input needed any change.
    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.synthesized == 0
    }
}

/// Repair `messages` and report what changed.
///
/// # Examples
/// ```
/// use convoclaw::agent::repair::{repair_history, MISSING_TOOL_RESULT};
/// use convoclaw::session::{Message, ToolCall};
///
/// let history = vec![
///     Message::tool_result("stale", "left over from a truncated turn"),
///     Message::user("weather?"),
///     Message::assistant_with_tools("", vec![ToolCall::new("c1", "weather", "{}")]),
///     Message::user("hello?"),
/// ];
/// let repair = repair_history(&history);
/// assert_eq!(repair.dropped, 1);
/// assert_eq!(repair.synthesized, 1);
/// assert_eq!(repair.messages[2].content, MISSING_TOOL_RESULT);
/// ```
pub fn repair_history(messages: &[Message]) -> HistoryRepair {
    let mut repair = HistoryRepair {
        messages: Vec::with_capacity(messages.len()),
        ..Default::default()
    };

    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        i += 1;

        if msg.role == Role::Assistant && msg.has_tool_calls() {
            let mut expected: Vec<&str> = msg
                .tool_calls
                .iter()
                .flatten()
                .map(|call| call.id.as_str())
                .collect();
            repair.messages.push(msg.clone());

            while i < messages.len() && messages[i].is_tool_result() {
                let result = &messages[i];
                i += 1;
                let answered = result
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| expected.iter().position(|e| *e == id));
                match answered {
                    Some(pos) => {
                        expected.remove(pos);
                        repair.messages.push(result.clone());
                    }
                    None => {
                        warn!(
                            tool_call_id = result.tool_call_id.as_deref().unwrap_or(""),
                            "Dropping tool result that matches no pending tool call"
                        );
                        repair.dropped += 1;
                    }
                }
            }

            for id in expected {
                warn!(tool_call_id = id, "Synthesizing missing tool result");
                repair
                    .messages
                    .push(Message::tool_result(id, MISSING_TOOL_RESULT));
                repair.synthesized += 1;
            }
        } else if msg.is_tool_result() {
            warn!(
                tool_call_id = msg.tool_call_id.as_deref().unwrap_or(""),
                leading = repair.messages.is_empty(),
                "Dropping orphaned tool result"
            );
            repair.dropped += 1;
        } else {
            repair.messages.push(msg.clone());
        }
    }

    repair
}

/// Return a structurally valid copy of `messages`.
///
/// Every assistant message with tool calls is followed by exactly one tool
/// result per call id, and no tool result appears anywhere else. Messages
/// that are already valid come back unchanged.
pub fn sanitize_history(messages: &[Message]) -> Vec<Message> {
    repair_history(messages).messages
}
