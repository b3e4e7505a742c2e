//! Token estimation for request sizing.
//!
//! Uses a ~4 bytes per token heuristic with a fixed per-message overhead.
//! When the provider has reported the real prompt size of an earlier request
//! for the same session, the heuristic is scaled by how far off it was.

use serde::{Deserialize, Serialize};

use crate::session::Message;

/// Provider-reported prompt size for the last real request of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCalibration {
    /// Prompt tokens the provider billed for the request
    pub prompt_tokens: u64,
    /// Number of messages in that request
    pub message_count: usize,
    /// Heuristic estimate of that same request, when it was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<usize>,
}

impl TokenCalibration {
    /// Create a calibration without a recorded baseline estimate.
    pub fn new(prompt_tokens: u64, message_count: usize) -> Self {
        Self {
            prompt_tokens,
            message_count,
            estimated_tokens: None,
        }
    }

    /// Attach the heuristic estimate the provider's count should be compared to.
    pub fn with_estimate(mut self, estimated_tokens: usize) -> Self {
        self.estimated_tokens = Some(estimated_tokens);
        self
    }

    /// Build a calibration from the request that was actually sent.
    ///
    /// # Example
    /// ```
    /// use convoclaw::agent::tokens::{TokenCalibration, TokenEstimator};
    /// use convoclaw::session::Message;
    ///
    /// let request = vec![Message::system("Be brief."), Message::user("Hi")];
    /// let calibration = TokenCalibration::from_request(30, &request);
    /// assert_eq!(calibration.message_count, 2);
    /// assert_eq!(
    ///     calibration.estimated_tokens,
    ///     Some(TokenEstimator::estimate_history(&request))
    /// );
    /// ```
    pub fn from_request(prompt_tokens: u64, request: &[Message]) -> Self {
        Self::new(prompt_tokens, request.len())
            .with_estimate(TokenEstimator::estimate_history(request))
    }
}

/// Heuristic token estimator.
pub struct TokenEstimator;

impl TokenEstimator {
    /// Bytes per token estimate.
    const BYTES_PER_TOKEN: usize = 4;

    /// Overhead tokens per message (role, formatting).
    const MESSAGE_OVERHEAD: usize = 4;

    /// Lower bound for the calibration scale.
    pub const MIN_SCALE: f64 = 0.5;

    /// Upper bound for the calibration scale.
    pub const MAX_SCALE: f64 = 2.0;

    /// Estimate tokens for a text string.
    pub const fn estimate_text(text: &str) -> usize {
        text.len().div_ceil(Self::BYTES_PER_TOKEN)
    }

    /// Estimate tokens for a single message, tool-call payloads included.
    pub fn estimate_message(message: &Message) -> usize {
        let mut tokens = Self::estimate_text(&message.content) + Self::MESSAGE_OVERHEAD;
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                tokens += Self::estimate_text(&call.id)
                    + Self::estimate_text(&call.name)
                    + Self::estimate_text(&call.arguments);
            }
        }
        if let Some(id) = &message.tool_call_id {
            tokens += Self::estimate_text(id);
        }
        tokens
    }

    /// Uncalibrated estimate for a message sequence.
    pub fn estimate_history(messages: &[Message]) -> usize {
        messages.iter().map(Self::estimate_message).sum()
    }

    /// Scale factor derived from `calibration`, clamped to
    /// `[MIN_SCALE, MAX_SCALE]`.
    ///
    /// The baseline is the recorded estimate when present, otherwise the
    /// heuristic over the first `message_count` messages of `messages`.
    /// Returns `1.0` when there is nothing to compare against.
    pub fn scale(messages: &[Message], calibration: Option<&TokenCalibration>) -> f64 {
        let Some(calibration) = calibration else {
            return 1.0;
        };
        let baseline = calibration.estimated_tokens.unwrap_or_else(|| {
            let prior = calibration.message_count.min(messages.len());
            Self::estimate_history(&messages[..prior])
        });
        if baseline == 0 || calibration.prompt_tokens == 0 {
            return 1.0;
        }
        (calibration.prompt_tokens as f64 / baseline as f64).clamp(Self::MIN_SCALE, Self::MAX_SCALE)
    }

    /// Apply a scale factor to a raw estimate, rounding up.
    pub fn apply_scale(raw: usize, scale: f64) -> usize {
        if (scale - 1.0).abs() < f64::EPSILON {
            raw
        } else {
            (raw as f64 * scale).ceil() as usize
        }
    }

    /// Estimate tokens for `messages`, calibrated when possible.
    ///
    /// # Example
    /// ```
    /// use convoclaw::agent::tokens::{TokenCalibration, TokenEstimator};
    /// use convoclaw::session::Message;
    ///
    /// let history = vec![Message::user("abcdefgh")]; // 2 + 4 overhead
    /// assert_eq!(TokenEstimator::estimate(&history, None), 6);
    ///
    /// // Provider said the same request was twice as large
    /// let calibration = TokenCalibration::new(12, 1).with_estimate(6);
    /// assert_eq!(TokenEstimator::estimate(&history, Some(&calibration)), 12);
    /// ```
    pub fn estimate(messages: &[Message], calibration: Option<&TokenCalibration>) -> usize {
        let raw = Self::estimate_history(messages);
        Self::apply_scale(raw, Self::scale(messages, calibration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    #[test]
    fn test_estimate_text() {
        assert_eq!(TokenEstimator::estimate_text(""), 0);
        assert_eq!(TokenEstimator::estimate_text("abc"), 1);
        assert_eq!(TokenEstimator::estimate_text("abcd"), 1);
        assert_eq!(TokenEstimator::estimate_text("abcde"), 2);
        // Bytes, not chars: each CJK char is 3 bytes
        assert_eq!(TokenEstimator::estimate_text("你好"), 2);
    }

    #[test]
    fn test_empty_message_costs_overhead() {
        assert_eq!(TokenEstimator::estimate_message(&Message::user("")), 4);
        assert_eq!(TokenEstimator::estimate_history(&[]), 0);
    }

    #[test]
    fn test_tool_payload_counted() {
        let plain = Message::assistant("ok");
        let with_tools = Message::assistant_with_tools(
            "ok",
            vec![ToolCall::new("call_1", "web_search", r#"{"query":"rust"}"#)],
        );
        let result = Message::tool_result("call_1", "done");

        assert_eq!(TokenEstimator::estimate_message(&plain), 5);
        // "call_1" 2 + "web_search" 3 + args(16 bytes) 4
        assert_eq!(TokenEstimator::estimate_message(&with_tools), 5 + 2 + 3 + 4);
        assert_eq!(TokenEstimator::estimate_message(&result), 1 + 4 + 2);
    }

    #[test]
    fn test_scale_is_clamped() {
        let history = vec![Message::user("abcdefgh")];
        let huge = TokenCalibration::new(1_000, 1).with_estimate(6);
        let tiny = TokenCalibration::new(1, 1).with_estimate(6);

        assert_eq!(TokenEstimator::scale(&history, Some(&huge)), 2.0);
        assert_eq!(TokenEstimator::scale(&history, Some(&tiny)), 0.5);
        assert_eq!(TokenEstimator::estimate(&history, Some(&huge)), 12);
        assert_eq!(TokenEstimator::estimate(&history, Some(&tiny)), 3);
    }

    #[test]
    fn test_scale_without_recorded_estimate_uses_prefix() {
        let history = vec![
            Message::user("abcdefgh"),      // 6
            Message::assistant("abcdefgh"), // 6
            Message::user("abcdefgh"),
        ];
        // Provider measured the first two messages at 18 tokens vs 12 estimated
        let calibration = TokenCalibration::new(18, 2);
        let scale = TokenEstimator::scale(&history, Some(&calibration));
        assert!((scale - 1.5).abs() < 1e-9);
        assert_eq!(TokenEstimator::estimate(&history, Some(&calibration)), 27);
    }

    #[test]
    fn test_zero_baseline_means_no_scaling() {
        let history = vec![Message::user("abcdefgh")];
        let calibration = TokenCalibration::new(500, 0);
        assert_eq!(TokenEstimator::scale(&history, Some(&calibration)), 1.0);
        assert_eq!(TokenEstimator::estimate(&history, Some(&calibration)), 6);

        let no_usage = TokenCalibration::new(0, 1).with_estimate(6);
        assert_eq!(TokenEstimator::scale(&history, Some(&no_usage)), 1.0);
    }

    #[test]
    fn test_calibration_serde_skips_missing_estimate() {
        let json = serde_json::to_string(&TokenCalibration::new(10, 2)).unwrap();
        assert!(!json.contains("estimated_tokens"));
        let parsed: TokenCalibration =
            serde_json::from_str(r#"{"prompt_tokens":10,"message_count":2}"#).unwrap();
        assert_eq!(parsed, TokenCalibration::new(10, 2));
    }
}
