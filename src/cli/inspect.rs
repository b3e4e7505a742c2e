//! Inspect command handler.

use std::path::Path;

use anyhow::{Context, Result};

use convoclaw::agent::compaction::{needs_compaction, threshold_tokens};
use convoclaw::agent::{AssemblyConfig, ContextBuilder, TokenEstimator};
use convoclaw::config::Config;
use convoclaw::session::Session;
use convoclaw::utils::string::{preview, single_line};

use super::common::expand_tilde;

const PREVIEW_CHARS: usize = 100;

/// Print the request a session would send next, its token estimate and
/// whether it is due for compaction.
pub(crate) fn cmd_inspect(config: &Config, path: &Path, message: &str, full: bool) -> Result<()> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    let session: Session = serde_json::from_str(&content)
        .with_context(|| format!("Invalid session file {}", path.display()))?;

    print!("{}", render(config, &session, message, full));
    Ok(())
}

fn render(config: &Config, session: &Session, message: &str, full: bool) -> String {
    let window = config.agents.defaults.context_window;
    let calibration = session.calibration.as_ref();
    let assembly = AssemblyConfig::from_config(config).with_calibration(session.calibration.clone());
    let request = ContextBuilder::from_config(config).build_messages(
        &session.messages,
        session.summary.as_deref(),
        message,
        &assembly,
    );

    let mut out = String::new();
    out.push_str(&format!(
        "Session: {} ({} messages, {} compactions)\n",
        session.key,
        session.messages.len(),
        session.compaction_count
    ));
    match &session.summary {
        Some(summary) => out.push_str(&format!("Summary: {} chars\n", summary.chars().count())),
        None => out.push_str("Summary: none\n"),
    }
    match calibration {
        Some(c) => out.push_str(&format!(
            "Calibration: {} prompt tokens over {} messages (scale {:.2})\n",
            c.prompt_tokens,
            c.message_count,
            TokenEstimator::scale(&session.messages, calibration)
        )),
        None => out.push_str("Calibration: none\n"),
    }

    out.push_str(&format!("\nRequest ({} messages):\n", request.len()));
    for msg in &request {
        let text = if full {
            msg.content.clone()
        } else {
            preview(&single_line(&msg.content), PREVIEW_CHARS)
        };
        out.push_str(&format!("  [{}] {}\n", msg.role, text));
        for call in msg.tool_calls.iter().flatten() {
            out.push_str(&format!("      -> {} ({})\n", call.name, call.id));
        }
    }

    let estimate = TokenEstimator::estimate(&session.messages, calibration);
    let threshold = threshold_tokens(&config.compaction, window);
    out.push_str(&format!(
        "\nHistory estimate: {} tokens (window {}, compaction threshold {:.0})\n",
        estimate, window, threshold
    ));
    let verdict = if !config.compaction.enabled {
        "disabled".to_string()
    } else if needs_compaction(&session.messages, calibration, &config.compaction, window) {
        format!(
            "due (would summarize {} messages, keep {})",
            session
                .messages
                .len()
                .saturating_sub(config.compaction.keep_last_messages),
            config.compaction.keep_last_messages
        )
    } else {
        format!(
            "not needed (needs > {} messages and > {:.0} tokens)",
            config.compaction.min_messages, threshold
        )
    };
    out.push_str(&format!("Compaction: {}\n", verdict));
    out
}
