//! Sanitize command handler.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};

use convoclaw::utils::sanitize::{is_silent_reply, sanitize_response_bytes};

/// Clean stdin the way replies are cleaned before delivery.
///
/// Prints nothing for silent replies or when nothing survives.
pub(crate) fn cmd_sanitize() -> Result<()> {
    let mut raw = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut raw)
        .context("Failed to read stdin")?;

    if let Some(cleaned) = render(&raw) {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", cleaned).context("Failed to write stdout")?;
    }
    Ok(())
}

/// Text to print for `raw`, if any.
fn render(raw: &[u8]) -> Option<String> {
    if is_silent_reply(String::from_utf8_lossy(raw).trim()) {
        return None;
    }
    let cleaned = sanitize_response_bytes(raw);
    if cleaned.is_empty() || is_silent_reply(&cleaned) {
        None
    } else {
        Some(cleaned)
    }
}
