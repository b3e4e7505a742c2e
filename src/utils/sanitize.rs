//! Assistant response sanitization.
//!
//! Raw model output can leak protocol artifacts: garbled tool-call XML,
//! tool calls downgraded to plain text, reasoning blocks, echoed system
//! messages, repeated paragraphs and media placeholders. [`sanitize_response`]
//! runs a fixed pipeline of independent stages over the text before it is
//! shown to a user or persisted.
//!
//! The pipeline is total (any input yields a string, possibly empty) and
//! leaves already-clean text untouched apart from trimming.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Reply token a model uses to say "do not answer this message".
pub const SILENT_REPLY_TOKEN: &str = "NO_REPLY";

/// Substrings that mark a response as containing raw tool-call markup.
const GARBLED_TOOL_INDICATORS: &[&str] = &[
    "<tool_call",
    "</tool_call>",
    "<parameter name=",
    "<function=",
    "<invoke name=",
    "<function_calls>",
    "<minimax:tool_call>",
    "<|tool_call",
];

/// Line prefixes of tool calls/results rendered as plain text.
const DOWNGRADED_TOOL_PREFIXES: &[&str] = &["[Tool Call:", "[Tool Result", "[Historical context:"];

const SYSTEM_MESSAGE_PREFIX: &str = "[System Message]";

/// Reasoning tags stripped together with their content.
const REASONING_TAGS: &[&str] = &["think", "thinking", "thought", "antThinking"];

static TOOL_XML_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<\|tool_call[^>]*?\|>|</?(?:minimax:)?(?:tool_call|function_calls|invoke|parameter|function)\b[^>]*>|<function=[^>]*>",
    )
    .unwrap()
});

/// Per-tag (closed block, opening tag, closing tag) patterns. The regex crate
/// has no backreferences, so each tag gets its own set.
static REASONING_RES: Lazy<Vec<(Regex, Regex, Regex)>> = Lazy::new(|| {
    REASONING_TAGS
        .iter()
        .map(|tag| {
            (
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap(),
                Regex::new(&format!(r"(?i)<{tag}\b[^>]*>")).unwrap(),
                Regex::new(&format!(r"(?i)</{tag}\s*>")).unwrap(),
            )
        })
        .collect()
});

static FINAL_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?final\b[^>]*>").unwrap());

static PARAGRAPH_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n\s*").unwrap());

type Stage = fn(&str) -> String;

/// Pipeline stages in application order.
const STAGES: [(&str, Stage); 8] = [
    ("garbled_tool_xml", strip_garbled_tool_xml),
    ("downgraded_tool_text", strip_downgraded_tool_text),
    ("reasoning_tags", strip_reasoning_tags),
    ("final_tags", strip_final_tags),
    ("system_echo", strip_system_echo),
    ("duplicate_blocks", collapse_duplicate_blocks),
    ("media_paths", strip_media_paths),
    ("leading_blank_lines", strip_leading_blank_lines),
];

/// Clean raw assistant output.
///
/// # Examples
/// ```
/// use convoclaw::utils::sanitize::sanitize_response;
///
/// let raw = "<think>the user wants a greeting</think>\n\nHello!\n\nHello!";
/// assert_eq!(sanitize_response(raw), "Hello!");
///
/// // Garbled tool markup discards the whole response
/// assert_eq!(sanitize_response("Sure <tool_call>{\"name\":\"x\"}"), "");
/// ```
pub fn sanitize_response(raw: &str) -> String {
    let mut text = raw.to_string();
    for (name, stage) in STAGES {
        let next = stage(&text);
        if next != text {
            debug!(
                stage = name,
                before = text.len(),
                after = next.len(),
                "Sanitizer stage modified response"
            );
        }
        text = next;
        if text.is_empty() {
            break;
        }
    }
    text
}

/// Clean raw assistant output that may not be valid UTF-8.
pub fn sanitize_response_bytes(raw: &[u8]) -> String {
    sanitize_response(&String::from_utf8_lossy(raw))
}

/// Whether `text` asks for no reply to be sent.
///
/// Matches [`SILENT_REPLY_TOKEN`] on its own, or at the start or end of the
/// trimmed text when separated from the rest by a non-word character.
///
/// # Examples
/// ```
/// use convoclaw::utils::sanitize::is_silent_reply;
///
/// assert!(is_silent_reply("NO_REPLY"));
/// assert!(is_silent_reply("  NO_REPLY.  "));
/// assert!(is_silent_reply("Nothing to add. NO_REPLY"));
/// assert!(!is_silent_reply("NO_REPLYX"));
/// ```
pub fn is_silent_reply(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed == SILENT_REPLY_TOKEN {
        return true;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    if let Some(rest) = trimmed.strip_prefix(SILENT_REPLY_TOKEN) {
        if rest.chars().next().is_some_and(|c| !is_word(c)) {
            return true;
        }
    }
    if let Some(rest) = trimmed.strip_suffix(SILENT_REPLY_TOKEN) {
        if rest.chars().next_back().is_some_and(|c| !is_word(c)) {
            return true;
        }
    }
    false
}

/// Drop lines rejected by `keep`; returns the input unchanged if none were.
fn filter_lines(text: &str, mut keep: impl FnMut(&str) -> bool) -> String {
    let mut dropped = false;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let k = keep(line);
            dropped |= !k;
            k
        })
        .collect();
    if dropped {
        kept.join("\n")
    } else {
        text.to_string()
    }
}

/// Stage 1: any raw tool-call markup discards the response.
fn strip_garbled_tool_xml(text: &str) -> String {
    if !GARBLED_TOOL_INDICATORS.iter().any(|i| text.contains(i)) {
        return text.to_string();
    }
    let remainder = TOOL_XML_RE.replace_all(text, "");
    warn!(
        original_len = text.len(),
        discarded_remainder_len = remainder.trim().len(),
        "Discarding response containing garbled tool-call markup"
    );
    String::new()
}

fn is_tool_text_continuation(line: &str) -> bool {
    if line.starts_with(' ') || line.starts_with('\t') {
        return !line.trim().is_empty();
    }
    let trimmed = line.trim_start();
    trimmed.starts_with(['{', '}', '[', ']', '"'])
        || trimmed.starts_with("Arguments:")
        || trimmed.starts_with("Result:")
}

/// Stage 2: tool calls/results the model echoed back as plain text.
fn strip_downgraded_tool_text(text: &str) -> String {
    let mut in_block = false;
    filter_lines(text, |line| {
        let trimmed = line.trim_start();
        if DOWNGRADED_TOOL_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            in_block = true;
            return false;
        }
        if in_block && is_tool_text_continuation(line) {
            return false;
        }
        in_block = false;
        true
    })
}

/// Stage 3: reasoning blocks, including unterminated ones.
///
/// Paired blocks of every tag go first, so a stray tag of one kind inside a
/// block of another is removed with that block.
fn strip_reasoning_tags(text: &str) -> String {
    let mut out = text.to_string();
    loop {
        let before = out.len();
        for (block, _, _) in REASONING_RES.iter() {
            out = block.replace_all(&out, "").into_owned();
        }
        if out.len() == before {
            break;
        }
    }

    // Closing tag with nothing before it opened: the reasoning started
    // before the visible text did.
    let last_close = REASONING_RES
        .iter()
        .filter_map(|(_, _, close)| close.find_iter(&out).last().map(|m| m.end()))
        .max();
    if let Some(end) = last_close {
        out = out[end..].to_string();
    }
    let first_open = REASONING_RES
        .iter()
        .filter_map(|(_, open, _)| open.find(&out).map(|m| m.start()))
        .min();
    if let Some(start) = first_open {
        out.truncate(start);
    }
    out
}

/// Stage 4: `<final>` wrappers, keeping the content.
fn strip_final_tags(text: &str) -> String {
    FINAL_TAG_RE.replace_all(text, "").into_owned()
}

/// Stage 5: `[System Message]` blocks echoed into the reply.
fn strip_system_echo(text: &str) -> String {
    let mut in_block = false;
    filter_lines(text, |line| {
        if line.trim_start().starts_with(SYSTEM_MESSAGE_PREFIX) {
            in_block = true;
            return false;
        }
        if line.trim().is_empty() {
            in_block = false;
            return true;
        }
        !in_block
    })
}

/// Stage 6: consecutive identical paragraphs.
fn collapse_duplicate_blocks(text: &str) -> String {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK_RE.split(text).collect();
    let has_duplicates = paragraphs
        .windows(2)
        .any(|w| !w[0].trim().is_empty() && w[0].trim() == w[1].trim());
    if !has_duplicates {
        return text.to_string();
    }

    let mut kept: Vec<&str> = Vec::with_capacity(paragraphs.len());
    for paragraph in paragraphs {
        if kept.last().map(|prev| prev.trim()) == Some(paragraph.trim()) {
            continue;
        }
        kept.push(paragraph);
    }
    kept.join("\n\n")
}

/// Stage 7: media attachment paths and placeholders.
///
/// A removed line may have been all that separated two equal paragraphs,
/// so duplicates are collapsed again afterwards.
fn strip_media_paths(text: &str) -> String {
    let stripped = filter_lines(text, |line| {
        !(line.trim_start().starts_with("MEDIA:") || line.contains("<media:"))
    });
    if stripped == text {
        stripped
    } else {
        collapse_duplicate_blocks(&stripped)
    }
}

/// Stage 8: leading blank lines and surrounding whitespace.
fn strip_leading_blank_lines(text: &str) -> String {
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_unchanged() {
        let input = "Hello, world!\n\nThis is a normal reply.\n- item one\n- item two";
        assert_eq!(sanitize_response(input), input);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "<thinking>hmm</thinking>Answer\n\nAnswer\n\nMore",
            "[Tool Call: search]\nArguments: {\"q\": 1}\nDone.",
            "\n\n  <final>Result</final>  \n",
            "[System Message] reminder\nstill system\n\nReal reply\nMEDIA:/tmp/a.png",
            "A\n\nMEDIA:/tmp/x.png\n\nA",
            "Intro\n\nSame\n\n<media:image>\n\nSame\n\nEnd",
        ];
        for input in inputs {
            let once = sanitize_response(input);
            assert_eq!(sanitize_response(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_garbled_xml_discards_everything() {
        for indicator in GARBLED_TOOL_INDICATORS {
            let input = format!("Here is the answer.\n{}garbage", indicator);
            assert_eq!(sanitize_response(&input), "", "indicator {}", indicator);
        }
    }

    #[test]
    fn test_garbled_xml_with_full_block() {
        let input = "Let me check.\n<function_calls>\n<invoke name=\"read\">\n<parameter name=\"path\">/etc</parameter>\n</invoke>\n</function_calls>";
        assert_eq!(sanitize_response(input), "");
    }

    #[test]
    fn test_downgraded_tool_text_removed() {
        let input = "[Tool Call: web_search]\nArguments: {\n  \"query\": \"rust\"\n}\n[Tool Result for web_search]\n\"result text\"\nHere is what I found.";
        assert_eq!(sanitize_response(input), "Here is what I found.");
    }

    #[test]
    fn test_historical_context_removed() {
        let input = "[Historical context: earlier turns]\n  indented detail\nActual answer";
        assert_eq!(sanitize_response(input), "Actual answer");
    }

    #[test]
    fn test_reasoning_blocks_removed() {
        assert_eq!(sanitize_response("<think>plan</think>Hi"), "Hi");
        assert_eq!(sanitize_response("<THINKING>\nplan\n</THINKING>\nHi"), "Hi");
        assert_eq!(sanitize_response("A<thought>x</thought>B"), "AB");
        assert_eq!(
            sanitize_response("<antThinking>meta</antThinking>Reply"),
            "Reply"
        );
    }

    #[test]
    fn test_unclosed_reasoning_tag_drops_rest() {
        assert_eq!(sanitize_response("Answer first. <think>and then"), "Answer first.");
    }

    #[test]
    fn test_orphan_closing_tag_drops_prefix() {
        assert_eq!(sanitize_response("leaked reasoning</think>\nReal answer"), "Real answer");
    }

    #[test]
    fn test_think_does_not_match_thinking_prefix_only() {
        // `<think` must not treat `<thinking>` as an unclosed `<think>`
        assert_eq!(sanitize_response("<thinking>a</thinking>ok"), "ok");
    }

    #[test]
    fn test_stray_tag_inside_other_reasoning_block() {
        assert_eq!(sanitize_response("A <thinking>x <think> y</thinking> B"), "A  B");
        assert_eq!(sanitize_response("<think>a <thought> b</think>Visible"), "Visible");
    }

    #[test]
    fn test_mixed_unclosed_tags_cut_at_earliest() {
        assert_eq!(strip_reasoning_tags("Keep <thought>x <think>y"), "Keep ");
        assert_eq!(strip_reasoning_tags("a</think>b</thinking>Answer"), "Answer");
    }

    #[test]
    fn test_final_tags_keep_content() {
        assert_eq!(sanitize_response("<final>The answer is 4.</final>"), "The answer is 4.");
    }

    #[test]
    fn test_system_echo_removed() {
        let input = "[System Message] Heartbeat\nCheck tasks\n\nAll good here.";
        assert_eq!(sanitize_response(input), "All good here.");
    }

    #[test]
    fn test_duplicate_collapse() {
        assert_eq!(sanitize_response("A\n\nA\n\nB"), "A\n\nB");
        assert_eq!(sanitize_response("A\n\nB\n\nA"), "A\n\nB\n\nA");
        assert_eq!(collapse_duplicate_blocks("A\n\n  A  \n\nB"), "A\n\nB");
    }

    #[test]
    fn test_duplicate_collapse_crlf() {
        assert_eq!(sanitize_response("A\r\n\r\nA\r\n\r\nB"), "A\n\nB");
    }

    #[test]
    fn test_media_line_between_duplicates() {
        assert_eq!(sanitize_response("A\n\nMEDIA:/tmp/x.png\n\nA"), "A");
        assert_eq!(strip_media_paths("Pic\nMEDIA:/a.png\nPic"), "Pic\nPic");
    }

    #[test]
    fn test_no_duplicates_preserves_spacing() {
        let input = "A\n\n\n\nB";
        assert_eq!(collapse_duplicate_blocks(input), input);
    }

    #[test]
    fn test_media_lines_removed() {
        let input = "Here you go\nMEDIA:/tmp/photo.jpg\n<media:image>\nEnjoy";
        assert_eq!(sanitize_response(input), "Here you go\nEnjoy");
    }

    #[test]
    fn test_leading_blank_lines_removed() {
        assert_eq!(sanitize_response("\n\n\n  Hello  \n"), "Hello");
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(sanitize_response(""), "");
        assert_eq!(sanitize_response("   \n\t"), "");
    }

    #[test]
    fn test_bytes_lossy() {
        let bytes = b"Hello \xff world";
        let out = sanitize_response_bytes(bytes);
        assert!(out.starts_with("Hello"));
        assert!(out.ends_with("world"));
    }

    #[test]
    fn test_silent_reply() {
        assert!(is_silent_reply("NO_REPLY"));
        assert!(is_silent_reply("NO_REPLY."));
        assert!(is_silent_reply("\nNO_REPLY\n"));
        assert!(is_silent_reply("NO_REPLY - nothing to say"));
        assert!(is_silent_reply("ok then: NO_REPLY"));
        assert!(!is_silent_reply("NO_REPLYX"));
        assert!(!is_silent_reply("XNO_REPLY"));
        assert!(!is_silent_reply("say NO_REPLY_PLEASE"));
        assert!(!is_silent_reply(""));
        assert!(!is_silent_reply("Hello"));
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let names: Vec<&str> = STAGES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names.first(), Some(&"garbled_tool_xml"));
        assert_eq!(names.last(), Some(&"leading_blank_lines"));
        assert_eq!(names.len(), 8);
    }
}
