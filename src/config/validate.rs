//! Configuration validation with unknown field detection.

use serde_json::{Map, Value};

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["agents", "compaction", "logging"];

const KNOWN_AGENTS: &[&str] = &["defaults"];

const KNOWN_AGENTS_DEFAULTS: &[&str] = &[
    "model",
    "max_tokens",
    "temperature",
    "context_window",
    "max_history_turns",
    "agent_timeout_secs",
    "system_prompt",
];

const KNOWN_COMPACTION: &[&str] = &[
    "enabled",
    "history_share",
    "min_messages",
    "keep_last_messages",
    "prune_min_messages",
    "summary_max_tokens",
    "timeout_secs",
];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Push an error for every key of `obj` not in `known`. Returns whether any was found.
fn check_keys(
    obj: &Map<String, Value>,
    prefix: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let mut found = false;
    for key in obj.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        found = true;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}': {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, &path, message));
    }
    found
}

fn section<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(|v| v.as_object())
}

/// Validate a raw JSON config value: unknown fields, value ranges and
/// settings that make compaction ineffective.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        ));
        return diagnostics;
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, "", KNOWN_TOP_LEVEL, &mut diagnostics);
    if let Some(agents) = section(obj, "agents") {
        has_unknown |= check_keys(agents, "agents", KNOWN_AGENTS, &mut diagnostics);
        if let Some(defaults) = section(agents, "defaults") {
            has_unknown |= check_keys(
                defaults,
                "agents.defaults",
                KNOWN_AGENTS_DEFAULTS,
                &mut diagnostics,
            );
        }
    }
    if let Some(compaction) = section(obj, "compaction") {
        has_unknown |= check_keys(compaction, "compaction", KNOWN_COMPACTION, &mut diagnostics);
    }
    if let Some(logging) = section(obj, "logging") {
        has_unknown |= check_keys(logging, "logging", KNOWN_LOGGING, &mut diagnostics);
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    let config: Config = match serde_json::from_value(raw.clone()) {
        Ok(config) => config,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                format!("Invalid value: {}", e),
            ));
            return diagnostics;
        }
    };

    if let Err(e) = config.validate() {
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, "", e.to_string()));
    }

    let compaction = &config.compaction;
    if compaction.keep_last_messages >= compaction.min_messages {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "compaction.keep_last_messages",
            format!(
                "Not below min_messages ({}); compaction will never shorten history",
                compaction.min_messages
            ),
        ));
    }
    if !compaction.enabled {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "compaction.enabled",
            "Disabled; history grows until pruning drops it from requests",
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("hello", "helo"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert!(levenshtein("hello", "world") > 3);
    }

    #[test]
    fn test_suggest_field() {
        let result = suggest_field("compacton", KNOWN_TOP_LEVEL).unwrap();
        assert!(result.contains("compaction"));
        assert!(suggest_field("xyzabc", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let raw = json!({
            "agents": {"defaults": {"model": "gpt-4o", "context_window": 128000}},
            "compaction": {"min_messages": 40, "keep_last_messages": 6},
            "logging": {"format": "json"}
        });
        let diags = validate_config(&raw);
        assert!(errors(&diags).is_empty(), "{:?}", diags);
        assert!(diags.iter().any(|d| d.message == "All fields recognized"));
    }

    #[test]
    fn test_validate_unknown_nested_field() {
        let raw = json!({"compaction": {"keep_last": 4}});
        let diags = validate_config(&raw);
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "compaction.keep_last");
    }

    #[test]
    fn test_validate_unknown_top_level() {
        let diags = validate_config(&json!({"agentsss": {}}));
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("did you mean 'agents'?"));
    }

    #[test]
    fn test_validate_out_of_range_share() {
        let diags = validate_config(&json!({"compaction": {"history_share": 1.5}}));
        assert!(errors(&diags)
            .iter()
            .any(|d| d.message.contains("history_share")));
    }

    #[test]
    fn test_validate_wrong_type() {
        let diags = validate_config(&json!({"compaction": {"min_messages": "many"}}));
        assert!(errors(&diags)
            .iter()
            .any(|d| d.message.starts_with("Invalid value")));
    }

    #[test]
    fn test_validate_keep_not_below_min_warns() {
        let raw = json!({"compaction": {"min_messages": 4, "keep_last_messages": 4}});
        let diags = validate_config(&raw);
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Warn && d.path == "compaction.keep_last_messages"
        }));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error && d.message.contains("must be a JSON object")
        }));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticLevel::Warn, "compaction.enabled", "Disabled");
        assert_eq!(d.to_string(), "[WARN] compaction.enabled: Disabled");
    }
}
