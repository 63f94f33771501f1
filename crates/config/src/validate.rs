//! Configuration validation.
//!
//! Checks syntax, unknown or misspelled keys, and values that would make the
//! relay misbehave (zero windows, zero concurrency, inverted thresholds).

use std::path::{Path, PathBuf};

use crate::{env_subst::unresolved_placeholders, schema::HublinkConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "value", "env"
    pub category: &'static str,
    /// Dotted path, e.g. "antispam.window_ms"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Section name and the keys it accepts.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("database", &["url", "max_connections"]),
    ("cache", &["connection_ttl_secs"]),
    ("relay", &[
        "fanout_concurrency",
        "delivery_timeout_ms",
        "message_ttl_secs",
        "max_reaction_kinds",
        "delete_marker_secs",
        "reply_preview_chars",
        "branding_name",
    ]),
    ("antispam", &[
        "max_messages",
        "window_ms",
        "strike_decay_secs",
        "strike_threshold",
        "auto_blacklist_secs",
        "repeated_char_threshold",
    ]),
    ("blockwords", &["max_rules_per_hub", "auto_blacklist_secs"]),
    ("content", &["profanity", "invite_hosts", "hidden_link_text"]),
    ("staff", &["user_ids"]),
    ("metrics", &["enabled", "listen"]),
];

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

fn unknown_field(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
        None => "unknown field".to_string(),
    };
    Diagnostic::new(Severity::Error, "unknown-field", path, message)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered one when
/// `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file)
    else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            match config_path.extension().and_then(|e| e.to_str()) {
                Some("toml") | None => validate_toml_str(&content),
                _ => validate_parsed(crate::loader::load_config(&config_path)),
            }
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// YAML and JSON get type and value checks only.
fn validate_parsed(parsed: crate::Result<HublinkConfig>) -> ValidationResult {
    let mut diagnostics = Vec::new();
    match parsed {
        Ok(config) => check_values(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            e.to_string(),
        )),
    }
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Validate an already env-substituted TOML string.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    if let Some(table) = value.as_table() {
        check_unknown_fields(table, &mut diagnostics);
    }

    for name in unresolved_placeholders(toml_str) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "env",
            "",
            format!("environment variable {name} is not set"),
        ));
    }

    match toml::from_str::<HublinkConfig>(toml_str) {
        Ok(config) => check_values(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(table: &toml::Table, diagnostics: &mut Vec<Diagnostic>) {
    let sections: Vec<&str> = KNOWN_KEYS.iter().map(|(s, _)| *s).collect();
    for (section, body) in table {
        let Some((_, keys)) = KNOWN_KEYS.iter().find(|(s, _)| s == section) else {
            diagnostics.push(unknown_field(section.clone(), section, &sections));
            continue;
        };
        let Some(body) = body.as_table() else {
            continue;
        };
        for key in body.keys() {
            if !keys.contains(&key.as_str()) {
                diagnostics.push(unknown_field(format!("{section}.{key}"), key, keys));
            }
        }
    }
}

fn check_values(config: &HublinkConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut error = |path: &str, message: &str| {
        diagnostics.push(Diagnostic::new(Severity::Error, "value", path, message));
    };

    let url = &config.database.url;
    if !url.starts_with("sqlite:") {
        error(
            "database.url",
            "only sqlite: database URLs are supported",
        );
    }
    if config.database.max_connections == 0 {
        error("database.max_connections", "must be at least 1");
    }
    if config.relay.fanout_concurrency == 0 {
        error("relay.fanout_concurrency", "must be at least 1");
    }
    if config.relay.delivery_timeout_ms == 0 {
        error("relay.delivery_timeout_ms", "must be greater than zero");
    }
    if config.relay.message_ttl_secs == 0 {
        error("relay.message_ttl_secs", "must be greater than zero");
    }
    if config.relay.max_reaction_kinds == 0 {
        error("relay.max_reaction_kinds", "must be at least 1");
    }
    if config.antispam.window_ms == 0 {
        error("antispam.window_ms", "must be greater than zero");
    }
    if config.antispam.max_messages < 2 {
        error("antispam.max_messages", "needs at least 2 timestamps to form a window");
    }
    if config.antispam.strike_threshold == 0 {
        error("antispam.strike_threshold", "must be at least 1");
    }

    if config.antispam.strike_decay_secs * 1000 < config.antispam.window_ms {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "antispam.strike_decay_secs",
            "strikes decay faster than the spam window, the auto-blacklist threshold may never be reached",
        ));
    }
    if config.cache.connection_ttl_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "cache.connection_ttl_secs",
            "a zero TTL disables the connection cache",
        ));
    }
    if config.blockwords.max_rules_per_hub == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "blockwords.max_rules_per_hub",
            "block-word rules cannot be created",
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn paths(result: &ValidationResult, severity: Severity) -> Vec<String> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.path.clone())
            .collect()
    }

    #[test]
    fn levenshtein_edits() {
        assert_eq!(levenshtein("relay", "relay"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("antispam", "antispan"), 1);
        assert_eq!(levenshtein("window_ms", "windw_ms"), 1);
    }

    #[test]
    fn empty_config_is_clean() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_short_circuits() {
        let result = validate_toml_str("[relay\nfanout = ");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn misspelled_key_gets_suggestion() {
        let result = validate_toml_str("[antispam]\nwindow_mss = 100\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "antispam.window_mss");
        assert!(diag.message.contains("window_ms"));
    }

    #[test]
    fn unknown_section_is_error() {
        let result = validate_toml_str("[relays]\nfanout_concurrency = 1\n");
        assert!(result.has_errors());
        assert!(result.diagnostics[0].message.contains("relay"));
    }

    #[test]
    fn zero_values_are_errors() {
        let result = validate_toml_str(
            "[relay]\nfanout_concurrency = 0\n[antispam]\nwindow_ms = 0\nstrike_threshold = 0\n",
        );
        let errors = paths(&result, Severity::Error);
        assert!(errors.contains(&"relay.fanout_concurrency".to_string()));
        assert!(errors.contains(&"antispam.window_ms".to_string()));
        assert!(errors.contains(&"antispam.strike_threshold".to_string()));
    }

    #[test]
    fn non_sqlite_database_is_error() {
        let result = validate_toml_str("[database]\nurl = \"postgres://db\"\n");
        assert_eq!(paths(&result, Severity::Error), vec!["database.url".to_string()]);
    }

    #[test]
    fn short_strike_decay_warns() {
        let result = validate_toml_str("[antispam]\nstrike_decay_secs = 1\nwindow_ms = 5000\n");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn unresolved_env_var_warns() {
        let result = validate_toml_str("[database]\nurl = \"${HUBLINK_NEVER_SET_FOR_TESTS}\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "env" && d.message.contains("HUBLINK_NEVER_SET_FOR_TESTS"))
        );
    }

    #[test]
    fn validates_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hublink.yaml");
        std::fs::write(&path, "relay:\n  max_reaction_kinds: 0\n").unwrap();

        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(
            paths(&result, Severity::Error),
            vec!["relay.max_reaction_kinds".to_string()]
        );
    }
}
