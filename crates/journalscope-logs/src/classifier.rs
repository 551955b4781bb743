use regex::Regex;
use std::sync::LazyLock;

use journalscope_types::{LogRecord, Severity};

use crate::plugin::SeverityOverride;

/// `short-iso` / `short-precise` timestamps: 2024-01-15T10:30:00+0100
static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?$")
        .unwrap()
});

/// Classic syslog `short` timestamps: Jan 15 10:30:00
static SYSLOG_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})(?:\s|$)").unwrap()
});

/// Keywords checked in order against the lowercased line; first hit wins
const SEVERITY_KEYWORDS: [(&str, Severity); 9] = [
    ("error", Severity::Err),
    ("err", Severity::Err),
    ("warning", Severity::Warning),
    ("warn", Severity::Warning),
    ("crit", Severity::Crit),
    ("alert", Severity::Alert),
    ("emerg", Severity::Emerg),
    ("debug", Severity::Debug),
    ("notice", Severity::Notice),
];

/// Turns raw journal lines into [`LogRecord`]s
///
/// Classification never fails. A line with no recognisable timestamp keeps
/// the whole text as its message, and a line with no severity keyword is
/// [`Severity::Info`]. Registered overrides are consulted before the keyword
/// heuristic, in registration order.
#[derive(Default)]
pub struct RecordClassifier {
    overrides: Vec<Box<dyn SeverityOverride>>,
}

impl RecordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a severity override
    pub fn register(&mut self, plugin: Box<dyn SeverityOverride>) {
        self.overrides.push(plugin);
    }

    /// Names of the registered overrides
    pub fn override_names(&self) -> Vec<&str> {
        self.overrides.iter().map(|o| o.name()).collect()
    }

    /// Classify one line (without its trailing newline)
    pub fn classify(&self, raw: &str) -> LogRecord {
        let mut record = classify(raw);
        if let Some(severity) = self.overrides.iter().find_map(|o| o.classify(raw)) {
            record.severity = severity;
        }
        record
    }
}

impl std::fmt::Debug for RecordClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordClassifier")
            .field("overrides", &self.override_names())
            .finish()
    }
}

/// Heuristic classification with no overrides
pub fn classify(raw: &str) -> LogRecord {
    let (timestamp, rest) = split_timestamp(raw);
    let message = if timestamp.is_empty() || rest.is_empty() {
        raw
    } else {
        rest
    };

    LogRecord::new(
        infer_severity(raw),
        timestamp.to_string(),
        message.to_string(),
        raw.to_string(),
    )
}

/// Best-effort severity from keywords in the line
pub fn infer_severity(raw: &str) -> Severity {
    let lower = raw.to_lowercase();
    SEVERITY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Info)
}

/// Split a leading timestamp off the line
///
/// Returns `("", raw)` when the line does not start with one.
pub fn split_timestamp(raw: &str) -> (&str, &str) {
    let trimmed = raw.trim_start();

    let (first, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    if ISO_TIMESTAMP.is_match(first) {
        return (first, rest.trim_start());
    }

    if let Some(caps) = SYSLOG_TIMESTAMP.captures(trimmed) {
        let ts = caps.get(1).map_or("", |m| m.as_str());
        return (ts, trimmed[ts.len()..].trim_start());
    }

    ("", raw)
}
