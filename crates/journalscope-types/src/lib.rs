//! Shared types for journalscope
//!
//! This crate contains data structures used across multiple journalscope crates.

use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Severity
// ============================================================================

/// Journal priority, 0 (most severe) through 7 (least severe)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "emergency")]
    Emerg = 0,
    Alert = 1,
    #[serde(alias = "critical")]
    Crit = 2,
    #[serde(alias = "error")]
    Err = 3,
    #[serde(alias = "warn")]
    Warning = 4,
    Notice = 5,
    #[default]
    Info = 6,
    Debug = 7,
}

impl Severity {
    /// All levels, most severe first
    pub const ALL: [Severity; 8] = [
        Self::Emerg,
        Self::Alert,
        Self::Crit,
        Self::Err,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// Numeric priority as understood by `journalctl -p`
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Journal name of this level
    pub fn name(&self) -> &'static str {
        match self {
            Self::Emerg => "emerg",
            Self::Alert => "alert",
            Self::Crit => "crit",
            Self::Err => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerg => "EMG",
            Self::Alert => "ALR",
            Self::Crit => "CRT",
            Self::Err => "ERR",
            Self::Warning => "WRN",
            Self::Notice => "NTC",
            Self::Info => "INF",
            Self::Debug => "DBG",
        }
    }

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Emerg | Self::Alert | Self::Crit => Color::Magenta,
            Self::Err => Color::Red,
            Self::Warning => Color::Yellow,
            Self::Notice => Color::Blue,
            Self::Info => Color::Green,
            Self::Debug => Color::DarkGray,
        }
    }

    /// Whether this level is at least as severe as `threshold`
    pub fn at_least(&self, threshold: Severity) -> bool {
        self.as_u8() <= threshold.as_u8()
    }

    /// Cycle to the next, less severe threshold (wrapping)
    pub fn next(&self) -> Self {
        Self::ALL[(self.as_u8() as usize + 1) % Self::ALL.len()]
    }
}

impl TryFrom<u8> for Severity {
    type Error = ParseSeverityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ParseSeverityError(value.to_string()))
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, ParseSeverityError> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Severity::try_from(n);
        }
        match s.to_lowercase().as_str() {
            "emerg" | "emergency" => Ok(Severity::Emerg),
            "alert" => Ok(Severity::Alert),
            "crit" | "critical" => Ok(Severity::Crit),
            "err" | "error" => Ok(Severity::Err),
            "warning" | "warn" => Ok(Severity::Warning),
            "notice" => Ok(Severity::Notice),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a severity name or number is not recognised
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseSeverityError(pub String);

impl fmt::Display for ParseSeverityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown severity '{}' (expected 0-7 or emerg, alert, crit, err, warning, notice, info, debug)",
            self.0
        )
    }
}

impl std::error::Error for ParseSeverityError {}

// ============================================================================
// Filter Types
// ============================================================================

/// Filter settings owned by the consumer
///
/// Unit, severity and since shape the fetch; only `search_text` is applied
/// locally to records already in view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    /// Restrict to one systemd unit / source
    pub unit: Option<String>,

    /// Only this level and more severe ones
    #[serde(alias = "priority")]
    pub min_severity: Option<Severity>,

    /// Free-form time expression passed through to the source
    pub since: Option<String>,

    /// Local case-insensitive text search over messages
    #[serde(skip)]
    pub search_text: String,
}

impl FilterState {
    /// Unit name, if set to something other than whitespace
    pub fn unit(&self) -> Option<&str> {
        non_blank(self.unit.as_deref())
    }

    /// Since expression, if set to something other than whitespace
    pub fn since(&self) -> Option<&str> {
        non_blank(self.since.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Log Types
// ============================================================================

/// A single classified log line
///
/// Severity and timestamp are best-effort guesses from the text, not values
/// reported by the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Inferred severity
    pub severity: Severity,

    /// Leading timestamp text (empty when none was recognised)
    pub timestamp: String,

    /// Line content after the timestamp
    pub message: String,

    /// Original raw line
    pub raw: String,
}

impl LogRecord {
    pub fn new(severity: Severity, timestamp: String, message: String, raw: String) -> Self {
        Self {
            severity,
            timestamp,
            message,
            raw,
        }
    }
}

/// Counts per severity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    counts: [usize; 8],
}

impl LevelCounts {
    pub fn add(&mut self, severity: Severity) {
        self.counts[severity.as_u8() as usize] += 1;
    }

    pub fn get(&self, severity: Severity) -> usize {
        self.counts[severity.as_u8() as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
