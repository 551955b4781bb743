//! Log ingestion for journalscope
//!
//! This crate builds log-source command lines, runs them as one-shot loads or
//! long-running follow sessions, classifies each line, and keeps the filtered
//! view handed to the display layer.

mod classifier;
mod command;
mod error;
mod filter;
mod loader;
mod plugin;
mod stream;
mod view;

pub use classifier::{RecordClassifier, classify, infer_severity, split_timestamp};
pub use command::{
    CommandLine, DEFAULT_BATCH_LIMIT, DEFAULT_OUTPUT_FORMAT, DEFAULT_PROGRAM, JournalCommand,
};
pub use error::{SessionNotice, SourceError};
pub use filter::{SearchFilter, matches};
pub use loader::{BatchLoader, DEFAULT_LOAD_TIMEOUT};
pub use plugin::{PluginError, RulePlugin, SeverityOverride, load_rule_plugins};
pub use stream::{FollowPhase, FollowSession, RecordSink};
pub use view::ViewState;

// Re-export types used in our public API
pub use journalscope_types::{FilterState, LevelCounts, LogRecord, Severity};
