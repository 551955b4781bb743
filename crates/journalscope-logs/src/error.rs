use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Stderr kept in error reports is capped at this many bytes
pub(crate) const STDERR_LIMIT: usize = 4096;

/// Failures of the log-source subprocess
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("log source did not finish within {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("log source exited with {}{}", format_code(.code), format_stderr(.stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a follow session is already running")]
    AlreadyRunning,
}

impl SourceError {
    pub(crate) fn exit(status: ExitStatus, stderr: &[u8]) -> Self {
        Self::Exit {
            code: status.code(),
            stderr: trim_stderr(stderr),
        }
    }
}

/// Asynchronous end of a follow session, reported once
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    /// Output closed without a stop request
    Ended { code: Option<i32>, stderr: String },

    /// Reading the output failed
    ReadFailed { message: String },
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ended { code, stderr } => write!(
                f,
                "follow stopped: log source exited with {}{}",
                format_code(code),
                format_stderr(stderr)
            ),
            Self::ReadFailed { message } => write!(f, "follow stopped: {}", message),
        }
    }
}

fn format_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Lossy-decode and cap stderr for display
pub(crate) fn trim_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_message() {
        let err = SourceError::Exit {
            code: Some(1),
            stderr: "Failed to add filter for units: No data available".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "log source exited with status 1: Failed to add filter for units: No data available"
        );
    }

    #[test]
    fn test_notice_message() {
        let notice = SessionNotice::Ended {
            code: None,
            stderr: String::new(),
        };
        assert_eq!(notice.to_string(), "follow stopped: log source exited with a signal");
    }

    #[test]
    fn test_trim_stderr() {
        assert_eq!(trim_stderr(b"  oops \n"), "oops");
        let long = "é".repeat(STDERR_LIMIT);
        let trimmed = trim_stderr(long.as_bytes());
        assert!(trimmed.len() <= STDERR_LIMIT + '…'.len_utf8());
        assert!(trimmed.ends_with('…'));
    }
}
