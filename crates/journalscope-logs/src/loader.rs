use std::sync::Arc;
use std::time::Duration;

use journalscope_types::{FilterState, LogRecord};

use crate::classifier::RecordClassifier;
use crate::command::{CommandLine, JournalCommand};
use crate::error::SourceError;

/// Wall-clock bound on a one-shot load
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the log source once and classifies its whole output
#[derive(Clone, Debug)]
pub struct BatchLoader {
    command: JournalCommand,
    classifier: Arc<RecordClassifier>,
    timeout: Duration,
}

impl BatchLoader {
    pub fn new(command: JournalCommand, classifier: Arc<RecordClassifier>) -> Self {
        Self {
            command,
            classifier,
            timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch up to the batch limit of records matching `filter`
    pub async fn load(&self, filter: &FilterState) -> Result<Vec<LogRecord>, SourceError> {
        let line = self.command.build(filter, false);
        self.load_command(&line).await
    }

    /// Run an arbitrary command line under the load contract
    ///
    /// Either every non-blank output line comes back classified, in order,
    /// or an error does. An empty output with a zero exit is `Ok(vec![])`.
    pub async fn load_command(&self, line: &CommandLine) -> Result<Vec<LogRecord>, SourceError> {
        tracing::debug!(command = %line, "loading logs");

        let child = line
            .to_command()
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::warn!(program = %line.program, error = %source, "failed to spawn log source");
                SourceError::Spawn {
                    program: line.program.clone(),
                    source,
                }
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "log source timed out");
                return Err(SourceError::Timeout {
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let err = SourceError::exit(output.status, &output.stderr);
            tracing::warn!("{}", err);
            return Err(err);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let records: Vec<LogRecord> = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| self.classifier.classify(l))
            .collect();

        tracing::debug!(count = records.len(), "loaded logs");
        Ok(records)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use journalscope_types::Severity;

    fn loader() -> BatchLoader {
        BatchLoader::new(JournalCommand::default(), Arc::new(RecordClassifier::new()))
    }

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_load_in_order() {
        let records = loader()
            .load_command(&sh(
                "printf '2024-01-01T10:00:00 a: disk error\\n\\n2024-01-01T10:00:01 b: ok\\n'",
            ))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, "2024-01-01T10:00:00");
        assert_eq!(records[0].message, "a: disk error");
        assert_eq!(records[0].severity, Severity::Err);
        assert_eq!(records[1].message, "b: ok");
        assert_eq!(records[1].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_kept() {
        let records = loader()
            .load_command(&sh("printf 'a\\nno newline'"))
            .await
            .unwrap();

        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["a", "no newline"]);
    }

    #[tokio::test]
    async fn test_empty_output_is_ok() {
        let records = loader().load_command(&sh("exit 0")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let result = loader()
            .load_command(&sh("echo 'some output'; echo 'No journal files' >&2; exit 3"))
            .await;

        match result {
            Err(SourceError::Exit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "No journal files");
            }
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let line = CommandLine::new("/nonexistent/journalscope-test-binary", Vec::<String>::new());
        let result = loader().load_command(&line).await;
        assert!(matches!(result, Err(SourceError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_timeout() {
        let loader = loader().with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let result = loader.load_command(&sh("exec sleep 5")).await;
        assert!(matches!(result, Err(SourceError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_load_builds_from_filter() {
        // echo prints the journalctl arguments back as a single line
        let loader = BatchLoader::new(JournalCommand::new("echo"), Arc::new(RecordClassifier::new()));
        let filter = FilterState {
            unit: Some("sshd".to_string()),
            ..Default::default()
        };
        let records = loader.load(&filter).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw, "--no-pager -o short-iso -u sshd -n 1000");
    }
}
