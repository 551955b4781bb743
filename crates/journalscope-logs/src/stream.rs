use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use journalscope_types::{FilterState, LogRecord};

use crate::classifier::RecordClassifier;
use crate::command::{CommandLine, JournalCommand};
use crate::error::{STDERR_LIMIT, SessionNotice, SourceError, trim_stderr};

/// How long a source that closed its output gets to exit on its own
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of a [`FollowSession`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Where a follow session delivers its output
#[derive(Clone, Debug)]
pub struct RecordSink {
    /// One record per line, in emission order
    pub records: mpsc::UnboundedSender<LogRecord>,

    /// At most one notice per session, when the source ends on its own
    pub notices: mpsc::UnboundedSender<SessionNotice>,
}

impl RecordSink {
    /// Create a sink and the receivers for both of its channels
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<LogRecord>,
        mpsc::UnboundedReceiver<SessionNotice>,
    ) {
        let (records, record_rx) = mpsc::unbounded_channel();
        let (notices, notice_rx) = mpsc::unbounded_channel();
        (Self { records, notices }, record_rx, notice_rx)
    }
}

/// State shared between a session and its reader task
struct Shared {
    /// The owned subprocess; only this session and its reader touch it
    child: Mutex<Option<Child>>,

    /// Cleared by `stop()`, checked at every line boundary
    running: AtomicBool,

    phase: watch::Sender<FollowPhase>,
}

/// Streams a long-running log source into a [`RecordSink`]
///
/// At most one subprocess is owned at a time. [`FollowSession::stop`] never
/// waits: it clears the running flag, kills the process and returns, and
/// the reader task reaps the process and moves the session back to
/// [`FollowPhase::Idle`]. A line already in hand when the stop lands may
/// still be delivered; nothing is delivered once the reader has exited.
///
/// Starting a session spawns a task, so it must happen inside a tokio
/// runtime.
pub struct FollowSession {
    command: JournalCommand,
    classifier: Arc<RecordClassifier>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FollowSession {
    pub fn new(command: JournalCommand, classifier: Arc<RecordClassifier>) -> Self {
        let (phase, _) = watch::channel(FollowPhase::Idle);
        Self {
            command,
            classifier,
            shared: Arc::new(Shared {
                child: Mutex::new(None),
                running: AtomicBool::new(false),
                phase,
            }),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn phase(&self) -> FollowPhase {
        *self.shared.phase.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<FollowPhase> {
        self.shared.phase.subscribe()
    }

    /// Follow the source using `filter`
    pub fn start(&mut self, filter: &FilterState, sink: RecordSink) -> Result<(), SourceError> {
        let line = self.command.build(filter, true);
        self.start_command(line, sink)
    }

    /// Follow an arbitrary command line
    pub fn start_command(&mut self, line: CommandLine, sink: RecordSink) -> Result<(), SourceError> {
        let claimed = self.shared.phase.send_if_modified(|phase| {
            if *phase == FollowPhase::Idle {
                *phase = FollowPhase::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(SourceError::AlreadyRunning);
        }

        tracing::debug!(command = %line, "starting follow");

        let mut child = match line.to_command().kill_on_drop(true).spawn() {
            Ok(child) => child,
            Err(source) => {
                tracing::warn!(program = %line.program, error = %source, "failed to spawn log source");
                self.shared.phase.send_replace(FollowPhase::Idle);
                return Err(SourceError::Spawn {
                    program: line.program,
                    source,
                });
            }
        };

        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            self.shared.phase.send_replace(FollowPhase::Idle);
            return Err(SourceError::Io(std::io::Error::other(
                "log source stdout was not captured",
            )));
        };
        let stderr = child.stderr.take();

        self.cancel = CancellationToken::new();
        self.shared.running.store(true, Ordering::SeqCst);
        *self.shared.child.lock() = Some(child);
        self.shared.phase.send_replace(FollowPhase::Running);

        tracing::info!(pid = ?self.pid(), "follow started");

        self.task = Some(tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            self.cancel.clone(),
            Arc::clone(&self.classifier),
            stdout,
            stderr,
            sink,
        )));

        Ok(())
    }

    /// Request the session to stop; returns without waiting for the reader
    pub fn stop(&mut self) {
        let stopping = self.shared.phase.send_if_modified(|phase| {
            if matches!(*phase, FollowPhase::Starting | FollowPhase::Running) {
                *phase = FollowPhase::Stopping;
                true
            } else {
                false
            }
        });
        if !stopping {
            return;
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(child) = self.shared.child.lock().as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "log source already gone");
            }
        }
        tracing::info!("follow stop requested");
    }

    /// Wait until the reader has exited and the session is idle again
    pub async fn wait_idle(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            // The reader never got to reset the phase
            tracing::error!(error = %e, "follow reader failed");
            self.shared.child.lock().take();
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.phase.send_replace(FollowPhase::Idle);
        }
    }

    /// Process id of the owned subprocess, if one is alive
    pub fn pid(&self) -> Option<u32> {
        self.shared.child.lock().as_ref().and_then(Child::id)
    }
}

impl Drop for FollowSession {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Outcome {
    Cancelled,
    SinkClosed,
    Eof,
    ReadFailed(String),
}

async fn read_loop(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    classifier: Arc<RecordClassifier>,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    sink: RecordSink,
) {
    let stderr_task = stderr.map(|s| tokio::spawn(drain_stderr(s)));
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut delivered: u64 = 0;

    let outcome = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break Outcome::Cancelled,

            result = reader.read_until(b'\n', &mut buf) => {
                match result {
                    Ok(0) => break Outcome::Eof,
                    Ok(_) => {
                        if !shared.running.load(Ordering::SeqCst) {
                            break Outcome::Cancelled;
                        }
                        let line = decode_line(&buf);
                        let record = (!line.trim().is_empty()).then(|| classifier.classify(&line));
                        buf.clear();
                        let Some(record) = record else {
                            continue;
                        };

                        if sink.records.send(record).is_err() {
                            // Consumer went away
                            break Outcome::SinkClosed;
                        }
                        delivered += 1;
                    }
                    Err(e) => break Outcome::ReadFailed(e.to_string()),
                }
            }
        }
    };

    let child = shared.child.lock().take();
    let code = match child {
        Some(child) => reap(child, matches!(outcome, Outcome::Eof)).await,
        None => None,
    };

    // Only an end the consumer did not ask for is worth a notice
    let unrequested = shared.running.swap(false, Ordering::SeqCst);
    let notice = match outcome {
        Outcome::Eof if unrequested => {
            let stderr = match stderr_task {
                Some(task) => tokio::time::timeout(EXIT_GRACE, task)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            Some(SessionNotice::Ended {
                code,
                stderr: trim_stderr(&stderr),
            })
        }
        Outcome::ReadFailed(message) if unrequested => Some(SessionNotice::ReadFailed { message }),
        _ => {
            if let Some(task) = stderr_task {
                task.abort();
            }
            None
        }
    };

    if let Some(notice) = notice {
        tracing::warn!("{}", notice);
        let _ = sink.notices.send(notice);
    }

    tracing::info!(delivered, "follow ended");
    shared.phase.send_replace(FollowPhase::Idle);
}

/// One line without its terminator; invalid UTF-8 is replaced, not rejected
fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Wait for the child, killing it unless it already closed its output
async fn reap(mut child: Child, closed_output: bool) -> Option<i32> {
    if closed_output {
        if let Ok(status) = tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            return status.ok().and_then(|s| s.code());
        }
    }
    let _ = child.start_kill();
    child.wait().await.ok().and_then(|s| s.code())
}

/// Read stderr to the end so the source never blocks on it, keeping the head
async fn drain_stderr(mut stderr: ChildStderr) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = STDERR_LIMIT.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use journalscope_types::Severity;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn session() -> FollowSession {
        FollowSession::new(JournalCommand::default(), Arc::new(RecordClassifier::new()))
    }

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh", ["-c", script])
    }

    async fn wait_idle(session: &mut FollowSession) {
        timeout(WAIT, session.wait_idle())
            .await
            .expect("session did not return to idle");
    }

    #[tokio::test]
    async fn test_streams_in_order_then_reports_end() {
        let mut session = session();
        let (sink, mut records, mut notices) = RecordSink::channel();

        session
            .start_command(sh("printf 'one\\n\\ntwo error\\nthree\\n'"), sink)
            .unwrap();

        let mut messages = Vec::new();
        while let Some(record) = timeout(WAIT, records.recv()).await.unwrap() {
            messages.push((record.message, record.severity));
        }
        assert_eq!(
            messages,
            [
                ("one".to_string(), Severity::Info),
                ("two error".to_string(), Severity::Err),
                ("three".to_string(), Severity::Info),
            ]
        );

        wait_idle(&mut session).await;
        assert_eq!(session.phase(), FollowPhase::Idle);
        assert_eq!(
            timeout(WAIT, notices.recv()).await.unwrap(),
            Some(SessionNotice::Ended {
                code: Some(0),
                stderr: String::new()
            })
        );
        // Exactly one notice
        assert_eq!(timeout(WAIT, notices.recv()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crash_is_reported_with_stderr() {
        let mut session = session();
        let (sink, mut records, mut notices) = RecordSink::channel();

        session
            .start_command(sh("echo partial; echo 'source died' >&2; exit 2"), sink)
            .unwrap();

        let first = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(first.message, "partial");

        let notice = timeout(WAIT, notices.recv()).await.unwrap().unwrap();
        assert_eq!(
            notice,
            SessionNotice::Ended {
                code: Some(2),
                stderr: "source died".to_string()
            }
        );
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let mut session = session();
        let (sink, mut records, _notices) = RecordSink::channel();

        session
            .start_command(sh("echo first; exec sleep 30"), sink.clone())
            .unwrap();
        let pid = session.pid();
        assert!(pid.is_some());

        let second = session.start_command(sh("echo second"), sink);
        assert!(matches!(second, Err(SourceError::AlreadyRunning)));
        assert_eq!(session.pid(), pid);
        assert_eq!(session.phase(), FollowPhase::Running);

        let first = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(first.message, "first");

        session.stop();
        wait_idle(&mut session).await;
        assert_eq!(session.pid(), None);
    }

    #[tokio::test]
    async fn test_stop_returns_promptly_and_delivery_ceases() {
        let mut session = session();
        let (sink, mut records, mut notices) = RecordSink::channel();

        session
            .start_command(
                sh("i=0; while true; do echo \"line $i\"; i=$((i+1)); sleep 0.01; done"),
                sink,
            )
            .unwrap();

        for _ in 0..3 {
            timeout(WAIT, records.recv()).await.unwrap().unwrap();
        }

        let started = std::time::Instant::now();
        session.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(matches!(
            session.phase(),
            FollowPhase::Stopping | FollowPhase::Idle
        ));

        wait_idle(&mut session).await;

        // The reader dropped its sender, so the channel drains and closes
        let mut trailing = 0;
        while timeout(WAIT, records.recv()).await.unwrap().is_some() {
            trailing += 1;
        }
        assert!(trailing < 100);

        // A requested stop is not reported as a notice
        assert_eq!(timeout(WAIT, notices.recv()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut session = session();
        session.stop();
        assert_eq!(session.phase(), FollowPhase::Idle);
    }

    #[tokio::test]
    async fn test_spawn_failure_returns_to_idle() {
        let mut session = session();
        let (sink, _records, _notices) = RecordSink::channel();

        let result = session.start_command(
            CommandLine::new("/nonexistent/journalscope-test-binary", Vec::<String>::new()),
            sink.clone(),
        );
        assert!(matches!(result, Err(SourceError::Spawn { .. })));
        assert_eq!(session.phase(), FollowPhase::Idle);

        // Still usable afterwards
        session.start_command(sh("echo ok"), sink).unwrap();
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut session = session();

        let (sink, _records, _notices) = RecordSink::channel();
        session.start_command(sh("exec sleep 30"), sink).unwrap();
        session.stop();
        wait_idle(&mut session).await;

        let (sink, mut records, _notices) = RecordSink::channel();
        session.start_command(sh("echo again; exec sleep 30"), sink).unwrap();
        let record = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(record.message, "again");
        session.stop();
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_subscribe_sees_phase_transitions() {
        let mut session = session();
        let mut phase = session.subscribe();
        assert_eq!(*phase.borrow(), FollowPhase::Idle);

        let (sink, _records, _notices) = RecordSink::channel();
        session.start_command(sh("exec sleep 30"), sink).unwrap();
        timeout(WAIT, phase.wait_for(|p| *p == FollowPhase::Running))
            .await
            .unwrap()
            .unwrap();

        session.stop();
        timeout(WAIT, phase.wait_for(|p| *p == FollowPhase::Idle))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_uses_follow_command() {
        // echo prints the journalctl arguments back and exits
        let mut session = FollowSession::new(
            JournalCommand::new("echo"),
            Arc::new(RecordClassifier::new()),
        );
        let (sink, mut records, _notices) = RecordSink::channel();
        session.start(&FilterState::default(), sink).unwrap();

        let record = timeout(WAIT, records.recv()).await.unwrap().unwrap();
        assert_eq!(record.raw, "--no-pager -o short-iso -f");
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_follow() {
        let mut session = session();
        let (sink, mut records, mut notices) = RecordSink::channel();

        session
            .start_command(
                sh("printf 'before\\nbad \\377 byte\\r\\nafter\\n'; exec sleep 30"),
                sink,
            )
            .unwrap();

        let mut messages = Vec::new();
        for _ in 0..3 {
            let record = timeout(WAIT, records.recv()).await.unwrap().unwrap();
            messages.push(record.message);
        }
        assert_eq!(messages, ["before", "bad \u{FFFD} byte", "after"]);
        assert_eq!(session.phase(), FollowPhase::Running);
        assert!(notices.try_recv().is_err());

        session.stop();
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_delivered() {
        let mut session = session();
        let (sink, mut records, _notices) = RecordSink::channel();

        session
            .start_command(sh("printf 'a\\nno newline'"), sink)
            .unwrap();

        let mut messages = Vec::new();
        while let Some(record) = timeout(WAIT, records.recv()).await.unwrap() {
            messages.push(record.message);
        }
        assert_eq!(messages, ["a", "no newline"]);
        wait_idle(&mut session).await;
    }

    #[tokio::test]
    async fn test_wait_idle_without_start_returns() {
        let mut session = session();
        wait_idle(&mut session).await;
        assert_eq!(session.phase(), FollowPhase::Idle);
    }

    #[test]
    fn test_decode_line_strips_terminator() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"tail"), "tail");
        assert_eq!(decode_line(b"x \xff y\n"), "x \u{FFFD} y");
    }
}
