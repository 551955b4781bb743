use std::process::Stdio;

use journalscope_types::FilterState;

/// Default log-source program
pub const DEFAULT_PROGRAM: &str = "journalctl";

/// Default `-o` output mode; timestamps are ISO-8601 and easy to split off
pub const DEFAULT_OUTPUT_FORMAT: &str = "short-iso";

/// Cap on lines requested by a one-shot load
pub const DEFAULT_BATCH_LIMIT: usize = 1000;

/// A program plus its argument list, ready to spawn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a tokio command with stdout/stderr piped and stdin closed
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Maps filter state to a `journalctl` invocation
#[derive(Clone, Debug)]
pub struct JournalCommand {
    program: String,
    output_format: String,
    batch_limit: usize,
}

impl JournalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Build the command line for a load (`follow = false`) or a follow
    pub fn build(&self, filter: &FilterState, follow: bool) -> CommandLine {
        let mut args: Vec<String> = vec![
            "--no-pager".into(),
            "-o".into(),
            self.output_format.clone(),
        ];

        if let Some(unit) = filter.unit() {
            args.push("-u".into());
            args.push(unit.to_string());
        }

        if let Some(severity) = filter.min_severity {
            args.push("-p".into());
            args.push(severity.as_u8().to_string());
        }

        // Passed through verbatim; journalctl reports bad expressions itself
        if let Some(since) = filter.since() {
            args.push("--since".into());
            args.push(since.to_string());
        }

        if follow {
            args.push("-f".into());
        } else {
            args.push("-n".into());
            args.push(self.batch_limit.to_string());
        }

        CommandLine {
            program: self.program.clone(),
            args,
        }
    }
}

impl Default for JournalCommand {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}
