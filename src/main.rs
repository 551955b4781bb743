mod config;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use journalscope_logs::{
    BatchLoader, FilterState, FollowSession, JournalCommand, LogRecord, RecordClassifier,
    RecordSink, SessionNotice, Severity, SourceError, ViewState, load_rule_plugins,
};
use journalscope_tui::{
    Action, AppState, Event, EventHandler, HelpOverlay, InputField, KeyBindings, KeyContext,
    LogViewerScreen, Tui,
};

use crate::config::Config;

/// journalscope - A terminal UI for tailing and filtering the system journal
#[derive(Parser, Debug)]
#[command(name = "journalscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only show entries from this unit
    #[arg(short, long)]
    unit: Option<String>,

    /// Minimum priority, 0-7 or emerg, alert, crit, err, warning, notice, info, debug
    #[arg(short, long)]
    priority: Option<Severity>,

    /// Only show entries newer than this (any journalctl --since value)
    #[arg(short = 'S', long)]
    since: Option<String>,

    /// Follow new entries instead of loading a batch
    #[arg(short, long)]
    follow: bool,

    /// Print entries to stdout instead of starting the TUI
    #[arg(long)]
    print: bool,

    /// Log source program
    #[arg(long, value_name = "PROGRAM")]
    program: Option<String>,

    /// Number of entries fetched per load
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Load timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file (default: <config dir>/journalscope/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory of TOML severity rule files
    #[arg(long, value_name = "DIR")]
    plugins_dir: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// UI refresh interval in milliseconds
    #[arg(long, value_name = "MS")]
    tick_rate: Option<u64>,
}

/// Effective settings: command line over config file over defaults
struct Settings {
    command: JournalCommand,
    filter: FilterState,
    load_timeout: Duration,
    tick_rate: Duration,
    show_timestamps: bool,
    plugins_dir: Option<PathBuf>,
}

impl Settings {
    fn resolve(args: &Args, config: Config) -> Self {
        let plugins_dir = args.plugins_dir.clone().or_else(|| config.plugins_dir());

        let mut filter = config.filter;
        if let Some(unit) = &args.unit {
            filter.unit = Some(unit.clone());
        }
        if args.priority.is_some() {
            filter.min_severity = args.priority;
        }
        if let Some(since) = &args.since {
            filter.since = Some(since.clone());
        }

        let source = config.source;
        let command = JournalCommand::new(args.program.clone().unwrap_or(source.program))
            .with_output_format(source.output_format)
            .with_batch_limit(args.limit.unwrap_or(source.batch_limit));

        Self {
            command,
            filter,
            load_timeout: Duration::from_secs(args.timeout.unwrap_or(source.load_timeout_secs)),
            tick_rate: Duration::from_millis(args.tick_rate.unwrap_or(config.ui.tick_rate_ms)),
            show_timestamps: config.ui.show_timestamps,
            plugins_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_file.as_deref())?;

    // Run the application
    let result = run(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    let settings = Settings::resolve(&args, config);

    let classifier = Arc::new(build_classifier(settings.plugins_dir.as_deref()));
    let loader = BatchLoader::new(settings.command.clone(), classifier.clone())
        .with_timeout(settings.load_timeout);
    let session = FollowSession::new(settings.command.clone(), classifier);

    if args.print {
        run_print(&settings, &loader, session, args.follow).await
    } else {
        run_app(settings, loader, session, args.follow).await
    }
}

fn build_classifier(plugins_dir: Option<&Path>) -> RecordClassifier {
    let mut classifier = RecordClassifier::new();
    if let Some(dir) = plugins_dir {
        for plugin in load_rule_plugins(dir) {
            classifier.register(Box::new(plugin));
        }
    }
    tracing::debug!(plugins = ?classifier.override_names(), "classifier ready");
    classifier
}

// ============================================================================
// Headless mode
// ============================================================================

async fn run_print(
    settings: &Settings,
    loader: &BatchLoader,
    mut session: FollowSession,
    follow: bool,
) -> Result<()> {
    let stdout = io::stdout();

    if !follow {
        let records = loader.load(&settings.filter).await?;
        let mut out = stdout.lock();
        for record in &records {
            print_record(&mut out, record)?;
        }
        return Ok(());
    }

    let (sink, mut record_rx, mut notice_rx) = RecordSink::channel();
    session.start(&settings.filter, sink)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ended = None;
    loop {
        tokio::select! {
            // Drain records before reacting to the end notice
            biased;

            Some(record) = record_rx.recv() => {
                if let Err(e) = print_record(&mut stdout.lock(), &record) {
                    session.stop();
                    if e.kind() == io::ErrorKind::BrokenPipe {
                        break;
                    }
                    return Err(e.into());
                }
            }

            Some(notice) = notice_rx.recv() => {
                ended = Some(notice);
                break;
            }

            _ = &mut ctrl_c => {
                session.stop();
                break;
            }
        }
    }

    session.wait_idle().await;

    match ended {
        Some(SessionNotice::Ended { code: Some(0), .. }) | None => Ok(()),
        Some(notice) => anyhow::bail!("{}", notice),
    }
}

/// `<timestamp> <LBL> <message>`, without the timestamp when there is none
fn print_record(out: &mut impl Write, record: &LogRecord) -> io::Result<()> {
    if record.timestamp.is_empty() {
        writeln!(out, "{} {}", record.severity.as_str(), record.message)
    } else {
        writeln!(
            out,
            "{} {} {}",
            record.timestamp,
            record.severity.as_str(),
            record.message
        )
    }
}

// ============================================================================
// TUI
// ============================================================================

/// Internal results of async operations
enum InternalAction {
    LoadFinished {
        generation: u64,
        result: Result<Vec<LogRecord>, SourceError>,
    },
}

/// Everything `handle_action` needs besides the state
struct Fetchers<'a> {
    loader: &'a BatchLoader,
    session: &'a mut FollowSession,
    sink: &'a RecordSink,
    internal_tx: &'a mpsc::UnboundedSender<InternalAction>,
}

async fn run_app(
    settings: Settings,
    loader: BatchLoader,
    mut session: FollowSession,
    follow: bool,
) -> Result<()> {
    // Create action channels
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<InternalAction>();
    let (sink, mut record_rx, mut notice_rx) = RecordSink::channel();
    let mut phase_rx = session.subscribe();

    // Initialize state
    let mut state = AppState::new(settings.filter.clone());
    state.ui_state.show_timestamps = settings.show_timestamps;

    // Initialize TUI
    let mut tui = Tui::new()?;
    let mut events = EventHandler::new(settings.tick_rate);
    let keybindings = KeyBindings::new();

    // Initial fetch
    let _ = action_tx.send(if follow {
        Action::ToggleFollow
    } else {
        Action::Load
    });

    render(&mut tui, &mut state)?;

    // Main event loop
    loop {
        tokio::select! {
            // Handle terminal events
            Some(event) = events.next() => {
                match event {
                    Event::Key(key) => {
                        let action = if state.ui_state.help_visible {
                            // Any key closes help
                            Some(Action::ToggleHelp)
                        } else if state.ui_state.editing.is_some() {
                            keybindings.get_input_action(&key)
                        } else {
                            keybindings.get_action(KeyContext::LogViewer, &key)
                        };
                        if let Some(action) = action {
                            let _ = action_tx.send(action);
                        }
                    }
                    Event::Paste(text) => {
                        if state.ui_state.editing.is_some() {
                            let _ = action_tx.send(Action::InputPaste(text));
                        }
                    }
                    Event::Tick => {
                        // Redrawn below; keeps the clock current
                    }
                    Event::Resize(_, _) => {
                        let _ = action_tx.send(Action::Render);
                    }
                    Event::Error(e) => {
                        state.show_error(e);
                    }
                }
            }

            // Handle streamed records
            Some(record) = record_rx.recv() => {
                state.push_record(record);
            }

            // The follow session ended on its own
            Some(notice) = notice_rx.recv() => {
                state.follow_ended(&notice);
            }

            Ok(()) = phase_rx.changed() => {
                state.follow_phase = *phase_rx.borrow_and_update();
            }

            // Handle user actions
            Some(action) = action_rx.recv() => {
                let mut fetchers = Fetchers {
                    loader: &loader,
                    session: &mut session,
                    sink: &sink,
                    internal_tx: &internal_tx,
                };
                handle_action(&mut state, &mut fetchers, action);
            }

            // Handle internal async actions
            Some(internal) = internal_rx.recv() => {
                match internal {
                    InternalAction::LoadFinished { generation, result } => {
                        if !state.finish_load(generation, result) {
                            tracing::debug!(generation, "discarded superseded load");
                        }
                    }
                }
            }
        }

        if state.should_quit {
            break;
        }

        render(&mut tui, &mut state)?;
    }

    // Cleanup
    session.stop();
    events.shutdown();
    tui.restore()?;

    Ok(())
}

fn handle_action(state: &mut AppState, fetchers: &mut Fetchers<'_>, action: Action) {
    match action {
        Action::Quit => {
            fetchers.session.stop();
            state.should_quit = true;
        }
        Action::ToggleHelp => {
            state.ui_state.help_visible = !state.ui_state.help_visible;
        }

        // Fetching
        Action::Load => {
            if let Some((generation, filter)) = state.begin_load() {
                let loader = fetchers.loader.clone();
                let internal_tx = fetchers.internal_tx.clone();
                tokio::spawn(async move {
                    let result = loader.load(&filter).await;
                    let _ = internal_tx.send(InternalAction::LoadFinished { generation, result });
                });
            }
        }
        Action::ToggleFollow => {
            if state.is_following() {
                fetchers.session.stop();
                state.show_info("Follow stopped");
            } else {
                // A batch landing now would wipe the streamed records
                state.abandon_load();
                match fetchers.session.start(&state.filter, fetchers.sink.clone()) {
                    Ok(()) => {
                        state.follow_phase = fetchers.session.phase();
                        state.show_info("Following new entries");
                    }
                    Err(e) => {
                        state.show_error(format!("Follow failed: {}", e));
                    }
                }
            }
        }

        // Filter form
        Action::EditField(field) => {
            state.start_edit(field);
        }
        Action::InputChar(c) => {
            state.input_char(c);
        }
        Action::InputPaste(text) => {
            state.input_paste(&text);
        }
        Action::InputBackspace => {
            state.input_backspace();
        }
        Action::InputClear => {
            state.input_clear();
        }
        Action::InputCommit => {
            if let Some(InputField::Unit | InputField::Since) = state.commit_input() {
                state.show_info("Filter updated; press l to load");
            }
        }
        Action::InputCancel => {
            state.cancel_input();
        }
        Action::CyclePriority => {
            state.cycle_priority();
            let label = state
                .filter
                .min_severity
                .map(|level| level.name())
                .unwrap_or("all");
            state.show_info(format!("Priority: {}; press l to load", label));
        }
        Action::ClearPriority => {
            state.clear_priority();
            state.show_info("Priority: all; press l to load");
        }
        Action::ClearSearch => {
            state.clear_search();
        }

        // Log viewer
        Action::ScrollUp(n) => {
            state.scroll_up(n);
        }
        Action::ScrollDown(n) => {
            state.scroll_down(n);
        }
        Action::PageUp => {
            state.scroll_up(20);
        }
        Action::PageDown => {
            state.scroll_down(20);
        }
        Action::ScrollToTop => {
            state.scroll_to_top();
        }
        Action::ScrollToBottom => {
            state.scroll_to_bottom();
        }
        Action::ToggleAutoScroll => {
            state.ui_state.auto_scroll = !state.ui_state.auto_scroll;
        }
        Action::ToggleTimestamps => {
            state.ui_state.show_timestamps = !state.ui_state.show_timestamps;
        }
        Action::ToggleStats => {
            state.ui_state.stats_visible = !state.ui_state.stats_visible;
        }
        Action::ClearLogs => {
            state.clear_logs();
        }
        Action::ExportLogs => {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let filename = format!("journalscope_{}.log", timestamp);

            match export_logs_to_file(Path::new(&filename), &state.view) {
                Ok(count) => {
                    state.show_info(format!("Exported {} entries to {}", count, filename));
                }
                Err(e) => {
                    state.show_error(format!("Export failed: {:#}", e));
                }
            }
        }

        Action::DismissNotice => {
            state.dismiss_notice();
        }
        Action::Render => {}
    }
}

fn render(tui: &mut Tui, state: &mut AppState) -> Result<()> {
    tui.terminal().draw(|frame| {
        LogViewerScreen::render(frame, state);

        if state.ui_state.help_visible {
            HelpOverlay::render(frame);
        }
    })?;

    Ok(())
}

/// Write every record's original line, filtered or not
fn export_logs_to_file(path: &Path, view: &ViewState) -> Result<usize> {
    let mut contents = view.export_raw();
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(view.len())
}
