use journalscope_logs::{
    FilterState, FollowPhase, LogRecord, SessionNotice, Severity, SourceError, ViewState,
};

/// Editable fields of the filter form
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputField {
    Search,
    Unit,
    Since,
}

impl InputField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Search => "Search",
            Self::Unit => "Unit",
            Self::Since => "Since",
        }
    }
}

/// One-line message shown above the status bar
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

/// UI-specific transient state
pub struct UiState {
    /// Field currently being edited, if any
    pub editing: Option<InputField>,

    /// Text of the field being edited
    pub input: String,

    /// Search text to restore if a search edit is cancelled
    search_before_edit: String,

    /// Is help overlay visible?
    pub help_visible: bool,

    /// Scroll position in log viewer
    pub log_scroll: usize,

    /// Keep the newest entries in view?
    pub auto_scroll: bool,

    /// Show timestamps in log viewer?
    pub show_timestamps: bool,

    /// Show severity counts?
    pub stats_visible: bool,

    pub notice: Option<Notice>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            editing: None,
            input: String::new(),
            search_before_edit: String::new(),
            help_visible: false,
            log_scroll: 0,
            auto_scroll: true,
            show_timestamps: true,
            stats_visible: false,
            notice: None,
        }
    }
}

/// Global application state
///
/// Owned by the event loop; every record, notice and filter change is
/// applied here, one at a time.
pub struct AppState {
    /// Filter form; unit, priority and since take effect on the next fetch
    pub filter: FilterState,

    /// Accumulated records and the visible subset
    pub view: ViewState,

    /// Mirror of the follow session's phase
    pub follow_phase: FollowPhase,

    /// Is a load in flight?
    pub loading: bool,

    /// Generation of the newest load; older results are discarded
    load_generation: u64,

    pub ui_state: UiState,

    /// Whether app should quit
    pub should_quit: bool,
}

impl AppState {
    pub fn new(filter: FilterState) -> Self {
        Self {
            view: ViewState::new(filter.clone()),
            filter,
            follow_phase: FollowPhase::Idle,
            loading: false,
            load_generation: 0,
            ui_state: UiState::default(),
            should_quit: false,
        }
    }

    pub fn is_following(&self) -> bool {
        self.follow_phase != FollowPhase::Idle
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Begin a load, returning its generation and filter snapshot
    ///
    /// A running follow is never hot-reloaded, so loading is refused until
    /// the follow is stopped.
    pub fn begin_load(&mut self) -> Option<(u64, FilterState)> {
        if self.is_following() {
            self.show_info("Stop following (f) before loading");
            return None;
        }
        self.load_generation += 1;
        self.loading = true;
        Some((self.load_generation, self.filter.clone()))
    }

    /// Apply a load result; returns false for a superseded load
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: Result<Vec<LogRecord>, SourceError>,
    ) -> bool {
        if generation != self.load_generation {
            return false;
        }
        self.loading = false;
        self.view.reset();
        self.ui_state.log_scroll = 0;
        self.ui_state.auto_scroll = true;

        match result {
            Ok(records) => {
                let count = records.len();
                self.view.extend(records);
                self.show_info(format!("Loaded {} entries", count));
            }
            Err(e) => {
                self.show_error(format!("Load failed: {}", e));
            }
        }
        true
    }

    /// Forget any load in flight; its result will be discarded
    pub fn abandon_load(&mut self) {
        if self.loading {
            self.load_generation += 1;
            self.loading = false;
        }
    }

    /// Append one streamed record
    pub fn push_record(&mut self, record: LogRecord) {
        self.view.append(record);
    }

    /// The follow session ended without being asked to
    pub fn follow_ended(&mut self, notice: &SessionNotice) {
        self.follow_phase = FollowPhase::Idle;
        self.show_error(notice.to_string());
    }

    // ------------------------------------------------------------------
    // Filter form
    // ------------------------------------------------------------------

    /// Start editing a field, seeded with its current value
    pub fn start_edit(&mut self, field: InputField) {
        self.ui_state.input = match field {
            InputField::Search => {
                self.ui_state.search_before_edit = self.filter.search_text.clone();
                self.filter.search_text.clone()
            }
            InputField::Unit => self.filter.unit.clone().unwrap_or_default(),
            InputField::Since => self.filter.since.clone().unwrap_or_default(),
        };
        self.ui_state.editing = Some(field);
    }

    pub fn input_char(&mut self, c: char) {
        self.ui_state.input.push(c);
        self.after_input();
    }

    /// Insert pasted text, flattened to one line
    pub fn input_paste(&mut self, text: &str) {
        self.ui_state
            .input
            .extend(text.chars().filter(|c| *c != '\n' && *c != '\r'));
        self.after_input();
    }

    pub fn input_backspace(&mut self) {
        self.ui_state.input.pop();
        self.after_input();
    }

    pub fn input_clear(&mut self) {
        self.ui_state.input.clear();
        self.after_input();
    }

    /// Search is live: every keystroke refilters the view
    fn after_input(&mut self) {
        if self.ui_state.editing == Some(InputField::Search) {
            let text = self.ui_state.input.clone();
            self.apply_search(&text);
        }
    }

    /// Finish editing, returning the field that was committed
    pub fn commit_input(&mut self) -> Option<InputField> {
        let field = self.ui_state.editing.take()?;
        let value = std::mem::take(&mut self.ui_state.input);
        let trimmed = value.trim();
        let optional = (!trimmed.is_empty()).then(|| trimmed.to_string());

        match field {
            InputField::Search => self.apply_search(&value),
            InputField::Unit => self.filter.unit = optional,
            InputField::Since => self.filter.since = optional,
        }
        Some(field)
    }

    /// Abandon the edit; a search edit restores the previous search
    pub fn cancel_input(&mut self) {
        if self.ui_state.editing.take() == Some(InputField::Search) {
            let previous = std::mem::take(&mut self.ui_state.search_before_edit);
            self.apply_search(&previous);
        }
        self.ui_state.input.clear();
    }

    fn apply_search(&mut self, text: &str) {
        self.filter.search_text = text.to_string();
        self.view.set_search(text);
        self.ui_state.log_scroll = 0;
    }

    pub fn clear_search(&mut self) {
        self.apply_search("");
    }

    /// Cycle the minimum severity: all, emerg, alert ... debug, all
    pub fn cycle_priority(&mut self) {
        self.filter.min_severity = match self.filter.min_severity {
            None => Some(Severity::Emerg),
            Some(Severity::Debug) => None,
            Some(level) => Some(level.next()),
        };
    }

    pub fn clear_priority(&mut self) {
        self.filter.min_severity = None;
    }

    // ------------------------------------------------------------------
    // Log viewer
    // ------------------------------------------------------------------

    pub fn clear_logs(&mut self) {
        self.view.reset();
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        // Clamped to the visible count at render time
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(n);
    }

    pub fn scroll_to_top(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.ui_state.auto_scroll = true;
    }

    // ------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------

    pub fn show_info(&mut self, text: impl Into<String>) {
        self.ui_state.notice = Some(Notice {
            text: text.into(),
            is_error: false,
        });
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.ui_state.notice = Some(Notice {
            text: text.into(),
            is_error: true,
        });
    }

    pub fn dismiss_notice(&mut self) {
        self.ui_state.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journalscope_logs::classify;

    fn state_with(lines: &[&str]) -> AppState {
        let mut state = AppState::new(FilterState::default());
        for line in lines {
            state.push_record(classify(line));
        }
        state
    }

    fn visible(state: &AppState) -> Vec<&str> {
        state.view.visible().map(|r| r.message.as_str()).collect()
    }

    #[test]
    fn test_search_is_live_per_keystroke() {
        let mut state = state_with(&["sshd: a", "cron: b", "sshd: c"]);
        state.start_edit(InputField::Search);

        state.input_char('s');
        assert_eq!(visible(&state), ["sshd: a", "sshd: c"]);

        state.input_char('s');
        state.input_char('h');
        state.input_char('d');
        state.input_char(' ');
        assert!(visible(&state).is_empty());

        state.input_backspace();
        assert_eq!(visible(&state), ["sshd: a", "sshd: c"]);

        assert_eq!(state.commit_input(), Some(InputField::Search));
        assert_eq!(state.filter.search_text, "sshd");
        assert_eq!(state.view.filter().search_text, "sshd");
    }

    #[test]
    fn test_cancel_search_restores_previous() {
        let mut state = state_with(&["sshd: a", "cron: b"]);
        state.start_edit(InputField::Search);
        state.input_paste("cron");
        state.commit_input();
        assert_eq!(visible(&state), ["cron: b"]);

        state.start_edit(InputField::Search);
        state.input_clear();
        assert_eq!(visible(&state).len(), 2);
        state.cancel_input();
        assert_eq!(visible(&state), ["cron: b"]);
        assert_eq!(state.ui_state.editing, None);
    }

    #[test]
    fn test_streamed_records_respect_search() {
        let mut state = state_with(&[]);
        state.start_edit(InputField::Search);
        state.input_paste("disk\n");
        state.commit_input();
        assert_eq!(state.filter.search_text, "disk");

        state.push_record(classify("kernel: disk full"));
        state.push_record(classify("cron: tick"));
        assert_eq!(visible(&state), ["kernel: disk full"]);
        assert_eq!(state.view.len(), 2);
    }

    #[test]
    fn test_unit_and_since_commit_trimmed() {
        let mut state = state_with(&[]);
        state.start_edit(InputField::Unit);
        state.input_paste("  sshd.service ");
        state.commit_input();
        assert_eq!(state.filter.unit.as_deref(), Some("sshd.service"));

        state.start_edit(InputField::Unit);
        assert_eq!(state.ui_state.input, "sshd.service");
        state.input_clear();
        state.input_char(' ');
        state.commit_input();
        assert_eq!(state.filter.unit, None);

        state.start_edit(InputField::Since);
        state.input_paste("1 hour ago");
        state.cancel_input();
        assert_eq!(state.filter.since, None);
    }

    #[test]
    fn test_cycle_priority_wraps_to_all() {
        let mut state = state_with(&[]);
        state.cycle_priority();
        assert_eq!(state.filter.min_severity, Some(Severity::Emerg));
        for _ in 0..7 {
            state.cycle_priority();
        }
        assert_eq!(state.filter.min_severity, Some(Severity::Debug));
        state.cycle_priority();
        assert_eq!(state.filter.min_severity, None);

        state.cycle_priority();
        state.clear_priority();
        assert_eq!(state.filter.min_severity, None);
    }

    #[test]
    fn test_load_refused_while_following() {
        let mut state = state_with(&[]);
        state.follow_phase = FollowPhase::Running;
        assert!(state.begin_load().is_none());
        assert!(!state.loading);
        assert!(state.ui_state.notice.is_some());
    }

    #[test]
    fn test_stale_load_is_discarded() {
        let mut state = state_with(&["old"]);
        let (first, _) = state.begin_load().unwrap();
        let (second, _) = state.begin_load().unwrap();

        assert!(!state.finish_load(first, Ok(vec![classify("stale")])));
        assert_eq!(visible(&state), ["old"]);
        assert!(state.loading);

        assert!(state.finish_load(second, Ok(vec![classify("fresh")])));
        assert_eq!(visible(&state), ["fresh"]);
        assert!(!state.loading);
    }

    #[test]
    fn test_abandoned_load_does_not_clear_streamed_records() {
        let mut state = state_with(&[]);
        let (generation, _) = state.begin_load().unwrap();
        state.abandon_load();
        assert!(!state.loading);

        state.push_record(classify("streamed"));
        assert!(!state.finish_load(generation, Ok(vec![classify("late batch")])));
        assert_eq!(visible(&state), ["streamed"]);
    }

    #[test]
    fn test_failed_load_clears_and_reports() {
        let mut state = state_with(&["old"]);
        let (generation, _) = state.begin_load().unwrap();
        let err = SourceError::Exit {
            code: Some(1),
            stderr: "No journal files were found.".to_string(),
        };
        assert!(state.finish_load(generation, Err(err)));
        assert!(state.view.is_empty());

        let notice = state.ui_state.notice.as_ref().unwrap();
        assert!(notice.is_error);
        assert!(notice.text.contains("No journal files"));
    }

    #[test]
    fn test_follow_ended_returns_to_idle() {
        let mut state = state_with(&[]);
        state.follow_phase = FollowPhase::Running;
        state.follow_ended(&SessionNotice::Ended {
            code: Some(1),
            stderr: String::new(),
        });
        assert!(!state.is_following());
        assert!(state.ui_state.notice.as_ref().unwrap().is_error);
    }

    #[test]
    fn test_scrolling_disables_auto_scroll() {
        let mut state = state_with(&[]);
        state.scroll_down(5);
        assert!(!state.ui_state.auto_scroll);
        assert_eq!(state.ui_state.log_scroll, 5);
        state.scroll_up(10);
        assert_eq!(state.ui_state.log_scroll, 0);
        state.scroll_to_bottom();
        assert!(state.ui_state.auto_scroll);
    }
}
