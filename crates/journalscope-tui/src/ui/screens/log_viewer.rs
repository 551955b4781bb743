use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use journalscope_logs::{FollowPhase, SearchFilter};
use journalscope_types::{LogRecord, Severity};

use crate::app::{AppState, InputField};
use crate::ui::Theme;
use crate::ui::components::{StatusBar, log_viewer_hints};

const ELLIPSIS: &str = "…";

/// Log viewer screen
pub struct LogViewerScreen;

/// Cut `s` to at most `max_width` terminal columns
///
/// Returns the kept prefix and whether anything was dropped. When text is
/// dropped, one column is left free for an ellipsis.
pub fn truncate_to_width(s: &str, max_width: usize) -> (&str, bool) {
    if s.width() <= max_width {
        return (s, false);
    }
    let budget = max_width.saturating_sub(ELLIPSIS.width());
    let mut used = 0;
    for (i, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            return (&s[..i], true);
        }
        used += w;
    }
    (s, false)
}

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState) {
        let area = frame.area();

        let show_filter_bar =
            state.ui_state.editing.is_some() || !state.filter.search_text.is_empty();

        // Build constraints based on what's visible
        let mut constraints = vec![Constraint::Length(3)]; // Header always
        if show_filter_bar {
            constraints.push(Constraint::Length(3));
        }
        if state.ui_state.stats_visible {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Min(1)); // Logs
        if state.ui_state.notice.is_some() {
            constraints.push(Constraint::Length(1));
        }
        constraints.push(Constraint::Length(1)); // Status bar

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut idx = 0;

        Self::render_header(frame, chunks[idx], state);
        idx += 1;

        if show_filter_bar {
            Self::render_filter_bar(frame, chunks[idx], state);
            idx += 1;
        }

        if state.ui_state.stats_visible {
            Self::render_stats_bar(frame, chunks[idx], state);
            idx += 1;
        }

        Self::render_logs(frame, chunks[idx], state);
        idx += 1;

        if state.ui_state.notice.is_some() {
            Self::render_notice(frame, chunks[idx], state);
            idx += 1;
        }

        Self::render_status_bar(frame, chunks[idx], state);
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
        let filter = &state.filter;
        let separator = || Span::styled(" │ ", Theme::text_dim());

        let priority = match filter.min_severity {
            Some(level) => format!("≤ {}", level.name()),
            None => "all".to_string(),
        };

        let phase = match state.follow_phase {
            FollowPhase::Idle if state.loading => Span::styled("loading…", Theme::text_highlight()),
            FollowPhase::Idle => Span::styled("idle", Theme::text_dim()),
            FollowPhase::Starting => Span::styled("starting…", Theme::text_highlight()),
            FollowPhase::Running => Span::styled("● following", Theme::following()),
            FollowPhase::Stopping => Span::styled("stopping…", Theme::text_highlight()),
        };

        let title = Line::from(vec![
            Span::styled("journalscope", Theme::title()),
            separator(),
            Span::styled("unit ", Theme::text_dim()),
            Span::styled(filter.unit().unwrap_or("*").to_string(), Theme::text()),
            separator(),
            Span::styled("priority ", Theme::text_dim()),
            Span::styled(
                priority,
                filter
                    .min_severity
                    .map(Theme::severity_label)
                    .unwrap_or_else(Theme::text),
            ),
            separator(),
            Span::styled("since ", Theme::text_dim()),
            Span::styled(filter.since().unwrap_or("-").to_string(), Theme::text()),
            separator(),
            phase,
        ]);

        let header = Paragraph::new(title).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_filter_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![];

        match state.ui_state.editing {
            Some(field) => {
                spans.push(Span::styled(
                    format!(" {}: ", field.label()),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ));
                spans.push(Span::styled(
                    state.ui_state.input.clone(),
                    Theme::text_highlight(),
                ));
                spans.push(Span::styled(
                    "█",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::SLOW_BLINK),
                ));

                let hint = match field {
                    InputField::Search => "  [Enter] Keep  [Esc] Cancel",
                    InputField::Unit | InputField::Since => {
                        "  [Enter] Set (applies on next load)  [Esc] Cancel"
                    }
                };
                spans.push(Span::styled(hint, Theme::text_dim()));
            }
            None => {
                spans.push(Span::styled(" Search: ", Theme::text_dim()));
                spans.push(Span::styled(
                    state.filter.search_text.clone(),
                    Theme::text_highlight(),
                ));
                spans.push(Span::styled("  [n] Clear  [/] Edit", Theme::text_dim()));
            }
        }

        let border = if state.ui_state.editing.is_some() {
            Theme::border_focused()
        } else {
            Theme::border()
        };

        let filter_bar = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(Span::styled(" Filter ", Theme::title())),
        );

        frame.render_widget(filter_bar, area);
    }

    fn render_stats_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let counts = state.view.level_counts();

        let mut spans = vec![Span::styled(" ", Theme::text())];
        for level in Severity::ALL {
            let count = counts.get(level);
            // Rare levels only show up when present
            if count == 0 && level.at_least(Severity::Crit) {
                continue;
            }
            spans.push(Span::styled(
                format!("{}:", level.as_str()),
                Theme::severity_label(level),
            ));
            spans.push(Span::styled(format!("{} ", count), Theme::text()));
        }
        spans.push(Span::styled("│ ", Theme::text_dim()));
        spans.push(Span::styled("Total:", Theme::text_dim()));
        spans.push(Span::styled(format!("{}", counts.total()), Theme::text()));

        let stats_widget = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(" Stats ", Theme::title())),
        );

        frame.render_widget(stats_widget, area);
    }

    fn render_logs(frame: &mut Frame, area: Rect, state: &mut AppState) {
        let total = state.view.visible_len();

        // Calculate visible area (accounting for border)
        let inner_height = area.height.saturating_sub(2) as usize;
        let max_scroll = total.saturating_sub(inner_height);

        if state.ui_state.auto_scroll {
            state.ui_state.log_scroll = max_scroll;
        }
        if state.ui_state.log_scroll > max_scroll {
            state.ui_state.log_scroll = max_scroll;
        }

        let page: Vec<&LogRecord> = state
            .view
            .visible_range(state.ui_state.log_scroll, inner_height)
            .collect();

        let timestamp_width = if state.ui_state.show_timestamps {
            page.iter().map(|r| r.timestamp.width()).max().unwrap_or(0)
        } else {
            0
        };

        // 2 for borders, 1 for scrollbar
        let inner_width = area.width.saturating_sub(3) as usize;
        let search = state.view.search();

        let lines: Vec<Line> = page
            .iter()
            .map(|record| format_log_line(record, search, timestamp_width, inner_width))
            .collect();

        let title = if search.is_empty() {
            format!(" Logs ({}) ", total)
        } else {
            format!(" Logs ({} of {} matching) ", total, state.view.len())
        };

        let logs_widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(title, Theme::title())),
        );

        frame.render_widget(logs_widget, area);

        if total > inner_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));

            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(state.ui_state.log_scroll);

            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn render_notice(frame: &mut Frame, area: Rect, state: &AppState) {
        let Some(notice) = &state.ui_state.notice else {
            return;
        };
        let style = if notice.is_error {
            Theme::error()
        } else {
            Theme::notice()
        };
        let line = Line::from(vec![
            Span::styled(format!(" {} ", notice.text), style),
            Span::styled("[Esc] dismiss", Theme::text_dim()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let right = format!(
            "{} entries │ {} {}",
            state.view.len(),
            Local::now().format("%H:%M:%S"),
            if state.ui_state.auto_scroll { "▼" } else { " " }
        );

        let status = StatusBar::new()
            .hints(log_viewer_hints(state.is_following()))
            .right(right);

        frame.render_widget(status, area);
    }
}

/// One table row: severity label, timestamp and message
fn format_log_line(
    record: &LogRecord,
    search: &SearchFilter,
    timestamp_width: usize,
    available_width: usize,
) -> Line<'static> {
    let mut spans = Vec::new();
    let mut prefix_width = 0;

    spans.push(Span::styled(
        record.severity.as_str(),
        Theme::severity_label(record.severity),
    ));
    prefix_width += 3;

    if timestamp_width > 0 {
        let pad = timestamp_width.saturating_sub(record.timestamp.width());
        spans.push(Span::styled(
            format!(" {}{}", record.timestamp, " ".repeat(pad)),
            Theme::text_dim(),
        ));
        prefix_width += timestamp_width + 1;
    }

    spans.push(Span::styled(" │ ", Theme::text_dim()));
    prefix_width += 3;

    let message_width = available_width.saturating_sub(prefix_width);
    let (shown, truncated) = truncate_to_width(&record.message, message_width);
    let base_style = Theme::severity_text(record.severity);

    let mut last_end = 0;
    for (start, end) in search.find_matches(shown) {
        if start > last_end {
            spans.push(Span::styled(shown[last_end..start].to_string(), base_style));
        }
        spans.push(Span::styled(shown[start..end].to_string(), Theme::search_match()));
        last_end = end;
    }
    if last_end < shown.len() {
        spans.push(Span::styled(shown[last_end..].to_string(), base_style));
    }
    if truncated {
        spans.push(Span::styled(ELLIPSIS, Theme::text_dim()));
    }

    Line::from(spans)
}
