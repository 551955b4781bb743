use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use crate::ui::Theme;

/// Status bar showing keyboard shortcuts
pub struct StatusBar<'a> {
    hints: Vec<(&'a str, &'a str)>,
    right_text: Option<String>,
}

impl<'a> StatusBar<'a> {
    pub fn new() -> Self {
        Self {
            hints: Vec::new(),
            right_text: None,
        }
    }

    /// Add keyboard hints as (key, description) pairs
    pub fn hints<I>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.hints = hints.into_iter().collect();
        self
    }

    /// Set text to display on the right side
    pub fn right<S: Into<String>>(mut self, text: S) -> Self {
        self.right_text = Some(text.into());
        self
    }
}

impl Default for StatusBar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        buf.set_style(area, Theme::status_bar());

        let right_width = self
            .right_text
            .as_deref()
            .map(|r| r.width() as u16)
            .unwrap_or(0);

        // Build hints
        let mut spans = Vec::new();
        for (i, (key, desc)) in self.hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" ", Theme::status_bar()));
            }
            spans.push(Span::styled(format!("[{}]", key), Theme::status_bar_key()));
            spans.push(Span::styled(desc.to_string(), Theme::status_bar()));
        }

        let line = Line::from(spans);
        let line_width = line.width() as u16;

        // Right text wins when the bar is too narrow for both
        let hints_width = area.width.saturating_sub(right_width + 3);
        buf.set_line(area.x + 1, area.y, &line, hints_width.min(line_width));

        if let Some(right) = self.right_text {
            let right_x = area.x + area.width.saturating_sub(right_width + 1);
            let span = Span::styled(right, Theme::status_bar());
            buf.set_span(right_x, area.y, &span, right_width);
        }
    }
}

/// Default hints for the log viewer
pub fn log_viewer_hints(following: bool) -> Vec<(&'static str, &'static str)> {
    vec![
        ("l", "Load"),
        ("f", if following { "Stop" } else { "Follow" }),
        ("/", "Search"),
        ("u", "Unit"),
        ("s", "Since"),
        ("p", "Priority"),
        ("e", "Export"),
        ("?", "Help"),
        ("q", "Quit"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(buf: &Buffer, width: u16) -> String {
        (0..width).map(|x| buf[(x, 0)].symbol().to_string()).collect()
    }

    #[test]
    fn test_renders_hints_and_right_text() {
        let area = Rect::new(0, 0, 40, 1);
        let mut buf = Buffer::empty(area);
        StatusBar::new()
            .hints([("q", "Quit")])
            .right("12 entries")
            .render(area, &mut buf);

        let text = row(&buf, 40);
        assert!(text.starts_with(" [q]Quit"));
        assert!(text.trim_end().ends_with("12 entries"));
    }

    #[test]
    fn test_narrow_bar_keeps_right_text() {
        let area = Rect::new(0, 0, 16, 1);
        let mut buf = Buffer::empty(area);
        StatusBar::new()
            .hints(log_viewer_hints(false))
            .right("3 entries")
            .render(area, &mut buf);

        assert!(row(&buf, 16).contains("3 entries"));
    }
}
