use journalscope_types::{FilterState, LogRecord};

/// Compiled local text filter for log records
///
/// Only the search text is applied here. Unit, severity and since already
/// shaped what the source returned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Case-folded needle (empty = match all)
    needle: String,
}

impl SearchFilter {
    /// Create a new case-insensitive filter from search text
    pub fn new(pattern: &str) -> Self {
        Self {
            needle: fold_case(pattern),
        }
    }

    /// Create a filter from the search text of a filter state
    pub fn from_state(filter: &FilterState) -> Self {
        Self::new(&filter.search_text)
    }

    /// Check if a record's message contains the search text
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.needle.is_empty() || fold_case(&record.message).contains(&self.needle)
    }

    /// Find all match positions in a string (for highlighting)
    ///
    /// Ranges are byte offsets into `text` on char boundaries, so every
    /// message that [`SearchFilter::matches`] accepts gets at least one.
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        if self.needle.is_empty() {
            return Vec::new();
        }

        // For each folded byte, the span of the source char it came from
        let mut folded = String::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len());
        for (start, c) in text.char_indices() {
            let end = start + c.len_utf8();
            for lower in c.to_lowercase() {
                folded.push(lower);
                origin.extend(std::iter::repeat_n((start, end), lower.len_utf8()));
            }
        }

        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for (at, m) in folded.match_indices(&self.needle) {
            let start = origin[at].0;
            let end = origin[at + m.len() - 1].1;
            // A char folding to several chars can straddle two matches
            match ranges.last_mut() {
                Some(last) if start < last.1 => last.1 = last.1.max(end),
                _ => ranges.push((start, end)),
            }
        }
        ranges
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }
}

/// Per-char lowercase, so folded offsets map back to source chars
fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Whether `record` is visible under `filter`
pub fn matches(record: &LogRecord, filter: &FilterState) -> bool {
    SearchFilter::from_state(filter).matches(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use journalscope_types::Severity;

    fn record(message: &str) -> LogRecord {
        LogRecord::new(
            Severity::Info,
            String::new(),
            message.to_string(),
            format!("2024-01-01T00:00:00 {}", message),
        )
    }

    #[test]
    fn test_empty_matches_everything() {
        let filter = SearchFilter::new("");
        assert!(filter.is_empty());
        assert!(filter.matches(&record("")));
        assert!(filter.matches(&record("anything")));
    }

    #[test]
    fn test_case_insensitive_substring() {
        let filter = SearchFilter::new("SSHD");
        assert!(filter.matches(&record("sshd[12]: session opened")));
        assert!(filter.matches(&record("started SshD")));
        assert!(!filter.matches(&record("cron: job")));
    }

    #[test]
    fn test_matches_message_not_raw() {
        // The raw line carries a timestamp the message does not
        let filter = SearchFilter::new("2024-01-01");
        assert!(!filter.matches(&record("hello")));
    }

    #[test]
    fn test_severity_is_not_filtered_locally() {
        let state = FilterState {
            min_severity: Some(Severity::Emerg),
            ..Default::default()
        };
        let mut debug = record("noise");
        debug.severity = Severity::Debug;
        assert!(matches(&debug, &state));
    }

    #[test]
    fn test_find_matches() {
        let filter = SearchFilter::new("error");
        let matches = filter.find_matches("an Error occurred, another error here");
        assert_eq!(matches, vec![(3, 8), (27, 32)]);
    }

    #[test]
    fn test_find_matches_non_ascii() {
        let filter = SearchFilter::new("ÉCHEC");
        let text = "Tâche: échec, puis ÉCHEC";
        assert!(filter.matches(&record(text)));

        let matches = filter.find_matches(text);
        assert_eq!(matches.len(), 2);
        for (start, end) in matches {
            assert_eq!(text[start..end].to_lowercase(), "échec");
        }
    }

    #[test]
    fn test_find_matches_when_folding_changes_length() {
        // U+0130 lowercases to two chars
        let filter = SearchFilter::new("i");
        let text = "\u{130}stanbul";
        assert!(filter.matches(&record(text)));
        assert_eq!(filter.find_matches(text), vec![(0, 2)]);
    }
}
