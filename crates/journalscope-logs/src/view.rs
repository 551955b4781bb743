use journalscope_types::{FilterState, LevelCounts, LogRecord};

use crate::filter::SearchFilter;

/// Accumulated records plus the subset visible under the current filter
///
/// Owned by a single context; every mutation keeps `visible` equal to the
/// records that pass the current search filter, in arrival order.
#[derive(Debug, Default)]
pub struct ViewState {
    /// All records, in arrival order
    records: Vec<LogRecord>,

    /// Filter the visible set was computed against
    filter: FilterState,

    /// Compiled search text of `filter`
    search: SearchFilter,

    /// Indices into `records` that pass `search`
    visible: Vec<usize>,
}

impl ViewState {
    pub fn new(filter: FilterState) -> Self {
        let search = SearchFilter::from_state(&filter);
        Self {
            records: Vec::new(),
            filter,
            search,
            visible: Vec::new(),
        }
    }

    /// Clear all records
    pub fn reset(&mut self) {
        self.records.clear();
        self.visible.clear();
    }

    /// Add a record, showing it if it passes the current filter
    pub fn append(&mut self, record: LogRecord) {
        if self.search.matches(&record) {
            self.visible.push(self.records.len());
        }
        self.records.push(record);
    }

    pub fn extend<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = LogRecord>,
    {
        for record in records {
            self.append(record);
        }
    }

    /// Replace the filter and recompute the visible set from scratch
    pub fn set_filter(&mut self, filter: FilterState) {
        self.search = SearchFilter::from_state(&filter);
        self.filter = filter;
        self.recompute();
    }

    /// Change only the search text
    pub fn set_search(&mut self, text: &str) {
        if text == self.filter.search_text {
            return;
        }
        self.filter.search_text = text.to_string();
        self.search = SearchFilter::new(text);
        self.recompute();
    }

    fn recompute(&mut self) {
        let search = &self.search;
        self.visible = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| search.matches(r))
            .map(|(i, _)| i)
            .collect();
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    /// All records
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Records passing the current filter
    pub fn visible(&self) -> impl Iterator<Item = &LogRecord> + '_ {
        self.visible.iter().map(|&i| &self.records[i])
    }

    /// Get visible records in a range (for virtual scrolling)
    pub fn visible_range(&self, start: usize, count: usize) -> impl Iterator<Item = &LogRecord> + '_ {
        self.visible
            .iter()
            .skip(start)
            .take(count)
            .map(|&i| &self.records[i])
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    /// Total record count
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Original lines of every record, filtered or not
    pub fn raw_lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().map(|r| r.raw.as_str())
    }

    /// Export all records as newline-joined raw lines
    pub fn export_raw(&self) -> String {
        self.raw_lines().collect::<Vec<_>>().join("\n")
    }

    /// Get record count per severity
    pub fn level_counts(&self) -> LevelCounts {
        let mut counts = LevelCounts::default();
        for record in &self.records {
            counts.add(record.severity);
        }
        counts
    }
}
