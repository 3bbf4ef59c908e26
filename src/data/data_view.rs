use crate::data::table_model::TableModel;
use crate::filter::manager::CombinationMode;
use crate::filter::rule::FilterRule;
use std::fmt;
use std::str::FromStr;

/// Which rows to keep relative to the model's highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HighlightFilter {
    #[default]
    All,
    Highlighted,
    Unhighlighted,
}

impl FromStr for HighlightFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(HighlightFilter::All),
            "highlighted" => Ok(HighlightFilter::Highlighted),
            "unhighlighted" => Ok(HighlightFilter::Unhighlighted),
            other => Err(format!(
                "unknown view mode '{}' (expected all, highlighted or unhighlighted)",
                other
            )),
        }
    }
}

impl fmt::Display for HighlightFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightFilter::All => write!(f, "all"),
            HighlightFilter::Highlighted => write!(f, "highlighted"),
            HighlightFilter::Unhighlighted => write!(f, "unhighlighted"),
        }
    }
}

/// A filtered window onto a `TableModel`
///
/// A row is visible when it passes the text search, the highlight gate and
/// the view's own extra rules, in that order. Visible rows are cached;
/// `sync` recomputes them once the model's revision has moved on or the
/// criteria changed, `refresh` does so unconditionally.
#[derive(Debug, Clone, Default)]
pub struct DataView {
    search_text: String,
    search_column: Option<String>,
    highlight_filter: HighlightFilter,
    extra_filters: Vec<FilterRule>,
    extra_filter_mode: CombinationMode,
    visible_rows: Vec<usize>,
    synced_revision: Option<u64>,
}

impl DataView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view already refreshed against a model
    pub fn for_model(model: &TableModel) -> Self {
        let mut view = Self::new();
        view.refresh(model);
        view
    }

    pub fn set_search(&mut self, text: &str, column: Option<String>) {
        self.search_text = text.trim().to_string();
        self.search_column = column.filter(|c| !c.trim().is_empty());
        self.synced_revision = None;
    }

    pub fn clear_search(&mut self) {
        self.search_text.clear();
        self.search_column = None;
        self.synced_revision = None;
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn search_column(&self) -> Option<&str> {
        self.search_column.as_deref()
    }

    pub fn set_highlight_filter(&mut self, mode: HighlightFilter) {
        self.highlight_filter = mode;
        self.synced_revision = None;
    }

    pub fn highlight_filter(&self) -> HighlightFilter {
        self.highlight_filter
    }

    pub fn set_extra_filters(&mut self, filters: Vec<FilterRule>, mode: CombinationMode) {
        self.extra_filters = filters;
        self.extra_filter_mode = mode;
        self.synced_revision = None;
    }

    pub fn extra_filters(&self) -> &[FilterRule] {
        &self.extra_filters
    }

    pub fn extra_filter_mode(&self) -> CombinationMode {
        self.extra_filter_mode
    }

    fn passes_search(&self, model: &TableModel, row: usize) -> bool {
        if self.search_text.is_empty() {
            return true;
        }

        let needle = self.search_text.to_lowercase();
        let cell_matches = |col: usize| {
            model.table().get_value(row, col).is_some_and(|value| {
                let text = value.to_string();
                !text.is_empty() && text.to_lowercase().contains(&needle)
            })
        };

        match &self.search_column {
            None => (0..model.column_count()).any(cell_matches),
            Some(label) => model.column_for_label(label).is_some_and(cell_matches),
        }
    }

    fn passes_highlight_gate(&self, model: &TableModel, row: usize) -> bool {
        if self.highlight_filter == HighlightFilter::All || !model.filters().has_filters() {
            return true;
        }

        let highlighted = model.is_row_highlighted(row);
        match self.highlight_filter {
            HighlightFilter::Highlighted => highlighted,
            HighlightFilter::Unhighlighted => !highlighted,
            HighlightFilter::All => true,
        }
    }

    fn passes_extra_filters(&self, model: &TableModel, row: usize) -> bool {
        if self.extra_filters.is_empty() {
            return true;
        }

        let evaluate = |rule: &FilterRule| {
            model
                .column_for_label(rule.column())
                .and_then(|col| model.table().get_value(row, col))
                .map(|value| rule.matches(value))
        };

        match self.extra_filter_mode {
            // Rules on missing columns are skipped
            CombinationMode::Any => self
                .extra_filters
                .iter()
                .any(|rule| evaluate(rule) == Some(true)),
            // A missing column fails the row
            CombinationMode::All => self
                .extra_filters
                .iter()
                .all(|rule| evaluate(rule) == Some(true)),
        }
    }

    /// Decide visibility for one source row
    pub fn filter_accepts_row(&self, model: &TableModel, row: usize) -> bool {
        self.passes_search(model, row)
            && self.passes_highlight_gate(model, row)
            && self.passes_extra_filters(model, row)
    }

    /// Recompute the visible rows from the model
    pub fn refresh(&mut self, model: &TableModel) {
        self.visible_rows = (0..model.row_count())
            .filter(|&row| self.filter_accepts_row(model, row))
            .collect();
        self.synced_revision = Some(model.revision());
    }

    /// True when the cached rows predate a change to the model or the criteria
    pub fn is_stale(&self, model: &TableModel) -> bool {
        self.synced_revision != Some(model.revision())
    }

    /// Refresh only if stale; returns whether rows were recomputed
    pub fn sync(&mut self, model: &TableModel) -> bool {
        if !self.is_stale(model) {
            return false;
        }
        self.refresh(model);
        true
    }

    pub fn visible_rows(&self) -> &[usize] {
        &self.visible_rows
    }

    pub fn row_count(&self) -> usize {
        self.visible_rows.len()
    }

    /// Map a visible position back to the model row
    pub fn source_row(&self, visible_index: usize) -> Option<usize> {
        self.visible_rows.get(visible_index).copied()
    }

    /// Visible rows that the model highlights
    pub fn highlighted_count(&self, model: &TableModel) -> usize {
        self.visible_rows
            .iter()
            .filter(|&&row| model.is_row_highlighted(row))
            .count()
    }
}
