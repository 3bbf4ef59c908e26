use crate::data::data_view::DataView;
use crate::data::table_model::TableModel;
use crate::filter::manager::CombinationMode;
use crate::filter::rule::FilterRule;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKind {
    /// The full data set; always first, never closed
    Base,
    /// Snapshot of base rows matching one rule set
    Rule,
    /// Rows matching (or missing) every rule tab
    Filtered,
    /// User snapshot of another tab
    Custom,
    /// Table loaded from a separate file
    File,
}

impl TabKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabKind::Base => "base",
            TabKind::Rule => "rule",
            TabKind::Filtered => "filtered",
            TabKind::Custom => "custom",
            TabKind::File => "file",
        }
    }

    /// Tabs that carry their own editable rule list
    pub fn owns_filters(&self) -> bool {
        matches!(self, TabKind::Rule | TabKind::Custom | TabKind::File)
    }
}

impl FromStr for TabKind {
    type Err = String;

    /// "filter" is the older name for rule tabs
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base" => Ok(TabKind::Base),
            "rule" | "filter" => Ok(TabKind::Rule),
            "filtered" => Ok(TabKind::Filtered),
            "custom" => Ok(TabKind::Custom),
            "file" => Ok(TabKind::File),
            other => Err(format!("unknown tab type '{}'", other)),
        }
    }
}

impl fmt::Display for TabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tab: its rules, its view and, for every kind but base, its own table
///
/// Rules, mode and view only change through `Workspace`, which keeps the
/// derived tabs and the saved layout in step with them.
#[derive(Debug)]
pub struct Tab {
    pub id: TabId,
    pub name: String,
    pub kind: TabKind,
    pub file_path: Option<PathBuf>,
    pub(super) filters: Vec<FilterRule>,
    pub(super) mode: CombinationMode,
    pub(super) model: Option<TableModel>,
    pub(super) view: DataView,
}

impl Tab {
    pub(super) fn new(id: TabId, name: impl Into<String>, kind: TabKind, model: Option<TableModel>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            filters: Vec::new(),
            mode: CombinationMode::All,
            file_path: None,
            model,
            view: DataView::new(),
        }
    }

    pub fn filters(&self) -> &[FilterRule] {
        &self.filters
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    pub fn view(&self) -> &DataView {
        &self.view
    }

    /// The tab's own model, or the shared base model
    pub fn model<'a>(&'a self, base: &'a TableModel) -> &'a TableModel {
        self.model.as_ref().unwrap_or(base)
    }

    pub fn owns_model(&self) -> bool {
        self.model.is_some()
    }

    pub(super) fn refresh(&mut self, base: &TableModel) {
        let model = self.model.as_ref().unwrap_or(base);
        self.view.refresh(model);
    }

    /// Refresh the view only when its model or criteria changed since
    pub(super) fn sync(&mut self, base: &TableModel) -> bool {
        let model = self.model.as_ref().unwrap_or(base);
        self.view.sync(model)
    }

    /// Apply the workspace search, dropping the column when this table lacks it
    pub(super) fn apply_search(&mut self, text: &str, column: Option<&str>, base: &TableModel) {
        let model = self.model.as_ref().unwrap_or(base);
        let column = column
            .filter(|c| model.column_for_label(c).is_some())
            .map(str::to_string);
        self.view.set_search(text, column);
        self.view.refresh(model);
    }

    /// Append unless a structurally equal rule is already present
    pub(super) fn push_filter(&mut self, rule: FilterRule) -> bool {
        if self.filters.contains(&rule) {
            return false;
        }
        self.filters.push(rule);
        true
    }

    pub fn has_filter(&self, rule: &FilterRule) -> bool {
        self.filters.contains(rule)
    }
}
