//! JSON state file: last file, Filtered tab mode and the tab layout.

use crate::filter::manager::CombinationMode;
use crate::filter::rule::FilterRule;
use crate::workspace::tab::TabKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FILTERED_MATCHED: &str = "matched";
pub const FILTERED_UNMATCHED: &str = "unmatched";

fn default_filtered_mode() -> String {
    FILTERED_MATCHED.to_string()
}

fn default_filter_mode() -> String {
    CombinationMode::All.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub last_file: Option<PathBuf>,

    /// "matched" or "unmatched"; anything else reads as matched
    #[serde(default = "default_filtered_mode")]
    pub filtered_tab_mode: String,

    #[serde(default)]
    pub tabs: Vec<TabEntry>,

    /// Rules saved before tabs carried their own lists
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<JsonValue>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            last_file: None,
            filtered_tab_mode: default_filtered_mode(),
            tabs: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl AppState {
    pub fn filtered_show_matches(&self) -> bool {
        self.filtered_tab_mode != FILTERED_UNMATCHED
    }

    /// Top-level rules from the older format, bad entries skipped
    pub fn legacy_filters(&self) -> Vec<FilterRule> {
        parse_rules(&self.filters, "legacy filters")
    }
}

/// A tab as written to disk; very old files only stored tab names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TabEntry {
    Full(TabState),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabState {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub filters: Vec<JsonValue>,

    #[serde(default = "default_filter_mode")]
    pub filter_mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Single rule written by older versions
    #[serde(default, skip_serializing)]
    pub filter: Option<JsonValue>,
}

impl TabState {
    pub fn new(name: &str, kind: TabKind, filters: &[FilterRule], mode: CombinationMode) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.as_str().to_string(),
            filters: filters.iter().map(FilterRule::to_value).collect(),
            filter_mode: mode.to_string(),
            file_path: None,
            filter: None,
        }
    }

    pub fn tab_kind(&self) -> Option<TabKind> {
        self.kind.parse().ok()
    }

    pub fn mode(&self) -> CombinationMode {
        CombinationMode::parse_lenient(&self.filter_mode)
    }

    /// Saved rules; falls back to the single `filter` key when `filters` is empty
    pub fn rules(&self) -> Vec<FilterRule> {
        if self.filters.is_empty() {
            if let Some(single) = &self.filter {
                return parse_rules(std::slice::from_ref(single), &self.name);
            }
        }
        parse_rules(&self.filters, &self.name)
    }
}

fn parse_rules(values: &[JsonValue], owner: &str) -> Vec<FilterRule> {
    values
        .iter()
        .filter_map(|value| match FilterRule::from_value(value) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(target: "state", "Skipping saved rule in '{}': {}", owner, e);
                None
            }
        })
        .collect()
}

/// Reads and writes the state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no state has been saved yet
    pub fn load(&self) -> Result<Option<AppState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let state = serde_json::from_str(&contents)
            .with_context(|| format!("State file {} is corrupt", self.path.display()))?;
        Ok(Some(state))
    }

    /// Write through a temp file so an interrupted save keeps the old state
    pub fn save(&self, state: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(target: "state", "Saved {} tabs to {}", state.tabs.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::NumericOperator;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("app_state.json"));
        assert!(store.load().unwrap().is_none());

        let rule = FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5);
        let mut file_tab = TabState::new("other.csv", TabKind::File, &[], CombinationMode::All);
        file_tab.file_path = Some(dir.path().join("other.csv"));
        let state = AppState {
            last_file: Some(dir.path().join("students.csv")),
            filtered_tab_mode: FILTERED_UNMATCHED.to_string(),
            tabs: vec![
                TabEntry::Full(TabState::new("All Students", TabKind::Base, &[], CombinationMode::All)),
                TabEntry::Full(TabState::new("GPA >= 3.5", TabKind::Rule, &[rule.clone()], CombinationMode::Any)),
                TabEntry::Full(file_tab),
            ],
            filters: Vec::new(),
        };
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!loaded.filtered_show_matches());

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"type\": \"rule\""));

        let TabEntry::Full(rule_tab) = &loaded.tabs[1] else {
            panic!("expected full tab entry");
        };
        assert_eq!(rule_tab.rules(), vec![rule]);
        assert_eq!(rule_tab.mode(), CombinationMode::Any);
    }

    #[test]
    fn test_legacy_shapes() {
        let raw = r#"{
            "last_file": "students.xlsx",
            "filtered_tab_mode": "something-else",
            "filters": [{"type": "text", "column": "Status", "tokens": ["Active"], "case_sensitive": false}],
            "tabs": [
                {"name": "Old", "type": "filter", "filter": {"type": "numeric", "column": "GPA", "operator": ">", "value": 3.0}},
                {"name": "Broken", "type": "rule", "filters": [{"type": "mystery"}], "filter_mode": "bogus"},
                "Just A Name"
            ]
        }"#;
        let state: AppState = serde_json::from_str(raw).unwrap();

        assert!(state.filtered_show_matches());
        assert_eq!(state.legacy_filters().len(), 1);

        let TabEntry::Full(old) = &state.tabs[0] else {
            panic!("expected full tab entry");
        };
        assert_eq!(old.tab_kind(), Some(TabKind::Rule));
        assert_eq!(
            old.rules(),
            vec![FilterRule::numeric("GPA", NumericOperator::Greater, 3.0)]
        );

        let TabEntry::Full(broken) = &state.tabs[1] else {
            panic!("expected full tab entry");
        };
        assert!(broken.rules().is_empty());
        assert_eq!(broken.mode(), CombinationMode::All);

        assert_eq!(state.tabs[2], TabEntry::Name("Just A Name".to_string()));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app_state.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(StateStore::new(&path).load().is_err());
    }
}
