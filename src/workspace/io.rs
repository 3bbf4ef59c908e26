//! Files in and out of the workspace: loading, export, archives, presets
//! and the saved tab layout.

use super::{mask_rows, Workspace, WorkspaceError, BASE_TAB_INDEX};
use crate::data::archive::ArchiveStore;
use crate::data::data_exporter::{DataExporter, ExportOptions, SheetLayout};
use crate::data::datatable::DataTable;
use crate::data::datatable_loaders::{add_date_column, load_table, LoadOptions, LoadOutcome};
use crate::data::merge::merge_tables;
use crate::filter::manager::CombinationMode;
use crate::filter::rule::FilterRule;
use crate::presets::FilterPreset;
use crate::workspace::state::{AppState, TabEntry, TabState, FILTERED_MATCHED, FILTERED_UNMATCHED};
use crate::workspace::tab::TabKind;
use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info, warn};

const RESTORED_RULES_TAB: &str = "Restored Rules";

/// What to do with a file loaded while the base tab already holds data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    /// Append to the base table, dropping duplicate rows
    Merge,
    Replace,
    /// Open the file in its own tab
    NewTab,
}

impl FromStr for LoadAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("--").to_lowercase().as_str() {
            "merge" => Ok(LoadAction::Merge),
            "replace" => Ok(LoadAction::Replace),
            "new-tab" | "newtab" | "new_tab" => Ok(LoadAction::NewTab),
            other => Err(format!("unknown load action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadReport {
    /// Workbook with several sheets; load again naming one
    NeedsSheet(Vec<String>),
    Loaded {
        action: Option<LoadAction>,
        rows: usize,
        total: usize,
        archive: Option<PathBuf>,
    },
    NewTab {
        index: usize,
        rows: usize,
    },
}

/// Which rows `export` writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// The whole base table
    All,
    /// Rows the tab currently shows
    Tab,
    /// The tab's highlighted rows
    Filtered,
}

impl FromStr for ExportScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ExportScope::All),
            "tab" | "current" => Ok(ExportScope::Tab),
            "filtered" | "highlighted" => Ok(ExportScope::Filtered),
            other => Err(format!("unknown export scope '{}'", other)),
        }
    }
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportScope::All => "all",
            ExportScope::Tab => "tab",
            ExportScope::Filtered => "filtered",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub loaded_file: Option<PathBuf>,
    /// Last file recorded in the state but gone from disk
    pub missing_file: Option<PathBuf>,
    pub tabs_restored: usize,
    pub skipped: Vec<String>,
}

impl Workspace {
    fn load_options(&self, sheet: Option<&str>) -> LoadOptions {
        LoadOptions {
            sheet: sheet.map(str::to_string),
            inference_threshold: self.settings.inference_threshold,
        }
    }

    /// Load a file, taking the first sheet of a multi-sheet workbook
    fn load_first_sheet(&self, path: &Path) -> Result<DataTable> {
        let mut table = match load_table(path, &self.load_options(None))? {
            LoadOutcome::Loaded(table) => table,
            LoadOutcome::NeedsSheet(sheets) => {
                let first = sheets
                    .first()
                    .ok_or_else(|| anyhow!("{} has no sheets", path.display()))?;
                match load_table(path, &self.load_options(Some(first.as_str())))? {
                    LoadOutcome::Loaded(table) => table,
                    LoadOutcome::NeedsSheet(_) => {
                        return Err(anyhow!("Could not read sheet '{}' of {}", first, path.display()))
                    }
                }
            }
        };
        add_date_column(&mut table);
        Ok(table)
    }

    /// Load a data file into the workspace
    ///
    /// With an empty base tab the file becomes the base table. Otherwise
    /// `action` says whether to merge, replace or open a new tab; leaving it
    /// out is `WorkspaceError::LoadActionRequired`. Nothing changes when
    /// reading or merging fails.
    pub fn load_file(
        &mut self,
        path: &Path,
        sheet: Option<&str>,
        action: Option<LoadAction>,
    ) -> Result<LoadReport> {
        let mut incoming = match load_table(path, &self.load_options(sheet))? {
            LoadOutcome::Loaded(table) => table,
            LoadOutcome::NeedsSheet(sheets) => return Ok(LoadReport::NeedsSheet(sheets)),
        };
        add_date_column(&mut incoming);
        let rows = incoming.row_count();

        let action = if self.has_data() {
            Some(action.ok_or(WorkspaceError::LoadActionRequired {
                existing: self.base.row_count(),
                incoming: rows,
            })?)
        } else {
            None
        };

        match action {
            Some(LoadAction::NewTab) => {
                let index = self.create_file_tab(incoming, path, None)?;
                return Ok(LoadReport::NewTab { index, rows });
            }
            Some(LoadAction::Merge) => {
                let merged = merge_tables(self.base.table(), &incoming)?;
                self.replace_base_table(merged);
            }
            Some(LoadAction::Replace) | None => self.replace_base_table(incoming),
        }

        self.current_file = Some(path.to_path_buf());
        info!(
            target: "workspace",
            "Loaded {} rows from {} ({} in base table)",
            rows,
            path.display(),
            self.base.row_count()
        );

        let archive = if self.settings.archive_on_load {
            self.try_archive()
        } else {
            None
        };
        self.commit();

        Ok(LoadReport::Loaded {
            action,
            rows,
            total: self.base.row_count(),
            archive,
        })
    }

    /// Replace the base table with an archive's full data
    pub fn open_archive(&mut self, path: &Path) -> Result<usize> {
        let store = match &self.archives {
            Some(store) => store.clone(),
            None => ArchiveStore::new(path.parent().unwrap_or(Path::new("."))),
        };
        let table = store.open(path, self.settings.inference_threshold)?;
        let rows = table.row_count();

        self.replace_base_table(table);
        self.current_file = Some(path.to_path_buf());
        self.commit();
        info!(target: "workspace", "Opened archive {} ({} rows)", path.display(), rows);
        Ok(rows)
    }

    pub fn archive_store(&self) -> Option<&ArchiveStore> {
        self.archives.as_ref()
    }

    /// Snapshot the base table with the rule-tab highlighting
    ///
    /// `None` without an archive store or without data.
    pub fn archive_snapshot(&self) -> Result<Option<PathBuf>> {
        let Some(store) = &self.archives else {
            return Ok(None);
        };
        if !self.has_data() {
            return Ok(None);
        }

        let (filters, mode) = self.filter_context(BASE_TAB_INDEX)?;
        let options = ExportOptions {
            layout: SheetLayout::Split,
            filters: Some(&filters),
            mode,
            mask: Some(&self.union_mask),
        };
        store.create_snapshot(self.base.table(), &options).map(Some)
    }

    fn try_archive(&self) -> Option<PathBuf> {
        match self.archive_snapshot() {
            Ok(path) => path,
            Err(e) => {
                error!(target: "archive", "Archive snapshot failed: {:#}", e);
                None
            }
        }
    }

    fn export_rows(
        &self,
        index: usize,
        rows: &[usize],
        path: &Path,
        layout: SheetLayout,
    ) -> Result<String> {
        let tab = self.tab(index)?;
        let table = tab.model(&self.base).table().select_rows(rows);
        let (filters, mode) = self.filter_context(index)?;

        // Base rows carry the union of every rule tab
        let base_mask: Option<Vec<bool>> = (tab.kind == TabKind::Base).then(|| {
            rows.iter()
                .map(|&row| self.union_mask.get(row).copied().unwrap_or(false))
                .collect()
        });

        let options = ExportOptions {
            layout,
            filters: Some(&filters),
            mode,
            mask: base_mask.as_deref(),
        };
        DataExporter::export(&table, path, &options)
    }

    /// Write a tab's rows to `path`, format chosen by extension
    pub fn export(&self, index: usize, scope: ExportScope, path: &Path) -> Result<String> {
        match scope {
            ExportScope::All => {
                let rows: Vec<usize> = (0..self.base.row_count()).collect();
                self.export_rows(BASE_TAB_INDEX, &rows, path, SheetLayout::Single)
            }
            ExportScope::Tab => {
                let rows = self.tab(index)?.view.visible_rows().to_vec();
                self.export_rows(index, &rows, path, SheetLayout::Single)
            }
            ExportScope::Filtered => {
                let rows = mask_rows(&self.tab_highlight_mask(index)?);
                self.export_rows(index, &rows, path, SheetLayout::Single)
            }
        }
    }

    /// Save the visible rows split into ALL/HIGHLIGHTED/UNHIGHLIGHTED sheets
    pub fn save_view(&self, index: usize, path: &Path) -> Result<String> {
        let rows = self.tab(index)?.view.visible_rows().to_vec();
        self.export_rows(index, &rows, path, SheetLayout::Split)
    }

    /// Rules a preset saved from this tab would hold
    pub fn preset_filters(&self, index: usize) -> Result<Vec<FilterRule>, WorkspaceError> {
        let filters = self.display_filters(index)?;
        if filters.is_empty() {
            return Err(WorkspaceError::NoFilters);
        }
        Ok(filters)
    }

    /// Apply a preset, returning the tab that received its rules
    ///
    /// On the base tab the preset opens a rule tab named after it. On other
    /// tabs its rules replace the tab's own.
    pub fn apply_preset(&mut self, index: usize, preset: &FilterPreset) -> Result<usize, WorkspaceError> {
        let kind = self.tab(index)?.kind;
        if kind == TabKind::Filtered {
            return Err(WorkspaceError::FilteredTabNotEditable);
        }
        if preset.filters.is_empty() {
            return Err(WorkspaceError::NoFilters);
        }
        self.require_data(index)?;

        let target = if kind == TabKind::Base {
            let created =
                self.create_rule_tab(preset.filters.clone(), Some(preset.name.clone()), CombinationMode::All)?;
            self.refresh_rule_state();
            created
        } else {
            let tab = &mut self.tabs[index];
            tab.filters.clear();
            for rule in &preset.filters {
                tab.push_filter(rule.clone());
            }
            self.filters_changed(index);
            index
        };

        info!(
            target: "presets",
            "Applied preset '{}' ({} rules)",
            preset.name,
            preset.filters.len()
        );
        self.commit();
        Ok(target)
    }

    /// The layout as it would be written to the state file
    pub fn snapshot_state(&self) -> AppState {
        let tabs = self
            .tabs
            .iter()
            .filter(|tab| tab.kind != TabKind::Filtered)
            .map(|tab| {
                let mut state = TabState::new(&tab.name, tab.kind, &tab.filters, tab.mode);
                state.file_path = tab.file_path.clone();
                TabEntry::Full(state)
            })
            .collect();

        AppState {
            last_file: self.current_file.clone(),
            filtered_tab_mode: if self.filtered_show_matches {
                FILTERED_MATCHED
            } else {
                FILTERED_UNMATCHED
            }
            .to_string(),
            tabs,
            filters: Vec::new(),
        }
    }

    /// Write the layout to the attached store; failures are logged only
    pub fn save_state(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.snapshot_state()) {
                warn!(target: "state", "Failed to save state: {:#}", e);
            }
        }
    }

    /// Rebuild the workspace from a saved layout
    ///
    /// Reloads the last file when it still exists, then recreates rule,
    /// custom and file tabs. Rules on columns the table no longer has are
    /// dropped; a rule tab left with none is skipped.
    pub fn restore(&mut self, state: &AppState) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        self.filtered_show_matches = state.filtered_show_matches();

        if let Some(path) = &state.last_file {
            if path.exists() {
                let table = self.load_first_sheet(path)?;
                self.replace_base_table(table);
                self.current_file = Some(path.clone());
                report.loaded_file = Some(path.clone());
            } else {
                warn!(target: "state", "Last file {} no longer exists", path.display());
                report.missing_file = Some(path.clone());
            }
        }

        let mut base_named = false;
        let mut saw_full_tabs = false;
        for (position, entry) in state.tabs.iter().enumerate() {
            let saved = match entry {
                TabEntry::Name(name) => {
                    if position == 0 && !name.trim().is_empty() {
                        self.tabs[BASE_TAB_INDEX].name = name.clone();
                        base_named = true;
                    }
                    continue;
                }
                TabEntry::Full(saved) => saved,
            };
            saw_full_tabs = true;

            match saved.tab_kind() {
                Some(TabKind::Base) => {
                    if !base_named && !saved.name.trim().is_empty() {
                        self.tabs[BASE_TAB_INDEX].name = saved.name.clone();
                        base_named = true;
                    }
                }
                Some(kind) if self.has_data() => match self.restore_tab(saved, kind) {
                    Ok(true) => report.tabs_restored += 1,
                    Ok(false) => report.skipped.push(saved.name.clone()),
                    Err(e) => {
                        warn!(target: "state", "Could not restore tab '{}': {:#}", saved.name, e);
                        report.skipped.push(saved.name.clone());
                    }
                },
                _ => report.skipped.push(saved.name.clone()),
            }
        }

        if !saw_full_tabs && self.has_data() {
            let rules = self.base_rules(state.legacy_filters());
            if !rules.is_empty() {
                self.create_rule_tab(rules, Some(RESTORED_RULES_TAB.to_string()), CombinationMode::All)?;
                report.tabs_restored += 1;
            }
        }

        self.refresh_rule_state();
        self.commit();
        info!(
            target: "state",
            "Restored {} tab(s), skipped {}",
            report.tabs_restored,
            report.skipped.len()
        );
        Ok(report)
    }

    fn base_rules(&self, rules: Vec<FilterRule>) -> Vec<FilterRule> {
        rules
            .into_iter()
            .filter(|rule| self.base.table().has_column(rule.column()))
            .collect()
    }

    /// Recreate one saved tab; `Ok(false)` when nothing was left to restore
    fn restore_tab(&mut self, saved: &TabState, kind: TabKind) -> Result<bool> {
        let index = match kind {
            TabKind::Rule => {
                let rules = self.base_rules(saved.rules());
                if rules.is_empty() {
                    return Ok(false);
                }
                self.create_rule_tab(rules, Some(saved.name.clone()), saved.mode())?;
                return Ok(true);
            }
            TabKind::Custom => self.insert_custom_tab(&saved.name, BASE_TAB_INDEX)?,
            TabKind::File => {
                let Some(path) = saved.file_path.as_deref().filter(|p| p.exists()) else {
                    warn!(target: "state", "File for tab '{}' is missing", saved.name);
                    return Ok(false);
                };
                let table = self.load_first_sheet(path)?;
                self.insert_file_tab(table, path, Some(&saved.name))?
            }
            TabKind::Base | TabKind::Filtered => return Ok(false),
        };

        let tab = &mut self.tabs[index];
        let columns = tab.model(&self.base).table().column_names();
        tab.filters = saved
            .rules()
            .into_iter()
            .filter(|rule| columns.iter().any(|c| c == rule.column()))
            .collect();
        tab.mode = saved.mode();
        self.apply_tab_filters(index);
        Ok(true)
    }

    /// Read the attached state file and restore it
    ///
    /// A missing or unreadable file starts an empty workspace.
    pub fn restore_from_store(&mut self) -> Result<Option<RestoreReport>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(target: "state", "Ignoring saved state: {:#}", e);
                return Ok(None);
            }
        };
        self.restore(&state).map(Some)
    }

    /// Save the layout and, when configured, write a final archive
    pub fn on_exit(&self) -> Option<PathBuf> {
        self.save_state();
        if self.settings.archive_on_exit {
            self.try_archive()
        } else {
            None
        }
    }
}
