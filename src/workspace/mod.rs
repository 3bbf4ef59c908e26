//! Tabs over one shared student table.
//!
//! The base tab shows the loaded table. Adding a rule on the base tab spawns
//! a rule tab holding a snapshot of the matching rows; the union of all rule
//! tabs highlights the base table and feeds the singleton Filtered tab.
//! Custom and file tabs own independent tables and filter them with their
//! own rules. Every mutating call saves the layout when a `StateStore` is
//! attached.

pub mod error;
pub mod io;
pub mod state;
pub mod tab;

pub use error::WorkspaceError;
pub use io::{ExportScope, LoadAction, LoadReport, RestoreReport};
pub use state::{AppState, StateStore, TabEntry, TabState};
pub use tab::{Tab, TabId, TabKind};

use crate::config::BehaviorConfig;
use crate::data::archive::ArchiveStore;
use crate::data::data_view::HighlightFilter;
use crate::data::datatable::{DataTable, DataValue};
use crate::data::table_model::{strip_filter_indicator, TableModel};
use crate::filter::manager::{rules_mask, CombinationMode, FilterManager};
use crate::filter::rule::FilterRule;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const FILTERED_TAB_NAME: &str = "Filtered";
pub const BASE_TAB_INDEX: usize = 0;

/// What `add_filter` did with the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChange {
    /// A rule tab was created at this index
    CreatedTab(usize),
    Added,
    AlreadyPresent,
}

pub struct Workspace {
    base: TableModel,
    tabs: Vec<Tab>,
    current: usize,
    next_id: TabId,
    filtered_show_matches: bool,
    current_file: Option<PathBuf>,
    search_text: String,
    search_column: Option<String>,
    union_mask: Vec<bool>,
    settings: BehaviorConfig,
    store: Option<StateStore>,
    archives: Option<ArchiveStore>,
}

/// Row indices where the mask is set
fn mask_rows(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(row, &hit)| hit.then_some(row))
        .collect()
}

/// Highlight a tab's own table by its own rules, under its own mode
fn apply_own_highlights(tab: &mut Tab) {
    let Some(model) = tab.model.as_mut() else {
        return;
    };

    let applicable: Vec<FilterRule> = tab
        .filters
        .iter()
        .filter(|rule| model.table().has_column(rule.column()))
        .cloned()
        .collect();

    model.filters_mut().clear_all();
    if model.row_count() == 0 || applicable.is_empty() {
        model.set_highlight_mask(None);
        return;
    }

    let mask = rules_mask(&applicable, tab.mode, model.table());
    for rule in applicable {
        model.filters_mut().add_filter(rule);
    }
    model.set_highlight_mask(Some(mask));
}

impl Workspace {
    pub fn new(settings: BehaviorConfig) -> Self {
        let base = TableModel::new(DataTable::new("students"));

        let mut base_tab = Tab::new(0, settings.base_tab_name.clone(), TabKind::Base, None);
        base_tab.mode = settings.default_filter_mode;
        let filtered_tab = Tab::new(
            1,
            FILTERED_TAB_NAME,
            TabKind::Filtered,
            Some(TableModel::new(DataTable::new(FILTERED_TAB_NAME))),
        );

        Self {
            base,
            tabs: vec![base_tab, filtered_tab],
            current: 0,
            next_id: 2,
            filtered_show_matches: true,
            current_file: None,
            search_text: String::new(),
            search_column: None,
            union_mask: Vec::new(),
            settings,
            store: None,
            archives: None,
        }
    }

    /// Save the tab layout after every change
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Write snapshots on load and exit
    pub fn with_archive_store(mut self, archives: ArchiveStore) -> Self {
        self.archives = Some(archives);
        self
    }

    pub fn settings(&self) -> &BehaviorConfig {
        &self.settings
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn tab(&self, index: usize) -> Result<&Tab, WorkspaceError> {
        self.tabs.get(index).ok_or(WorkspaceError::NoSuchTab(index))
    }

    pub fn tab_model(&self, index: usize) -> Result<&TableModel, WorkspaceError> {
        Ok(self.tab(index)?.model(&self.base))
    }

    pub fn base_model(&self) -> &TableModel {
        &self.base
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_tab(&self) -> &Tab {
        &self.tabs[self.current]
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), WorkspaceError> {
        self.tab(index)?;
        self.current = index;
        Ok(())
    }

    pub fn filtered_index(&self) -> Option<usize> {
        self.tabs.iter().position(|t| t.kind == TabKind::Filtered)
    }

    pub fn filtered_show_matches(&self) -> bool {
        self.filtered_show_matches
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    /// Base rows matched by at least one rule tab
    pub fn union_mask(&self) -> &[bool] {
        &self.union_mask
    }

    pub fn has_data(&self) -> bool {
        self.base.row_count() > 0
    }

    pub fn search(&self) -> (&str, Option<&str>) {
        (&self.search_text, self.search_column.as_deref())
    }

    /// "Name (visible rows)" as shown in the tab list
    pub fn tab_title(&self, index: usize) -> Result<String, WorkspaceError> {
        let tab = self.tab(index)?;
        Ok(format!("{} ({})", tab.name, tab.view.row_count()))
    }

    fn alloc_id(&mut self) -> TabId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_tab(&mut self, mut tab: Tab) -> usize {
        tab.apply_search(&self.search_text, self.search_column.as_deref(), &self.base);
        debug!(target: "workspace", "Opened {} tab '{}'", tab.kind, tab.name);
        self.tabs.push(tab);
        self.tabs.len() - 1
    }

    fn remove_tab_at(&mut self, index: usize) -> Tab {
        let tab = self.tabs.remove(index);
        if self.current == index {
            self.current = index.min(self.tabs.len() - 1);
        } else if self.current > index {
            self.current -= 1;
        }
        debug!(target: "workspace", "Closed {} tab '{}'", tab.kind, tab.name);
        tab
    }

    fn rule_tab_indices(&self) -> Vec<usize> {
        self.tabs
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (t.kind == TabKind::Rule).then_some(i))
            .collect()
    }

    fn rule_tab_owning(&self, rule: &FilterRule) -> Option<usize> {
        self.tabs
            .iter()
            .position(|t| t.kind == TabKind::Rule && t.has_filter(rule))
    }

    /// Every rule-tab rule once, in tab order
    fn all_rule_tab_filters(&self) -> Vec<FilterRule> {
        let mut rules: Vec<FilterRule> = Vec::new();
        for tab in self.tabs.iter().filter(|t| t.kind == TabKind::Rule) {
            for rule in &tab.filters {
                if !rules.contains(rule) {
                    rules.push(rule.clone());
                }
            }
        }
        rules
    }

    /// Rules listed for a tab; base and Filtered list the rule tabs' rules
    pub fn display_filters(&self, index: usize) -> Result<Vec<FilterRule>, WorkspaceError> {
        let tab = self.tab(index)?;
        Ok(match tab.kind {
            TabKind::Base | TabKind::Filtered => self.all_rule_tab_filters(),
            _ => tab.filters.clone(),
        })
    }

    /// Rules and mode used to colour an export of this tab
    pub fn filter_context(
        &self,
        index: usize,
    ) -> Result<(FilterManager, CombinationMode), WorkspaceError> {
        let tab = self.tab(index)?;
        let (rules, mode) = match tab.kind {
            TabKind::Base | TabKind::Filtered => (self.all_rule_tab_filters(), CombinationMode::Any),
            _ => (tab.filters.clone(), tab.mode),
        };
        let mut manager = FilterManager::new();
        for rule in rules {
            manager.add_filter(rule);
        }
        Ok((manager, mode))
    }

    /// Which rows of the tab's own table count as highlighted
    pub fn tab_highlight_mask(&self, index: usize) -> Result<Vec<bool>, WorkspaceError> {
        let tab = self.tab(index)?;
        let model = tab.model(&self.base);
        Ok(match tab.kind {
            TabKind::Base => self.union_mask.clone(),
            TabKind::Filtered => vec![false; model.row_count()],
            _ => rules_mask(&tab.filters, tab.mode, model.table()),
        })
    }

    fn require_data(&self, index: usize) -> Result<(), WorkspaceError> {
        if self.tab_model(index)?.column_count() == 0 {
            return Err(WorkspaceError::NoData);
        }
        Ok(())
    }

    fn build_rule_model(&self, filters: &[FilterRule], mode: CombinationMode) -> TableModel {
        let mask = rules_mask(filters, mode, self.base.table());
        self.base.snapshot(&mask_rows(&mask))
    }

    fn create_rule_tab(
        &mut self,
        filters: Vec<FilterRule>,
        name: Option<String>,
        mode: CombinationMode,
    ) -> Result<usize, WorkspaceError> {
        let mut unique: Vec<FilterRule> = Vec::new();
        for rule in filters {
            if !unique.contains(&rule) {
                unique.push(rule);
            }
        }
        let Some(first) = unique.first() else {
            return Err(WorkspaceError::NoFilters);
        };

        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| first.tab_label());
        let model = self.build_rule_model(&unique, mode);
        let id = self.alloc_id();

        let mut tab = Tab::new(id, name, TabKind::Rule, Some(model));
        tab.filters = unique;
        tab.mode = mode;
        apply_own_highlights(&mut tab);

        info!(
            target: "workspace",
            "Rule tab '{}' matches {} rows",
            tab.name,
            tab.model(&self.base).row_count()
        );
        Ok(self.push_tab(tab))
    }

    fn rebuild_rule_tab(&mut self, index: usize) {
        let model = self.build_rule_model(&self.tabs[index].filters, self.tabs[index].mode);
        let tab = &mut self.tabs[index];
        tab.model = Some(model);
        apply_own_highlights(tab);
        tab.apply_search(&self.search_text, self.search_column.as_deref(), &self.base);
    }

    fn rebuild_all_rule_tabs(&mut self) {
        for index in self.rule_tab_indices() {
            self.rebuild_rule_tab(index);
        }
    }

    fn rebuild_filtered_tab(&mut self) {
        let rows: Vec<usize> = self
            .union_mask
            .iter()
            .enumerate()
            .filter_map(|(row, &hit)| (hit == self.filtered_show_matches).then_some(row))
            .collect();
        let model = self.base.snapshot(&rows);

        if let Some(index) = self.filtered_index() {
            let tab = &mut self.tabs[index];
            tab.model = Some(model);
            tab.apply_search(&self.search_text, self.search_column.as_deref(), &self.base);
        }
    }

    /// Recompute the union mask, base highlighting and the Filtered tab
    pub fn refresh_rule_state(&mut self) {
        let union = {
            let table = self.base.table();
            let mut union = vec![false; table.row_count()];
            for tab in self
                .tabs
                .iter()
                .filter(|t| t.kind == TabKind::Rule && !t.filters.is_empty())
            {
                for (slot, hit) in union.iter_mut().zip(rules_mask(&tab.filters, tab.mode, table)) {
                    *slot |= hit;
                }
            }
            union
        };

        let rules = self.all_rule_tab_filters();
        let filters = self.base.filters_mut();
        filters.clear_all();
        for rule in rules {
            filters.add_filter(rule);
        }

        if self.base.row_count() == 0 {
            self.base.set_highlight_mask(None);
        } else {
            self.base.set_highlight_mask(Some(union.clone()));
        }
        debug!(
            target: "workspace",
            "Rule union highlights {} of {} rows",
            union.iter().filter(|&&hit| hit).count(),
            union.len()
        );
        self.union_mask = union;

        self.rebuild_filtered_tab();
        self.refresh_views();
    }

    /// Bring every view whose model or criteria changed up to date
    pub fn refresh_views(&mut self) -> usize {
        let mut refreshed = 0;
        for tab in &mut self.tabs {
            if tab.sync(&self.base) {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Finish a mutation: stale views catch up, then the layout is saved
    fn commit(&mut self) {
        let refreshed = self.refresh_views();
        debug!(target: "workspace", "Refreshed {} stale view(s)", refreshed);
        self.save_state();
    }

    /// Push a custom or file tab's rules into its view and highlighting
    fn apply_tab_filters(&mut self, index: usize) {
        let tab = &mut self.tabs[index];
        tab.view.set_extra_filters(tab.filters.clone(), tab.mode);
        apply_own_highlights(tab);
        tab.refresh(&self.base);
    }

    /// Follow-up after a tab's rule list changed
    fn filters_changed(&mut self, index: usize) {
        match self.tabs[index].kind {
            TabKind::Rule if self.tabs[index].filters.is_empty() => {
                self.remove_tab_at(index);
                self.refresh_rule_state();
            }
            TabKind::Rule => {
                self.rebuild_rule_tab(index);
                self.refresh_rule_state();
            }
            TabKind::Custom | TabKind::File => self.apply_tab_filters(index),
            TabKind::Base | TabKind::Filtered => {}
        }
    }

    /// Swap the base table, keeping rule tabs and re-deriving everything
    fn replace_base_table(&mut self, table: DataTable) {
        self.base.set_table(table);
        self.rebuild_all_rule_tabs();
        self.refresh_rule_state();
        self.apply_search_to_all_tabs();
    }

    /// Add a rule to a tab
    ///
    /// On the base tab this opens a new rule tab using `mode` (or the base
    /// tab's mode). Elsewhere the rule joins the tab's list and `mode`, when
    /// given, replaces the tab's mode.
    pub fn add_filter(
        &mut self,
        index: usize,
        rule: FilterRule,
        mode: Option<CombinationMode>,
    ) -> Result<FilterChange, WorkspaceError> {
        let kind = self.tab(index)?.kind;
        if kind == TabKind::Filtered {
            return Err(WorkspaceError::FilteredTabNotEditable);
        }
        self.require_data(index)?;

        if kind == TabKind::Base {
            let mode = mode.unwrap_or(self.tabs[index].mode);
            let created = self.create_rule_tab(vec![rule], None, mode)?;
            self.refresh_rule_state();
            self.commit();
            return Ok(FilterChange::CreatedTab(created));
        }

        let tab = &mut self.tabs[index];
        let mode_changed = mode.is_some_and(|m| m != tab.mode);
        if let Some(mode) = mode {
            tab.mode = mode;
        }
        let added = tab.push_filter(rule);
        if !added && !mode_changed {
            return Ok(FilterChange::AlreadyPresent);
        }

        self.filters_changed(index);
        self.commit();
        Ok(if added {
            FilterChange::Added
        } else {
            FilterChange::AlreadyPresent
        })
    }

    /// Tab that actually holds the rules listed for `index`
    fn owner_of(&self, index: usize, rule: &FilterRule) -> Result<usize, WorkspaceError> {
        match self.tab(index)?.kind {
            TabKind::Filtered => Err(WorkspaceError::FilteredTabNotEditable),
            TabKind::Base => self
                .rule_tab_owning(rule)
                .ok_or(WorkspaceError::NoSuchFilter),
            _ if self.tabs[index].has_filter(rule) => Ok(index),
            _ => Err(WorkspaceError::NoSuchFilter),
        }
    }

    /// Remove a rule; the last rule of a rule tab takes the tab with it
    pub fn remove_filter(&mut self, index: usize, rule: &FilterRule) -> Result<(), WorkspaceError> {
        let owner = self.owner_of(index, rule)?;
        self.tabs[owner].filters.retain(|r| r != rule);
        self.filters_changed(owner);
        self.commit();
        Ok(())
    }

    /// Replace a rule in place, keeping its position in the list
    pub fn replace_filter(
        &mut self,
        index: usize,
        old: &FilterRule,
        new: FilterRule,
    ) -> Result<(), WorkspaceError> {
        let owner = self.owner_of(index, old)?;
        if *old == new {
            return Ok(());
        }

        let filters = &mut self.tabs[owner].filters;
        if filters.contains(&new) {
            filters.retain(|r| r != old);
        } else if let Some(slot) = filters.iter_mut().find(|r| *r == old) {
            *slot = new;
        }

        self.filters_changed(owner);
        self.commit();
        Ok(())
    }

    /// Drop every rule on a tab, returning how many went
    ///
    /// On the base tab this closes every rule tab; on a rule tab it closes
    /// the tab itself.
    pub fn clear_filters(&mut self, index: usize) -> Result<usize, WorkspaceError> {
        let removed = match self.tab(index)?.kind {
            TabKind::Filtered => return Err(WorkspaceError::FilteredTabNotEditable),
            TabKind::Base => {
                let count = self
                    .tabs
                    .iter()
                    .filter(|t| t.kind == TabKind::Rule)
                    .map(|t| t.filters.len())
                    .sum();
                self.close_rule_tabs();
                count
            }
            _ => {
                let count = self.tabs[index].filters.len();
                self.tabs[index].filters.clear();
                self.filters_changed(index);
                count
            }
        };
        self.commit();
        Ok(removed)
    }

    /// Remove one column's rules; on base and Filtered, from every rule tab
    pub fn clear_column_filters(&mut self, index: usize, column: &str) -> Result<usize, WorkspaceError> {
        let column = strip_filter_indicator(column);
        let targets = match self.tab(index)?.kind {
            TabKind::Base | TabKind::Filtered => self.rule_tab_indices(),
            _ => vec![index],
        };

        let touches_rule_tabs = targets.iter().any(|&t| self.tabs[t].kind == TabKind::Rule);
        let mut removed = 0;
        let mut touched = Vec::new();
        for &target in &targets {
            let filters = &mut self.tabs[target].filters;
            let before = filters.len();
            filters.retain(|r| r.column() != column);
            if filters.len() != before {
                removed += before - filters.len();
                touched.push(target);
            }
        }

        // Highest index first so earlier indices stay valid when rule tabs close
        for &target in touched.iter().rev() {
            match self.tabs[target].kind {
                TabKind::Rule if self.tabs[target].filters.is_empty() => {
                    self.remove_tab_at(target);
                }
                TabKind::Rule => self.rebuild_rule_tab(target),
                _ => self.apply_tab_filters(target),
            }
        }

        if removed > 0 {
            if touches_rule_tabs {
                self.refresh_rule_state();
            }
            info!(target: "workspace", "Removed {} rule(s) on '{}'", removed, column);
            self.commit();
        }
        Ok(removed)
    }

    /// Set how a tab's rules combine; on the base tab this is the mode new rule tabs get
    pub fn set_filter_mode(&mut self, index: usize, mode: CombinationMode) -> Result<(), WorkspaceError> {
        let kind = self.tab(index)?.kind;
        if kind == TabKind::Filtered {
            return Err(WorkspaceError::FilteredTabNotEditable);
        }
        self.tabs[index].mode = mode;
        self.filters_changed(index);
        self.commit();
        Ok(())
    }

    /// The rule tab holding `rule`, created with just that rule when missing
    pub fn open_rule_tab(&mut self, rule: FilterRule) -> Result<usize, WorkspaceError> {
        if let Some(existing) = self.rule_tab_owning(&rule) {
            return Ok(existing);
        }
        self.require_data(BASE_TAB_INDEX)?;
        let mode = self.tabs[BASE_TAB_INDEX].mode;
        let index = self.create_rule_tab(vec![rule], None, mode)?;
        self.refresh_rule_state();
        self.commit();
        Ok(index)
    }

    fn insert_custom_tab(&mut self, name: &str, source: usize) -> Result<usize, WorkspaceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::EmptyTabName);
        }
        let src = self.tab(source)?;
        let snapshot = src.model(&self.base).snapshot(src.view.visible_rows());
        let id = self.alloc_id();
        Ok(self.push_tab(Tab::new(id, name, TabKind::Custom, Some(snapshot))))
    }

    /// Independent copy of the rows `source` currently shows
    pub fn create_custom_tab(&mut self, name: &str, source: usize) -> Result<usize, WorkspaceError> {
        let index = self.insert_custom_tab(name, source)?;
        self.commit();
        Ok(index)
    }

    pub fn duplicate_tab(&mut self, index: usize) -> Result<usize, WorkspaceError> {
        let name = format!("{} Copy", self.tab(index)?.name);
        self.create_custom_tab(&name, index)
    }

    /// Custom tab around a table built elsewhere, e.g. moved rows
    pub fn add_table_tab(&mut self, name: &str, table: DataTable) -> Result<usize, WorkspaceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::EmptyTabName);
        }
        let id = self.alloc_id();
        let index = self.push_tab(Tab::new(id, name, TabKind::Custom, Some(TableModel::new(table))));
        self.commit();
        Ok(index)
    }

    fn insert_file_tab(
        &mut self,
        table: DataTable,
        path: &Path,
        name: Option<&str>,
    ) -> Result<usize, WorkspaceError> {
        if table.row_count() == 0 {
            return Err(WorkspaceError::EmptyTable);
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string())
            });
        let id = self.alloc_id();
        let mut tab = Tab::new(id, name, TabKind::File, Some(TableModel::new(table)));
        tab.file_path = Some(path.to_path_buf());
        Ok(self.push_tab(tab))
    }

    /// Tab for a table loaded from `path`, named after the file unless `name` is given
    pub fn create_file_tab(
        &mut self,
        table: DataTable,
        path: &Path,
        name: Option<&str>,
    ) -> Result<usize, WorkspaceError> {
        let index = self.insert_file_tab(table, path, name)?;
        self.commit();
        Ok(index)
    }

    pub fn rename_tab(&mut self, index: usize, name: &str) -> Result<(), WorkspaceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::EmptyTabName);
        }
        self.tab(index)?;
        self.tabs[index].name = name.to_string();
        self.commit();
        Ok(())
    }

    pub fn close_tab(&mut self, index: usize) -> Result<(), WorkspaceError> {
        match self.tab(index)?.kind {
            TabKind::Base => return Err(WorkspaceError::BaseTabNotClosable),
            TabKind::Filtered => return Err(WorkspaceError::FilteredTabNotClosable),
            TabKind::Rule => {
                self.remove_tab_at(index);
                self.refresh_rule_state();
            }
            TabKind::Custom | TabKind::File => {
                self.remove_tab_at(index);
            }
        }
        self.commit();
        Ok(())
    }

    fn close_rule_tabs(&mut self) -> usize {
        let indices = self.rule_tab_indices();
        for &index in indices.iter().rev() {
            self.remove_tab_at(index);
        }
        self.refresh_rule_state();
        indices.len()
    }

    /// Close every rule tab, keeping base, Filtered, custom and file tabs
    pub fn close_all_rule_tabs(&mut self) -> usize {
        let closed = self.close_rule_tabs();
        self.commit();
        closed
    }

    /// Filtered tab shows rows matching the rule tabs, or the rest
    pub fn set_filtered_show_matches(&mut self, show_matches: bool) {
        self.filtered_show_matches = show_matches;
        self.refresh_rule_state();
        self.commit();
    }

    fn apply_search_to_all_tabs(&mut self) {
        for tab in &mut self.tabs {
            tab.apply_search(&self.search_text, self.search_column.as_deref(), &self.base);
        }
    }

    /// Search every tab; a column a tab lacks falls back to all columns there
    pub fn set_search(&mut self, text: &str, column: Option<&str>) {
        self.search_text = text.to_string();
        self.search_column = column.map(|c| strip_filter_indicator(c).to_string());
        self.apply_search_to_all_tabs();
    }

    pub fn clear_search(&mut self) {
        self.set_search("", None);
    }

    pub fn set_view_mode(&mut self, index: usize, mode: HighlightFilter) -> Result<(), WorkspaceError> {
        self.tab(index)?;
        let tab = &mut self.tabs[index];
        tab.view.set_highlight_filter(mode);
        tab.refresh(&self.base);
        Ok(())
    }

    /// Reorder a tab's table on one column
    pub fn sort_tab(&mut self, index: usize, column: &str, ascending: bool) -> Result<()> {
        let kind = self.tab(index)?.kind;
        match self.tabs[index].model.as_mut() {
            Some(model) => model.sort_by(column, ascending)?,
            None => self.base.sort_by(column, ascending)?,
        }

        if kind == TabKind::Base {
            // Union positions follow the base rows
            self.refresh_rule_state();
        } else {
            self.tabs[index].refresh(&self.base);
        }
        Ok(())
    }

    fn highlighted_base_rows(&self, index: usize) -> Result<DataTable, WorkspaceError> {
        if self.tab(index)?.kind != TabKind::Base {
            return Err(WorkspaceError::BaseTabOnly);
        }
        if !self.union_mask.iter().any(|&hit| hit) {
            return Err(WorkspaceError::NoHighlightedRows);
        }
        Ok(self.base.table().select_by_mask(&self.union_mask, true))
    }

    /// Take the highlighted rows out of the base table
    pub fn move_highlighted(&mut self, index: usize) -> Result<DataTable, WorkspaceError> {
        let highlighted = self.highlighted_base_rows(index)?;
        let mut remaining = self.base.table().clone();
        remaining.remove_by_mask(&self.union_mask);
        info!(
            target: "workspace",
            "Moved {} highlighted rows out of the base table",
            highlighted.row_count()
        );
        self.replace_base_table(remaining);
        self.commit();
        Ok(highlighted)
    }

    /// Copy of the highlighted base rows
    pub fn copy_highlighted(&self, index: usize) -> Result<DataTable, WorkspaceError> {
        self.highlighted_base_rows(index)
    }

    /// Edit the cell at a visible row of a tab, coercing the input to the column type
    pub fn edit_cell(
        &mut self,
        index: usize,
        visible_row: usize,
        column: &str,
        input: &str,
    ) -> Result<DataValue> {
        let tab = self.tab(index)?;
        let row = tab
            .view
            .source_row(visible_row)
            .ok_or(WorkspaceError::RowOutOfRange {
                row: visible_row,
                visible: tab.view.row_count(),
            })?;

        let kind = tab.kind;
        let value = match self.tabs[index].model.as_mut() {
            Some(model) => model.set_cell(row, column, input)?,
            None => self.base.set_cell(row, column, input)?,
        };

        match kind {
            TabKind::Base => {
                self.rebuild_all_rule_tabs();
                self.refresh_rule_state();
            }
            TabKind::Custom | TabKind::File => self.apply_tab_filters(index),
            TabKind::Rule => {
                let tab = &mut self.tabs[index];
                apply_own_highlights(tab);
                tab.refresh(&self.base);
            }
            TabKind::Filtered => self.tabs[index].refresh(&self.base),
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::NumericOperator;

    fn text(value: &str) -> DataValue {
        DataValue::String(value.to_string())
    }

    fn students() -> DataTable {
        DataTable::from_rows(
            "students",
            &["Name", "GPA", "Scholarship", "Status"],
            vec![
                vec![text("Ada"), DataValue::Float(3.6), DataValue::Integer(0), text("Active")],
                vec![text("Ben"), DataValue::Float(2.0), DataValue::Integer(500), text("Probation")],
                vec![text("Cy"), DataValue::Float(3.9), DataValue::Integer(1000), text("Active")],
                vec![text("Di"), DataValue::Float(2.8), DataValue::Integer(0), text("Active")],
            ],
        )
        .unwrap()
    }

    fn workspace() -> Workspace {
        let mut ws = Workspace::new(BehaviorConfig::default());
        ws.replace_base_table(students());
        ws
    }

    fn gpa_at_least(value: f64) -> FilterRule {
        FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, value)
    }

    fn names(ws: &Workspace, index: usize) -> Vec<String> {
        let tab = ws.tab(index).unwrap();
        let model = ws.tab_model(index).unwrap();
        tab.view
            .visible_rows()
            .iter()
            .map(|&row| model.table().get_value_by_name(row, "Name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_new_workspace_layout() {
        let ws = Workspace::new(BehaviorConfig::default());
        assert_eq!(ws.tab_count(), 2);
        assert_eq!(ws.tab(0).unwrap().name, "All Students");
        assert_eq!(ws.tab(1).unwrap().kind, TabKind::Filtered);
        assert!(!ws.has_data());
    }

    #[test]
    fn test_rule_on_base_spawns_rule_tab() {
        let mut ws = workspace();
        let change = ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        assert_eq!(change, FilterChange::CreatedTab(2));

        let rule_tab = ws.tab(2).unwrap();
        assert_eq!(rule_tab.kind, TabKind::Rule);
        assert_eq!(rule_tab.name, "GPA >= 3.5");
        assert_eq!(names(&ws, 2), vec!["Ada", "Cy"]);

        assert_eq!(ws.union_mask(), &[true, false, true, false]);
        assert!(ws.base_model().is_row_highlighted(0));
        assert!(ws.base_model().filters().has_filters());
        assert_eq!(names(&ws, 1), vec!["Ada", "Cy"]);
    }

    #[test]
    fn test_filtered_tab_without_rules() {
        let mut ws = workspace();
        assert!(names(&ws, 1).is_empty());

        ws.set_filtered_show_matches(false);
        assert_eq!(names(&ws, 1).len(), 4);
    }

    #[test]
    fn test_filtered_tab_unmatched_mode() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.set_filtered_show_matches(false);
        assert_eq!(names(&ws, 1), vec!["Ben", "Di"]);
    }

    #[test]
    fn test_filtered_tab_rejects_rules() {
        let mut ws = workspace();
        assert_eq!(
            ws.add_filter(1, gpa_at_least(3.0), None),
            Err(WorkspaceError::FilteredTabNotEditable)
        );
        assert_eq!(ws.close_tab(1), Err(WorkspaceError::FilteredTabNotClosable));
        assert_eq!(ws.close_tab(0), Err(WorkspaceError::BaseTabNotClosable));
    }

    #[test]
    fn test_rule_tab_modes() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), Some(CombinationMode::Any)).unwrap();
        let scholarship = FilterRule::numeric("Scholarship", NumericOperator::Greater, 0.0);
        assert_eq!(ws.add_filter(2, scholarship.clone(), None).unwrap(), FilterChange::Added);
        assert_eq!(names(&ws, 2), vec!["Ada", "Ben", "Cy"]);

        ws.set_filter_mode(2, CombinationMode::All).unwrap();
        assert_eq!(names(&ws, 2), vec!["Cy"]);
        assert_eq!(ws.union_mask(), &[false, false, true, false]);

        assert_eq!(
            ws.add_filter(2, scholarship, None).unwrap(),
            FilterChange::AlreadyPresent
        );
    }

    #[test]
    fn test_removing_last_rule_closes_rule_tab() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.set_current(2).unwrap();

        ws.remove_filter(0, &gpa_at_least(3.5)).unwrap();
        assert_eq!(ws.tab_count(), 2);
        assert_eq!(ws.current_index(), 1);
        assert!(ws.union_mask().iter().all(|&hit| !hit));
        assert!(!ws.base_model().filters().has_filters());
        assert_eq!(
            ws.remove_filter(0, &gpa_at_least(3.5)),
            Err(WorkspaceError::NoSuchFilter)
        );
    }

    #[test]
    fn test_replace_filter_keeps_position() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        let active = FilterRule::text("Status", ["active"], false);
        ws.add_filter(2, active.clone(), None).unwrap();

        ws.replace_filter(0, &gpa_at_least(3.5), gpa_at_least(2.5)).unwrap();
        assert_eq!(ws.tab(2).unwrap().filters, vec![gpa_at_least(2.5), active]);
        assert_eq!(names(&ws, 2), vec!["Ada", "Cy", "Di"]);
    }

    #[test]
    fn test_clear_column_filters_across_rule_tabs() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.add_filter(0, FilterRule::text("Status", ["Probation"], false), None)
            .unwrap();
        ws.add_filter(3, gpa_at_least(1.0), None).unwrap();

        let removed = ws.clear_column_filters(0, "[F] GPA").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ws.tab_count(), 3);
        assert_eq!(ws.tab(2).unwrap().filters.len(), 1);
        assert_eq!(ws.union_mask(), &[false, true, false, false]);
    }

    #[test]
    fn test_clear_filters_on_base_closes_rule_tabs() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.add_filter(0, gpa_at_least(2.5), None).unwrap();
        ws.create_custom_tab("Mine", 0).unwrap();

        assert_eq!(ws.clear_filters(0).unwrap(), 2);
        let kinds: Vec<TabKind> = ws.tabs().iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TabKind::Base, TabKind::Filtered, TabKind::Custom]);
    }

    #[test]
    fn test_open_rule_tab_reuses_existing() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        assert_eq!(ws.open_rule_tab(gpa_at_least(3.5)).unwrap(), 2);
        assert_eq!(ws.open_rule_tab(gpa_at_least(3.0)).unwrap(), 3);
    }

    #[test]
    fn test_custom_tab_is_independent_snapshot() {
        let mut ws = workspace();
        ws.set_search("active", Some("Status"));
        let custom = ws.create_custom_tab("Actives", 0).unwrap();
        assert_eq!(ws.tab_model(custom).unwrap().row_count(), 3);

        ws.clear_search();
        ws.edit_cell(0, 0, "Name", "Ada L.").unwrap();
        assert_eq!(names(&ws, custom)[0], "Ada");

        ws.add_filter(custom, gpa_at_least(3.0), None).unwrap();
        assert_eq!(names(&ws, custom), vec!["Ada", "Cy"]);
        assert!(ws.tab_model(custom).unwrap().is_row_highlighted(0));

        let copy = ws.duplicate_tab(custom).unwrap();
        assert_eq!(ws.tab(copy).unwrap().name, "Actives Copy");
        assert_eq!(names(&ws, copy), vec!["Ada", "Cy"]);
        assert!(ws.tab(copy).unwrap().filters.is_empty());
    }

    #[test]
    fn test_search_column_missing_in_tab_falls_back() {
        let mut ws = workspace();
        let other = DataTable::from_rows("other", &["Name"], vec![vec![text("Zed")]]).unwrap();
        let file = ws.create_file_tab(other, Path::new("/tmp/other.csv"), None).unwrap();
        assert_eq!(ws.tab(file).unwrap().name, "other.csv");

        ws.set_search("zed", Some("Status"));
        assert_eq!(names(&ws, file), vec!["Zed"]);
        assert!(names(&ws, 0).is_empty());
    }

    #[test]
    fn test_move_and_copy_highlighted() {
        let mut ws = workspace();
        assert_eq!(
            ws.copy_highlighted(0).unwrap_err(),
            WorkspaceError::NoHighlightedRows
        );

        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        assert_eq!(ws.copy_highlighted(2).unwrap_err(), WorkspaceError::BaseTabOnly);
        assert_eq!(ws.copy_highlighted(0).unwrap().row_count(), 2);

        let moved = ws.move_highlighted(0).unwrap();
        assert_eq!(moved.row_count(), 2);
        assert_eq!(ws.base_model().row_count(), 2);
        assert_eq!(ws.tab_model(2).unwrap().row_count(), 0);
        assert_eq!(ws.union_mask(), &[false, false]);

        let tab = ws.add_table_tab("Filtered Rows (Moved)", moved).unwrap();
        assert_eq!(names(&ws, tab), vec!["Ada", "Cy"]);
    }

    #[test]
    fn test_edit_cell_on_base_refreshes_rules() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();

        let value = ws.edit_cell(0, 1, "GPA", "3.7").unwrap();
        assert_eq!(value, DataValue::Float(3.7));
        assert_eq!(names(&ws, 2), vec!["Ada", "Ben", "Cy"]);
        assert_eq!(ws.union_mask(), &[true, true, true, false]);

        assert!(ws.edit_cell(0, 99, "GPA", "1").is_err());
    }

    #[test]
    fn test_view_mode_on_base() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.set_view_mode(0, HighlightFilter::Unhighlighted).unwrap();
        assert_eq!(names(&ws, 0), vec!["Ben", "Di"]);
        assert_eq!(ws.tab_title(0).unwrap(), "All Students (2)");
    }

    #[test]
    fn test_sort_base_keeps_union_aligned() {
        let mut ws = workspace();
        ws.add_filter(0, gpa_at_least(3.5), None).unwrap();
        ws.sort_tab(0, "GPA", false).unwrap();

        assert_eq!(names(&ws, 0), vec!["Cy", "Ada", "Di", "Ben"]);
        assert_eq!(ws.union_mask(), &[true, true, false, false]);
        assert!(ws.sort_tab(0, "Nope", true).is_err());
    }

    #[test]
    fn test_rule_on_missing_column_matches_nothing() {
        let mut ws = workspace();
        ws.add_filter(0, FilterRule::numeric("Age", NumericOperator::Greater, 1.0), None)
            .unwrap();
        assert_eq!(ws.tab_model(2).unwrap().row_count(), 0);
        assert!(ws.union_mask().iter().all(|&hit| !hit));
    }
}
