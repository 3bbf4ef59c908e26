use anyhow::{anyhow, Context, Result};
use chrono::Local;
use crossterm::style::Stylize;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use reedline::{
    default_emacs_keybindings, ColumnarMenu, Emacs, FileBackedHistory, KeyCode, KeyModifiers,
    MenuBuilder, Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline,
    ReedlineEvent, ReedlineMenu, Signal,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use student_admissions::commands::{parse_command, Command, PruneRule};
use student_admissions::config::Config;
use student_admissions::data::archive::ArchiveStore;
use student_admissions::filter::FilterRule;
use student_admissions::presets::{FilterPreset, PresetManager};
use student_admissions::utils::app_paths::AppPaths;
use student_admissions::utils::logging::{
    get_log_buffer, init_tracing_with_dual_logging, install_panic_hook,
};
use student_admissions::workspace::{
    FilterChange, LoadAction, LoadReport, StateStore, Workspace, WorkspaceError,
};
use tracing::{info, warn};

mod completer;
mod table_display;

use completer::{CommandCompleter, SharedColumns};
use table_display::{
    display_archives, display_filters, display_presets, display_stats, display_tab, display_tabs,
};

const DEFAULT_LOG_LINES: usize = 20;

struct AdmissionsPrompt {
    label: String,
}

impl Prompt for AdmissionsPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!("admissions [{}]", self.label))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Default | PromptEditMode::Emacs => "> ".into(),
            PromptEditMode::Vi(vi_mode) => match vi_mode {
                reedline::PromptViMode::Normal => "N> ".into(),
                reedline::PromptViMode::Insert => "I> ".into(),
            },
            PromptEditMode::Custom(str) => format!("{str}> ").into(),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!(
            "({}reverse search: {})",
            prefix, history_search.term
        ))
    }
}

fn print_usage() {
    println!("{}", "Student Admissions Manager".blue().bold());
    println!();
    println!("{}", "Usage:".yellow());
    println!("  admissions [OPTIONS] [FILE.xlsx|FILE.csv|FILE.tsv|FILE.json]");
    println!();
    println!("{}", "Options:".yellow());
    println!(
        "  {} - Write a commented config file with defaults",
        "--generate-config".green()
    );
    println!(
        "  {}      - Start empty instead of restoring the last session",
        "--no-restore".green()
    );
    println!("  {}            - Show this help", "--help".green());
    println!();
}

fn print_help() {
    let section = |title: &str| println!("{}", title.yellow());
    let line = |command: &str, what: &str| println!("  {} {}", format!("{:<44}", command).green(), what);

    section("Data:");
    line("load <path> [--sheet S] [--merge|--replace|--new-tab]", "Load a file");
    line("show [limit]", "Print the current tab");
    line("columns [pattern]", "List columns, fuzzy-matching a pattern");
    line("stats <column>", "Column summary");
    line("sort <column> [asc|desc]", "Sort the current tab");
    line("edit <row> <column> <value>", "Edit a cell of the current tab");
    section("Filters:");
    line("filter add <expr> [--any]", "Add a rule (on the base tab: new rule tab)");
    line("filter list", "Rules on the current tab");
    line("filter rm <n> | filter edit <n> <expr>", "Remove or replace a rule");
    line("filter clear [column]", "Clear all rules or one column's");
    line("filter mode all|any", "How the tab's rules combine");
    line("search <text> [--column C] | search clear", "Search every tab");
    line("view all|highlighted|unhighlighted", "Row visibility by highlight");
    println!("  Rule syntax: GPA >= 3.5 | Status contains active,pending | Applied between 2024-01-01 and 2024-06-30");
    section("Tabs:");
    line("tabs | tab <n>", "List tabs or switch");
    line("newtab <name> | dup", "Snapshot the visible rows into a new tab");
    line("rename <name> | close [n]", "Rename or close a tab");
    line("filtered matches|unmatched", "What the Filtered tab shows");
    line("move-highlighted | copy-highlighted", "Split highlighted base rows into a tab");
    section("Output:");
    line("export all|tab|filtered <path>", "Export by extension (xlsx/csv/tsv/json)");
    line("save <path>", "Save visible rows split into highlight sheets");
    line("preset save <name> [description]", "Save the tab's rules as a preset");
    line("preset load <name> | list | rm <name>", "Manage presets");
    line("archive list [today|week|month]", "List archive snapshots");
    line("archive prune --days N | --keep N", "Delete old archives");
    line("archive open <n>", "Load an archive as the base table");
    line("logs [n] | help | quit", "");
}

struct Shell {
    workspace: Workspace,
    presets: PresetManager,
    config: Config,
    columns: SharedColumns,
    matcher: SkimMatcherV2,
}

impl Shell {
    fn current(&self) -> usize {
        self.workspace.current_index()
    }

    fn prompt(&self) -> AdmissionsPrompt {
        let label = self
            .workspace
            .tab_title(self.current())
            .unwrap_or_else(|_| "?".to_string());
        AdmissionsPrompt { label }
    }

    fn sync_columns(&self) {
        let names = self
            .workspace
            .tab_model(self.current())
            .map(|m| m.table().column_names())
            .unwrap_or_default();
        *self.columns.lock().unwrap_or_else(PoisonError::into_inner) = names;
    }

    fn archives(&self) -> Result<&ArchiveStore> {
        self.workspace
            .archive_store()
            .ok_or_else(|| anyhow!("Archiving is not configured"))
    }

    fn load(&mut self, path: &Path, sheet: Option<&str>, action: Option<LoadAction>) -> Result<()> {
        match self.workspace.load_file(path, sheet, action)? {
            LoadReport::NeedsSheet(sheets) => {
                println!("{}", "This workbook has several sheets:".yellow());
                for name in &sheets {
                    println!("  {}", name);
                }
                println!("Load again with --sheet <name>.");
            }
            LoadReport::Loaded {
                rows,
                total,
                archive,
                ..
            } => {
                println!(
                    "{}",
                    format!("✓ Loaded {} rows from {} ({} rows total)", rows, path.display(), total).green()
                );
                if let Some(archive) = archive {
                    println!("  Archived to {}", archive.display());
                }
                self.workspace.set_current(0)?;
            }
            LoadReport::NewTab { index, rows } => {
                println!("{}", format!("✓ Opened {} rows in a new tab", rows).green());
                self.workspace.set_current(index)?;
            }
        }
        Ok(())
    }

    fn list_columns(&self, pattern: Option<&str>) -> Result<()> {
        let model = self.workspace.tab_model(self.current())?;
        let mut columns: Vec<(i64, String)> = model
            .table()
            .column_names()
            .into_iter()
            .filter_map(|name| match pattern {
                Some(p) => self.matcher.fuzzy_match(&name, p).map(|score| (score, name)),
                None => Some((0, name)),
            })
            .collect();
        if pattern.is_some() {
            columns.sort_by(|a, b| b.0.cmp(&a.0));
        }

        if columns.is_empty() {
            println!("{}", "No matching columns.".yellow());
        }
        for (_, name) in columns {
            let kind = model
                .column_kind(&name)
                .map(|k| k.to_string())
                .unwrap_or_default();
            println!("  {:<30} {}", name, kind.dark_grey());
        }
        Ok(())
    }

    /// Run one command; false ends the session
    fn run(&mut self, command: Command) -> Result<bool> {
        let current = self.current();
        match command {
            Command::Load { path, sheet, action } => self.load(&path, sheet.as_deref(), action)?,
            Command::Tabs => display_tabs(&self.workspace),
            Command::Tab(index) => {
                self.workspace.set_current(index)?;
                display_tab(&self.workspace, index, None, &self.config.display);
            }
            Command::Show(limit) => display_tab(&self.workspace, current, limit, &self.config.display),
            Command::Columns(pattern) => self.list_columns(pattern.as_deref())?,
            Command::Stats(column) => {
                let model = self.workspace.tab_model(current)?;
                let stats = model
                    .column_stats(&column)
                    .ok_or_else(|| anyhow!("Unknown column '{}'", column))?;
                display_stats(&column, model.column_kind(&column), &stats);
            }
            Command::Sort { column, ascending } => {
                self.workspace.sort_tab(current, &column, ascending)?;
                display_tab(&self.workspace, current, None, &self.config.display);
            }
            Command::FilterAdd { rule, mode } => {
                let label = rule.to_string();
                match self.workspace.add_filter(current, rule, mode)? {
                    FilterChange::CreatedTab(index) => {
                        let title = self.workspace.tab_title(index)?;
                        println!("{}", format!("✓ Rule tab {} created: {}", index + 1, title).green());
                    }
                    FilterChange::Added => println!("{}", format!("✓ Added {}", label).green()),
                    FilterChange::AlreadyPresent => println!("{}", "That rule is already on this tab.".yellow()),
                }
            }
            Command::FilterList => {
                let rules = self.workspace.display_filters(current)?;
                display_filters(&rules, self.workspace.tab(current)?.mode(), self.config.display.use_colors);
            }
            Command::FilterRemove(n) => {
                let rule = self.nth_rule(current, n)?;
                self.workspace.remove_filter(current, &rule)?;
                println!("{}", format!("✓ Removed {}", rule).green());
            }
            Command::FilterEdit { index, rule } => {
                let old = self.nth_rule(current, index)?;
                self.workspace.replace_filter(current, &old, rule)?;
                println!("{}", "✓ Rule updated".green());
            }
            Command::FilterClear(column) => {
                let removed = match column {
                    Some(column) => self.workspace.clear_column_filters(current, &column)?,
                    None => self.workspace.clear_filters(current)?,
                };
                println!("{}", format!("✓ Removed {} rule(s)", removed).green());
            }
            Command::FilterMode(mode) => {
                self.workspace.set_filter_mode(current, mode)?;
                println!("{}", format!("✓ Rules now combine with {}", mode).green());
            }
            Command::Search { text, column } => {
                self.workspace.set_search(&text, column.as_deref());
                display_tab(&self.workspace, current, None, &self.config.display);
            }
            Command::SearchClear => self.workspace.clear_search(),
            Command::View(mode) => {
                self.workspace.set_view_mode(current, mode)?;
                display_tab(&self.workspace, current, None, &self.config.display);
            }
            Command::NewTab(name) => {
                let index = self.workspace.create_custom_tab(&name, current)?;
                self.workspace.set_current(index)?;
            }
            Command::Duplicate => {
                let index = self.workspace.duplicate_tab(current)?;
                self.workspace.set_current(index)?;
            }
            Command::Close(index) => self.workspace.close_tab(index.unwrap_or(current))?,
            Command::Rename(name) => self.workspace.rename_tab(current, &name)?,
            Command::FilteredMode(show_matches) => self.workspace.set_filtered_show_matches(show_matches),
            Command::Edit { row, column, value } => {
                let stored = self.workspace.edit_cell(current, row, &column, &value)?;
                println!("{}", format!("✓ {} row {} = {}", column, row + 1, stored).green());
            }
            Command::MoveHighlighted => {
                let moved = self.workspace.move_highlighted(current)?;
                let index = self.workspace.add_table_tab("Filtered Rows (Moved)", moved)?;
                self.workspace.set_current(index)?;
            }
            Command::CopyHighlighted => {
                let copied = self.workspace.copy_highlighted(current)?;
                let index = self.workspace.add_table_tab("Filtered Rows (Copy)", copied)?;
                self.workspace.set_current(index)?;
            }
            Command::Export { scope, path } => {
                let message = self.workspace.export(current, scope, &path)?;
                println!("{}", message.green());
            }
            Command::Save(path) => {
                let message = self.workspace.save_view(current, &path)?;
                println!("{}", message.green());
            }
            Command::PresetSave { name, description } => {
                let filters = match self.workspace.preset_filters(current) {
                    Ok(filters) => filters,
                    Err(WorkspaceError::NoFilters) => {
                        println!("{}", "Add some filters before saving a preset.".yellow());
                        return Ok(true);
                    }
                    Err(e) => return Err(e.into()),
                };
                let preset = FilterPreset::new(name, description).with_filters(filters);
                let path = self.presets.save(&preset)?;
                println!("{}", format!("✓ Saved preset to {}", path.display()).green());
            }
            Command::PresetLoad(name) => {
                let preset = self.presets.load(&name)?;
                let index = self.workspace.apply_preset(current, &preset)?;
                self.workspace.set_current(index)?;
                println!("{}", format!("✓ Applied preset '{}'", preset.name).green());
            }
            Command::PresetList => display_presets(&self.presets.list()?),
            Command::PresetRemove(name) => {
                if self.presets.delete(&name)? {
                    println!("{}", format!("✓ Deleted preset '{}'", name).green());
                } else {
                    println!("{}", format!("No preset named '{}'", name).yellow());
                }
            }
            Command::ArchiveList(period) => display_archives(&self.archives()?.list_period(period)?),
            Command::ArchivePrune(rule) => {
                let store = self.archives()?;
                let removed = match rule {
                    PruneRule::OlderThanDays(days) => {
                        store.prune_older_than(days, Local::now().naive_local())?
                    }
                    PruneRule::KeepLatest(keep) => store.prune_keep_latest(keep)?,
                };
                println!("{}", format!("✓ Deleted {} archive(s)", removed).green());
            }
            Command::ArchiveOpen(n) => {
                let archive = self
                    .archives()?
                    .list()?
                    .into_iter()
                    .nth(n)
                    .ok_or_else(|| anyhow!("No archive number {}", n + 1))?;
                let rows = self.workspace.open_archive(&archive.path)?;
                self.workspace.set_current(0)?;
                println!("{}", format!("✓ Loaded {} rows from {}", rows, archive.filename).green());
            }
            Command::Logs(count) => match get_log_buffer() {
                Some(buffer) => {
                    for entry in buffer.get_recent(count.unwrap_or(DEFAULT_LOG_LINES)) {
                        println!("{}", entry.format_for_display());
                    }
                }
                None => println!("{}", "Logging is not initialized.".yellow()),
            },
            Command::Help => print_help(),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn nth_rule(&self, tab: usize, n: usize) -> Result<FilterRule> {
        self.workspace
            .display_filters(tab)?
            .into_iter()
            .nth(n)
            .ok_or_else(|| anyhow!("No rule number {} on this tab", n + 1))
    }
}

fn generate_config() -> Result<()> {
    let path = Config::get_config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, Config::create_default_with_comments())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Configuration file created at: {}", path.display());
    Ok(())
}

fn build_editor(config: &Config, paths: &AppPaths, columns: SharedColumns) -> Reedline {
    let completion_menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_completion")
            .with_columns(4)
            .with_column_padding(2),
    );

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Menu("command_completion".to_string()),
    );

    let mut editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new(columns)))
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    if config.behavior.enable_history {
        match FileBackedHistory::with_file(config.behavior.max_history_entries, paths.history_file()) {
            Ok(history) => editor = editor.with_history(Box::new(history)),
            Err(e) => warn!(target: "admissions", "History disabled: {}", e),
        }
    }
    editor
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--generate-config") {
        return generate_config();
    }
    let restore = !args.iter().any(|a| a == "--no-restore");
    let file_arg = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from);

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Using default settings, config could not be read: {:#}", e);
        Config::default()
    });
    let paths = AppPaths::from_config(&config.paths)?;

    init_tracing_with_dual_logging(Some(paths.logs_dir().as_path()));
    install_panic_hook();

    let workspace = Workspace::new(config.behavior.clone())
        .with_state_store(StateStore::new(paths.state_file()))
        .with_archive_store(ArchiveStore::new(paths.archives_dir()));
    let columns: SharedColumns = Arc::new(Mutex::new(Vec::new()));

    let mut shell = Shell {
        workspace,
        presets: PresetManager::new(paths.presets_dir()),
        config,
        columns: columns.clone(),
        matcher: SkimMatcherV2::default(),
    };

    if restore && shell.config.behavior.restore_on_start {
        match shell.workspace.restore_from_store() {
            Ok(Some(report)) => {
                if let Some(file) = &report.loaded_file {
                    println!("Restored {} with {} tab(s)", file.display(), report.tabs_restored);
                }
                if let Some(missing) = &report.missing_file {
                    println!("{}", format!("Last file {} no longer exists", missing.display()).yellow());
                }
                for name in &report.skipped {
                    println!("{}", format!("Skipped tab '{}'", name).yellow());
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{}", format!("Could not restore last session: {:#}", e).red()),
        }
    }

    if let Some(path) = file_arg {
        let action = shell.workspace.has_data().then_some(LoadAction::Replace);
        if let Err(e) = shell.load(&path, None, action) {
            eprintln!("{}", format!("Error: {:#}", e).red());
        }
    }

    println!("{}", "Student Admissions Manager - type 'help' for commands".blue().bold());
    shell.sync_columns();
    let mut editor = build_editor(&shell.config, &paths, columns);

    loop {
        let prompt = shell.prompt();
        let signal = editor.read_line(&prompt).context("Failed to read input")?;
        match signal {
            Signal::Success(line) => {
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("{}", format!("Error: {}", e).red());
                        continue;
                    }
                };
                match shell.run(command) {
                    Ok(true) => shell.sync_columns(),
                    Ok(false) => break,
                    Err(e) => eprintln!("{}", format!("Error: {:#}", e).red()),
                }
            }
            Signal::CtrlD | Signal::CtrlC => break,
        }
    }

    if let Some(archive) = shell.workspace.on_exit() {
        println!("Archived session to {}", archive.display());
    }
    info!(target: "admissions", "Session ended");
    println!("\nGoodbye!");
    Ok(())
}
