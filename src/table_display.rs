use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use crossterm::style::Stylize;
use student_admissions::config::DisplayConfig;
use student_admissions::data::archive::{format_file_size, ArchiveInfo};
use student_admissions::data::datatable::{ColumnKind, ColumnStats};
use student_admissions::filter::{CombinationMode, FilterRule, Rgb};
use student_admissions::presets::PresetInfo;
use student_admissions::workspace::{TabKind, Workspace};

fn truncate(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn fill(color: Rgb) -> Color {
    Color::Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print the visible rows of a tab, colouring cells that match a rule
pub fn display_tab(workspace: &Workspace, index: usize, limit: Option<usize>, display: &DisplayConfig) {
    let (Ok(tab), Ok(model)) = (workspace.tab(index), workspace.tab_model(index)) else {
        return;
    };
    if model.column_count() == 0 {
        println!("{}", "No data loaded. Use 'load <path>'.".yellow());
        return;
    }

    let mut table = new_table();
    let mut header: Vec<Cell> = Vec::new();
    if display.show_row_numbers {
        header.push(Cell::new("#").add_attribute(Attribute::Bold));
    }
    header.extend(
        model
            .header_labels()
            .into_iter()
            .map(|label| Cell::new(label).add_attribute(Attribute::Bold)),
    );
    table.set_header(header);

    let limit = limit.unwrap_or(display.max_display_rows);
    let visible = tab.view().visible_rows();
    for (position, &row) in visible.iter().take(limit).enumerate() {
        let highlighted = model.is_row_highlighted(row);
        let mut cells: Vec<Cell> = Vec::new();
        if display.show_row_numbers {
            let marker = if highlighted { "*" } else { "" };
            cells.push(Cell::new(format!("{}{}", position + 1, marker)));
        }

        for col in 0..model.column_count() {
            let text = model
                .table()
                .get_value(row, col)
                .map(|v| v.to_string())
                .unwrap_or_default();
            let mut cell = Cell::new(truncate(&text, display.max_column_width));
            if display.use_colors {
                if let Some(color) = model.cell_color(row, col) {
                    cell = cell.bg(fill(color)).fg(Color::Black);
                } else if highlighted {
                    cell = cell.add_attribute(Attribute::Bold);
                }
            }
            cells.push(cell);
        }
        table.add_row(cells);
    }

    println!("{table}");
    let shown = visible.len().min(limit);
    println!(
        "{}",
        format!(
            "{}: showing {} of {} visible rows ({} total, {} highlighted)",
            tab.name,
            shown,
            visible.len(),
            model.row_count(),
            tab.view().highlighted_count(model)
        )
        .green()
    );
}

pub fn display_tabs(workspace: &Workspace) {
    let mut table = new_table();
    table.set_header(vec!["#", "Tab", "Type", "Rows", "Rules", "Mode"]);

    for (index, tab) in workspace.tabs().iter().enumerate() {
        let marker = if index == workspace.current_index() { "▶ " } else { "" };
        let rules = workspace
            .display_filters(index)
            .map(|rules| rules.len())
            .unwrap_or_default();
        let mode = match tab.kind {
            TabKind::Filtered if workspace.filtered_show_matches() => "matches".to_string(),
            TabKind::Filtered => "unmatched".to_string(),
            _ => tab.mode().to_string(),
        };
        table.add_row(vec![
            format!("{}{}", marker, index + 1),
            tab.name.clone(),
            tab.kind.to_string(),
            tab.view().row_count().to_string(),
            rules.to_string(),
            mode,
        ]);
    }
    println!("{table}");
}

pub fn display_filters(rules: &[FilterRule], mode: CombinationMode, use_colors: bool) {
    if rules.is_empty() {
        println!("{}", "No filters on this tab.".yellow());
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["#", "Rule", "Column"]);
    for (index, rule) in rules.iter().enumerate() {
        let mut label = Cell::new(rule.to_string());
        if use_colors {
            label = label.bg(fill(rule.color())).fg(Color::Black);
        }
        table.add_row(vec![
            Cell::new(index + 1),
            label,
            Cell::new(rule.column()),
        ]);
    }
    println!("{table}");
    println!("Combined with: {}", mode.to_string().cyan());
}

pub fn display_stats(column: &str, kind: Option<ColumnKind>, stats: &ColumnStats) {
    let mut table = new_table();
    table.set_header(vec![Cell::new(column).add_attribute(Attribute::Bold), Cell::new("")]);
    if let Some(kind) = kind {
        table.add_row(vec!["type".to_string(), kind.to_string()]);
    }
    table.add_row(vec!["rows".to_string(), stats.count.to_string()]);
    table.add_row(vec!["non-empty".to_string(), stats.non_null.to_string()]);
    table.add_row(vec!["empty".to_string(), stats.null.to_string()]);
    table.add_row(vec!["unique".to_string(), stats.unique.to_string()]);
    if let Some(numeric) = &stats.numeric {
        table.add_row(vec!["min".to_string(), numeric.min.to_string()]);
        table.add_row(vec!["max".to_string(), numeric.max.to_string()]);
        table.add_row(vec!["mean".to_string(), format!("{:.2}", numeric.mean)]);
        table.add_row(vec!["median".to_string(), numeric.median.to_string()]);
    }
    println!("{table}");
}

pub fn display_archives(archives: &[ArchiveInfo]) {
    if archives.is_empty() {
        println!("{}", "No archives found.".yellow());
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["#", "Archive", "Taken", "Size"]);
    for (index, archive) in archives.iter().enumerate() {
        let taken = archive
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());
        table.add_row(vec![
            (index + 1).to_string(),
            archive.filename.clone(),
            taken,
            format_file_size(archive.size),
        ]);
    }
    println!("{table}");
}

pub fn display_presets(presets: &[PresetInfo]) {
    if presets.is_empty() {
        println!("{}", "No presets saved.".yellow());
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["Preset", "Rules", "Description"]);
    for preset in presets {
        table.add_row(vec![
            preset.name.clone(),
            preset.filter_count.to_string(),
            preset.description.clone(),
        ]);
    }
    println!("{table}");
}
