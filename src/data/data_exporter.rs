use crate::data::datatable::{DataTable, DataValue};
use crate::filter::manager::{CombinationMode, FilterManager};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

const MAX_COLUMN_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    Xlsx,
}

impl ExportFormat {
    /// Format from the path extension; anything unrecognised becomes a workbook
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("csv") => ExportFormat::Csv,
            Some("tsv") => ExportFormat::Tsv,
            Some("json") => ExportFormat::Json,
            _ => ExportFormat::Xlsx,
        }
    }
}

/// How a workbook lays out rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetLayout {
    /// ALL, HIGHLIGHTED and UNHIGHLIGHTED sheets
    Split,
    /// One sheet named "Data"
    Single,
}

/// Highlighting context for a workbook export
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions<'a> {
    pub layout: SheetLayout,
    /// Rules used for cell fills and, without a mask, for splitting rows
    pub filters: Option<&'a FilterManager>,
    pub mode: CombinationMode,
    /// Precomputed highlight mask, used instead of evaluating the rules
    pub mask: Option<&'a [bool]>,
}

impl Default for ExportOptions<'_> {
    fn default() -> Self {
        Self {
            layout: SheetLayout::Split,
            filters: None,
            mode: CombinationMode::All,
            mask: None,
        }
    }
}

/// Writes tables to CSV, TSV, JSON and formatted Excel workbooks
pub struct DataExporter;

impl DataExporter {
    /// Export by path extension, returning a message for the user
    pub fn export(table: &DataTable, path: &Path, options: &ExportOptions) -> Result<String> {
        let format = ExportFormat::from_path(path);
        match format {
            ExportFormat::Csv => Self::write_delimited(table, path, b',')?,
            ExportFormat::Tsv => Self::write_delimited(table, path, b'\t')?,
            ExportFormat::Json => Self::write_json(table, path)?,
            ExportFormat::Xlsx => Self::write_xlsx(table, path, options)?,
        }

        info!(
            target: "export",
            "Exported {} rows as {:?} to {}",
            table.row_count(),
            format,
            path.display()
        );
        Ok(format!(
            "✓ Exported {} rows to {}",
            table.row_count(),
            path.display()
        ))
    }

    pub fn write_delimited(table: &DataTable, path: &Path, delimiter: u8) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        writer.write_record(table.column_names())?;
        for row in &table.rows {
            writer.write_record(row.values.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Records array, one object per row keyed by column name
    pub fn write_json(table: &DataTable, path: &Path) -> Result<()> {
        let records: Vec<Value> = table
            .rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                for (column, value) in table.columns.iter().zip(&row.values) {
                    record.insert(column.name.clone(), value.to_json());
                }
                Value::Object(record)
            })
            .collect();

        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &records)?;
        Ok(())
    }

    /// Rows to place on the HIGHLIGHTED sheet
    ///
    /// A supplied mask wins; otherwise the rules are evaluated under the
    /// given mode, and with no rules nothing is highlighted.
    pub fn highlight_mask(table: &DataTable, options: &ExportOptions) -> Vec<bool> {
        let rows = table.row_count();
        if let Some(mask) = options.mask {
            if mask.len() == rows {
                return mask.to_vec();
            }
            warn!(
                target: "export",
                "Ignoring highlight mask of length {} for {} rows",
                mask.len(),
                rows
            );
            return vec![false; rows];
        }

        match options.filters {
            Some(filters) if filters.has_filters() => (0..rows)
                .map(|row| match options.mode {
                    CombinationMode::All => filters.matches_all_filters(table, row),
                    CombinationMode::Any => filters.matches_any_filter(table, row),
                })
                .collect(),
            _ => vec![false; rows],
        }
    }

    pub fn write_xlsx(table: &DataTable, path: &Path, options: &ExportOptions) -> Result<()> {
        let mut workbook = Workbook::new();
        let mut fills = FillCache::default();

        if table.is_empty() {
            write_sheet(&mut workbook, "ALL", table, &[], None, &mut fills)?;
        } else {
            let all: Vec<usize> = (0..table.row_count()).collect();
            match options.layout {
                SheetLayout::Single => {
                    write_sheet(&mut workbook, "Data", table, &all, options.filters, &mut fills)?;
                }
                SheetLayout::Split => {
                    let mask = Self::highlight_mask(table, options);
                    let (highlighted, unhighlighted): (Vec<usize>, Vec<usize>) =
                        all.iter().partition(|&&row| mask[row]);
                    write_sheet(&mut workbook, "ALL", table, &all, options.filters, &mut fills)?;
                    write_sheet(
                        &mut workbook,
                        "HIGHLIGHTED",
                        table,
                        &highlighted,
                        options.filters,
                        &mut fills,
                    )?;
                    write_sheet(
                        &mut workbook,
                        "UNHIGHLIGHTED",
                        table,
                        &unhighlighted,
                        options.filters,
                        &mut fills,
                    )?;
                }
            }
        }

        workbook
            .save(path)
            .with_context(|| format!("Failed to write workbook {}", path.display()))?;
        Ok(())
    }
}

#[derive(Default)]
struct FillCache {
    formats: HashMap<u32, Format>,
}

impl FillCache {
    fn get(&mut self, rgb: u32) -> &Format {
        self.formats
            .entry(rgb)
            .or_insert_with(|| Format::new().set_background_color(Color::RGB(rgb)))
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &DataValue,
    fill: Option<&Format>,
) -> Result<()> {
    match (value, fill) {
        (DataValue::Null, _) => {}
        (DataValue::Integer(i), None) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        (DataValue::Integer(i), Some(format)) => {
            sheet.write_number_with_format(row, col, *i as f64, format)?;
        }
        (DataValue::Float(f), None) if f.is_finite() => {
            sheet.write_number(row, col, *f)?;
        }
        (DataValue::Float(f), Some(format)) if f.is_finite() => {
            sheet.write_number_with_format(row, col, *f, format)?;
        }
        (DataValue::Boolean(b), None) => {
            sheet.write_boolean(row, col, *b)?;
        }
        (DataValue::Boolean(b), Some(format)) => {
            sheet.write_boolean_with_format(row, col, *b, format)?;
        }
        (other, None) => {
            sheet.write_string(row, col, other.to_string())?;
        }
        (other, Some(format)) => {
            sheet.write_string_with_format(row, col, other.to_string(), format)?;
        }
    }
    Ok(())
}

fn write_sheet(
    workbook: &mut Workbook,
    name: &str,
    table: &DataTable,
    rows: &[usize],
    filters: Option<&FilterManager>,
    fills: &mut FillCache,
) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    let header_format = Format::new().set_bold();
    let mut widths: Vec<usize> = Vec::with_capacity(table.column_count());
    for (col, column) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, column.name.as_str(), &header_format)?;
        widths.push(column.name.chars().count());
    }

    for (out_row, &src_row) in rows.iter().enumerate() {
        let Some(row) = table.rows.get(src_row) else {
            continue;
        };
        for (col, value) in row.values.iter().enumerate() {
            let fill = filters
                .and_then(|f| f.get_color_for_cell(&table.columns[col].name, value))
                .map(|rgb| fills.get(rgb.as_u32()).clone());
            write_cell(sheet, out_row as u32 + 1, col as u16, value, fill.as_ref())?;
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(value.to_string().chars().count());
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (width + 2).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(col as u16, width as f64)?;
    }

    sheet.set_freeze_panes(1, 0)?;
    if !widths.is_empty() {
        sheet.autofilter(0, 0, rows.len() as u32, (widths.len() - 1) as u16)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::{FilterRule, NumericOperator};
    use tempfile::TempDir;

    fn students() -> DataTable {
        DataTable::from_rows(
            "students",
            &["Name", "GPA"],
            vec![
                vec![DataValue::String("Ada".to_string()), DataValue::Float(3.6)],
                vec![DataValue::String("Ben, Jr.".to_string()), DataValue::Float(2.1)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("a.tsv")), ExportFormat::Tsv);
        assert_eq!(ExportFormat::from_path(Path::new("a.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("a.xlsx")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_path(Path::new("export")), ExportFormat::Xlsx);
    }

    #[test]
    fn test_highlight_mask_sources() {
        let table = students();
        assert_eq!(
            DataExporter::highlight_mask(&table, &ExportOptions::default()),
            vec![false, false]
        );

        let mut filters = FilterManager::new();
        filters.add_filter(FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5));
        let options = ExportOptions {
            filters: Some(&filters),
            ..Default::default()
        };
        assert_eq!(DataExporter::highlight_mask(&table, &options), vec![true, false]);

        let mask = [false, true];
        let options = ExportOptions {
            filters: Some(&filters),
            mask: Some(&mask),
            ..Default::default()
        };
        assert_eq!(DataExporter::highlight_mask(&table, &options), vec![false, true]);

        let short = [true];
        let options = ExportOptions {
            mask: Some(&short),
            ..Default::default()
        };
        assert_eq!(DataExporter::highlight_mask(&table, &options), vec![false, false]);
    }

    #[test]
    fn test_csv_and_json_output() {
        let dir = TempDir::new().unwrap();
        let table = students();

        let csv_path = dir.path().join("out.csv");
        DataExporter::export(&table, &csv_path, &ExportOptions::default()).unwrap();
        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv_text, "Name,GPA\nAda,3.6\n\"Ben, Jr.\",2.1\n");

        let json_path = dir.path().join("out.json");
        DataExporter::export(&table, &json_path, &ExportOptions::default()).unwrap();
        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json[1]["Name"], "Ben, Jr.");
        assert_eq!(json[0]["GPA"], 3.6);
    }

    #[test]
    fn test_xlsx_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut filters = FilterManager::new();
        filters.add_filter(FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5));
        let options = ExportOptions {
            filters: Some(&filters),
            ..Default::default()
        };

        DataExporter::export(&students(), &path, &options).unwrap();
        assert!(path.exists());

        let empty = dir.path().join("empty.xlsx");
        DataExporter::write_xlsx(&DataTable::new("none"), &empty, &options).unwrap();
        assert!(empty.exists());
    }
}
