use crate::data::datatable::{DataColumn, DataRow, DataTable, DataType, DataValue};
use crate::data::type_inference::TypeInference;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Local;
use csv::ReaderBuilder;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Column stamped on every loaded row
pub const DATE_ADDED_COLUMN: &str = "Date Added";

pub const DEFAULT_INFERENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Sheet '{sheet}' not found (available: {})", .available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Excel,
    Csv,
    Tsv,
    Json,
}

impl SourceFormat {
    /// Pick a reader from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" | "xls" | "xlsm" => Ok(SourceFormat::Excel),
            "csv" => Ok(SourceFormat::Csv),
            "tsv" => Ok(SourceFormat::Tsv),
            "json" => Ok(SourceFormat::Json),
            _ => Err(LoadError::UnsupportedFormat { extension }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Excel => "excel",
            SourceFormat::Csv => "csv",
            SourceFormat::Tsv => "tsv",
            SourceFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Worksheet to read from a workbook
    pub sheet: Option<String>,
    /// Share of parseable cells needed before a column is cast
    pub inference_threshold: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            inference_threshold: DEFAULT_INFERENCE_THRESHOLD,
        }
    }
}

/// Result of a load: either a table, or a workbook whose sheet must be chosen
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(DataTable),
    NeedsSheet(Vec<String>),
}

/// Load any supported file into a DataTable
pub fn load_table<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<LoadOutcome> {
    let path = path.as_ref();
    let format = SourceFormat::from_path(path)?;
    let table_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data")
        .to_string();

    info!(target: "loader", "Loading {} file {}", format.name(), path.display());

    let threshold = options.inference_threshold;
    let table = match format {
        SourceFormat::Excel => {
            return load_excel_to_datatable(path, options.sheet.as_deref(), &table_name, threshold)
        }
        SourceFormat::Csv => load_delimited_to_datatable(path, b',', &table_name, threshold)?,
        SourceFormat::Tsv => load_delimited_to_datatable(path, b'\t', &table_name, threshold)?,
        SourceFormat::Json => load_json_to_datatable(path, &table_name, threshold)?,
    };

    Ok(LoadOutcome::Loaded(table))
}

/// Read a file as text, falling back to Latin-1 when it is not valid UTF-8
fn read_text(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(target: "loader", "{} is not UTF-8, decoding as Latin-1", path.display());
            err.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    };

    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

/// Make headers usable as column names: blanks get a placeholder, repeats a suffix
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = match header.trim() {
                "" => format!("Unnamed: {}", idx),
                trimmed => trimmed.to_string(),
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Build a typed table from raw text cells
///
/// Each column is cast as a whole; cells that do not fit a cast column
/// become nulls.
pub fn build_table_from_strings(
    table_name: &str,
    headers: Vec<String>,
    string_rows: Vec<Vec<String>>,
    threshold: f64,
) -> DataTable {
    let headers = normalize_headers(headers);
    let mut table = DataTable::new(table_name);

    let mut column_types = Vec::with_capacity(headers.len());
    for (col_idx, header) in headers.iter().enumerate() {
        let inferred = TypeInference::infer_column(
            string_rows
                .iter()
                .map(|row| row.get(col_idx).map(String::as_str).unwrap_or("")),
            threshold,
        );
        let data_type = DataType::from(inferred);
        debug!(target: "loader", "Column '{}' inferred as {:?}", header, data_type);
        column_types.push(data_type);
        table.add_column(DataColumn::new(header.as_str()).with_type(data_type));
    }

    for string_row in string_rows {
        let values = column_types
            .iter()
            .enumerate()
            .map(|(col_idx, data_type)| {
                let raw = string_row.get(col_idx).map(String::as_str).unwrap_or("");
                DataValue::parse_as(raw, data_type).unwrap_or(DataValue::Null)
            })
            .collect();
        table.rows.push(DataRow::new(values));
    }

    table.refresh_column_stats();
    table
}

/// Load a CSV or TSV file into a DataTable
pub fn load_delimited_to_datatable<P: AsRef<Path>>(
    path: P,
    delimiter: u8,
    table_name: &str,
    threshold: f64,
) -> Result<DataTable> {
    let path = path.as_ref();
    let text = read_text(path)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut string_rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to parse {}", path.display()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        row.resize(headers.len(), String::new());
        string_rows.push(row);
    }

    let mut table = build_table_from_strings(table_name, headers, string_rows, threshold);
    let source_type = if delimiter == b'\t' { "tsv" } else { "csv" };
    table
        .metadata
        .insert("source_type".to_string(), source_type.to_string());
    table
        .metadata
        .insert("source_path".to_string(), path.display().to_string());

    Ok(table)
}

fn json_cell_to_string(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::Null) | None => String::new(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Load a JSON file into a DataTable
///
/// Accepts an array of records, or a column-oriented object mapping each
/// column to an array or to an index-keyed object.
pub fn load_json_to_datatable<P: AsRef<Path>>(
    path: P,
    table_name: &str,
    threshold: f64,
) -> Result<DataTable> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let json: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse JSON file: {}", path.display()))?;

    let (headers, string_rows) = match &json {
        JsonValue::Array(records) => {
            let mut headers: Vec<String> = Vec::new();
            let mut seen = HashSet::new();
            for record in records {
                let obj = record
                    .as_object()
                    .context("JSON data must be an array of objects")?;
                for key in obj.keys() {
                    if seen.insert(key.clone()) {
                        headers.push(key.clone());
                    }
                }
            }

            let rows = records
                .iter()
                .filter_map(JsonValue::as_object)
                .map(|obj| {
                    headers
                        .iter()
                        .map(|h| json_cell_to_string(obj.get(h)))
                        .collect()
                })
                .collect();
            (headers, rows)
        }
        JsonValue::Object(columns) => {
            let headers: Vec<String> = columns.keys().cloned().collect();
            let cells: Vec<Vec<String>> = columns
                .values()
                .map(|column| match column {
                    JsonValue::Array(values) => {
                        values.iter().map(|v| json_cell_to_string(Some(v))).collect()
                    }
                    JsonValue::Object(by_index) => {
                        let mut entries: Vec<(usize, String)> = by_index
                            .iter()
                            .map(|(k, v)| {
                                (k.parse().unwrap_or(usize::MAX), json_cell_to_string(Some(v)))
                            })
                            .collect();
                        entries.sort_by_key(|(idx, _)| *idx);
                        entries.into_iter().map(|(_, v)| v).collect()
                    }
                    scalar => vec![json_cell_to_string(Some(scalar))],
                })
                .collect();

            let row_count = cells.iter().map(Vec::len).max().unwrap_or(0);
            let rows = (0..row_count)
                .map(|row| {
                    cells
                        .iter()
                        .map(|column| column.get(row).cloned().unwrap_or_default())
                        .collect()
                })
                .collect();
            (headers, rows)
        }
        _ => anyhow::bail!("JSON data must be an array of objects"),
    };

    let mut table = build_table_from_strings(table_name, headers, string_rows, threshold);
    table
        .metadata
        .insert("source_type".to_string(), "json".to_string());
    table
        .metadata
        .insert("source_path".to_string(), path.display().to_string());

    Ok(table)
}

fn excel_cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|dt| TypeInference::format_datetime(&dt))
            .unwrap_or_else(|| dt.as_f64().to_string()),
    }
}

/// Load one worksheet; without a sheet name a multi-sheet workbook asks for one
pub fn load_excel_to_datatable<P: AsRef<Path>>(
    path: P,
    sheet: Option<&str>,
    table_name: &str,
    threshold: f64,
) -> Result<LoadOutcome> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let sheets = workbook.sheet_names().to_vec();

    let sheet_name = match sheet {
        Some(name) => {
            if !sheets.iter().any(|s| s == name) {
                return Err(LoadError::SheetNotFound {
                    sheet: name.to_string(),
                    available: sheets,
                }
                .into());
            }
            name.to_string()
        }
        None if sheets.len() > 1 => return Ok(LoadOutcome::NeedsSheet(sheets)),
        None => sheets
            .first()
            .cloned()
            .context("Workbook contains no sheets")?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{}'", sheet_name))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(excel_cell_to_string).collect())
        .unwrap_or_default();

    let string_rows: Vec<Vec<String>> = rows
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(excel_cell_to_string).collect();
            cells.resize(headers.len(), String::new());
            cells
        })
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .collect();

    let mut table = build_table_from_strings(table_name, headers, string_rows, threshold);
    table
        .metadata
        .insert("source_type".to_string(), "excel".to_string());
    table
        .metadata
        .insert("source_path".to_string(), path.display().to_string());
    table.metadata.insert("sheet".to_string(), sheet_name);

    Ok(LoadOutcome::Loaded(table))
}

/// Current local time in the format used for the load timestamp column
pub fn load_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Stamp every row with the load time, replacing any earlier stamp
pub fn add_date_column(table: &mut DataTable) {
    table.set_constant_column(DATE_ADDED_COLUMN, DataValue::DateTime(load_timestamp()));
}
