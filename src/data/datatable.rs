use crate::data::type_inference::{InferredType, TypeInference};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Represents the data type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Null,
    Mixed, // For columns with mixed types
}

impl DataType {
    /// Merge two types (for columns with mixed types)
    pub fn merge(&self, other: &DataType) -> DataType {
        if self == other {
            return *self;
        }

        match (self, other) {
            (DataType::Null, t) | (t, DataType::Null) => *t,
            (DataType::Integer, DataType::Float) | (DataType::Float, DataType::Integer) => {
                DataType::Float
            }
            _ => DataType::Mixed,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            DataType::Integer | DataType::Float => ColumnKind::Numeric,
            DataType::DateTime => ColumnKind::Date,
            _ => ColumnKind::Text,
        }
    }
}

impl From<InferredType> for DataType {
    fn from(inferred: InferredType) -> Self {
        match inferred {
            InferredType::Boolean => DataType::Boolean,
            InferredType::Integer => DataType::Integer,
            InferredType::Float => DataType::Float,
            InferredType::DateTime => DataType::DateTime,
            InferredType::String => DataType::String,
            InferredType::Null => DataType::Null,
        }
    }
}

/// Coarse column classification used to pick which filter rules make sense
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Date,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Date => write!(f, "date"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// Column metadata and definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique_values: Option<usize>,
    pub null_count: usize,
}

impl DataColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::String,
            nullable: true,
            unique_values: None,
            null_count: 0,
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }
}

/// A single cell value in the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(String), // Normalised "YYYY-MM-DD[ HH:MM:SS]"
    Null,
}

impl DataValue {
    /// Convert raw text into a value of the given column type
    ///
    /// Returns `None` when the text does not fit the type, so loaders can
    /// null it out and cell edits can keep the raw input instead.
    pub fn parse_as(s: &str, data_type: &DataType) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Some(DataValue::Null);
        }

        match data_type {
            DataType::String | DataType::Mixed | DataType::Null => {
                Some(DataValue::String(s.to_string()))
            }
            DataType::Integer => match trimmed.parse::<i64>() {
                Ok(i) => Some(DataValue::Integer(i)),
                Err(_) => TypeInference::parse_number(trimmed).map(DataValue::Float),
            },
            DataType::Float => TypeInference::parse_number(trimmed).map(DataValue::Float),
            DataType::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(DataValue::Boolean(true)),
                "false" | "no" | "0" => Some(DataValue::Boolean(false)),
                _ => None,
            },
            DataType::DateTime => TypeInference::parse_datetime(trimmed)
                .map(|dt| DataValue::DateTime(TypeInference::format_datetime(&dt))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::String(_) => DataType::String,
            DataValue::Integer(_) => DataType::Integer,
            DataValue::Float(_) => DataType::Float,
            DataValue::Boolean(_) => DataType::Boolean,
            DataValue::DateTime(_) => DataType::DateTime,
            DataValue::Null => DataType::Null,
        }
    }

    /// Numeric view of the cell; text is parsed, dates and nulls have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Integer(i) => Some(*i as f64),
            DataValue::Float(f) if f.is_finite() => Some(*f),
            DataValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            DataValue::String(s) => TypeInference::parse_number(s),
            _ => None,
        }
    }

    /// Calendar date view of the cell
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            DataValue::DateTime(s) | DataValue::String(s) => TypeInference::parse_date(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            DataValue::String(s) | DataValue::DateTime(s) => JsonValue::String(s.clone()),
            DataValue::Integer(i) => JsonValue::from(*i),
            DataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DataValue::Boolean(b) => JsonValue::Bool(*b),
            DataValue::Null => JsonValue::Null,
        }
    }

    /// Ordering used for sorting: nulls last, numbers numerically,
    /// everything else by display text
    pub fn sort_cmp(&self, other: &DataValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }

        match (self, other) {
            (DataValue::String(_), _) | (_, DataValue::String(_)) => {
                self.to_string().cmp(&other.to_string())
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::String(s) => write!(f, "{}", s),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::DateTime(dt) => write!(f, "{}", dt),
            DataValue::Null => write!(f, ""),
        }
    }
}

/// A row of data in the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub values: Vec<DataValue>,
}

impl DataRow {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-column summary shown by the `stats` command
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub non_null: usize,
    pub null: usize,
    pub unique: usize,
    pub numeric: Option<NumericSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// The main DataTable structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<DataColumn>,
    pub rows: Vec<DataRow>,
    pub metadata: HashMap<String, String>,
}

impl DataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a table whose columns are all text, handy for fixtures
    pub fn from_rows(
        name: impl Into<String>,
        columns: &[&str],
        rows: Vec<Vec<DataValue>>,
    ) -> Result<Self, String> {
        let mut table = DataTable::new(name);
        for column in columns {
            table.add_column(DataColumn::new(*column));
        }
        for values in rows {
            table.add_row(DataRow::new(values))?;
        }
        table.infer_column_types();
        Ok(table)
    }

    pub fn add_column(&mut self, column: DataColumn) -> &mut Self {
        self.columns.push(column);
        self
    }

    pub fn add_row(&mut self, row: DataRow) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "Row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn get_column(&self, name: &str) -> Option<&DataColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column_index(name).is_some()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names as a vector
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Infer and update column types based on data
    pub fn infer_column_types(&mut self) {
        for (col_idx, column) in self.columns.iter_mut().enumerate() {
            let mut inferred_type = DataType::Null;
            let mut null_count = 0;
            let mut unique_values = HashSet::new();

            for row in &self.rows {
                if let Some(value) = row.get(col_idx) {
                    if value.is_null() {
                        null_count += 1;
                    } else {
                        inferred_type = inferred_type.merge(&value.data_type());
                        unique_values.insert(value.to_string());
                    }
                }
            }

            column.data_type = inferred_type;
            column.null_count = null_count;
            column.nullable = null_count > 0;
            column.unique_values = Some(unique_values.len());
        }
    }

    /// Recount nulls and distinct values, leaving column types alone
    pub fn refresh_column_stats(&mut self) {
        for (col_idx, column) in self.columns.iter_mut().enumerate() {
            let mut null_count = 0;
            let mut unique_values = HashSet::new();
            for value in self.rows.iter().filter_map(|r| r.get(col_idx)) {
                if value.is_null() {
                    null_count += 1;
                } else {
                    unique_values.insert(value.to_string());
                }
            }
            column.null_count = null_count;
            column.nullable = null_count > 0;
            column.unique_values = Some(unique_values.len());
        }
    }

    /// Get a value at specific row and column
    pub fn get_value(&self, row: usize, col: usize) -> Option<&DataValue> {
        self.rows.get(row)?.get(col)
    }

    /// Get a value by row index and column name
    pub fn get_value_by_name(&self, row: usize, col_name: &str) -> Option<&DataValue> {
        let col_idx = self.get_column_index(col_name)?;
        self.get_value(row, col_idx)
    }

    /// Replace a single cell, returning the previous value
    pub fn set_value(&mut self, row: usize, col: usize, value: DataValue) -> Option<DataValue> {
        let slot = self.rows.get_mut(row)?.values.get_mut(col)?;
        Some(std::mem::replace(slot, value))
    }

    /// Coerce user input to the column's type
    ///
    /// Empty input clears the cell. Input that does not fit the column type
    /// is stored verbatim as text rather than rejected.
    pub fn coerce_input(&self, col: usize, input: &str) -> DataValue {
        let data_type = self
            .columns
            .get(col)
            .map(|c| c.data_type)
            .unwrap_or(DataType::String);

        DataValue::parse_as(input, &data_type).unwrap_or_else(|| {
            debug!(
                target: "datatable",
                "Input '{}' does not fit {:?} column, keeping raw text", input, data_type
            );
            DataValue::String(input.to_string())
        })
    }

    /// Convert to a vector of string vectors (for display/compatibility)
    pub fn to_string_table(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.values.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    /// Get a single row as strings
    pub fn get_row_as_strings(&self, index: usize) -> Option<Vec<String>> {
        self.rows
            .get(index)
            .map(|row| row.values.iter().map(|value| value.to_string()).collect())
    }

    /// Copy the given rows into an independent table with the same schema
    pub fn select_rows(&self, indices: &[usize]) -> DataTable {
        let mut table = DataTable {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&idx| self.rows.get(idx).cloned())
                .collect(),
            metadata: self.metadata.clone(),
        };
        table.refresh_column_stats();
        table
    }

    /// Copy the rows whose mask entry equals `keep`
    pub fn select_by_mask(&self, mask: &[bool], keep: bool) -> DataTable {
        let indices: Vec<usize> = (0..self.row_count())
            .filter(|&idx| mask.get(idx).copied().unwrap_or(false) == keep)
            .collect();
        self.select_rows(&indices)
    }

    /// Drop every row whose mask entry is true, returning how many went
    pub fn remove_by_mask(&mut self, mask: &[bool]) -> usize {
        let before = self.rows.len();
        let mut idx = 0;
        self.rows.retain(|_| {
            let drop = mask.get(idx).copied().unwrap_or(false);
            idx += 1;
            !drop
        });
        self.refresh_column_stats();
        before - self.rows.len()
    }

    /// Add a column filled with one value, or overwrite it if it already exists
    pub fn set_constant_column(&mut self, name: &str, value: DataValue) {
        match self.get_column_index(name) {
            Some(col_idx) => {
                for row in &mut self.rows {
                    row.values[col_idx] = value.clone();
                }
            }
            None => {
                self.columns
                    .push(DataColumn::new(name).with_type(value.data_type()));
                for row in &mut self.rows {
                    row.values.push(value.clone());
                }
            }
        }
        self.refresh_column_stats();
    }

    /// Row order that would sort the table on one column (stable, nulls last)
    pub fn sort_order(&self, col: usize, ascending: bool) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.row_count()).collect();
        order.sort_by(|&a, &b| {
            let left = self.get_value(a, col).unwrap_or(&DataValue::Null);
            let right = self.get_value(b, col).unwrap_or(&DataValue::Null);
            let ordering = left.sort_cmp(right);
            if ascending || left.is_null() || right.is_null() {
                ordering
            } else {
                ordering.reverse()
            }
        });
        order
    }

    /// Rearrange rows so that row `i` becomes the old row `order[i]`
    pub fn reorder(&mut self, order: &[usize]) {
        self.rows = order
            .iter()
            .filter_map(|&idx| self.rows.get(idx).cloned())
            .collect();
    }

    pub fn sort_by_column(&mut self, col: usize, ascending: bool) {
        let order = self.sort_order(col, ascending);
        self.reorder(&order);
    }

    /// Summary statistics for one column
    pub fn column_stats(&self, col_name: &str) -> Option<ColumnStats> {
        let col_idx = self.get_column_index(col_name)?;
        let values: Vec<&DataValue> = self.rows.iter().filter_map(|r| r.get(col_idx)).collect();

        let non_null: Vec<&&DataValue> = values.iter().filter(|v| !v.is_null()).collect();
        let unique: HashSet<String> = non_null.iter().map(|v| v.to_string()).collect();

        let numeric = if self.columns[col_idx].data_type.kind() == ColumnKind::Numeric {
            let mut numbers: Vec<f64> = non_null.iter().filter_map(|v| v.as_f64()).collect();
            numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            summarize(&numbers)
        } else {
            None
        };

        Some(ColumnStats {
            count: values.len(),
            non_null: non_null.len(),
            null: values.len() - non_null.len(),
            unique: unique.len(),
            numeric,
        })
    }
}

fn summarize(sorted: &[f64]) -> Option<NumericSummary> {
    let first = *sorted.first()?;
    let last = *sorted.last()?;
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    Some(NumericSummary {
        min: first,
        max: last,
        mean,
        median,
    })
}

/// Convert a JSON scalar to a DataValue without any type guessing
pub fn json_value_to_data_value(json: &JsonValue) -> DataValue {
    match json {
        JsonValue::Null => DataValue::Null,
        JsonValue::Bool(b) => DataValue::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                DataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                DataValue::Float(f)
            } else {
                DataValue::String(n.to_string())
            }
        }
        JsonValue::String(s) => DataValue::String(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => DataValue::String(json.to_string()),
    }
}
