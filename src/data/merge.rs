//! Combining a freshly loaded table into the one already open.

use crate::data::datatable::{DataColumn, DataRow, DataTable, DataType, DataValue};
use crate::data::datatable_loaders::DATE_ADDED_COLUMN;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Column mismatch: Missing: {}; Extra: {}", list_or_none(.missing), list_or_none(.extra))]
    ColumnMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },
}

fn list_or_none(columns: &[String]) -> String {
    if columns.is_empty() {
        "none".to_string()
    } else {
        columns.join(", ")
    }
}

/// Data columns, everything but the load timestamp
fn base_columns(table: &DataTable) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| c.name != DATE_ADDED_COLUMN)
        .map(|c| c.name.clone())
        .collect()
}

/// Check that both tables carry the same data columns
pub fn check_columns(existing: &DataTable, incoming: &DataTable) -> Result<(), MergeError> {
    let existing_set: BTreeSet<String> = base_columns(existing).into_iter().collect();
    let incoming_set: BTreeSet<String> = base_columns(incoming).into_iter().collect();

    if existing_set == incoming_set {
        return Ok(());
    }

    Err(MergeError::ColumnMismatch {
        missing: existing_set.difference(&incoming_set).cloned().collect(),
        extra: incoming_set.difference(&existing_set).cloned().collect(),
    })
}

/// Append `incoming` to `existing`, dropping duplicate records
///
/// Records are compared on the data columns only. When two records are
/// equal the later one survives, in its own position, so re-loading a file
/// refreshes the load timestamp of every row it contains.
pub fn merge_tables(existing: &DataTable, incoming: &DataTable) -> Result<DataTable, MergeError> {
    check_columns(existing, incoming)?;

    let base = base_columns(existing);
    let mut columns = base.clone();
    if existing.has_column(DATE_ADDED_COLUMN) || incoming.has_column(DATE_ADDED_COLUMN) {
        columns.push(DATE_ADDED_COLUMN.to_string());
    }

    let project = |table: &DataTable| -> Vec<DataRow> {
        let indices: Vec<Option<usize>> =
            columns.iter().map(|c| table.get_column_index(c)).collect();
        table
            .rows
            .iter()
            .map(|row| {
                DataRow::new(
                    indices
                        .iter()
                        .map(|idx| {
                            idx.and_then(|i| row.get(i).cloned())
                                .unwrap_or(DataValue::Null)
                        })
                        .collect(),
                )
            })
            .collect()
    };

    let mut combined = project(existing);
    combined.extend(project(incoming));

    let key_of = |row: &DataRow| -> Vec<String> {
        row.values[..base.len()]
            .iter()
            .map(|v| v.to_string())
            .collect()
    };

    let mut last_seen: HashMap<Vec<String>, usize> = HashMap::new();
    for (idx, row) in combined.iter().enumerate() {
        last_seen.insert(key_of(row), idx);
    }

    let total = combined.len();
    let rows: Vec<DataRow> = combined
        .into_iter()
        .enumerate()
        .filter(|(idx, row)| last_seen.get(&key_of(row)) == Some(idx))
        .map(|(_, row)| row)
        .collect();

    debug!(
        target: "merge",
        "Dropped {} duplicate row(s) out of {}",
        total - rows.len(),
        total
    );

    let mut merged = DataTable::new(existing.name.clone());
    merged.metadata = existing.metadata.clone();
    for name in &columns {
        let type_in = |table: &DataTable| table.get_column(name).map(|c| c.data_type);
        let data_type = match (type_in(existing), type_in(incoming)) {
            (Some(a), Some(b)) => a.merge(&b),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => DataType::Null,
        };
        merged.add_column(DataColumn::new(name.as_str()).with_type(data_type));
    }
    merged.rows = rows;
    merged.refresh_column_stats();

    info!(
        target: "merge",
        "Merged {} + {} rows into {}",
        existing.row_count(),
        incoming.row_count(),
        merged.row_count()
    );

    Ok(merged)
}
