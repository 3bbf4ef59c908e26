//! A table plus the rules highlighting it.
//!
//! The model owns the data for one view, its `FilterManager`, and an
//! optional precomputed highlight mask. When a mask is attached it wins over
//! re-evaluating the rules, so derived views can highlight by a union of
//! rule sets the manager alone cannot express.
//!
//! The model subscribes to its own `FilterManager`: every rule change and
//! every model event bumps a revision counter, which views compare against
//! to know when their cached rows are out of date.

use crate::data::datatable::{ColumnKind, ColumnStats, DataTable, DataValue};
use crate::filter::manager::{FilterManager, ObserverId};
use crate::filter::rule::Rgb;
use anyhow::{anyhow, Result};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// Prefix shown in front of headers of filtered columns
pub const FILTER_INDICATOR: &str = "[F] ";

/// Strip the filter indicator from a displayed header
pub fn strip_filter_indicator(label: &str) -> &str {
    label.strip_prefix(FILTER_INDICATOR).unwrap_or(label)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    DataLoaded { rows: usize, columns: usize },
    CellUpdated { row: usize, column: String },
    HighlightChanged,
    Sorted { column: String, ascending: bool },
}

type ModelObserver = Box<dyn FnMut(&ModelEvent)>;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Revisions are unique across models, so a view never mistakes a swapped-in
/// model for the one it last saw
fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

pub struct TableModel {
    table: DataTable,
    filters: FilterManager,
    highlight_mask: Option<Vec<bool>>,
    observers: Vec<(ObserverId, ModelObserver)>,
    next_observer_id: ObserverId,
    revision: Rc<Cell<u64>>,
}

impl fmt::Debug for TableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableModel")
            .field("table", &self.table.name)
            .field("rows", &self.table.row_count())
            .field("filters", &self.filters)
            .field("has_mask", &self.highlight_mask.is_some())
            .field("revision", &self.revision.get())
            .finish()
    }
}

impl TableModel {
    pub fn new(table: DataTable) -> Self {
        let revision = Rc::new(Cell::new(next_revision()));
        let mut filters = FilterManager::new();
        let counter = Rc::clone(&revision);
        filters.add_observer(move |event| {
            counter.set(next_revision());
            trace!(target: "model", "Rules changed: {}", event.name());
        });

        Self {
            table,
            filters,
            highlight_mask: None,
            observers: Vec::new(),
            next_observer_id: 0,
            revision,
        }
    }

    /// Changes seen so far, from the rules or the model itself
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub fn add_observer<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&ModelEvent) + 'static,
    {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        before != self.observers.len()
    }

    fn notify(&mut self, event: ModelEvent) {
        self.revision.set(next_revision());
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    pub fn table(&self) -> &DataTable {
        &self.table
    }

    pub fn filters(&self) -> &FilterManager {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterManager {
        &mut self.filters
    }

    /// Swap in a new table; rules and the mask no longer apply and are dropped
    pub fn set_table(&mut self, table: DataTable) {
        info!(
            target: "model",
            "Loading '{}' ({} rows, {} columns)",
            table.name,
            table.row_count(),
            table.column_count()
        );
        self.table = table;
        self.filters.clear_all();
        self.highlight_mask = None;
        let event = ModelEvent::DataLoaded {
            rows: self.table.row_count(),
            columns: self.table.column_count(),
        };
        self.notify(event);
    }

    /// Replace the table while keeping the rules, as after a merge
    pub fn replace_rows(&mut self, table: DataTable) {
        self.table = table;
        self.highlight_mask = None;
        let event = ModelEvent::DataLoaded {
            rows: self.table.row_count(),
            columns: self.table.column_count(),
        };
        self.notify(event);
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.table.column_count()
    }

    /// Header as displayed, with the indicator on filtered columns
    pub fn header_label(&self, col: usize) -> Option<String> {
        let name = &self.table.columns.get(col)?.name;
        if self.filters.has_filters_for_column(name) {
            Some(format!("{}{}", FILTER_INDICATOR, name))
        } else {
            Some(name.clone())
        }
    }

    pub fn header_labels(&self) -> Vec<String> {
        (0..self.column_count())
            .filter_map(|col| self.header_label(col))
            .collect()
    }

    /// Resolve a displayed or plain header to a column index
    pub fn column_for_label(&self, label: &str) -> Option<usize> {
        self.table.get_column_index(strip_filter_indicator(label))
    }

    pub fn highlight_mask(&self) -> Option<&[bool]> {
        self.highlight_mask.as_deref()
    }

    pub fn set_highlight_mask(&mut self, mask: Option<Vec<bool>>) {
        self.highlight_mask = mask;
        self.notify(ModelEvent::HighlightChanged);
    }

    /// Mask first, then the rules; no rules means nothing is highlighted
    pub fn is_row_highlighted(&self, row: usize) -> bool {
        if let Some(mask) = &self.highlight_mask {
            if row < mask.len() {
                return mask[row];
            }
        }

        if !self.filters.has_filters() {
            return false;
        }

        self.filters.matches_all_filters(&self.table, row)
    }

    pub fn highlighted_rows(&self) -> Vec<bool> {
        (0..self.row_count())
            .map(|row| self.is_row_highlighted(row))
            .collect()
    }

    /// Background of one cell: colour of the first matching rule on its column
    pub fn cell_color(&self, row: usize, col: usize) -> Option<Rgb> {
        let column = self.table.columns.get(col)?;
        let value = self.table.get_value(row, col)?;
        self.filters.get_color_for_cell(&column.name, value)
    }

    /// Edit one cell from user input, coercing it to the column type
    pub fn set_cell(&mut self, row: usize, column: &str, input: &str) -> Result<DataValue> {
        let col = self
            .column_for_label(column)
            .ok_or_else(|| anyhow!("Unknown column '{}'", column))?;
        if row >= self.table.row_count() {
            return Err(anyhow!(
                "Row {} out of range (table has {} rows)",
                row,
                self.table.row_count()
            ));
        }

        let value = self.table.coerce_input(col, input);
        self.table.set_value(row, col, value.clone());
        self.table.refresh_column_stats();
        debug!(target: "model", "Set row {} '{}' to {:?}", row, column, value);

        let column = self.table.columns[col].name.clone();
        self.notify(ModelEvent::CellUpdated { row, column });
        Ok(value)
    }

    pub fn column_kind(&self, column: &str) -> Option<ColumnKind> {
        self.table
            .get_column(strip_filter_indicator(column))
            .map(|c| c.data_type.kind())
    }

    pub fn column_stats(&self, column: &str) -> Option<ColumnStats> {
        self.table.column_stats(strip_filter_indicator(column))
    }

    /// Sort rows on one column, carrying the highlight mask along
    pub fn sort_by(&mut self, column: &str, ascending: bool) -> Result<()> {
        let col = self
            .column_for_label(column)
            .ok_or_else(|| anyhow!("Unknown column '{}'", column))?;

        let order = self.table.sort_order(col, ascending);
        self.table.reorder(&order);
        if let Some(mask) = self.highlight_mask.take() {
            self.highlight_mask = Some(
                order
                    .iter()
                    .map(|&idx| mask.get(idx).copied().unwrap_or(false))
                    .collect(),
            );
        }

        let column = self.table.columns[col].name.clone();
        self.notify(ModelEvent::Sorted { column, ascending });
        Ok(())
    }

    /// Independent copy of a set of rows with no rules attached
    pub fn snapshot(&self, rows: &[usize]) -> TableModel {
        TableModel::new(self.table.select_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::{FilterRule, NumericOperator};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn model() -> TableModel {
        TableModel::new(
            DataTable::from_rows(
                "students",
                &["GPA", "Status"],
                vec![
                    vec![DataValue::Float(3.6), DataValue::String("Active".to_string())],
                    vec![DataValue::Float(2.1), DataValue::String("Probation".to_string())],
                    vec![DataValue::Float(3.9), DataValue::String("Active".to_string())],
                ],
            )
            .unwrap(),
        )
    }

    fn gpa_high() -> FilterRule {
        FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5)
    }

    #[test]
    fn test_no_filters_means_nothing_highlighted() {
        let model = model();
        assert_eq!(model.highlighted_rows(), vec![false, false, false]);
    }

    #[test]
    fn test_highlight_from_rules_and_mask() {
        let mut model = model();
        model.filters_mut().add_filter(gpa_high());
        assert_eq!(model.highlighted_rows(), vec![true, false, true]);

        model.set_highlight_mask(Some(vec![false, true]));
        // Rows past the end of the mask fall back to the rules
        assert_eq!(model.highlighted_rows(), vec![false, true, true]);
    }

    #[test]
    fn test_header_indicator() {
        let mut model = model();
        model.filters_mut().add_filter(gpa_high());
        assert_eq!(model.header_labels(), vec!["[F] GPA", "Status"]);
        assert_eq!(model.column_for_label("[F] GPA"), Some(0));
        assert_eq!(model.column_for_label("Status"), Some(1));
    }

    #[test]
    fn test_set_table_resets_rules() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut model = model();
        let sink = events.clone();
        model.add_observer(move |e| sink.borrow_mut().push(e.clone()));
        model.filters_mut().add_filter(gpa_high());
        model.set_highlight_mask(Some(vec![true, true, true]));

        model.set_table(DataTable::new("empty"));
        assert!(!model.filters().has_filters());
        assert!(model.highlight_mask().is_none());
        assert_eq!(
            events.borrow().last(),
            Some(&ModelEvent::DataLoaded { rows: 0, columns: 0 })
        );
    }

    #[test]
    fn test_revision_follows_rules_and_edits() {
        let mut model = model();
        let start = model.revision();

        model.filters_mut().add_filter(gpa_high());
        let after_add = model.revision();
        assert!(after_add > start);

        model.set_cell(0, "GPA", "3.0").unwrap();
        assert!(model.revision() > after_add);

        let before_clear = model.revision();
        model.filters_mut().clear_column_filters("Status");
        assert_eq!(model.revision(), before_clear);
    }

    #[test]
    fn test_set_cell_coerces_or_keeps_raw() {
        let mut model = model();
        assert_eq!(model.set_cell(1, "GPA", "3.7").unwrap(), DataValue::Float(3.7));
        assert_eq!(model.set_cell(1, "[F] GPA", "").unwrap(), DataValue::Null);
        assert_eq!(
            model.set_cell(1, "GPA", "withdrawn").unwrap(),
            DataValue::String("withdrawn".to_string())
        );
        assert!(model.set_cell(9, "GPA", "1").is_err());
        assert!(model.set_cell(0, "Major", "x").is_err());
    }

    #[test]
    fn test_cell_color() {
        let mut model = model();
        model.filters_mut().add_filter(gpa_high());
        assert_eq!(model.cell_color(0, 0), Some(gpa_high().color()));
        assert_eq!(model.cell_color(1, 0), None);
        assert_eq!(model.cell_color(0, 1), None);
    }

    #[test]
    fn test_sort_carries_mask() {
        let mut model = model();
        model.set_highlight_mask(Some(vec![false, true, false]));
        model.sort_by("GPA", true).unwrap();
        assert_eq!(model.highlight_mask(), Some(&[true, false, false][..]));
        assert_eq!(
            model.table().get_value_by_name(0, "Status").unwrap().to_string(),
            "Probation"
        );
    }

    #[test]
    fn test_column_kind() {
        let model = model();
        assert_eq!(model.column_kind("GPA"), Some(ColumnKind::Numeric));
        assert_eq!(model.column_kind("Status"), Some(ColumnKind::Text));
        assert_eq!(model.column_kind("Nope"), None);
    }
}
