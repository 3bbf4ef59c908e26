//! Column-keyed collection of active rules with change notification.

use crate::data::datatable::{DataTable, DataValue};
use crate::filter::rule::{FilterRule, Rgb};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// How several rules on one tab combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    #[default]
    All,
    Any,
}

impl CombinationMode {
    /// Parse leniently: anything other than "any" means "all"
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for CombinationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "and" => Ok(CombinationMode::All),
            "any" | "or" => Ok(CombinationMode::Any),
            other => Err(format!("unknown combination mode '{}'", other)),
        }
    }
}

impl fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombinationMode::All => write!(f, "all"),
            CombinationMode::Any => write!(f, "any"),
        }
    }
}

/// Notification sent to observers after every change
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    FilterAdded(FilterRule),
    FilterRemoved(FilterRule),
    ColumnFiltersCleared(String),
    FiltersCleared,
}

impl FilterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FilterEvent::FilterAdded(_) => "filter_added",
            FilterEvent::FilterRemoved(_) => "filter_removed",
            FilterEvent::ColumnFiltersCleared(_) => "column_filters_cleared",
            FilterEvent::FiltersCleared => "filters_cleared",
        }
    }
}

pub type ObserverId = usize;

type Observer = Box<dyn FnMut(&FilterEvent)>;

/// Value of `rule`'s column in `row`, or `None` when the column is absent
fn cell_for<'a>(rule: &FilterRule, table: &'a DataTable, row: usize) -> Option<&'a DataValue> {
    table.get_value_by_name(row, rule.column())
}

/// Evaluate a tab's own rule list against one row
///
/// Only rules whose column exists take part. With no applicable rule the
/// row does not match; otherwise `All` needs every applicable rule and `Any`
/// needs one.
pub fn rules_match_row(
    rules: &[FilterRule],
    mode: CombinationMode,
    table: &DataTable,
    row: usize,
) -> bool {
    let mut applicable = rules
        .iter()
        .filter_map(|rule| cell_for(rule, table, row).map(|value| rule.matches(value)))
        .peekable();

    if applicable.peek().is_none() {
        return false;
    }

    match mode {
        CombinationMode::All => applicable.all(|matched| matched),
        CombinationMode::Any => applicable.any(|matched| matched),
    }
}

/// Row mask for a rule list over a whole table
pub fn rules_mask(rules: &[FilterRule], mode: CombinationMode, table: &DataTable) -> Vec<bool> {
    (0..table.row_count())
        .map(|row| rules_match_row(rules, mode, table, row))
        .collect()
}

/// Active rules grouped by column, in the order columns were first filtered
#[derive(Default)]
pub struct FilterManager {
    filters: IndexMap<String, Vec<FilterRule>>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: ObserverId,
}

impl fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterManager")
            .field("filters", &self.filters)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback run synchronously after each change
    pub fn add_observer<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&FilterEvent) + 'static,
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

    fn notify(&mut self, event: FilterEvent) {
        trace!(target: "filters", "Notifying {} observer(s): {}", self.observers.len(), event.name());
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    /// Add a rule unless an equal one is already active; returns whether it was added
    pub fn add_filter(&mut self, rule: FilterRule) -> bool {
        let bucket = self.filters.entry(rule.column().to_string()).or_default();
        if bucket.contains(&rule) {
            debug!(target: "filters", "Skipping duplicate filter: {}", rule);
            return false;
        }

        debug!(target: "filters", "Adding filter: {}", rule);
        bucket.push(rule.clone());
        self.notify(FilterEvent::FilterAdded(rule));
        true
    }

    /// Remove a rule; the column bucket goes away with its last rule
    pub fn remove_filter(&mut self, rule: &FilterRule) -> bool {
        let Some(bucket) = self.filters.get_mut(rule.column()) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|r| r == rule) else {
            return false;
        };

        bucket.remove(position);
        if bucket.is_empty() {
            self.filters.shift_remove(rule.column());
        }

        debug!(target: "filters", "Removed filter: {}", rule);
        self.notify(FilterEvent::FilterRemoved(rule.clone()));
        true
    }

    pub fn clear_column_filters(&mut self, column: &str) -> usize {
        let Some(removed) = self.filters.shift_remove(column) else {
            return 0;
        };

        debug!(target: "filters", "Cleared {} filter(s) on '{}'", removed.len(), column);
        self.notify(FilterEvent::ColumnFiltersCleared(column.to_string()));
        removed.len()
    }

    pub fn clear_all(&mut self) {
        self.filters.clear();
        self.notify(FilterEvent::FiltersCleared);
    }

    pub fn get_filters_for_column(&self, column: &str) -> &[FilterRule] {
        self.filters.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All rules, column by column
    pub fn get_all_filters(&self) -> Vec<FilterRule> {
        self.filters.values().flatten().cloned().collect()
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn has_filters_for_column(&self, column: &str) -> bool {
        self.filters.contains_key(column)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.values().map(Vec::len).sum()
    }

    /// Colour of the first rule on `column` that accepts `value`
    pub fn get_color_for_cell(&self, column: &str, value: &DataValue) -> Option<Rgb> {
        self.get_filters_for_column(column)
            .iter()
            .find(|rule| rule.matches(value))
            .map(FilterRule::color)
    }

    /// OR over every rule; columns the table lacks are skipped
    pub fn matches_any_filter(&self, table: &DataTable, row: usize) -> bool {
        self.filters.iter().any(|(column, rules)| {
            table
                .get_value_by_name(row, column)
                .is_some_and(|value| rules.iter().any(|rule| rule.matches(value)))
        })
    }

    /// AND across columns, OR within a column
    ///
    /// No active rules accepts every row. A filtered column the table lacks
    /// rejects the row.
    pub fn matches_all_filters(&self, table: &DataTable, row: usize) -> bool {
        self.filters.iter().all(|(column, rules)| {
            table
                .get_value_by_name(row, column)
                .is_some_and(|value| rules.iter().any(|rule| rule.matches(value)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::NumericOperator;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn table() -> DataTable {
        DataTable::from_rows(
            "students",
            &["GPA", "Scholarship", "Status"],
            vec![
                vec![
                    DataValue::Float(3.6),
                    DataValue::Integer(0),
                    DataValue::String("Active".to_string()),
                ],
                vec![
                    DataValue::Float(2.0),
                    DataValue::Integer(500),
                    DataValue::String("Probation".to_string()),
                ],
            ],
        )
        .unwrap()
    }

    fn gpa_high() -> FilterRule {
        FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5)
    }

    fn has_scholarship() -> FilterRule {
        FilterRule::numeric("Scholarship", NumericOperator::Greater, 0.0)
    }

    #[test]
    fn test_add_deduplicates_and_notifies() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut manager = FilterManager::new();
        let sink = events.clone();
        manager.add_observer(move |event| sink.borrow_mut().push(event.name()));

        assert!(manager.add_filter(gpa_high()));
        assert!(!manager.add_filter(gpa_high()));
        assert_eq!(manager.filter_count(), 1);
        assert_eq!(*events.borrow(), vec!["filter_added"]);
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let mut manager = FilterManager::new();
        manager.add_filter(gpa_high());
        assert!(manager.remove_filter(&gpa_high()));
        assert!(!manager.has_filters_for_column("GPA"));
        assert!(!manager.remove_filter(&gpa_high()));
    }

    #[test]
    fn test_clear_events() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut manager = FilterManager::new();
        manager.add_filter(gpa_high());
        manager.add_filter(has_scholarship());
        let sink = events.clone();
        let id = manager.add_observer(move |event| sink.borrow_mut().push(event.clone()));

        assert_eq!(manager.clear_column_filters("GPA"), 1);
        assert_eq!(manager.clear_column_filters("GPA"), 0);
        manager.clear_all();
        assert!(manager.remove_observer(id));
        manager.add_filter(gpa_high());

        assert_eq!(
            *events.borrow(),
            vec![
                FilterEvent::ColumnFiltersCleared("GPA".to_string()),
                FilterEvent::FiltersCleared
            ]
        );
    }

    #[test]
    fn test_all_filters_keeps_column_order() {
        let mut manager = FilterManager::new();
        manager.add_filter(has_scholarship());
        manager.add_filter(gpa_high());
        manager.add_filter(FilterRule::numeric("Scholarship", NumericOperator::Less, 100.0));
        let columns: Vec<String> = manager
            .get_all_filters()
            .iter()
            .map(|r| r.column().to_string())
            .collect();
        assert_eq!(columns, vec!["Scholarship", "Scholarship", "GPA"]);
    }

    #[test]
    fn test_and_or_semantics() {
        let table = table();
        let mut manager = FilterManager::new();
        assert!(manager.matches_all_filters(&table, 0));
        assert!(!manager.matches_any_filter(&table, 0));

        manager.add_filter(gpa_high());
        manager.add_filter(has_scholarship());
        assert!(manager.matches_any_filter(&table, 0));
        assert!(manager.matches_any_filter(&table, 1));
        assert!(!manager.matches_all_filters(&table, 0));
        assert!(!manager.matches_all_filters(&table, 1));
    }

    #[test]
    fn test_or_within_column_for_all() {
        let table = table();
        let mut manager = FilterManager::new();
        manager.add_filter(gpa_high());
        manager.add_filter(FilterRule::numeric("GPA", NumericOperator::Less, 2.5));
        assert!(manager.matches_all_filters(&table, 0));
        assert!(manager.matches_all_filters(&table, 1));
    }

    #[test]
    fn test_absent_column() {
        let table = table();
        let mut manager = FilterManager::new();
        manager.add_filter(FilterRule::text("Major", ["math"], false));
        assert!(!manager.matches_all_filters(&table, 0));
        assert!(!manager.matches_any_filter(&table, 0));
        manager.add_filter(gpa_high());
        assert!(manager.matches_any_filter(&table, 0));
    }

    #[test]
    fn test_color_for_cell() {
        let mut manager = FilterManager::new();
        manager.add_filter(gpa_high());
        assert_eq!(
            manager.get_color_for_cell("GPA", &DataValue::Float(3.9)),
            Some(gpa_high().color())
        );
        assert_eq!(manager.get_color_for_cell("GPA", &DataValue::Float(1.0)), None);
        assert_eq!(manager.get_color_for_cell("Status", &DataValue::Null), None);
    }

    #[test]
    fn test_rules_match_row_modes() {
        let table = table();
        let rules = vec![gpa_high(), has_scholarship()];
        assert!(rules_match_row(&rules, CombinationMode::Any, &table, 0));
        assert!(rules_match_row(&rules, CombinationMode::Any, &table, 1));
        assert!(!rules_match_row(&rules, CombinationMode::All, &table, 0));

        let missing = vec![FilterRule::text("Major", ["x"], false)];
        assert!(!rules_match_row(&missing, CombinationMode::Any, &table, 0));
        assert_eq!(rules_mask(&[gpa_high()], CombinationMode::All, &table), vec![true, false]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("ANY".parse::<CombinationMode>(), Ok(CombinationMode::Any));
        assert!("some".parse::<CombinationMode>().is_err());
        assert_eq!(CombinationMode::parse_lenient("bogus"), CombinationMode::All);
    }
}
