//! Filter rules: single-column predicates with a highlight colour.

use crate::data::datatable::DataValue;
use crate::data::type_inference::TypeInference;
use crate::filter::error::{FilterError, FilterResult};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Background colour attached to a rule, used for cell highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed 0xRRGGBB
    pub fn as_u32(&self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

pub const TEXT_COLOR: Rgb = Rgb::new(255, 250, 205);
pub const DATE_COLOR: Rgb = Rgb::new(240, 230, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericOperator {
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "!=")]
    NotEqual,
}

impl NumericOperator {
    pub const ALL: [NumericOperator; 6] = [
        NumericOperator::GreaterOrEqual,
        NumericOperator::LessOrEqual,
        NumericOperator::Equal,
        NumericOperator::Greater,
        NumericOperator::Less,
        NumericOperator::NotEqual,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            NumericOperator::GreaterOrEqual => ">=",
            NumericOperator::LessOrEqual => "<=",
            NumericOperator::Equal => "==",
            NumericOperator::Greater => ">",
            NumericOperator::Less => "<",
            NumericOperator::NotEqual => "!=",
        }
    }

    pub fn from_symbol(symbol: &str) -> FilterResult<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == symbol)
            .ok_or_else(|| FilterError::unknown_operator(symbol))
    }

    pub fn evaluate(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            NumericOperator::GreaterOrEqual => lhs >= rhs,
            NumericOperator::LessOrEqual => lhs <= rhs,
            NumericOperator::Equal => lhs == rhs,
            NumericOperator::Greater => lhs > rhs,
            NumericOperator::Less => lhs < rhs,
            NumericOperator::NotEqual => lhs != rhs,
        }
    }

    pub fn color(&self) -> Rgb {
        match self {
            NumericOperator::GreaterOrEqual => Rgb::new(255, 230, 230),
            NumericOperator::LessOrEqual => Rgb::new(230, 255, 230),
            NumericOperator::Equal => Rgb::new(230, 230, 255),
            NumericOperator::Greater => Rgb::new(255, 220, 220),
            NumericOperator::Less => Rgb::new(220, 255, 220),
            NumericOperator::NotEqual => Rgb::new(245, 245, 245),
        }
    }
}

impl fmt::Display for NumericOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Deserialize)]
struct NumericFilterFields {
    column: String,
    operator: NumericOperator,
    value: f64,
}

impl TryFrom<NumericFilterFields> for NumericFilter {
    type Error = FilterError;

    fn try_from(fields: NumericFilterFields) -> FilterResult<Self> {
        if !fields.value.is_finite() {
            return Err(FilterError::non_finite_threshold(fields.value));
        }
        Ok(NumericFilter::new(fields.column, fields.operator, fields.value))
    }
}

/// Numeric threshold on one column
///
/// Thresholds are finite; the JSON form has no encoding for infinity or NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "NumericFilterFields")]
pub struct NumericFilter {
    pub column: String,
    pub operator: NumericOperator,
    pub value: f64,
}

impl NumericFilter {
    pub fn new(column: impl Into<String>, operator: NumericOperator, value: f64) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// Cells that do not coerce to a finite number never match
    pub fn matches(&self, value: &DataValue) -> bool {
        value
            .as_f64()
            .is_some_and(|cell| self.operator.evaluate(cell, self.value))
    }
}

impl PartialEq for NumericFilter {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column
            && self.operator == other.operator
            && self.value.to_bits() == other.value.to_bits()
    }
}

impl Eq for NumericFilter {}

impl Hash for NumericFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column.hash(state);
        self.operator.hash(state);
        self.value.to_bits().hash(state);
    }
}

#[derive(Deserialize)]
struct TextFilterFields {
    column: String,
    #[serde(default)]
    tokens: Vec<String>,
    #[serde(default)]
    case_sensitive: bool,
}

impl From<TextFilterFields> for TextFilter {
    fn from(fields: TextFilterFields) -> Self {
        TextFilter::new(fields.column, fields.tokens, fields.case_sensitive)
    }
}

/// Substring match against any of several tokens
///
/// Tokens are trimmed and blank ones dropped on construction; when the
/// filter is case-insensitive they are also lower-cased so matching only
/// has to fold the cell text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TextFilterFields")]
pub struct TextFilter {
    column: String,
    tokens: Vec<String>,
    case_sensitive: bool,
}

impl TextFilter {
    pub fn new<I, S>(column: impl Into<String>, tokens: I, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| if case_sensitive { t } else { t.to_lowercase() })
            .collect();

        Self {
            column: column.into(),
            tokens,
            case_sensitive,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn matches(&self, value: &DataValue) -> bool {
        if self.tokens.is_empty() {
            return false;
        }

        let text = value.to_string();
        if self.case_sensitive {
            self.tokens.iter().any(|token| text.contains(token.as_str()))
        } else {
            let text = text.to_lowercase();
            self.tokens.iter().any(|token| text.contains(token.as_str()))
        }
    }

    fn token_set(&self) -> BTreeSet<&str> {
        self.tokens.iter().map(String::as_str).collect()
    }
}

impl PartialEq for TextFilter {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column
            && self.case_sensitive == other.case_sensitive
            && self.token_set() == other.token_set()
    }
}

impl Eq for TextFilter {}

impl Hash for TextFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column.hash(state);
        self.token_set().hash(state);
        self.case_sensitive.hash(state);
    }
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => TypeInference::parse_date(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", text))),
    }
}

/// Inclusive date range, open on either side when a bound is missing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateFilter {
    pub column: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub end_date: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(
        column: impl Into<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            column: column.into(),
            start_date,
            end_date,
        }
    }

    pub fn matches(&self, value: &DataValue) -> bool {
        let Some(date) = value.as_date() else {
            return false;
        };

        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

/// A single-column predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterRule {
    Numeric(NumericFilter),
    Text(TextFilter),
    Date(DateFilter),
}

impl FilterRule {
    pub fn numeric(column: impl Into<String>, operator: NumericOperator, value: f64) -> Self {
        FilterRule::Numeric(NumericFilter::new(column, operator, value))
    }

    pub fn text<I, S>(column: impl Into<String>, tokens: I, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FilterRule::Text(TextFilter::new(column, tokens, case_sensitive))
    }

    pub fn date(
        column: impl Into<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        FilterRule::Date(DateFilter::new(column, start_date, end_date))
    }

    pub fn column(&self) -> &str {
        match self {
            FilterRule::Numeric(f) => &f.column,
            FilterRule::Text(f) => f.column(),
            FilterRule::Date(f) => &f.column,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FilterRule::Numeric(_) => "numeric",
            FilterRule::Text(_) => "text",
            FilterRule::Date(_) => "date",
        }
    }

    pub fn matches(&self, value: &DataValue) -> bool {
        match self {
            FilterRule::Numeric(f) => f.matches(value),
            FilterRule::Text(f) => f.matches(value),
            FilterRule::Date(f) => f.matches(value),
        }
    }

    pub fn color(&self) -> Rgb {
        match self {
            FilterRule::Numeric(f) => f.operator.color(),
            FilterRule::Text(_) => TEXT_COLOR,
            FilterRule::Date(_) => DATE_COLOR,
        }
    }

    /// Short name for a tab created from this rule
    pub fn tab_label(&self) -> String {
        match self {
            FilterRule::Numeric(n) => format!("{} {} {}", n.column, n.operator, n.value),
            FilterRule::Text(t) => {
                let mut tokens = t.tokens.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
                if t.tokens.len() > 2 {
                    tokens.push_str("...");
                }
                format!("{}: {}", t.column, tokens)
            }
            FilterRule::Date(d) => match (d.start_date, d.end_date) {
                (Some(start), Some(end)) => format!(
                    "{}: {} to {}",
                    d.column,
                    start.format("%Y-%m"),
                    end.format("%Y-%m")
                ),
                (Some(start), None) => format!("{}: After {}", d.column, start),
                (None, Some(end)) => format!("{}: Before {}", d.column, end),
                (None, None) => format!("{} Filter", d.column),
            },
        }
    }

    /// Plain JSON form, the same shape presets and the state file store
    pub fn to_value(&self) -> JsonValue {
        match self {
            FilterRule::Numeric(f) => json!({
                "type": "numeric",
                "column": f.column,
                "operator": f.operator.symbol(),
                "value": f.value,
            }),
            FilterRule::Text(f) => json!({
                "type": "text",
                "column": f.column,
                "tokens": f.tokens,
                "case_sensitive": f.case_sensitive,
            }),
            FilterRule::Date(f) => json!({
                "type": "date",
                "column": f.column,
                "start_date": f.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
                "end_date": f.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            }),
        }
    }

    pub fn from_value(value: &JsonValue) -> FilterResult<Self> {
        let kind = value
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| FilterError::invalid_rule("missing 'type' field"))?;

        if !matches!(kind, "numeric" | "text" | "date") {
            return Err(FilterError::unknown_rule_type(kind));
        }

        serde_json::from_value(value.clone()).map_err(|e| FilterError::invalid_rule(e.to_string()))
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRule::Numeric(n) => write!(f, "{} {} {}", n.column, n.operator, n.value),
            FilterRule::Text(t) => {
                let shown: Vec<&str> = t.tokens.iter().take(3).map(String::as_str).collect();
                write!(f, "{} contains: {}", t.column, shown.join(", "))?;
                if t.tokens.len() > 3 {
                    write!(f, "...")?;
                }
                Ok(())
            }
            FilterRule::Date(d) => match (d.start_date, d.end_date) {
                (Some(start), Some(end)) => write!(f, "{}: {} to {}", d.column, start, end),
                (Some(start), None) => write!(f, "{}: from {}", d.column, start),
                (None, Some(end)) => write!(f, "{}: until {}", d.column, end),
                (None, None) => write!(f, "{}: date filter", d.column),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_numeric_operators() {
        let cell = DataValue::Float(3.5);
        let expect = [
            (NumericOperator::GreaterOrEqual, true),
            (NumericOperator::LessOrEqual, true),
            (NumericOperator::Equal, true),
            (NumericOperator::Greater, false),
            (NumericOperator::Less, false),
            (NumericOperator::NotEqual, false),
        ];
        for (op, expected) in expect {
            assert_eq!(
                FilterRule::numeric("GPA", op, 3.5).matches(&cell),
                expected,
                "{op}"
            );
        }
    }

    #[test]
    fn test_numeric_non_coercible_never_matches() {
        let rule = FilterRule::numeric("GPA", NumericOperator::NotEqual, 1.0);
        assert!(!rule.matches(&DataValue::String("n/a".to_string())));
        assert!(!rule.matches(&DataValue::Null));
        assert!(!rule.matches(&DataValue::Float(f64::NAN)));
        assert!(rule.matches(&DataValue::String("2".to_string())));
    }

    #[test]
    fn test_text_tokens_normalised() {
        let rule = TextFilter::new("Status", ["  Active ", "", "PROBATION"], false);
        assert_eq!(rule.tokens(), &["active", "probation"]);
        assert!(rule.matches(&DataValue::String("Inactive".to_string())));
        assert!(!rule.matches(&DataValue::String("Graduated".to_string())));

        let strict = TextFilter::new("Status", ["Active"], true);
        assert!(!strict.matches(&DataValue::String("inactive".to_string())));
        assert!(strict.matches(&DataValue::String("Active".to_string())));
    }

    #[test]
    fn test_text_without_tokens_matches_nothing() {
        let rule = TextFilter::new("Status", ["  "], false);
        assert!(!rule.matches(&DataValue::String(String::new())));
    }

    #[test]
    fn test_date_range_inclusive() {
        let rule = FilterRule::date("Applied", Some(date(2024, 1, 1)), Some(date(2024, 6, 30)));
        assert!(rule.matches(&DataValue::DateTime("2024-01-01".to_string())));
        assert!(rule.matches(&DataValue::DateTime("2024-06-30 23:59:00".to_string())));
        assert!(!rule.matches(&DataValue::DateTime("2024-07-01".to_string())));
        assert!(!rule.matches(&DataValue::String("soon".to_string())));

        let open = FilterRule::date("Applied", None, Some(date(2024, 1, 1)));
        assert!(open.matches(&DataValue::String("12/31/1999".to_string())));
    }

    #[test]
    fn test_structural_equality() {
        let a = FilterRule::text("Major", ["math", "physics"], false);
        let b = FilterRule::text("Major", ["Physics", "MATH"], false);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
        assert!(set.insert(FilterRule::numeric("GPA", NumericOperator::Less, 2.0)));
    }

    #[test]
    fn test_round_trip_each_variant() {
        let rules = vec![
            FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5),
            FilterRule::text("Status", ["active", "pending"], false),
            FilterRule::date("Applied", Some(date(2024, 1, 1)), None),
        ];
        for rule in rules {
            let restored = FilterRule::from_value(&rule.to_value()).unwrap();
            assert_eq!(restored, rule);
        }
    }

    #[test]
    fn test_from_value_rejects_non_finite_threshold() {
        let err = FilterRule::from_value(&json!({
            "type": "numeric",
            "column": "GPA",
            "operator": ">",
            "value": null
        }));
        assert!(matches!(err, Err(FilterError::InvalidRule { .. })));

        let fields = NumericFilterFields {
            column: "GPA".to_string(),
            operator: NumericOperator::Greater,
            value: f64::INFINITY,
        };
        assert_eq!(
            NumericFilter::try_from(fields).unwrap_err(),
            FilterError::non_finite_threshold(f64::INFINITY)
        );

        let rule = FilterRule::numeric("GPA", NumericOperator::Less, 1e300);
        assert_eq!(FilterRule::from_value(&rule.to_value()).unwrap(), rule);
    }

    #[test]
    fn test_to_value_shape() {
        let rule = FilterRule::date("Applied", None, Some(date(2024, 6, 30)));
        assert_eq!(
            rule.to_value(),
            json!({"type": "date", "column": "Applied", "start_date": null, "end_date": "2024-06-30"})
        );
        let rule = FilterRule::numeric("GPA", NumericOperator::NotEqual, 2.0);
        assert_eq!(rule.to_value()["operator"], "!=");
    }

    #[test]
    fn test_from_value_is_lenient_on_input() {
        let rule = FilterRule::from_value(&json!({
            "type": "text",
            "column": "Name",
            "tokens": [" Smith "]
        }))
        .unwrap();
        assert_eq!(rule, FilterRule::text("Name", ["smith"], false));

        let rule = FilterRule::from_value(&json!({
            "type": "date",
            "column": "Applied",
            "start_date": "2024-01-01T00:00:00"
        }))
        .unwrap();
        assert_eq!(rule, FilterRule::date("Applied", Some(date(2024, 1, 1)), None));
    }

    #[test]
    fn test_from_value_rejects_unknown() {
        assert_eq!(
            FilterRule::from_value(&json!({"type": "regex", "column": "x"})),
            Err(FilterError::unknown_rule_type("regex"))
        );
        assert!(matches!(
            FilterRule::from_value(&json!({"type": "numeric", "column": "x", "operator": "=>", "value": 1})),
            Err(FilterError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_display_and_colors() {
        let rule = FilterRule::text("Major", ["a", "b", "c", "d"], false);
        assert_eq!(rule.to_string(), "Major contains: a, b, c...");
        assert_eq!(rule.color().to_hex(), "#FFFACD");

        let rule = FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5);
        assert_eq!(rule.to_string(), "GPA >= 3.5");
        assert_eq!(rule.color(), Rgb::new(255, 230, 230));
        assert_eq!(rule.color().as_u32(), 0xFFE6E6);

        let rule = FilterRule::date("Applied", Some(date(2024, 1, 1)), None);
        assert_eq!(rule.to_string(), "Applied: from 2024-01-01");
        assert_eq!(rule.color(), DATE_COLOR);
    }

    #[test]
    fn test_tab_labels() {
        assert_eq!(
            FilterRule::numeric("GPA", NumericOperator::GreaterOrEqual, 3.5).tab_label(),
            "GPA >= 3.5"
        );
        assert_eq!(
            FilterRule::text("Status", ["active", "pending", "hold"], false).tab_label(),
            "Status: active, pending..."
        );
        assert_eq!(
            FilterRule::date("Applied", Some(date(2024, 1, 5)), Some(date(2024, 6, 30))).tab_label(),
            "Applied: 2024-01 to 2024-06"
        );
        assert_eq!(
            FilterRule::date("Applied", None, Some(date(2024, 6, 30))).tab_label(),
            "Applied: Before 2024-06-30"
        );
    }
}
