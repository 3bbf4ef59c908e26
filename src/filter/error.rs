//! Error types for filter rules and the rule expression parser.

use thiserror::Error;

/// A specialized Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised while building, parsing or restoring filter rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    /// The rule expression is empty.
    #[error("filter expression is empty")]
    EmptyExpression,

    /// A serialized rule carries a `type` this build does not know.
    #[error("unknown filter type: {kind}")]
    UnknownRuleType { kind: String },

    /// A serialized rule has the right type but malformed fields.
    #[error("invalid filter definition: {reason}")]
    InvalidRule { reason: String },

    /// A comparison operator outside `>= <= == > < !=`.
    #[error("unknown operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("invalid number: {value}")]
    InvalidNumber { value: String },

    #[error("invalid date: {value}")]
    InvalidDate { value: String },

    /// A text rule with nothing left after trimming its tokens.
    #[error("text filter needs at least one token")]
    EmptyTokens,

    /// Trailing or unrecognised input in a rule expression.
    #[error("could not parse filter expression near: {input}")]
    UnexpectedInput { input: String },
}

impl FilterError {
    pub fn unknown_rule_type(kind: impl Into<String>) -> Self {
        FilterError::UnknownRuleType { kind: kind.into() }
    }

    pub fn invalid_rule(reason: impl Into<String>) -> Self {
        FilterError::InvalidRule {
            reason: reason.into(),
        }
    }

    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        FilterError::UnknownOperator {
            operator: operator.into(),
        }
    }

    pub fn non_finite_threshold(value: f64) -> Self {
        FilterError::InvalidRule {
            reason: format!("numeric threshold must be finite, got {}", value),
        }
    }

    pub fn invalid_date(value: impl Into<String>) -> Self {
        FilterError::InvalidDate {
            value: value.into(),
        }
    }

    pub fn unexpected_input(input: impl Into<String>) -> Self {
        FilterError::UnexpectedInput {
            input: input.into(),
        }
    }
}
