//! Filter rules, the rule manager and the shell's rule syntax.

pub mod error;
pub mod manager;
pub mod parser;
pub mod rule;

pub use error::{FilterError, FilterResult};
pub use manager::{CombinationMode, FilterEvent, FilterManager, ObserverId};
pub use parser::parse_rule;
pub use rule::{DateFilter, FilterRule, NumericFilter, NumericOperator, Rgb, TextFilter};
