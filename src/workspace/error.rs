use thiserror::Error;

/// Tab operations the workspace refuses
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("no tab at index {0}")]
    NoSuchTab(usize),

    #[error("the Filtered tab is derived from the rule tabs and cannot be filtered directly")]
    FilteredTabNotEditable,

    #[error("the base tab cannot be closed")]
    BaseTabNotClosable,

    #[error("the Filtered tab cannot be closed")]
    FilteredTabNotClosable,

    #[error("this action is only available on the base tab")]
    BaseTabOnly,

    #[error("no filtered rows")]
    NoHighlightedRows,

    #[error("tab name cannot be empty")]
    EmptyTabName,

    #[error("no rows to put in a new tab")]
    EmptyTable,

    #[error("filter not found on this tab")]
    NoSuchFilter,

    #[error("no filters to apply")]
    NoFilters,

    #[error("load data first")]
    NoData,

    #[error("row {row} out of range ({visible} visible rows)")]
    RowOutOfRange { row: usize, visible: usize },

    #[error(
        "{existing} rows already loaded; choose --merge, --replace or --new-tab for the {incoming} incoming rows"
    )]
    LoadActionRequired { existing: usize, incoming: usize },
}
