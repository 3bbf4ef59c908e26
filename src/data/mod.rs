//! Data layer: tables, loading, merging, views and export
//!
//! `DataTable` holds the rows, `TableModel` pairs a table with its rules,
//! and `DataView` decides which model rows a tab shows.

pub mod archive;
pub mod data_exporter;
pub mod data_view;
pub mod datatable;
pub mod datatable_loaders;
pub mod merge;
pub mod table_model;
pub mod type_inference;
