//! Student admissions manager: load student tables, highlight them with
//! filter rules, organise the results in tabs and export or archive them.

pub mod commands;
pub mod config;
pub mod data;
pub mod filter;
pub mod presets;
pub mod utils;
pub mod workspace;
