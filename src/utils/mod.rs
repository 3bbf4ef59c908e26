//! Paths and logging shared by the library and the shell

pub mod app_paths;
pub mod dual_logging;
pub mod logging;
