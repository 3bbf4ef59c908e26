//! Configuration module
//!
//! Settings are read from a TOML file in the platform config directory.

pub mod config;

pub use config::{BehaviorConfig, Config, DisplayConfig, PathsConfig};
