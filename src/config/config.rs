use crate::filter::manager::CombinationMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub behavior: BehaviorConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where state, presets, archives and logs live (platform data dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Override for the archive directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,

    /// Override for the presets directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Write an archive workbook after every load
    pub archive_on_load: bool,

    /// Write an archive workbook when the shell exits
    pub archive_on_exit: bool,

    /// Name of the always-present tab
    pub base_tab_name: String,

    /// Combination mode for rule tabs created without an explicit mode
    pub default_filter_mode: CombinationMode,

    /// Share of cells that must parse before a column is cast (0.0 - 1.0)
    pub inference_threshold: f64,

    /// Restore the last file and its tabs on startup
    pub restore_on_start: bool,

    /// Keep command history between sessions
    pub enable_history: bool,

    /// Maximum number of history entries to keep
    pub max_history_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Rows printed by `show` when no limit is given
    pub max_display_rows: usize,

    /// Truncate cell text wider than this
    pub max_column_width: usize,

    /// Print the source row number as the first column
    pub show_row_numbers: bool,

    /// Colour highlighted cells and rows in the terminal
    pub use_colors: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            archive_on_load: true,
            archive_on_exit: true,
            base_tab_name: "All Students".to_string(),
            default_filter_mode: CombinationMode::All,
            inference_threshold: 0.5,
            restore_on_start: true,
            enable_history: true,
            max_history_entries: 1000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_display_rows: 50,
            max_column_width: 40,
            show_row_numbers: true,
            use_colors: true,
        }
    }
}

impl Config {
    /// Load config from the default location, writing defaults if it is missing
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.behavior.inference_threshold = config.behavior.inference_threshold.clamp(0.0, 1.0);
        if config.behavior.base_tab_name.trim().is_empty() {
            config.behavior.base_tab_name = BehaviorConfig::default().base_tab_name;
        }
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("student-admissions").join("config.toml"))
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# Student Admissions Manager configuration
# Location: ~/.config/student-admissions/config.toml (Linux)
#           ~/Library/Application Support/student-admissions/config.toml (macOS)
#           %APPDATA%\student-admissions\config.toml (Windows)

[paths]
# Directory for app_state.json, presets/, archives/ and logs/
# data_dir = "/path/to/data"

# Separate archive or presets directories (default: inside data_dir)
# archive_dir = "/path/to/archives"
# presets_dir = "/path/to/presets"

[behavior]
# Write a timestamped archive workbook after every load
archive_on_load = true

# Write a final archive workbook when the shell exits
archive_on_exit = true

# Name of the tab that always shows the full data set
base_tab_name = "All Students"

# How rules combine in new rule tabs: "all" (AND) or "any" (OR)
default_filter_mode = "all"

# Share of non-empty cells that must parse as a number or date before
# a column is converted (0.0 - 1.0)
inference_threshold = 0.5

# Reload the last file and its tabs on startup
restore_on_start = true

# Keep command history between sessions
enable_history = true
max_history_entries = 1000

[display]
# Rows printed by `show` when no limit is given
max_display_rows = 50

# Truncate cell text wider than this many characters
max_column_width = 40

# Print source row numbers next to each row
show_row_numbers = true

# Colour highlighted rows and matching cells
use_colors = true
"#
        .to_string()
    }
}
