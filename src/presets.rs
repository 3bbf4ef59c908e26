//! Named filter bundles, one JSON file each in the presets directory.

use crate::filter::rule::FilterRule;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPreset {
    pub name: String,
    pub description: String,
    pub filters: Vec<FilterRule>,
}

/// On-disk shape; rules stay raw so one bad entry does not sink the file
#[derive(Serialize, Deserialize)]
struct PresetFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    filters: Vec<JsonValue>,
}

impl FilterPreset {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<FilterRule>) -> Self {
        self.filters = filters;
        self
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "filters": self.filters.iter().map(FilterRule::to_value).collect::<Vec<_>>(),
        })
    }

    /// Rebuild a preset, skipping rules that no longer deserialize
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let file: PresetFile = serde_json::from_value(value).context("Invalid preset file")?;
        let filters = file
            .filters
            .iter()
            .filter_map(|raw| match FilterRule::from_value(raw) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(target: "presets", "Skipping rule in preset '{}': {}", file.name, e);
                    None
                }
            })
            .collect();

        Ok(Self {
            name: file.name,
            description: file.description,
            filters,
        })
    }
}

/// Summary row for `preset list`
#[derive(Debug, Clone)]
pub struct PresetInfo {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub filter_count: usize,
}

/// File name for a preset: letters, digits, spaces, '-' and '_' only
pub fn preset_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    format!("{}.json", safe.trim())
}

pub struct PresetManager {
    dir: PathBuf,
}

impl PresetManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, preset: &FilterPreset) -> Result<PathBuf> {
        let file_name = preset_file_name(&preset.name);
        if file_name == ".json" {
            return Err(anyhow!(
                "Preset name '{}' has no usable characters",
                preset.name
            ));
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        let contents = serde_json::to_string_pretty(&preset.to_value())?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write preset {}", path.display()))?;

        info!(
            target: "presets",
            "Saved preset '{}' ({} filters) to {}",
            preset.name,
            preset.filters.len(),
            path.display()
        );
        Ok(path)
    }

    pub fn load_path(&self, path: &Path) -> Result<FilterPreset> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preset {}", path.display()))?;
        let value: JsonValue = serde_json::from_str(&contents)
            .with_context(|| format!("Preset {} is not valid JSON", path.display()))?;
        FilterPreset::from_value(value)
    }

    /// Find by display name first, then by file name
    pub fn find(&self, name: &str) -> Result<Option<PresetInfo>> {
        let presets = self.list()?;
        let by_file = preset_file_name(name);
        Ok(presets
            .iter()
            .find(|p| p.name == name)
            .or_else(|| presets.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
            .or_else(|| {
                presets
                    .iter()
                    .find(|p| p.path.file_name().is_some_and(|f| f == by_file.as_str()))
            })
            .cloned())
    }

    pub fn load(&self, name: &str) -> Result<FilterPreset> {
        let info = self
            .find(name)?
            .ok_or_else(|| anyhow!("No preset named '{}'", name))?;
        self.load_path(&info.path)
    }

    /// Every readable preset, sorted by name; unreadable files are logged and skipped
    pub fn list(&self) -> Result<Vec<PresetInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut presets = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match self.load_path(&path) {
                Ok(preset) => presets.push(PresetInfo {
                    name: preset.name,
                    description: preset.description,
                    filter_count: preset.filters.len(),
                    path,
                }),
                Err(e) => warn!(target: "presets", "Ignoring {}: {:#}", path.display(), e),
            }
        }

        presets.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        debug!(target: "presets", "Found {} presets in {}", presets.len(), self.dir.display());
        Ok(presets)
    }

    /// Returns false when there was nothing to delete
    pub fn delete(&self, name: &str) -> Result<bool> {
        let Some(info) = self.find(name)? else {
            return Ok(false);
        };
        fs::remove_file(&info.path)
            .with_context(|| format!("Failed to delete {}", info.path.display()))?;
        info!(target: "presets", "Deleted preset '{}'", info.name);
        Ok(true)
    }
}
