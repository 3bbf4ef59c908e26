use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

const APP_DIR_NAME: &str = "student-admissions";

/// Resolved on-disk locations for state, presets, archives, logs and history
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
    presets_dir: PathBuf,
    archives_dir: PathBuf,
}

impl AppPaths {
    /// Resolve against the platform data directory unless the config overrides it
    pub fn from_config(paths: &PathsConfig) -> Result<Self> {
        let data_dir = match &paths.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .context("Cannot determine data directory")?
                .join(APP_DIR_NAME),
        };
        Self::with_overrides(
            data_dir,
            paths.presets_dir.clone(),
            paths.archive_dir.clone(),
        )
    }

    /// Everything under one root, e.g. a temp dir in tests
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_overrides(data_dir.into(), None, None)
    }

    fn with_overrides(
        data_dir: PathBuf,
        presets_dir: Option<PathBuf>,
        archives_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let presets_dir = presets_dir.unwrap_or_else(|| data_dir.join("presets"));
        let archives_dir = archives_dir.unwrap_or_else(|| data_dir.join("archives"));

        for dir in [&data_dir, &presets_dir, &archives_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }

        Ok(Self {
            data_dir,
            presets_dir,
            archives_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("app_state.json")
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    pub fn archives_dir(&self) -> &Path {
        &self.archives_dir
    }

    /// Created lazily by the log writer
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rooted_layout() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::rooted_at(dir.path().join("data")).unwrap();

        assert_eq!(paths.state_file(), dir.path().join("data/app_state.json"));
        assert!(paths.presets_dir().is_dir());
        assert!(paths.archives_dir().is_dir());
        assert_eq!(paths.history_file().file_name().unwrap(), "history.txt");
    }

    #[test]
    fn test_config_overrides() {
        let dir = TempDir::new().unwrap();
        let config = PathsConfig {
            data_dir: Some(dir.path().join("data")),
            archive_dir: Some(dir.path().join("elsewhere")),
            presets_dir: None,
        };
        let paths = AppPaths::from_config(&config).unwrap();

        assert_eq!(paths.archives_dir(), dir.path().join("elsewhere"));
        assert_eq!(paths.presets_dir(), dir.path().join("data/presets"));
        assert!(paths.archives_dir().is_dir());
    }
}
