//! Timestamped workbook snapshots of the loaded data.

use crate::data::data_exporter::{DataExporter, ExportOptions, SheetLayout};
use crate::data::datatable::DataTable;
use crate::data::datatable_loaders::{load_excel_to_datatable, LoadOutcome};
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const ARCHIVE_PREFIX: &str = "archive_";
const ARCHIVE_EXTENSION: &str = ".xlsx";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveInfo {
    pub filename: String,
    pub path: PathBuf,
    /// Parsed from the file name; `None` for names that do not parse
    pub timestamp: Option<NaiveDateTime>,
    pub size: u64,
}

impl ArchiveInfo {
    /// Whole days between the snapshot and `now`
    pub fn age_days(&self, now: NaiveDateTime) -> Option<i64> {
        self.timestamp.map(|ts| (now - ts).num_days())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchivePeriod {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl ArchivePeriod {
    pub fn includes(&self, archive: &ArchiveInfo, now: NaiveDateTime) -> bool {
        if *self == ArchivePeriod::All {
            return true;
        }
        match archive.age_days(now) {
            None => false,
            Some(days) => match self {
                ArchivePeriod::Today => days == 0,
                ArchivePeriod::Week => days < 7,
                ArchivePeriod::Month => days < 30,
                ArchivePeriod::All => true,
            },
        }
    }
}

impl FromStr for ArchivePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(ArchivePeriod::Today),
            "week" => Ok(ArchivePeriod::Week),
            "month" => Ok(ArchivePeriod::Month),
            "all" => Ok(ArchivePeriod::All),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

impl fmt::Display for ArchivePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchivePeriod::Today => "today",
            ArchivePeriod::Week => "week",
            ArchivePeriod::Month => "month",
            ArchivePeriod::All => "all",
        };
        write!(f, "{}", name)
    }
}

/// Human readable size, one decimal place
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

fn parse_archive_name(filename: &str) -> Option<NaiveDateTime> {
    let stamp = filename
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_EXTENSION)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Directory of archive workbooks
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot a table now
    pub fn create_snapshot(&self, table: &DataTable, options: &ExportOptions) -> Result<PathBuf> {
        self.create_snapshot_at(table, options, Local::now().naive_local())
    }

    /// Snapshot a table under an explicit timestamp; always split into sheets
    pub fn create_snapshot_at(
        &self,
        table: &DataTable,
        options: &ExportOptions,
        timestamp: NaiveDateTime,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let filename = format!(
            "{}{}{}",
            ARCHIVE_PREFIX,
            timestamp.format(TIMESTAMP_FORMAT),
            ARCHIVE_EXTENSION
        );
        let path = self.dir.join(filename);
        let options = ExportOptions {
            layout: SheetLayout::Split,
            ..*options
        };
        DataExporter::write_xlsx(table, &path, &options)?;

        info!(target: "archive", "Created archive {}", path.display());
        Ok(path)
    }

    /// All archives, newest first; unparseable names sort last
    pub fn list(&self) -> Result<Vec<ArchiveInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with(ARCHIVE_PREFIX) || !filename.ends_with(ARCHIVE_EXTENSION) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            archives.push(ArchiveInfo {
                timestamp: parse_archive_name(&filename),
                path: entry.path(),
                filename,
                size,
            });
        }

        archives.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(archives)
    }

    pub fn list_period(&self, period: ArchivePeriod) -> Result<Vec<ArchiveInfo>> {
        let now = Local::now().naive_local();
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| period.includes(a, now))
            .collect())
    }

    /// Delete archives at least `days` whole days old
    pub fn prune_older_than(&self, days: i64, now: NaiveDateTime) -> Result<usize> {
        let stale: Vec<ArchiveInfo> = self
            .list()?
            .into_iter()
            .filter(|a| a.age_days(now).is_some_and(|age| age >= days))
            .collect();
        self.remove(&stale)
    }

    /// Delete everything but the newest `keep` archives
    pub fn prune_keep_latest(&self, keep: usize) -> Result<usize> {
        let stale: Vec<ArchiveInfo> = self.list()?.into_iter().skip(keep).collect();
        self.remove(&stale)
    }

    fn remove(&self, archives: &[ArchiveInfo]) -> Result<usize> {
        let mut removed = 0;
        for archive in archives {
            match fs::remove_file(&archive.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    target: "archive",
                    "Failed to delete {}: {}", archive.path.display(), e
                ),
            }
        }
        info!(target: "archive", "Pruned {} archive(s)", removed);
        Ok(removed)
    }

    /// Read back the full table from an archive's ALL sheet
    pub fn open(&self, path: &Path, threshold: f64) -> Result<DataTable> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("archive")
            .to_string();
        match load_excel_to_datatable(path, Some("ALL"), &name, threshold)? {
            LoadOutcome::Loaded(table) => Ok(table),
            LoadOutcome::NeedsSheet(_) => bail!("Archive {} has no ALL sheet", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::datatable::DataValue;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn table() -> DataTable {
        DataTable::from_rows(
            "students",
            &["Name", "GPA"],
            vec![vec![DataValue::String("Ada".to_string()), DataValue::Float(3.5)]],
        )
        .unwrap()
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_parse_archive_name() {
        assert_eq!(
            parse_archive_name("archive_2024-03-05_14-00-00.xlsx"),
            Some(at(5, 14))
        );
        assert_eq!(parse_archive_name("archive_latest.xlsx"), None);
    }

    #[test]
    fn test_list_sorted_and_pruned() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path().join("archives"));
        assert!(store.list().unwrap().is_empty());

        let options = ExportOptions::default();
        store.create_snapshot_at(&table(), &options, at(1, 9)).unwrap();
        store.create_snapshot_at(&table(), &options, at(20, 9)).unwrap();
        store.create_snapshot_at(&table(), &options, at(10, 9)).unwrap();
        fs::write(store.dir().join("notes.txt"), "x").unwrap();

        let listed = store.list().unwrap();
        let stamps: Vec<_> = listed.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![Some(at(20, 9)), Some(at(10, 9)), Some(at(1, 9))]);
        assert!(listed.iter().all(|a| a.size > 0));

        assert_eq!(store.prune_older_than(15, at(25, 8)).unwrap(), 1);
        assert_eq!(store.prune_keep_latest(1).unwrap(), 1);
        let left = store.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].timestamp, Some(at(20, 9)));
    }

    #[test]
    fn test_period_filter() {
        let now = at(20, 12);
        let info = |ts: Option<NaiveDateTime>| ArchiveInfo {
            filename: String::new(),
            path: PathBuf::new(),
            timestamp: ts,
            size: 0,
        };

        assert!(ArchivePeriod::Today.includes(&info(Some(at(20, 1))), now));
        assert!(!ArchivePeriod::Today.includes(&info(Some(at(19, 1))), now));
        assert!(ArchivePeriod::Week.includes(&info(Some(at(14, 1))), now));
        assert!(!ArchivePeriod::Week.includes(&info(Some(at(13, 1))), now));
        assert!(!ArchivePeriod::Month.includes(&info(None), now));
        assert!(ArchivePeriod::All.includes(&info(None), now));
        assert_eq!("Week".parse::<ArchivePeriod>(), Ok(ArchivePeriod::Week));
    }

    #[test]
    fn test_open_reads_all_sheet() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(dir.path());
        let path = store
            .create_snapshot_at(&table(), &ExportOptions::default(), at(2, 10))
            .unwrap();

        let restored = store.open(&path, 0.5).unwrap();
        assert_eq!(restored.column_names(), vec!["Name", "GPA"]);
        assert_eq!(restored.get_value_by_name(0, "GPA"), Some(&DataValue::Float(3.5)));
    }
}
