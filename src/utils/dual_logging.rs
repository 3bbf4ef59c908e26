use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::utils::logging::LogEntry;

/// Echo every log line to stderr when set
pub const DEBUG_ENV_VAR: &str = "ADMISSIONS_DEBUG";

static DUAL_LOGGER: OnceLock<DualLogger> = OnceLock::new();

/// Writes formatted log entries to a timestamped file
pub struct DualLogger {
    log_file: Mutex<Option<File>>,
    log_path: PathBuf,
}

impl DualLogger {
    pub fn new(log_dir: &Path) -> Self {
        let _ = std::fs::create_dir_all(log_dir);

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("admissions_{}.log", timestamp));

        let latest_path = log_dir.join("latest.log");

        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&latest_path);
            let _ = std::os::unix::fs::symlink(&log_path, &latest_path);
        }

        #[cfg(windows)]
        {
            // Symlinks need elevated rights on Windows; leave a pointer file instead
            let pointer_content = format!("Current log file: {}\n", log_path.display());
            let _ = std::fs::write(&latest_path, pointer_content);
        }

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok();

        Self {
            log_file: Mutex::new(log_file),
            log_path,
        }
    }

    pub fn log(&self, entry: &LogEntry) {
        let line = entry.format_for_display();

        let mut file_opt = self.log_file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref mut file) = *file_opt {
            let _ = writeln!(file, "{}", line);
            // Flushed per line so a crash leaves the tail on disk
            let _ = file.flush();
        }

        if std::env::var_os(DEBUG_ENV_VAR).is_some() {
            eprintln!("{}", line);
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn flush(&self) {
        let mut file_opt = self.log_file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref mut file) = *file_opt {
            let _ = file.flush();
        }
    }
}

/// Initialize the global dual logger; later calls return the first instance
pub fn init_dual_logger(log_dir: &Path) -> &'static DualLogger {
    DUAL_LOGGER.get_or_init(|| DualLogger::new(log_dir))
}

pub fn get_dual_logger() -> Option<&'static DualLogger> {
    DUAL_LOGGER.get()
}
