use chrono::Local;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use crate::utils::dual_logging::{self, DualLogger};

/// Maximum number of log entries to keep in memory
const MAX_LOG_ENTRIES: usize = 1000;

/// Overrides the default `info` filter, e.g. `ADMISSIONS_LOG=workspace=debug`
pub const LOG_ENV_VAR: &str = "ADMISSIONS_LOG";

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, target: &str, message: String) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S.%3f").to_string(),
            level: level.to_string().to_uppercase(),
            target: target.to_string(),
            message,
        }
    }

    pub fn format_for_display(&self) -> String {
        format!(
            "[{}] {} [{}] {}",
            self.timestamp, self.level, self.target, self.message
        )
    }
}

/// Thread-safe ring buffer for log entries
#[derive(Clone, Default)]
pub struct LogRingBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogRingBuffer {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `count` entries, oldest first
    pub fn get_recent(&self, count: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(count).rev().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split a compact-format line ("LEVEL target: message") into its parts
///
/// Lines without a level prefix are kept whole under the "general" target.
pub fn parse_compact_line(line: &str) -> (Level, &str, &str) {
    let levels = [
        ("TRACE ", Level::TRACE),
        ("DEBUG ", Level::DEBUG),
        ("INFO ", Level::INFO),
        ("WARN ", Level::WARN),
        ("ERROR ", Level::ERROR),
    ];

    let Some((level, rest)) = levels
        .iter()
        .find_map(|(prefix, level)| line.strip_prefix(prefix).map(|rest| (*level, rest)))
    else {
        return (Level::INFO, "general", line);
    };

    match rest.find(':') {
        Some(colon) if !rest[..colon].contains(' ') => {
            (level, &rest[..colon], rest[colon + 1..].trim())
        }
        _ => (level, "general", rest),
    }
}

/// Writer handed to the fmt layer: every line goes to the ring buffer and the log file
pub struct DualWriter {
    buffer: LogRingBuffer,
    dual_logger: Option<&'static DualLogger>,
}

impl DualWriter {
    pub fn new(buffer: LogRingBuffer, dual_logger: Option<&'static DualLogger>) -> Self {
        Self {
            buffer,
            dual_logger,
        }
    }
}

impl std::io::Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(message) = std::str::from_utf8(buf) {
            for line in message.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let (level, target, msg) = parse_compact_line(line);
                let entry = LogEntry::new(level, target, msg.to_string());
                if let Some(logger) = self.dual_logger {
                    logger.log(&entry);
                }
                self.buffer.push(entry);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(logger) = self.dual_logger {
            logger.flush();
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DualWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Clone for DualWriter {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            dual_logger: self.dual_logger,
        }
    }
}

static LOG_BUFFER: OnceLock<LogRingBuffer> = OnceLock::new();

pub fn init_log_buffer() -> LogRingBuffer {
    LOG_BUFFER.get_or_init(LogRingBuffer::new).clone()
}

/// Entries shown by the shell's `logs` command
pub fn get_log_buffer() -> Option<LogRingBuffer> {
    LOG_BUFFER.get().cloned()
}

/// Initialize tracing with dual logging (ring buffer + file under `log_dir`)
pub fn init_tracing_with_dual_logging(log_dir: Option<&Path>) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let dual_logger = log_dir.map(dual_logging::init_dual_logger);
    let buffer = init_log_buffer();
    let dual_writer = DualWriter::new(buffer, dual_logger);

    let fmt_layer = fmt::layer()
        .with_writer(dual_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .without_time() // LogEntry stamps its own time
        .compact();

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();

    match dual_logger {
        Some(logger) => tracing::info!(
            target: "admissions",
            "Logging initialized, writing to {}",
            logger.log_path().display()
        ),
        None => tracing::info!(target: "admissions", "Logging initialized (memory only)"),
    }
}

/// Route panics through tracing so they land in the log file, then run the default hook
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        tracing::error!(target: "panic", "Panic at {}: {}", location, payload);
        if let Some(logger) = dual_logging::get_dual_logger() {
            logger.flush();
        }
        default_hook(info);
    }));
}
