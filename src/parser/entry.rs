use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inclusive 1-based line span in the originating log file.
///
/// Every entry keeps the span it was built from; concatenating the spans of
/// all entries of a file reconstructs the file without gaps or overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start >= 1 && end >= start);
        Self { start, end }
    }

    /// Number of raw lines covered by this span (never zero).
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Unknown,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DEBUG" | "TRACE" | "D" => LogLevel::Debug,
            "INFO" | "I" => LogLevel::Info,
            "WARNING" | "WARN" | "W" => LogLevel::Warn,
            "ERROR" | "ERR" | "E" => LogLevel::Error,
            "CRITICAL" | "FATAL" | "C" | "F" => LogLevel::Critical,
            _ => LogLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Unknown => "UNKNOWN",
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warn => 3,
            LogLevel::Error => 4,
            LogLevel::Critical => 5,
            LogLevel::Unknown => 0,
        }
    }

    /// Levels that make an entry an extraction candidate on their own.
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

/// One normalized unit of log content.
///
/// A single entry may span multiple raw lines when continuation lines (for
/// example a traceback) were folded into its message. Entries are never
/// mutated after construction; each pipeline stage produces new values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Best-effort parsed timestamp; `None` when absent or unparsable.
    pub timestamp: Option<DateTime<Local>>,
    pub level: LogLevel,
    pub service: Option<String>,
    /// Message text, possibly multi-line with an embedded traceback.
    pub message: String,
    /// Explicit error type carried by structured records, when present.
    pub error_type: Option<String>,
    /// Log file this entry came from.
    pub source_file: PathBuf,
    /// Provenance span of this entry within `source_file`.
    pub lines: LineRange,
}

impl LogEntry {
    pub fn new(source_file: PathBuf, lines: LineRange) -> Self {
        Self {
            timestamp: None,
            level: LogLevel::Unknown,
            service: None,
            message: String::new(),
            error_type: None,
            source_file,
            lines,
        }
    }
}
