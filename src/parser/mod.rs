pub mod entry;
pub mod plain;
pub mod structured;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use entry::LogEntry;
use fancy_regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// Normalization patterns
static QUOTED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).unwrap());
static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .unwrap()
});
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());
static PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:~|\.{1,2})?(?:/[\w.\-]+){2,}/?").unwrap());
static HEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b|\b[0-9a-fA-F]{8,}\b").unwrap());
static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Detected shape of a log file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON array-of-records content
    Structured,
    /// `[<timestamp>] <LEVEL> <service>: <message>` lines with continuations
    LineOriented,
}

/// Detect the log format from the file content.
///
/// Content whose trimmed start is `[` or `{` is treated as structured first;
/// the caller falls back to line-oriented parsing exactly once if the
/// structured parse fails as a whole.
pub fn detect_format(content: &str) -> LogFormat {
    match content.trim_start().chars().next() {
        Some('[' | '{') => LogFormat::Structured,
        _ => LogFormat::LineOriented,
    }
}

/// Per-file parse bookkeeping, reported alongside the entries so skipped
/// input stays accounted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub entries: usize,
    pub malformed_skipped: usize,
}

/// Result of parsing one log file.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub entries: Vec<LogEntry>,
    pub stats: ParseStats,
}

/// Parse a log file into normalized entries.
///
/// A fresh call re-reads the file from the start. Non-UTF8 bytes are replaced
/// rather than rejected, matching how log files rot in practice.
pub fn parse(path: &Path) -> std::io::Result<Parsed> {
    let buffer = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&buffer);
    Ok(parse_content(&content, path))
}

/// Parse already-loaded content, attributing provenance to `path`.
pub fn parse_content(content: &str, path: &Path) -> Parsed {
    match detect_format(content) {
        LogFormat::Structured => {
            if let Some(parsed) = structured::parse_records(content, path) {
                log::debug!(
                    "{}: structured format, {} entries ({} malformed skipped)",
                    path.display(),
                    parsed.stats.entries,
                    parsed.stats.malformed_skipped
                );
                return parsed;
            }
            // Whole-document JSON parse failed: fall back to line-oriented,
            // tried exactly once, never alternating per line.
            log::debug!(
                "{}: structured parse failed, falling back to line format",
                path.display()
            );
            plain::parse_lines(content, path)
        }
        LogFormat::LineOriented => plain::parse_lines(content, path),
    }
}

/// Parse a timestamp in the known log formats.
///
/// Accepts `%Y-%m-%d %H:%M:%S` with optional fractional seconds (Python's
/// `asctime` comma separator included) and RFC 3339. Anything else yields
/// `None`, never a parse failure.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim().replace(',', ".");

    for format in ["%Y-%m-%d %H:%M:%S%.3f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, format) {
            return Local.from_local_datetime(&naive).single();
        }
    }

    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

/// Normalize a log message into a structural shape key.
///
/// Quoted literals, numbers, hex runs, paths and URLs are replaced with
/// placeholders so that messages differing only in their variable parts
/// produce the same key. Used by the classifier's grouping key.
pub fn normalize_message(message: &str) -> String {
    let mut normalized = message.to_lowercase();

    // Quoted literals first, before their contents get rewritten piecemeal
    normalized = QUOTED_PATTERN.replace_all(&normalized, "<STR>").to_string();

    // UUIDs before hex, since UUIDs contain hex runs
    normalized = UUID_PATTERN.replace_all(&normalized, "<UUID>").to_string();

    normalized = URL_PATTERN.replace_all(&normalized, "<URL>").to_string();

    normalized = PATH_PATTERN.replace_all(&normalized, "<PATH>").to_string();

    normalized = HEX_PATTERN.replace_all(&normalized, "<HEX>").to_string();

    normalized = NUMBER_PATTERN.replace_all(&normalized, "<NUM>").to_string();

    normalized = WHITESPACE_PATTERN.replace_all(&normalized, " ").to_string();

    normalized.trim().to_string()
}
