use super::entry::{LineRange, LogEntry, LogLevel};
use super::{parse_timestamp, Parsed, ParseStats};
use fancy_regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// Header shape: [<timestamp>] <LEVEL> <service>: <message>
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\s+([A-Z]+)\s+([^:]+?):\s?(.*)$").unwrap());

/// Parse line-oriented log content.
///
/// Each line matching the header pattern starts a new entry. Lines that do
/// not match are continuations of the previous entry's message, which is how
/// multi-line tracebacks end up inside a single logical entry. A file with no
/// recognizable header at all yields one `UNKNOWN` entry wrapping the whole
/// content, so no input is silently dropped.
pub fn parse_lines(content: &str, path: &Path) -> Parsed {
    let mut entries: Vec<LogEntry> = Vec::new();
    let mut current: Option<LogEntry> = None;

    let mut total_lines = 0;
    for (idx, raw_line) in content.lines().enumerate() {
        let line_number = idx + 1;
        total_lines = line_number;

        if let Some(caps) = HEADER.captures(raw_line).ok().flatten() {
            if let Some(mut done) = current.take() {
                done.lines = LineRange::new(done.lines.start, line_number - 1);
                entries.push(done);
            }

            let mut entry = LogEntry::new(
                path.to_path_buf(),
                LineRange::new(line_number, line_number),
            );
            entry.timestamp = parse_timestamp(&caps[1]);
            entry.level = LogLevel::from_str(&caps[2]);
            entry.service = Some(caps[3].trim().to_string());
            entry.message = caps[4].to_string();
            current = Some(entry);
        } else {
            match current.as_mut() {
                Some(entry) => {
                    entry.message.push('\n');
                    entry.message.push_str(raw_line);
                }
                None => {
                    // Content before the first header (or a file with no
                    // headers at all) becomes an UNKNOWN preamble entry.
                    let mut entry = LogEntry::new(
                        path.to_path_buf(),
                        LineRange::new(line_number, line_number),
                    );
                    entry.message = raw_line.to_string();
                    current = Some(entry);
                }
            }
        }
    }

    if let Some(mut done) = current.take() {
        done.lines = LineRange::new(done.lines.start, total_lines);
        entries.push(done);
    }

    let stats = ParseStats {
        entries: entries.len(),
        malformed_skipped: 0,
    };
    Parsed { entries, stats }
}
