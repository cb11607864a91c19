use super::entry::{LineRange, LogEntry, LogLevel};
use super::{parse_timestamp, Parsed, ParseStats};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Known record fields in structured log files.
///
/// Every field is optional with an explicit default (null / UNKNOWN) so that
/// sparse records still map to a full `LogEntry`. Aliases cover the common
/// JSON-formatter spellings. Elements that are not objects, or whose fields
/// carry the wrong types, are rejected into the malformed counter instead of
/// being accepted ad hoc.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "asctime", alias = "time")]
    timestamp: Option<String>,
    #[serde(default, alias = "levelname", alias = "severity")]
    level: Option<String>,
    #[serde(default, alias = "name", alias = "logger")]
    service: Option<String>,
    #[serde(default, alias = "msg")]
    message: Option<String>,
    #[serde(default, alias = "exc_type")]
    error_type: Option<String>,
}

impl RawRecord {
    fn into_entry(self, source_file: &Path, lines: LineRange) -> LogEntry {
        let mut entry = LogEntry::new(source_file.to_path_buf(), lines);
        entry.timestamp = self.timestamp.as_deref().and_then(parse_timestamp);
        entry.level = self
            .level
            .as_deref()
            .map_or(LogLevel::Unknown, LogLevel::from_str);
        entry.service = self.service;
        entry.message = self.message.unwrap_or_default();
        entry.error_type = self.error_type;
        entry
    }
}

/// Attempt to parse content as a JSON array of records.
///
/// Returns `None` when the document is not valid JSON or not record-shaped at
/// the top level; the caller then falls back to line-oriented parsing exactly
/// once. A document that parses but contains malformed elements is still a
/// successful structured parse with those elements skipped and counted.
pub fn parse_records(content: &str, path: &Path) -> Option<Parsed> {
    let value: Value = serde_json::from_str(content).ok()?;
    let total_lines = content.lines().count().max(1);

    match value {
        Value::Array(elements) => {
            let spans = element_spans(content).unwrap_or_default();
            Some(build_entries(elements, &spans, total_lines, path))
        }
        // A single top-level object is treated as a one-record file.
        Value::Object(_) => {
            let full = LineRange::new(1, total_lines);
            match serde_json::from_value::<RawRecord>(value) {
                Ok(record) => Some(Parsed {
                    entries: vec![record.into_entry(path, full)],
                    stats: ParseStats {
                        entries: 1,
                        malformed_skipped: 0,
                    },
                }),
                Err(_) => Some(Parsed {
                    entries: Vec::new(),
                    stats: ParseStats {
                        entries: 0,
                        malformed_skipped: 1,
                    },
                }),
            }
        }
        _ => None,
    }
}

fn build_entries(
    elements: Vec<Value>,
    spans: &[(usize, usize)],
    total_lines: usize,
    path: &Path,
) -> Parsed {
    let mut entries: Vec<LogEntry> = Vec::new();
    let mut malformed_skipped = 0usize;
    // Spans are made contiguous: each entry starts where the previous one
    // ended, so array punctuation and skipped elements stay attributed.
    let mut pending_start = 1usize;

    for (idx, element) in elements.into_iter().enumerate() {
        let span_end = spans.get(idx).map_or(total_lines, |s| s.1);

        let record = match element {
            Value::Object(_) => serde_json::from_value::<RawRecord>(element).ok(),
            _ => None,
        };

        match record {
            Some(record) => {
                let start = pending_start.min(span_end);
                let lines = LineRange::new(start, span_end);
                entries.push(record.into_entry(path, lines));
                pending_start = pending_start.max(span_end + 1);
            }
            None => {
                log::debug!("{}: skipping malformed element {idx}", path.display());
                malformed_skipped += 1;
            }
        }
    }

    // The last entry absorbs the closing bracket and any trailing skipped
    // elements so spans still cover the whole file.
    if let Some(last) = entries.last_mut() {
        last.lines.end = last.lines.end.max(total_lines);
    }

    let stats = ParseStats {
        entries: entries.len(),
        malformed_skipped,
    };
    Parsed { entries, stats }
}

/// Line spans of the top-level array elements, by lightweight scan.
///
/// Tracks string/escape state and bracket depth; an element runs from its
/// first non-whitespace character to the comma or closing bracket that
/// terminates it. Only called on content serde_json already accepted.
fn element_spans(content: &str) -> Option<Vec<(usize, usize)>> {
    let mut spans = Vec::new();
    let mut line = 1usize;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;
    let mut elem_start: Option<usize> = None;

    for ch in content.chars() {
        if ch == '\n' {
            line += 1;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                if started && depth == 1 && elem_start.is_none() {
                    elem_start = Some(line);
                }
                in_string = true;
            }
            '[' => {
                if started {
                    if depth == 1 && elem_start.is_none() {
                        elem_start = Some(line);
                    }
                    depth += 1;
                } else {
                    started = true;
                    depth = 1;
                }
            }
            '{' => {
                if started && depth == 1 && elem_start.is_none() {
                    elem_start = Some(line);
                }
                depth += 1;
            }
            '}' | ']' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = elem_start.take() {
                        spans.push((start, line));
                    }
                }
            }
            ',' => {
                if depth == 1 {
                    if let Some(start) = elem_start.take() {
                        spans.push((start, line));
                    }
                }
            }
            c if !c.is_whitespace() => {
                if started && depth == 1 && elem_start.is_none() {
                    elem_start = Some(line);
                }
            }
            _ => {}
        }
    }

    Some(spans)
}
