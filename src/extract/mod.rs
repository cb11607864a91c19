pub mod python;
pub mod rust_panic;

use crate::parser::entry::{LineRange, LogEntry};
use chrono::{DateTime, Local};
use python::PythonTraceback;
use rust_panic::RustPanic;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// How much structured information was recoverable from a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One stack frame as stated in the traceback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub file: PathBuf,
    pub line: usize,
    pub function: Option<String>,
}

/// A recognized traceback: execution path plus the raised error.
#[derive(Debug, Clone)]
pub struct Traceback {
    pub error_type: String,
    pub error_message: String,
    /// Frames in traceback order; the last frame is the innermost call.
    pub frames: Vec<Frame>,
}

/// A format-specific traceback recognizer.
///
/// Recognizers are independent strategies selected by their marker test; the
/// first one whose marker matches handles the whole message.
pub trait TracebackRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap marker test used both for candidate gating and for selecting
    /// this recognizer.
    fn matches(&self, message: &str) -> bool;

    /// Full recognition; only called when `matches` returned true. `None`
    /// means the block is too truncated to trust.
    fn recognize(&self, message: &str) -> Option<Traceback>;
}

/// Provenance pointer back to the log entry a record was extracted from.
/// Carries no ownership of the entry itself.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRef {
    pub log_file: PathBuf,
    pub lines: LineRange,
    pub timestamp: Option<DateTime<Local>>,
}

impl EntryRef {
    fn of(entry: &LogEntry) -> Self {
        Self {
            log_file: entry.source_file.clone(),
            lines: entry.lines,
            timestamp: entry.timestamp,
        }
    }
}

/// A structured extraction of one error occurrence.
///
/// `origin_file`/`origin_line`, when present, are exactly what the traceback
/// text stated; no location is ever inferred beyond that.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub error_type: Option<String>,
    pub error_message: String,
    /// Application source file blamed by the deepest traceback frame.
    pub origin_file: Option<PathBuf>,
    pub origin_line: Option<usize>,
    /// Full execution path from the traceback, outermost first.
    pub frames: Vec<Frame>,
    /// Code excerpt around the origin line, when the real source file is
    /// reachable on disk.
    pub related_code: Option<String>,
    pub confidence: Confidence,
    pub source: EntryRef,
}

/// Resolves file paths stated in tracebacks to real files on disk.
///
/// Traceback paths are often relative to some long-gone working directory;
/// when the verbatim path does not exist the resolver falls back to a
/// basename search under the configured source root. Results are cached.
pub struct SourceResolver {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Option<PathBuf>>>,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, stated: &Path) -> Option<PathBuf> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(stated) {
                return hit.clone();
            }
        }

        let resolved = self.resolve_uncached(stated);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(stated.to_path_buf(), resolved.clone());
        }
        resolved
    }

    fn resolve_uncached(&self, stated: &Path) -> Option<PathBuf> {
        if stated.is_file() {
            return Some(stated.to_path_buf());
        }

        let joined = self.root.join(stated);
        if joined.is_file() {
            return Some(joined);
        }

        // Basename fallback: first lexicographic match under the source root.
        let name = stated.file_name()?;
        WalkDir::new(&self.root)
            .max_depth(16)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !e.file_type().is_dir()
                    || e.depth() == 0
                    || !e.file_name().to_string_lossy().starts_with('.')
            })
            .filter_map(Result::ok)
            .find(|e| e.file_type().is_file() && e.file_name() == name)
            .map(|e| e.path().to_path_buf())
    }
}

/// Scans parsed entries for error-bearing content and produces records.
pub struct Extractor {
    recognizers: Vec<Box<dyn TracebackRecognizer>>,
    resolver: SourceResolver,
    context_lines: usize,
}

impl Extractor {
    pub fn new(source_root: impl Into<PathBuf>, context_lines: usize) -> Self {
        Self {
            recognizers: vec![Box::new(PythonTraceback), Box::new(RustPanic)],
            resolver: SourceResolver::new(source_root),
            context_lines,
        }
    }

    /// Extract zero or one error record from an entry.
    ///
    /// Only entries at ERROR/CRITICAL level, or whose message contains a
    /// recognized traceback marker, are candidates; everything else yields
    /// nothing.
    pub fn extract(&self, entry: &LogEntry) -> Option<ErrorRecord> {
        let recognizer = self
            .recognizers
            .iter()
            .find(|r| r.matches(&entry.message));

        if !entry.level.is_error() && recognizer.is_none() {
            return None;
        }

        let traceback = recognizer.and_then(|r| {
            let tb = r.recognize(&entry.message);
            if tb.is_none() {
                log::debug!(
                    "{} marker present but block too truncated to recognize ({}:{})",
                    r.name(),
                    entry.source_file.display(),
                    entry.lines.start
                );
            }
            tb
        });

        // An explicit structured error_type field wins over the traceback's
        // raise line.
        let error_type = entry
            .error_type
            .clone()
            .or_else(|| traceback.as_ref().map(|tb| tb.error_type.clone()));

        let error_message = traceback
            .as_ref()
            .map_or_else(|| entry.message.trim().to_string(), |tb| tb.error_message.clone());

        let frames = traceback.map(|tb| tb.frames).unwrap_or_default();

        // Blame the deepest frame. For re-raised or chained exceptions this
        // is a heuristic, not a guarantee; the full frame list stays on the
        // record so callers can second-guess it.
        let (origin_file, origin_line) = frames
            .last()
            .map_or((None, None), |f| (Some(f.file.clone()), Some(f.line)));

        let resolved = origin_file.as_deref().and_then(|f| self.resolver.resolve(f));

        let related_code = match (&resolved, origin_line) {
            (Some(path), Some(line)) => read_context(path, line, self.context_lines),
            _ => None,
        };

        let confidence = if error_type.is_some() && resolved.is_some() && origin_line.is_some() {
            Confidence::High
        } else if error_type.is_some() {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        Some(ErrorRecord {
            error_type,
            error_message,
            origin_file,
            origin_line,
            frames,
            related_code,
            confidence,
            source: EntryRef::of(entry),
        })
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }
}

/// Read the ± context-line window around `line` from a source file. Any read
/// failure downgrades to `None` rather than failing extraction.
fn read_context(path: &Path, line: usize, context_lines: usize) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::debug!("cannot read {} for context: {err}", path.display());
            return None;
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() || line == 0 {
        return None;
    }

    let start = line.saturating_sub(context_lines).max(1);
    let end = (line + context_lines).min(lines.len());
    if start > lines.len() {
        return None;
    }

    Some(lines[start - 1..end].join("\n"))
}
