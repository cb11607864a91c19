use crate::error::TriageError;
use fancy_regex::Regex;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never worth descending into for log discovery.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "target",
    "venv",
    "env",
];

/// Bytes sampled from the head of a file for content sniffing.
const SNIFF_SAMPLE_BYTES: usize = 4096;

/// A candidate log file produced by discovery. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Directory depth below the discovery root (0 = directly inside it).
    pub depth: usize,
}

/// A non-fatal problem encountered during the walk, reported at end of run.
#[derive(Debug, Clone)]
pub struct DiscoveryWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum directory depth below the root (0 = root's own files only).
    pub max_depth: usize,
    /// Accepted extensions, compared case-insensitively, leading dot optional.
    pub extensions: Vec<String>,
    /// Optional content filter: regex, or literal substring when the pattern
    /// does not compile.
    pub grep: Option<String>,
    /// Pre-filter candidates by sampling their head for log-shaped content.
    pub sniff_content: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_depth: 4,
            extensions: vec![".log".into(), ".txt".into(), ".json".into()],
            grep: None,
            sniff_content: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Qualifying files in deterministic (lexicographic) order.
    pub files: Vec<LogFileDescriptor>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// Walk `root` to the configured depth and collect candidate log files.
///
/// Sibling ordering is lexicographic, so repeated runs over an unchanged tree
/// yield identical output; callers rely on that for index-based selection.
/// Each resolved directory is visited at most once per traversal, which keeps
/// symlink cycles from recursing forever. Unreadable entries are recorded as
/// warnings and skipped; only an unreadable root is fatal.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<DiscoveryOutcome, TriageError> {
    std::fs::read_dir(root).map_err(|source| TriageError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let extensions: Vec<String> = options
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let grep = options.grep.as_deref().map(GrepFilter::new);

    let mut outcome = DiscoveryOutcome::default();
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        // walkdir counts the root as depth 0; our depth 0 is the root's
        // direct children.
        .max_depth(options.max_depth + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') && entry.depth() > 0 {
                return false;
            }
            if IGNORED_DIRS.contains(&name.as_ref()) {
                return false;
            }
            // Visited-set over canonical paths; a directory reachable twice
            // (symlinks) is walked once.
            match entry.path().canonicalize() {
                Ok(canonical) => visited_dirs.insert(canonical),
                Err(_) => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                log::warn!("discovery: skipping {}: {err}", path.display());
                outcome.warnings.push(DiscoveryWarning {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let ext = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let Some(ext) = ext else { continue };
        if !extensions.contains(&ext) {
            continue;
        }

        if options.sniff_content && !looks_like_log(entry.path()) {
            log::debug!(
                "discovery: {} has a log extension but no log-shaped content",
                entry.path().display()
            );
            continue;
        }

        if let Some(filter) = &grep {
            match filter.matches_file(entry.path()) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    log::warn!(
                        "discovery: cannot grep {}: {err}",
                        entry.path().display()
                    );
                    outcome.warnings.push(DiscoveryWarning {
                        path: entry.path().to_path_buf(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
        }

        match entry.metadata() {
            Ok(metadata) => outcome.files.push(LogFileDescriptor {
                path: entry.path().to_path_buf(),
                size_bytes: metadata.len(),
                depth: entry.depth().saturating_sub(1),
            }),
            Err(err) => {
                log::warn!(
                    "discovery: cannot stat {}: {err}",
                    entry.path().display()
                );
                outcome.warnings.push(DiscoveryWarning {
                    path: entry.path().to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }
    }

    log::info!(
        "discovery: {} candidate file(s), {} warning(s) under {}",
        outcome.files.len(),
        outcome.warnings.len(),
        root.display()
    );
    Ok(outcome)
}

/// Content filter applied line-by-line so large logs are never loaded
/// wholesale.
enum GrepFilter {
    Pattern(Regex),
    Literal(String),
}

impl GrepFilter {
    fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => GrepFilter::Pattern(regex),
            // An invalid regex degrades to a substring test instead of
            // failing the whole discovery.
            Err(_) => GrepFilter::Literal(pattern.to_string()),
        }
    }

    fn matches_line(&self, line: &str) -> bool {
        match self {
            GrepFilter::Pattern(regex) => regex.is_match(line).unwrap_or(false),
            GrepFilter::Literal(needle) => line.contains(needle),
        }
    }

    fn matches_file(&self, path: &Path) -> std::io::Result<bool> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(false);
            }
            if self.matches_line(&String::from_utf8_lossy(&buf)) {
                return Ok(true);
            }
        }
    }
}

/// Sample the head of a file and check for log-shaped content: timestamps,
/// level tokens, or traceback markers.
fn looks_like_log(path: &Path) -> bool {
    static SHAPES: std::sync::LazyLock<Vec<Regex>> = std::sync::LazyLock::new(|| {
        [
            r"Traceback \(most recent call last\):",
            r"\d{4}-\d{2}-\d{2}",
            r"\d{2}:\d{2}:\d{2}",
            r"\b(ERROR|WARNING|WARN|INFO|DEBUG|CRITICAL)\b",
            r#""(level|levelname)""#,
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buf = vec![0u8; SNIFF_SAMPLE_BYTES];
    let Ok(read) = file.read(&mut buf) else {
        return false;
    };
    buf.truncate(read);

    let sample = String::from_utf8_lossy(&buf);
    SHAPES
        .iter()
        .any(|shape| shape.is_match(&sample).unwrap_or(false))
}
