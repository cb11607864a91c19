use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures surfaced by the session orchestrator.
///
/// Per-file and per-record problems are contained and counted in the run
/// summary instead; only conditions that prevent any progress at all (or
/// invalidate an explicit caller request, like a stale selection) show up
/// here.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The root directory could not be read at all, so discovery cannot make
    /// any progress.
    #[error("root directory {path} is not readable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A 1-based selection index does not exist in the listing.
    #[error("selection index {0} is out of range for the current listing")]
    SelectionOutOfRange(usize),

    /// The file behind a selection index changed (size or mtime) between
    /// listing and selection. The caller must re-list rather than operate on
    /// shifted content.
    #[error("stale selection: {path} changed between listing and selection")]
    StaleSelection { path: PathBuf },

    #[error("failed to write report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
