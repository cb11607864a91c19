// Logtriage - GPL-3.0-or-later
// This file is part of Logtriage.
//
// Copyright (C) 2026 Logtriage Authors
//
// Logtriage is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Logtriage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Logtriage.  If not, see <https://www.gnu.org/licenses/>.

//! Anchoring, validation and safe application of fix patches.
//!
//! The replacement text always comes from the reasoning collaborator; this
//! module only decides where it lands, whether it still applies, and how to
//! put things back. A patch is pinned to the checksum of its target file at
//! proposal time and refuses to apply against anything else.

use crate::extract::ErrorRecord;
use crate::reason::SuggestedFix;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    /// The target file changed since the patch was proposed. The caller must
    /// re-propose; the patch is never re-anchored against shifted content.
    #[error("{0} changed since the patch was proposed")]
    StaleChecksum(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A validated, anchored, reversible source edit proposal.
#[derive(Debug, Clone, Serialize)]
pub struct Patch {
    pub target_file: PathBuf,
    /// First line of the replaced span, 1-based. The span is contiguous.
    pub start_line: usize,
    pub original_lines: Vec<String>,
    pub replacement_lines: Vec<String>,
    /// Hex SHA-256 of the whole target file at proposal time.
    pub checksum: String,
}

/// Constructs and applies patches around a record's blamed source line.
pub struct FixEngine {
    context_lines: usize,
}

impl FixEngine {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// Build a patch for `record` from the collaborator's suggestion.
    ///
    /// Returns `None` when the record has no concrete anchor (no origin
    /// file/line), the target is unreadable, or the suggested original lines
    /// cannot be located verbatim inside the context window around the
    /// blamed line. A fix is never fabricated without an anchor.
    pub fn propose(
        &self,
        record: &ErrorRecord,
        target: &Path,
        suggestion: &SuggestedFix,
    ) -> Option<Patch> {
        let origin_line = record.origin_line?;
        record.origin_file.as_ref()?;

        let content = match std::fs::read_to_string(target) {
            Ok(content) => content,
            Err(err) => {
                log::warn!("cannot read fix target {}: {err}", target.display());
                return None;
            }
        };
        let lines: Vec<&str> = content.lines().collect();
        if origin_line == 0 || origin_line > lines.len() {
            log::warn!(
                "blamed line {origin_line} is outside {} ({} lines)",
                target.display(),
                lines.len()
            );
            return None;
        }

        let (start_line, original_lines) = if suggestion.original_lines.is_empty() {
            // No anchor text supplied: replace exactly the blamed line.
            (origin_line, vec![lines[origin_line - 1].to_string()])
        } else {
            let start = self.locate(&lines, origin_line, &suggestion.original_lines)?;
            (start, suggestion.original_lines.clone())
        };

        Some(Patch {
            target_file: target.to_path_buf(),
            start_line,
            original_lines,
            replacement_lines: suggestion.replacement_lines.clone(),
            checksum: checksum_of(&content),
        })
    }

    /// Find the suggested original lines verbatim within the context window
    /// around the blamed line. Returns the 1-based start of the match.
    fn locate(&self, lines: &[&str], origin_line: usize, needle: &[String]) -> Option<usize> {
        let window_start = origin_line.saturating_sub(self.context_lines).max(1);
        let window_end = (origin_line + self.context_lines).min(lines.len());

        for start in window_start..=window_end {
            let end = start + needle.len() - 1;
            if end > lines.len() {
                break;
            }
            let matches = needle
                .iter()
                .zip(&lines[start - 1..end])
                .all(|(want, have)| want == have);
            if matches {
                return Some(start);
            }
        }

        log::warn!(
            "suggested lines do not match the source around line {origin_line}; refusing to anchor"
        );
        None
    }
}

/// Apply a patch to its target file.
///
/// The target's checksum is recomputed first; any drift since proposal is
/// rejected as [`FixError::StaleChecksum`] instead of clobbering concurrent
/// edits. The write goes through a temporary file in the same directory and
/// an atomic rename, so a crash mid-write never leaves a half-written file.
pub fn apply_fix(patch: &Patch) -> Result<(), FixError> {
    let content = std::fs::read_to_string(&patch.target_file)?;
    if checksum_of(&content) != patch.checksum {
        return Err(FixError::StaleChecksum(patch.target_file.clone()));
    }

    let lines: Vec<&str> = content.lines().collect();
    let spliced = splice(
        &lines,
        patch.start_line,
        patch.original_lines.len(),
        &patch.replacement_lines,
        content.ends_with('\n'),
    );

    write_atomic(&patch.target_file, &spliced)?;
    log::info!(
        "applied fix to {} at line {}",
        patch.target_file.display(),
        patch.start_line
    );
    Ok(())
}

/// Restore the original lines of an applied patch.
///
/// Only valid immediately after a successful [`apply_fix`] of the same
/// patch; if the file no longer carries the replacement at the patched range
/// the revert is refused. This is not a general undo history.
pub fn revert_fix(patch: &Patch) -> Result<(), FixError> {
    let content = std::fs::read_to_string(&patch.target_file)?;
    let lines: Vec<&str> = content.lines().collect();

    let end = patch.start_line - 1 + patch.replacement_lines.len();
    let still_applied = end <= lines.len()
        && patch
            .replacement_lines
            .iter()
            .zip(&lines[patch.start_line - 1..end])
            .all(|(want, have)| want == have);
    if !still_applied {
        return Err(FixError::StaleChecksum(patch.target_file.clone()));
    }

    let spliced = splice(
        &lines,
        patch.start_line,
        patch.replacement_lines.len(),
        &patch.original_lines,
        content.ends_with('\n'),
    );

    write_atomic(&patch.target_file, &spliced)?;
    log::info!(
        "reverted fix on {} at line {}",
        patch.target_file.display(),
        patch.start_line
    );
    Ok(())
}

impl Patch {
    /// Render the proposal as a minimal unified diff for review.
    pub fn unified_diff(&self) -> String {
        let name = self.target_file.display();
        let mut out = format!(
            "--- a/{name}\n+++ b/{name}\n@@ -{},{} +{},{} @@\n",
            self.start_line,
            self.original_lines.len(),
            self.start_line,
            self.replacement_lines.len(),
        );
        for line in &self.original_lines {
            out.push('-');
            out.push_str(line);
            out.push('\n');
        }
        for line in &self.replacement_lines {
            out.push('+');
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn splice(
    lines: &[&str],
    start_line: usize,
    replaced_len: usize,
    insert: &[String],
    trailing_newline: bool,
) -> String {
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    result.extend(&lines[..start_line - 1]);
    result.extend(insert.iter().map(String::as_str));
    result.extend(&lines[(start_line - 1 + replaced_len).min(lines.len())..]);

    let mut content = result.join("\n");
    if trailing_newline && !content.is_empty() {
        content.push('\n');
    }
    content
}

fn write_atomic(target: &Path, content: &str) -> Result<(), FixError> {
    use std::io::Write;

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(target).map_err(|e| FixError::Io(e.error))?;
    Ok(())
}

fn checksum_of(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Confidence, EntryRef};
    use crate::parser::entry::LineRange;
    use std::fs;
    use tempfile::TempDir;

    const SOURCE: &str = "def run(d):\n    x = d['k']\n    return x\n";

    fn record_for(target: &Path, line: usize) -> ErrorRecord {
        ErrorRecord {
            error_type: Some("KeyError".into()),
            error_message: "'k'".into(),
            origin_file: Some(target.to_path_buf()),
            origin_line: Some(line),
            frames: Vec::new(),
            related_code: None,
            confidence: Confidence::High,
            source: EntryRef {
                log_file: PathBuf::from("app.log"),
                lines: LineRange::new(1, 1),
                timestamp: None,
            },
        }
    }

    fn suggestion() -> SuggestedFix {
        SuggestedFix {
            original_lines: vec!["    x = d['k']".into()],
            replacement_lines: vec!["    x = d.get('k')".into()],
        }
    }

    fn write_target(dir: &TempDir) -> PathBuf {
        let target = dir.path().join("worker.py");
        fs::write(&target, SOURCE).unwrap();
        target
    }

    #[test]
    fn test_propose_anchors_at_suggested_lines() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);

        let engine = FixEngine::new(5);
        let patch = engine
            .propose(&record_for(&target, 2), &target, &suggestion())
            .unwrap();
        assert_eq!(patch.start_line, 2);
        assert_eq!(patch.original_lines, vec!["    x = d['k']".to_string()]);
    }

    #[test]
    fn test_propose_without_anchor_returns_none() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);

        let mut record = record_for(&target, 2);
        record.origin_line = None;
        assert!(engine.propose(&record, &target, &suggestion()).is_none());

        let mut record = record_for(&target, 2);
        record.origin_file = None;
        assert!(engine.propose(&record, &target, &suggestion()).is_none());
    }

    #[test]
    fn test_propose_on_missing_file_returns_none() {
        let missing = Path::new("/no/such/file.py");
        let engine = FixEngine::new(5);
        assert!(engine
            .propose(&record_for(missing, 2), missing, &suggestion())
            .is_none());
    }

    #[test]
    fn test_propose_rejects_unmatched_suggestion() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);

        let bogus = SuggestedFix {
            original_lines: vec!["    y = something_else()".into()],
            replacement_lines: vec!["    y = 0".into()],
        };
        assert!(engine.propose(&record_for(&target, 2), &target, &bogus).is_none());
    }

    #[test]
    fn test_apply_then_revert_round_trips() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);
        let patch = engine
            .propose(&record_for(&target, 2), &target, &suggestion())
            .unwrap();

        apply_fix(&patch).unwrap();
        let patched = fs::read_to_string(&target).unwrap();
        assert!(patched.contains("d.get('k')"));
        assert!(!patched.contains("d['k']"));

        revert_fix(&patch).unwrap();
        let restored = fs::read_to_string(&target).unwrap();
        assert_eq!(restored, SOURCE);
        assert_eq!(checksum_of(&restored), patch.checksum);
    }

    #[test]
    fn test_apply_refuses_stale_target() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);
        let patch = engine
            .propose(&record_for(&target, 2), &target, &suggestion())
            .unwrap();

        // Concurrent edit between proposal and application.
        fs::write(&target, "def run(d):\n    x = d.pop('k')\n    return x\n").unwrap();

        let result = apply_fix(&patch);
        assert!(matches!(result, Err(FixError::StaleChecksum(_))));
        // The concurrent edit is untouched.
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("d.pop('k')"));
    }

    #[test]
    fn test_revert_refuses_when_replacement_gone() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);
        let patch = engine
            .propose(&record_for(&target, 2), &target, &suggestion())
            .unwrap();

        apply_fix(&patch).unwrap();
        fs::write(&target, "entirely new content\n").unwrap();
        assert!(matches!(
            revert_fix(&patch),
            Err(FixError::StaleChecksum(_))
        ));
    }

    #[test]
    fn test_multi_line_replacement() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);

        let expansion = SuggestedFix {
            original_lines: vec!["    x = d['k']".into()],
            replacement_lines: vec![
                "    if 'k' not in d:".into(),
                "        return None".into(),
                "    x = d['k']".into(),
            ],
        };
        let patch = engine
            .propose(&record_for(&target, 2), &target, &expansion)
            .unwrap();
        apply_fix(&patch).unwrap();
        let patched = fs::read_to_string(&target).unwrap();
        assert_eq!(
            patched,
            "def run(d):\n    if 'k' not in d:\n        return None\n    x = d['k']\n    return x\n"
        );

        revert_fix(&patch).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), SOURCE);
    }

    #[test]
    fn test_empty_suggestion_anchors_on_blamed_line() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);

        let bare = SuggestedFix {
            original_lines: Vec::new(),
            replacement_lines: vec!["    x = d.get('k', 0)".into()],
        };
        let patch = engine
            .propose(&record_for(&target, 2), &target, &bare)
            .unwrap();
        assert_eq!(patch.start_line, 2);
        assert_eq!(patch.original_lines, vec!["    x = d['k']".to_string()]);
    }

    #[test]
    fn test_unified_diff_carries_anchor() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir);
        let engine = FixEngine::new(5);
        let patch = engine
            .propose(&record_for(&target, 2), &target, &suggestion())
            .unwrap();

        let diff = patch.unified_diff();
        assert!(diff.contains("@@ -2,1 +2,1 @@"));
        assert!(diff.contains("-    x = d['k']"));
        assert!(diff.contains("+    x = d.get('k')"));
    }

    #[test]
    fn test_trailing_newline_preserved() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("no_newline.py");
        fs::write(&target, "a = 1\nb = 2").unwrap();

        let engine = FixEngine::new(5);
        let fix = SuggestedFix {
            original_lines: vec!["b = 2".into()],
            replacement_lines: vec!["b = 3".into()],
        };
        let patch = engine
            .propose(&record_for(&target, 2), &target, &fix)
            .unwrap();
        apply_fix(&patch).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "a = 1\nb = 3");

        revert_fix(&patch).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "a = 1\nb = 2");
    }
}
