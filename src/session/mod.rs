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

//! Session orchestration.
//!
//! Sequences Discovery → Parser → Extractor → Classifier → Fix Engine. Files
//! are independent up to classification, so per-file work fans out across the
//! rayon pool; results merge into the shared pattern table in discovery order
//! at a single point, keeping member order deterministic. Failures local to
//! one file are contained and counted; only a dead root directory or a stale
//! selection aborts the run.

use crate::classify::{ErrorPattern, PatternTable};
use crate::discovery::{discover, DiscoveryOptions, DiscoveryWarning, LogFileDescriptor};
use crate::error::TriageError;
use crate::extract::{Confidence, ErrorRecord, Extractor};
use crate::fix::{FixEngine, Patch};
use crate::parser::{self, ParseStats};
use crate::reason::{Reasoner, ReasoningRequest};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    /// Log-only: extract, classify and explain.
    Basic,
    /// Additionally correlate with source files and propose fixes.
    Deep,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub root: PathBuf,
    pub discovery: DiscoveryOptions,
    pub mode: ReviewMode,
    pub context_lines: usize,
    /// Root searched when resolving source paths stated in tracebacks.
    pub source_root: PathBuf,
}

/// One row of the discovered-file listing surface.
///
/// Size and mtime are captured at listing time; selection re-checks them so
/// an index never silently operates on a file that changed underneath it.
#[derive(Debug, Clone)]
pub struct ListedFile {
    pub descriptor: LogFileDescriptor,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<ListedFile>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// Which listed files to analyze. Indices are 1-based, as displayed.
#[derive(Debug, Clone)]
pub enum Selection {
    All,
    Indices(Vec<usize>),
}

/// One actionable result: a ranked pattern plus whatever the reasoning
/// collaborator and the fix engine could add to it.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub pattern: ErrorPattern,
    pub occurrences: usize,
    pub explanation: Option<String>,
    pub proposed_fix: Option<Patch>,
}

/// End-of-run accounting. Every skipped or degraded item lands in one of
/// these counters so totals stay reconcilable.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_selected: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub discovery_warnings: usize,
    pub entries: usize,
    pub malformed_entries: usize,
    pub records_high: usize,
    pub records_medium: usize,
    pub records_low: usize,
    pub patterns: usize,
    pub explanations: usize,
    pub explanations_unavailable: usize,
    pub fixes_proposed: usize,
}

impl RunSummary {
    pub fn records_total(&self) -> usize {
        self.records_high + self.records_medium + self.records_low
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub findings: Vec<Finding>,
    pub summary: RunSummary,
}

pub struct Session {
    options: SessionOptions,
    extractor: Extractor,
    fix_engine: FixEngine,
    reasoner: Option<Box<dyn Reasoner>>,
}

impl Session {
    pub fn new(options: SessionOptions, reasoner: Option<Box<dyn Reasoner>>) -> Self {
        let extractor = Extractor::new(options.source_root.clone(), options.context_lines);
        let fix_engine = FixEngine::new(options.context_lines);
        Self {
            options,
            extractor,
            fix_engine,
            reasoner,
        }
    }

    /// Discover log files and capture the listing surface.
    ///
    /// The listing order is stable across repeated runs on an unchanged
    /// tree, which is what makes 1-based index selection meaningful.
    pub fn list_files(&self) -> Result<Listing, TriageError> {
        let outcome = discover(&self.options.root, &self.options.discovery)?;
        let files = outcome
            .files
            .into_iter()
            .map(|descriptor| {
                let modified = std::fs::metadata(&descriptor.path)
                    .and_then(|m| m.modified())
                    .ok();
                ListedFile {
                    descriptor,
                    modified,
                }
            })
            .collect();
        Ok(Listing {
            files,
            warnings: outcome.warnings,
        })
    }

    /// Resolve a selection against the listing, failing clearly on stale or
    /// out-of-range indices.
    fn select<'a>(
        &self,
        listing: &'a Listing,
        selection: &Selection,
    ) -> Result<Vec<&'a ListedFile>, TriageError> {
        match selection {
            Selection::All => Ok(listing.files.iter().collect()),
            Selection::Indices(indices) => {
                let mut selected = Vec::with_capacity(indices.len());
                for &index in indices {
                    let file = listing
                        .files
                        .get(index.checked_sub(1).ok_or(TriageError::SelectionOutOfRange(index))?)
                        .ok_or(TriageError::SelectionOutOfRange(index))?;
                    verify_unchanged(file)?;
                    selected.push(file);
                }
                Ok(selected)
            }
        }
    }

    /// Run the pipeline over the selected files.
    pub fn analyze(
        &self,
        listing: &Listing,
        selection: &Selection,
    ) -> Result<RunReport, TriageError> {
        let selected = self.select(listing, selection)?;

        let mut summary = RunSummary {
            files_discovered: listing.files.len(),
            files_selected: selected.len(),
            discovery_warnings: listing.warnings.len(),
            ..RunSummary::default()
        };

        // Per-file fan-out; no shared mutable state until the merge below.
        let outcomes: Vec<(PathBuf, std::io::Result<(Vec<ErrorRecord>, ParseStats)>)> = selected
            .par_iter()
            .map(|file| {
                let path = file.descriptor.path.clone();
                let outcome = self.process_file(&path);
                (path, outcome)
            })
            .collect();

        // Single mutation point: merge in discovery order so pattern members
        // keep a deterministic insertion order.
        let table = PatternTable::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok((records, stats)) => {
                    summary.files_parsed += 1;
                    summary.entries += stats.entries;
                    summary.malformed_entries += stats.malformed_skipped;
                    for record in &records {
                        match record.confidence {
                            Confidence::High => summary.records_high += 1,
                            Confidence::Medium => summary.records_medium += 1,
                            Confidence::Low => summary.records_low += 1,
                        }
                    }
                    table.merge(records);
                }
                Err(err) => {
                    summary.files_failed += 1;
                    log::warn!("skipping {}: {err}", path.display());
                }
            }
        }

        let ranked = table.ranked();
        summary.patterns = ranked.len();

        let mut findings = Vec::with_capacity(ranked.len());
        for pattern in ranked {
            let finding = self.build_finding(pattern, &mut summary);
            findings.push(finding);
        }

        log::info!(
            "analyzed {} file(s): {} entries, {} records, {} pattern(s)",
            summary.files_parsed,
            summary.entries,
            summary.records_total(),
            summary.patterns
        );
        Ok(RunReport { findings, summary })
    }

    fn process_file(&self, path: &Path) -> std::io::Result<(Vec<ErrorRecord>, ParseStats)> {
        let parsed = parser::parse(path)?;
        let records = parsed
            .entries
            .iter()
            .filter_map(|entry| self.extractor.extract(entry))
            .collect();
        Ok((records, parsed.stats))
    }

    /// Consult the reasoning collaborator for one pattern and, in deep mode,
    /// try to anchor its suggested fix.
    fn build_finding(&self, pattern: ErrorPattern, summary: &mut RunSummary) -> Finding {
        let occurrences = pattern.occurrence_count();
        let representative = &pattern.representative;

        let mut explanation = None;
        let mut proposed_fix = None;

        if let Some(reasoner) = &self.reasoner {
            let request = reasoning_request(representative);
            match reasoner.consult(&request) {
                Ok(response) => {
                    summary.explanations += 1;
                    explanation = Some(response.explanation);

                    if self.options.mode == ReviewMode::Deep {
                        if let Some(suggestion) = response.suggested_fix {
                            proposed_fix = representative
                                .origin_file
                                .as_deref()
                                .and_then(|stated| self.extractor.resolver().resolve(stated))
                                .and_then(|target| {
                                    self.fix_engine.propose(representative, &target, &suggestion)
                                });
                            if proposed_fix.is_some() {
                                summary.fixes_proposed += 1;
                            }
                        }
                    }
                }
                Err(err) => {
                    summary.explanations_unavailable += 1;
                    if err.is_retryable() {
                        log::warn!("explanation unavailable (retryable): {err}");
                    } else {
                        log::warn!("explanation unavailable: {err}");
                    }
                }
            }
        }

        Finding {
            pattern,
            occurrences,
            explanation,
            proposed_fix,
        }
    }

    /// Serialize the report as pretty JSON.
    pub fn write_report(report: &RunReport, path: &Path) -> Result<(), TriageError> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| TriageError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(|source| TriageError::ReportWrite {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("report written to {}", path.display());
        Ok(())
    }
}

fn verify_unchanged(file: &ListedFile) -> Result<(), TriageError> {
    let stale = || TriageError::StaleSelection {
        path: file.descriptor.path.clone(),
    };

    let metadata = std::fs::metadata(&file.descriptor.path).map_err(|_| stale())?;
    if metadata.len() != file.descriptor.size_bytes {
        return Err(stale());
    }
    if metadata.modified().ok() != file.modified {
        return Err(stale());
    }
    Ok(())
}

fn reasoning_request(record: &ErrorRecord) -> ReasoningRequest {
    let surrounding_context = if record.frames.is_empty() {
        None
    } else {
        Some(
            record
                .frames
                .iter()
                .map(|frame| {
                    let function = frame
                        .function
                        .as_deref()
                        .map(|f| format!(", in {f}"))
                        .unwrap_or_default();
                    format!("File {}, line {}{function}", frame.file.display(), frame.line)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };

    ReasoningRequest {
        error_type: record.error_type.clone(),
        error_message: record.error_message.clone(),
        related_code: record.related_code.clone(),
        surrounding_context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::{ReasoningError, ReasoningResponse, SuggestedFix};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const LINE_LOG: &str = "\
[2025-04-30 12:00:01] ERROR worker: job failed
Traceback (most recent call last):
  File \"worker.py\", line 2, in run
    x = d['k']
KeyError: 'k'
[2025-04-30 12:00:02] ERROR worker: job failed
Traceback (most recent call last):
  File \"worker.py\", line 2, in run
    x = d['k']
KeyError: 'q'
[2025-04-30 12:00:03] ERROR api: request rejected";

    const JSON_LOG: &str = r#"[
  {"timestamp": "2025-04-30 12:00:04", "level": "ERROR", "service": "payments", "message": "charge declined", "error_type": "CardError"},
  {"timestamp": "2025-04-30 12:00:05", "level": "ERROR", "service": "payments", "message": "gateway unreachable", "error_type": "GatewayError"}
]"#;

    struct CannedReasoner {
        fix: Option<SuggestedFix>,
    }

    impl Reasoner for CannedReasoner {
        fn consult(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
            Ok(ReasoningResponse {
                explanation: "canned explanation".to_string(),
                suggested_fix: self.fix.clone(),
            })
        }
    }

    struct TimeoutReasoner;

    impl Reasoner for TimeoutReasoner {
        fn consult(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
            Err(ReasoningError::Timeout(Duration::from_secs(5)))
        }
    }

    fn options(root: &Path, mode: ReviewMode) -> SessionOptions {
        SessionOptions {
            root: root.to_path_buf(),
            discovery: DiscoveryOptions {
                max_depth: 0,
                extensions: vec![".log".into(), ".json".into()],
                grep: None,
                sniff_content: false,
            },
            mode,
            context_lines: 5,
            source_root: root.to_path_buf(),
        }
    }

    fn fixture(dir: &TempDir) {
        fs::write(dir.path().join("a.log"), LINE_LOG).unwrap();
        fs::write(dir.path().join("b.json"), JSON_LOG).unwrap();
    }

    #[test]
    fn test_end_to_end_basic_run() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let listing = session.list_files().unwrap();
        assert_eq!(listing.files.len(), 2);
        // Lexicographic: a.log before b.json.
        assert!(listing.files[0].descriptor.path.ends_with("a.log"));

        let report = session.analyze(&listing, &Selection::All).unwrap();
        assert_eq!(report.summary.files_parsed, 2);
        // a.log: 3 entries (traceback folded); b.json: 2 entries.
        assert_eq!(report.summary.entries, 5);
        assert_eq!(report.summary.records_total(), 5);

        // The two KeyError records share a pattern; the rest are singletons.
        assert_eq!(report.summary.patterns, 4);
        assert_eq!(report.findings[0].occurrences, 2);
        assert_eq!(
            report.findings[0].pattern.key.error_type,
            "KeyError".to_string()
        );
    }

    #[test]
    fn test_singletons_ranked_by_recency() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let listing = session.list_files().unwrap();
        let report = session.analyze(&listing, &Selection::All).unwrap();

        let singleton_types: Vec<&str> = report.findings[1..]
            .iter()
            .map(|f| f.pattern.key.error_type.as_str())
            .collect();
        // 12:00:05 GatewayError, 12:00:04 CardError, 12:00:03 untyped.
        assert_eq!(singleton_types, vec!["GatewayError", "CardError", ""]);
    }

    #[test]
    fn test_index_selection() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let listing = session.list_files().unwrap();

        let report = session
            .analyze(&listing, &Selection::Indices(vec![2]))
            .unwrap();
        assert_eq!(report.summary.files_selected, 1);
        assert_eq!(report.summary.entries, 2);

        let bad = session.analyze(&listing, &Selection::Indices(vec![7]));
        assert!(matches!(bad, Err(TriageError::SelectionOutOfRange(7))));
    }

    #[test]
    fn test_stale_index_fails_clearly() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let listing = session.list_files().unwrap();

        // The file grows between listing and selection.
        fs::write(
            dir.path().join("a.log"),
            format!("{LINE_LOG}\n[2025-04-30 12:00:09] ERROR worker: again"),
        )
        .unwrap();

        let result = session.analyze(&listing, &Selection::Indices(vec![1]));
        assert!(matches!(result, Err(TriageError::StaleSelection { .. })));
    }

    #[test]
    fn test_reasoning_timeout_counts_as_unavailable() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(
            options(dir.path(), ReviewMode::Basic),
            Some(Box::new(TimeoutReasoner)),
        );
        let listing = session.list_files().unwrap();
        let report = session.analyze(&listing, &Selection::All).unwrap();

        assert_eq!(report.summary.explanations, 0);
        assert_eq!(report.summary.explanations_unavailable, report.summary.patterns);
        assert!(report.findings.iter().all(|f| f.explanation.is_none()));
        // Classification is unaffected by the reasoning failures.
        assert_eq!(report.summary.patterns, 4);
    }

    #[test]
    fn test_deep_mode_proposes_anchored_fix() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);
        fs::write(
            dir.path().join("worker.py"),
            "def run(d):\n    x = d['k']\n    return x\n",
        )
        .unwrap();

        let reasoner = CannedReasoner {
            fix: Some(SuggestedFix {
                original_lines: vec!["    x = d['k']".into()],
                replacement_lines: vec!["    x = d.get('k')".into()],
            }),
        };
        let session = Session::new(
            options(dir.path(), ReviewMode::Deep),
            Some(Box::new(reasoner)),
        );
        let listing = session.list_files().unwrap();
        let report = session.analyze(&listing, &Selection::All).unwrap();

        assert_eq!(report.summary.fixes_proposed, 1);
        let finding = report
            .findings
            .iter()
            .find(|f| f.proposed_fix.is_some())
            .unwrap();
        assert_eq!(finding.pattern.key.error_type, "KeyError");
        let patch = finding.proposed_fix.as_ref().unwrap();
        assert_eq!(patch.start_line, 2);
    }

    #[test]
    fn test_basic_mode_never_proposes_fixes() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);
        fs::write(
            dir.path().join("worker.py"),
            "def run(d):\n    x = d['k']\n    return x\n",
        )
        .unwrap();

        let reasoner = CannedReasoner {
            fix: Some(SuggestedFix {
                original_lines: vec!["    x = d['k']".into()],
                replacement_lines: vec!["    x = d.get('k')".into()],
            }),
        };
        let session = Session::new(
            options(dir.path(), ReviewMode::Basic),
            Some(Box::new(reasoner)),
        );
        let listing = session.list_files().unwrap();
        let report = session.analyze(&listing, &Selection::All).unwrap();

        assert_eq!(report.summary.fixes_proposed, 0);
        assert!(report.findings.iter().all(|f| f.proposed_fix.is_none()));
        // Explanations still arrive in basic mode.
        assert_eq!(report.summary.explanations, report.summary.patterns);
    }

    #[test]
    fn test_report_round_trips_through_serde() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let listing = session.list_files().unwrap();
        let report = session.analyze(&listing, &Selection::All).unwrap();

        let path = dir.path().join("report.json");
        Session::write_report(&report, &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["summary"]["patterns"], 4);
        assert_eq!(value["findings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_per_file_failure_is_contained() {
        let dir = TempDir::new().unwrap();
        fixture(&dir);

        let session = Session::new(options(dir.path(), ReviewMode::Basic), None);
        let mut listing = session.list_files().unwrap();
        // A file that vanished after listing.
        listing.files.push(ListedFile {
            descriptor: LogFileDescriptor {
                path: dir.path().join("gone.log"),
                size_bytes: 0,
                depth: 0,
            },
            modified: None,
        });

        let report = session.analyze(&listing, &Selection::All).unwrap();
        assert_eq!(report.summary.files_failed, 1);
        assert_eq!(report.summary.files_parsed, 2);
        // The healthy files still produced their patterns.
        assert_eq!(report.summary.patterns, 4);
    }
}
