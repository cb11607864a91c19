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

//! Error classification and deduplication.
//!
//! Records are grouped by a structural key so that repeated occurrences of
//! the same underlying issue collapse into one ranked pattern, while the same
//! error type raised from different source files stays distinguishable.

use crate::extract::ErrorRecord;
use crate::parser::normalize_message;
use chrono::{DateTime, Local};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

/// Structural grouping key: error type, normalized message shape, and the
/// blamed source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub error_type: String,
    pub message_shape: String,
    pub origin_file: Option<String>,
}

impl GroupKey {
    pub fn of(record: &ErrorRecord) -> Self {
        Self {
            error_type: record.error_type.clone().unwrap_or_default(),
            message_shape: normalize_message(&record.error_message),
            origin_file: record
                .origin_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

/// A cluster of error records sharing one grouping key.
///
/// Members keep insertion order (= discovery order); the occurrence count is
/// always the member count, there is no separate counter to drift.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    pub key: GroupKey,
    pub representative: ErrorRecord,
    pub members: Vec<ErrorRecord>,
    pub first_seen: Option<DateTime<Local>>,
    pub last_seen: Option<DateTime<Local>>,
}

impl ErrorPattern {
    fn new(key: GroupKey, record: ErrorRecord) -> Self {
        let ts = record.source.timestamp;
        Self {
            key,
            representative: record.clone(),
            members: vec![record],
            first_seen: ts,
            last_seen: ts,
        }
    }

    fn add(&mut self, record: ErrorRecord) {
        if let Some(ts) = record.source.timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |seen| seen.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |seen| seen.max(ts)));
        }
        self.members.push(record);
    }

    pub fn occurrence_count(&self) -> usize {
        self.members.len()
    }
}

/// Central pattern table shared across file workers.
///
/// Keyed by grouping key with per-key locking; a member push and its
/// first/last-seen update happen under one shard guard, so a partially
/// updated pattern is never observable.
#[derive(Default)]
pub struct PatternTable {
    groups: DashMap<GroupKey, ErrorPattern>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ErrorRecord) {
        let key = GroupKey::of(&record);
        match self.groups.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().add(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ErrorPattern::new(key, record));
            }
        }
    }

    pub fn merge<I: IntoIterator<Item = ErrorRecord>>(&self, records: I) {
        for record in records {
            self.insert(record);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Ranked snapshot: most frequent first, ties broken by most recent
    /// `last_seen`, then by key so repeated runs emit identical order.
    /// Singletons still show up (rare errors matter), sorted after
    /// multi-occurrence patterns by the frequency rank.
    pub fn ranked(&self) -> Vec<ErrorPattern> {
        let mut patterns: Vec<ErrorPattern> =
            self.groups.iter().map(|entry| entry.value().clone()).collect();
        patterns.sort_by(|a, b| {
            b.occurrence_count()
                .cmp(&a.occurrence_count())
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.key.cmp(&b.key))
        });
        patterns
    }
}
