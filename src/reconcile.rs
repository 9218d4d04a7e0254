// src/reconcile.rs

//! Per-release package deduplication
//!
//! Indices routinely list a package more than once: several uploads of the
//! same source, an epoch bump, or the same name in two archive components.
//! A [`ReconciledSuite`] keeps exactly one record per name. A later record
//! replaces the stored one only if its version is strictly greater, so on a
//! tie the first record seen stays. Callers must therefore feed records in a
//! stable order.

use crate::repository::parsers::PackageRecord;
use crate::version::compare_versions;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::warn;

/// Winning record per package name for one (distro, release)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledSuite {
    release: String,
    packages: BTreeMap<String, PackageRecord>,
}

impl ReconciledSuite {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            packages: BTreeMap::new(),
        }
    }

    /// Build a suite by folding `records` in order
    pub fn from_records(
        release: impl Into<String>,
        records: impl IntoIterator<Item = PackageRecord>,
    ) -> Self {
        let mut suite = Self::new(release);
        for record in records {
            suite.insert(record);
        }
        suite
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// Offer a record; returns true if it is now the stored one
    pub fn insert(&mut self, record: PackageRecord) -> bool {
        match self.packages.entry(record.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(mut slot) => {
                if supersedes(&record, slot.get()) {
                    slot.insert(record);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fold another suite (e.g. another archive component) into this one.
    ///
    /// Records already present win ties against `other`.
    pub fn merge(&mut self, other: ReconciledSuite) {
        for (_, record) in other.packages {
            self.insert(record);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.get(name)
    }

    /// Records ordered by package name
    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Deduplicate `records` by name, first-seen wins ties
pub fn reconcile(records: impl IntoIterator<Item = PackageRecord>) -> BTreeMap<String, PackageRecord> {
    ReconciledSuite::from_records(String::new(), records).packages
}

/// Strict-greater test on the full distro version.
///
/// A version the comparator rejects never replaces anything.
fn supersedes(candidate: &PackageRecord, current: &PackageRecord) -> bool {
    match compare_versions(&candidate.version, &current.version) {
        Ok(ordering) => ordering == Ordering::Greater,
        Err(e) => {
            warn!(
                "Keeping {} {} over {}: {}",
                current.name, current.version, candidate.version, e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::upstream_of;

    fn record(name: &str, version: &str, component: &str) -> PackageRecord {
        PackageRecord::new(
            name.to_string(),
            version.to_string(),
            upstream_of(version).to_string(),
            "bookworm".to_string(),
            component.to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let records = vec![
            record("foo", "1.0", "first"),
            record("foo", "0.9", "second"),
            record("foo", "2.0", "third"),
            record("foo", "2.0", "fourth"),
        ];

        let result = reconcile(records);
        assert_eq!(result.len(), 1);
        let winner = &result["foo"];
        assert_eq!(winner.version, "2.0");
        assert_eq!(winner.component, "third");
    }

    #[test]
    fn test_epoch_bump_wins() {
        let suite = ReconciledSuite::from_records(
            "bookworm",
            vec![record("vim", "9.1-1", "main"), record("vim", "1:8.2-1", "main")],
        );
        assert_eq!(suite.get("vim").unwrap().version, "1:8.2-1");
        assert_eq!(suite.get("vim").unwrap().upstream_version, "8.2");
    }

    #[test]
    fn test_merge_components_strict_greater() {
        let mut main = ReconciledSuite::from_records(
            "bookworm",
            vec![record("foo", "1.0-1", "main"), record("bar", "2.0-1", "main")],
        );
        let contrib = ReconciledSuite::from_records(
            "bookworm",
            vec![
                record("foo", "1.0-1", "contrib"),
                record("bar", "2.1-1", "contrib"),
                record("baz", "0.1-1", "contrib"),
            ],
        );
        main.merge(contrib);

        assert_eq!(main.len(), 3);
        assert_eq!(main.get("foo").unwrap().component, "main");
        assert_eq!(main.get("bar").unwrap().component, "contrib");
        let names: Vec<&str> = main.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "baz", "foo"]);
    }

    #[test]
    fn test_malformed_candidate_never_replaces() {
        let mut suite = ReconciledSuite::new("38");
        assert!(suite.insert(record("foo", "1.0", "foo")));
        assert!(!suite.insert(record("foo", "x:2.0", "foo")));
        assert_eq!(suite.get("foo").unwrap().version, "1.0");
    }
}
