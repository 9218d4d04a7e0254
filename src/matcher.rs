// src/matcher.rs

//! AppStream component to package matching
//!
//! Each component is looked up by its canonical package name in every
//! release's [`ReconciledSuite`]. Across releases the record with the greatest
//! upstream version is selected, using the same comparator and the same
//! strict-greater rule as the reconciler: the earliest release wins ties.

use crate::appstream::AppStreamComponent;
use crate::reconcile::ReconciledSuite;
use crate::repository::parsers::PackageRecord;
use crate::version::compare_versions;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, warn};

/// Highest known version of one component within a distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentVersionSelection {
    pub identifier: String,
    pub package_name: String,
    pub upstream_version: String,

    /// The winning record, carrying its release and package URL
    pub record: PackageRecord,
}

impl ComponentVersionSelection {
    pub fn new(identifier: &str, record: PackageRecord) -> Self {
        Self {
            identifier: identifier.to_string(),
            package_name: record.name.clone(),
            upstream_version: record.upstream_version.clone(),
            record,
        }
    }
}

/// Select the highest upstream version per component across `suites`.
///
/// Components without a package name, or whose package appears in no suite,
/// are left out.
pub fn match_and_select(
    components: &[AppStreamComponent],
    suites: &[ReconciledSuite],
) -> BTreeMap<String, ComponentVersionSelection> {
    let mut selections = BTreeMap::new();

    for component in components {
        let Some(package) = component.package_name() else {
            debug!("{} declares no package", component.identifier);
            continue;
        };

        for suite in suites {
            if let Some(record) = suite.get(package) {
                select_into(
                    &mut selections,
                    ComponentVersionSelection::new(&component.identifier, record.clone()),
                );
            }
        }
    }

    selections
}

/// Offer a candidate to an existing selection map.
///
/// Replaces the stored selection only if the candidate's upstream version is
/// strictly greater. Returns true if the candidate was stored.
pub fn select_into(
    selections: &mut BTreeMap<String, ComponentVersionSelection>,
    candidate: ComponentVersionSelection,
) -> bool {
    match selections.entry(candidate.identifier.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(candidate);
            true
        }
        Entry::Occupied(mut slot) => {
            let current = slot.get();
            match compare_versions(&candidate.upstream_version, &current.upstream_version) {
                Ok(Ordering::Greater) => {
                    slot.insert(candidate);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!(
                        "Keeping {} {} from {}: {}",
                        current.identifier, current.upstream_version, current.record.release, e
                    );
                    false
                }
            }
        }
    }
}
