// src/repository/parsers/mod.rs

//! Repository metadata parsers for different index formats
//!
//! This module provides parsers for native repository metadata formats:
//! - Debian/Tanglu: Packages.gz control-stanza indices (lenient)
//! - Fedora/openSUSE: repomd.xml and primary.xml files (strict)
//! - openSUSE YaST2: content and packages.gz catalogs (strict)
//!
//! Every parser produces [`PackageRecord`]s, the canonical package shape the
//! rest of the pipeline works with.

pub mod apt;
pub mod rpmmd;
pub mod yast;

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// URL used when no package page can be constructed
pub const PLACEHOLDER_URL: &str = "#";

/// Normalized package entry extracted from a repository index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name
    pub name: String,

    /// Full distro version, possibly with epoch and revision
    pub version: String,

    /// Version with epoch and distro revision removed
    pub upstream_version: String,

    /// Suite, codename or release number this record belongs to
    pub release: String,

    /// Archive component (Debian family) or source package name (RPM family)
    pub component: String,

    /// Originating source package (RPM/YaST only)
    pub source_package: Option<String>,

    /// Architecture (RPM/YaST only)
    pub architecture: Option<String>,

    /// Package detail page
    pub url: String,
}

impl PackageRecord {
    /// Create a record, rejecting an empty version
    pub fn new(
        name: String,
        version: String,
        upstream_version: String,
        release: String,
        component: String,
    ) -> Result<Self> {
        if version.trim().is_empty() {
            return Err(Error::BadPackageStanza(format!(
                "package {} has no version",
                name
            )));
        }

        Ok(Self {
            name,
            version,
            upstream_version,
            release,
            component,
            source_package: None,
            architecture: None,
            url: PLACEHOLDER_URL.to_string(),
        })
    }

    pub fn with_source_package(mut self, source: Option<String>) -> Self {
        self.source_package = source;
        self
    }

    pub fn with_architecture(mut self, arch: Option<String>) -> Self {
        self.architecture = arch;
        self
    }
}

/// Drops packages nobody wants to match against AppStream data
///
/// Applied to RPM-MD and YaST catalogs after a successful parse.
#[derive(Debug, Clone)]
pub struct PackageFilter {
    skip_arches: Vec<String>,
    skip_suffixes: Vec<String>,
}

impl Default for PackageFilter {
    fn default() -> Self {
        Self {
            skip_arches: ["src", "i386", "i686"].map(String::from).to_vec(),
            skip_suffixes: ["-32bit", "-debuginfo", "-debugsource"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl PackageFilter {
    pub fn should_skip(&self, record: &PackageRecord) -> bool {
        if self.skip_suffixes.iter().any(|s| record.name.ends_with(s.as_str())) {
            return true;
        }
        record
            .architecture
            .as_deref()
            .is_some_and(|arch| self.skip_arches.iter().any(|a| a == arch))
    }

    pub fn apply(&self, records: Vec<PackageRecord>) -> Vec<PackageRecord> {
        let before = records.len();
        let kept: Vec<PackageRecord> = records.into_iter().filter(|r| !self.should_skip(r)).collect();
        debug!("Package filter kept {} of {} records", kept.len(), before);
        kept
    }
}

/// Patterns shared by the strict parsers
pub(crate) struct ParserPatterns {
    /// `<name>-<ver>-<rel>.src.rpm`
    pub source_rpm: Regex,
}

static PATTERNS: OnceLock<ParserPatterns> = OnceLock::new();

pub(crate) fn patterns() -> &'static ParserPatterns {
    PATTERNS.get_or_init(|| {
        debug!("Compiling parser patterns");
        ParserPatterns {
            source_rpm: Regex::new(r"^(.+)-[^-]+-[^-]+\.src\.rpm$")
                .expect("source rpm pattern is valid"),
        }
    })
}

/// Initialize shared parser state.
///
/// Meant to be called once by the process entry point before any parsing;
/// later calls are no-ops. Parsers still initialize lazily if it was skipped.
pub fn init_once() {
    let _ = patterns();
}
