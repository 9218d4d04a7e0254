// src/distro/mod.rs

//! Per-distribution retrievers
//!
//! Every configured distribution is driven through a [`DistroRetriever`]:
//!
//! - [`apt::AptRetriever`]: Debian-style archives (Debian, Tanglu)
//! - [`rpm::RpmRetriever`]: RPM-MD and YaST2 repositories (Fedora, openSUSE)
//!
//! Implementations only provide the per-release operations. Iterating
//! releases, isolating failures and matching components are shared.

pub mod apt;
pub mod rpm;

use crate::appstream::AppStreamComponent;
use crate::config::{Config, DistroConfig, DistroFamily, ReleaseConfig};
use crate::error::{Error, Result};
use crate::matcher::{ComponentVersionSelection, match_and_select};
use crate::reconcile::ReconciledSuite;
use crate::repository::HttpClient;
use crate::repository::parsers::PackageRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Shared state handed to every retriever
#[derive(Clone)]
pub struct DistroContext {
    pub config: Arc<Config>,
    pub client: HttpClient,
}

impl DistroContext {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            config,
            client: HttpClient::new()?,
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.config.cache_dir
    }
}

/// A release as reported to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub codename: String,
    pub version: String,
    pub development: bool,
}

/// A release whose refresh or load failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFailure {
    pub distro: String,
    pub release: String,
    pub error: String,
    pub retryable: bool,
}

impl ReleaseFailure {
    pub fn new(distro: &str, release: &str, error: &Error) -> Self {
        Self {
            distro: distro.to_string(),
            release: release.to_string(),
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Selections of one distribution plus the releases left out
#[derive(Debug, Default)]
pub struct ComponentPackages {
    pub selections: BTreeMap<String, ComponentVersionSelection>,
    pub failures: Vec<ReleaseFailure>,
}

/// Uniform contract over all distribution variants
pub trait DistroRetriever: Send + Sync {
    fn distro(&self) -> &DistroConfig;

    /// Refresh the caches of one release
    fn update_release(&self, release: &ReleaseConfig, force: bool) -> Result<()>;

    /// Build the reconciled package map of one release from its caches
    fn load_release(&self, release: &ReleaseConfig) -> Result<ReconciledSuite>;

    /// Directories holding the AppStream data of every release
    fn metadata_dirs(&self) -> Vec<PathBuf>;

    fn name(&self) -> &str {
        &self.distro().name
    }

    fn get_releases(&self) -> Vec<ReleaseInfo> {
        self.distro()
            .releases
            .iter()
            .map(|r| ReleaseInfo {
                codename: r.name.clone(),
                version: r.version.clone(),
                development: r.development,
            })
            .collect()
    }

    /// Refresh every release; failures are reported, not propagated
    fn update_caches(&self, force: bool) -> Vec<ReleaseFailure> {
        let distro = self.distro();
        let mut failures = Vec::new();
        for release in &distro.releases {
            if let Err(e) = self.update_release(release, force) {
                warn!("{} {}: update failed: {}", distro.name, release.name, e);
                failures.push(ReleaseFailure::new(&distro.name, distro.release_tag(release), &e));
            }
        }
        failures
    }

    /// Load every release not listed in `skip`, in configuration order
    fn load_suites(&self, skip: &[ReleaseFailure]) -> (Vec<ReconciledSuite>, Vec<ReleaseFailure>) {
        let distro = self.distro();
        let mut suites = Vec::new();
        let mut failures = Vec::new();

        for release in &distro.releases {
            let tag = distro.release_tag(release);
            if skip.iter().any(|f| f.release == tag) {
                continue;
            }
            match self.load_release(release) {
                Ok(suite) => suites.push(suite),
                Err(e) => {
                    warn!("Skipping {} {}: {}", distro.name, release.name, e);
                    failures.push(ReleaseFailure::new(&distro.name, tag, &e));
                }
            }
        }
        (suites, failures)
    }

    /// Every release's record for `package`
    fn get_packages_info(&self, package: &str) -> Vec<PackageRecord> {
        let (suites, _) = self.load_suites(&[]);
        suites
            .iter()
            .filter_map(|suite| suite.get(package).cloned())
            .collect()
    }

    /// Match `components` against all loadable releases
    fn get_components_packages(&self, components: &[AppStreamComponent]) -> ComponentPackages {
        let (suites, failures) = self.load_suites(&[]);
        ComponentPackages {
            selections: match_and_select(components, &suites),
            failures,
        }
    }
}

/// `<cache_root>/<distro>/metadata/<tag>`
pub fn metadata_dir(cache_root: &Path, distro: &DistroConfig, release: &ReleaseConfig) -> PathBuf {
    cache_root
        .join(&distro.name)
        .join("metadata")
        .join(distro.release_tag(release))
}

/// Create one retriever per configured distribution, in configuration order
pub fn build_retrievers(context: &DistroContext) -> Vec<Box<dyn DistroRetriever>> {
    context
        .config
        .distributions
        .iter()
        .map(|distro| -> Box<dyn DistroRetriever> {
            match distro.family {
                DistroFamily::Apt => Box::new(apt::AptRetriever::new(context.clone(), distro.clone())),
                DistroFamily::Rpm => Box::new(rpm::RpmRetriever::new(context.clone(), distro.clone())),
            }
        })
        .collect()
}
