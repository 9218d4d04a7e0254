// src/distro/apt.rs

//! Debian-style archives
//!
//! Each (suite, component) index is cached as
//! `<cache_root>/<distro>/<suite>/<component>/Packages.gz`. A release's suite
//! is the reconciliation of all its component indices.

use super::{DistroContext, DistroRetriever, metadata_dir};
use crate::config::{DistroConfig, ReleaseConfig};
use crate::error::{Error, Result};
use crate::reconcile::ReconciledSuite;
use crate::repository::parsers::apt::AptIndexParser;
use crate::repository::{Resource, needs_sync, write_sync_stamp};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "Packages.gz";

pub struct AptRetriever {
    context: DistroContext,
    distro: DistroConfig,
}

impl AptRetriever {
    pub fn new(context: DistroContext, distro: DistroConfig) -> Self {
        Self { context, distro }
    }

    fn suite_dir(&self, release: &ReleaseConfig) -> PathBuf {
        self.context
            .cache_root()
            .join(&self.distro.name)
            .join(&release.name)
    }

    /// Cached index of one component
    pub fn index_path(&self, release: &ReleaseConfig, component: &str) -> PathBuf {
        self.suite_dir(release).join(component).join(INDEX_FILE)
    }

    /// Location of an index below the archive root
    fn upstream_subpath(&self, release: &ReleaseConfig, component: &str) -> String {
        format!(
            "dists/{}/{}/binary-{}/{}",
            release.name, component, self.distro.architecture, INDEX_FILE
        )
    }

    /// Copy or download one component index.
    ///
    /// Returns false if the archive does not carry this component; a copy
    /// cached by an earlier refresh is then removed.
    fn fetch_index(&self, resource: &Resource, release: &ReleaseConfig, component: &str) -> Result<bool> {
        let subpath = self.upstream_subpath(release, component);
        let dest = self.index_path(release, component);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let present = match resource {
            Resource::Local(root) => {
                let source = root.join(&subpath);
                let present = source.is_file();
                if present {
                    fs::copy(&source, &dest)?;
                }
                present
            }
            Resource::Remote(_) => {
                let url = resource.url_for(&subpath)?;
                match self.context.client.download_file(&url, &dest) {
                    Ok(()) => true,
                    Err(Error::HttpStatus { status: 404, .. }) => false,
                    Err(e) => return Err(e),
                }
            }
        };

        if !present {
            evict(&dest)?;
            return Ok(false);
        }
        debug!("Cached {}", dest.display());
        Ok(true)
    }
}

/// Drop a cached index that no longer exists upstream
fn evict(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl DistroRetriever for AptRetriever {
    fn distro(&self) -> &DistroConfig {
        &self.distro
    }

    fn update_release(&self, release: &ReleaseConfig, force: bool) -> Result<()> {
        let suite_dir = self.suite_dir(release);
        if !force && !needs_sync(&suite_dir, self.context.config.max_age()) {
            info!("{} {} is up to date", self.distro.name, release.name);
            return Ok(());
        }

        let resource = Resource::resolve(&self.distro.archive_url)?;
        let mut fetched = 0;
        for component in &self.distro.components {
            if self.fetch_index(&resource, release, component)? {
                fetched += 1;
            } else {
                warn!(
                    "{} {} has no {} index for {}",
                    self.distro.name, release.name, component, self.distro.architecture
                );
            }
        }

        if fetched == 0 {
            return Err(Error::MissingIndex(format!(
                "{} {}: no component index at {}",
                self.distro.name, release.name, resource
            )));
        }

        write_sync_stamp(&suite_dir)?;
        info!(
            "Updated {} {} ({} components)",
            self.distro.name, release.name, fetched
        );
        Ok(())
    }

    fn load_release(&self, release: &ReleaseConfig) -> Result<ReconciledSuite> {
        let mut suite = ReconciledSuite::new(release.name.clone());
        let mut found = false;

        for component in &self.distro.components {
            let path = self.index_path(release, component);
            if !path.is_file() {
                debug!("No cached index {}", path.display());
                continue;
            }
            found = true;

            let parser = AptIndexParser::new(release.name.clone(), component.clone());
            let records = parser.parse_file(&path)?.into_iter().map(|mut record| {
                record.url = self.distro.package_url(&release.name, &record.name, None);
                record
            });
            suite.merge(ReconciledSuite::from_records(release.name.clone(), records));
        }

        if !found {
            return Err(Error::MissingIndex(format!(
                "{} {}: no cached component index",
                self.distro.name, release.name
            )));
        }
        Ok(suite)
    }

    fn metadata_dirs(&self) -> Vec<PathBuf> {
        self.distro
            .releases
            .iter()
            .map(|r| metadata_dir(self.context.cache_root(), &self.distro, r))
            .collect()
    }
}
