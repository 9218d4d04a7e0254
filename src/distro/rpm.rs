// src/distro/rpm.rs

//! RPM-MD and YaST2 repositories
//!
//! A refresh fetches a release's repository metadata through a
//! [`MetadataFetcher`] into `<cache_root>/<distro>/<tag>`, parses it, filters
//! the records and exports them as a catalog. Loading a release reads that
//! catalog back.

use super::{DistroContext, DistroRetriever, metadata_dir};
use crate::catalog::{catalog_dir, read_catalog, write_catalog};
use crate::config::{DistroConfig, FormatHint, ReleaseConfig};
use crate::error::{Error, Result};
use crate::reconcile::ReconciledSuite;
use crate::repository::parsers::rpmmd::RpmMdParser;
use crate::repository::parsers::yast::YastParser;
use crate::repository::parsers::{PackageFilter, PackageRecord};
use crate::repository::{MetadataFetcher, MetadataFormat, Resource, needs_sync, write_sync_stamp};
use std::path::PathBuf;
use tracing::{info, warn};

pub struct RpmRetriever {
    context: DistroContext,
    distro: DistroConfig,
    filter: PackageFilter,
}

impl RpmRetriever {
    pub fn new(context: DistroContext, distro: DistroConfig) -> Self {
        Self {
            context,
            distro,
            filter: PackageFilter::default(),
        }
    }

    /// Fetcher cache of a release
    pub fn cache_dir(&self, release: &ReleaseConfig) -> PathBuf {
        self.context
            .cache_root()
            .join(&self.distro.name)
            .join(self.distro.release_tag(release))
    }

    /// Exported catalog of a release
    pub fn catalog_dir(&self, release: &ReleaseConfig) -> PathBuf {
        let tag = self.distro.release_tag(release);
        catalog_dir(self.context.cache_root(), &self.distro.name, tag)
    }

    fn detect_format(&self, fetcher: &MetadataFetcher) -> Result<MetadataFormat> {
        let format = match self.distro.format {
            FormatHint::RpmMd => MetadataFormat::RpmMd,
            FormatHint::Yast2 => MetadataFormat::Yast2,
            FormatHint::Auto => fetcher.probe_format()?,
        };
        match format {
            MetadataFormat::RpmMd | MetadataFormat::Yast2 => Ok(format),
            other => Err(Error::UnknownFormat(format!(
                "{} metadata at {} is not supported for {}",
                other.style_name(),
                fetcher.resource(),
                self.distro.name
            ))),
        }
    }

    fn ingest(&self, fetcher: &MetadataFetcher, tag: &str) -> Result<(MetadataFormat, Vec<PackageRecord>)> {
        let format = self.detect_format(fetcher)?;
        let records = match format {
            MetadataFormat::Yast2 => YastParser::new(tag.to_string()).fetch_and_parse(fetcher)?,
            _ => RpmMdParser::new(tag.to_string()).fetch_and_parse(fetcher)?,
        };

        let records = self
            .filter
            .apply(records)
            .into_iter()
            .map(|mut record| {
                record.url = self.distro.package_url(
                    tag,
                    &record.name,
                    record.source_package.as_deref(),
                );
                record
            })
            .collect();
        Ok((format, records))
    }
}

impl DistroRetriever for RpmRetriever {
    fn distro(&self) -> &DistroConfig {
        &self.distro
    }

    fn update_release(&self, release: &ReleaseConfig, force: bool) -> Result<()> {
        let tag = self.distro.release_tag(release);
        let cache_dir = self.cache_dir(release);
        if !force && !needs_sync(&cache_dir, self.context.config.max_age()) {
            info!("{} {} is up to date", self.distro.name, tag);
            return Ok(());
        }

        let resource = Resource::resolve(&self.distro.repo_url(release))?;
        let fetcher = MetadataFetcher::new(resource, cache_dir.clone(), self.context.client.clone())?;

        let (format, records) = match self.ingest(&fetcher, tag) {
            Ok(result) => result,
            Err(e) => {
                if let Err(cleanup) = fetcher.finish(false) {
                    warn!("Failed to discard staged files: {}", cleanup);
                }
                return Err(e);
            }
        };

        // The promoted cache carries no stamp until the catalog is written,
        // so a failure in between is retried by the next refresh.
        fetcher.finish(true)?;
        write_catalog(&self.catalog_dir(release), format, &records)?;
        write_sync_stamp(&cache_dir)?;

        info!(
            "Updated {} {} ({} packages, {})",
            self.distro.name,
            tag,
            records.len(),
            format.style_name()
        );
        Ok(())
    }

    fn load_release(&self, release: &ReleaseConfig) -> Result<ReconciledSuite> {
        let tag = self.distro.release_tag(release);
        let records = read_catalog(&self.catalog_dir(release))?;
        Ok(ReconciledSuite::from_records(tag, records))
    }

    fn metadata_dirs(&self) -> Vec<PathBuf> {
        self.distro
            .releases
            .iter()
            .map(|r| metadata_dir(self.context.cache_root(), &self.distro, r))
            .collect()
    }
}
