// src/repository/mod.rs

//! Repository access and metadata caching
//!
//! This module provides functionality for:
//! - Resolving a repository resource to a local directory or a remote URL
//! - Downloading index files with retry support
//! - Caching fetched files across runs, reusing them when their digest matches
//! - Probing a resource to detect its metadata format

pub mod checksum;
pub mod parsers;

pub use checksum::{Checksum, HashAlgorithm};

use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Name of the freshness stamp written after a successful refresh
const SYNC_STAMP: &str = ".last-sync";

/// Where repository files come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// A directory on this machine; files are read in place
    Local(PathBuf),
    /// An HTTP(S) base URL; files are fetched into a cache
    Remote(Url),
}

impl Resource {
    /// Resolve a resource string by its URI scheme.
    ///
    /// Strings without a scheme are local paths, as are `file://` URLs.
    pub fn resolve(resource: &str) -> Result<Self> {
        match Url::parse(resource) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let mut url = url;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Ok(Resource::Remote(url))
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Resource::Local)
                .map_err(|_| Error::Config(format!("Invalid file URL: {}", resource))),
            // Single-letter schemes are Windows drive letters.
            Ok(url) if url.scheme().len() == 1 => Ok(Resource::Local(PathBuf::from(resource))),
            Ok(url) => Err(Error::UnknownFormat(format!(
                "unsupported resource scheme '{}' in {}",
                url.scheme(),
                resource
            ))),
            Err(_) => Ok(Resource::Local(PathBuf::from(resource))),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Resource::Local(_))
    }

    /// URL of a file below a remote resource
    pub fn url_for(&self, subpath: &str) -> Result<String> {
        match self {
            Resource::Remote(base) => base
                .join(subpath)
                .map(|u| u.to_string())
                .map_err(|e| Error::RepoMetadata(format!("Invalid location {}: {}", subpath, e))),
            Resource::Local(path) => Ok(path.join(subpath).display().to_string()),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Local(path) => write!(f, "{}", path.display()),
            Resource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Metadata layout detected at a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    /// Debian-style `Packages.gz` index
    AptStyle,
    /// `repodata/repomd.xml` + `primary.xml`
    RpmMd,
    /// YaST2 `content` + `packages.gz`
    Yast2,
    Unknown,
}

impl MetadataFormat {
    /// Marker files probed in order; the first one present wins
    const MARKERS: [(&'static str, MetadataFormat); 3] = [
        ("repodata/repomd.xml", MetadataFormat::RpmMd),
        ("content", MetadataFormat::Yast2),
        ("Packages.gz", MetadataFormat::AptStyle),
    ];

    pub fn style_name(&self) -> &'static str {
        match self {
            MetadataFormat::AptStyle => "apt",
            MetadataFormat::RpmMd => "rpm-md",
            MetadataFormat::Yast2 => "yast2",
            MetadataFormat::Unknown => "unknown",
        }
    }
}

/// HTTP client wrapper with retry support
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    /// Create a new client with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Download a file to the specified path with retry support.
    ///
    /// The body is written to a `.part` file next to `dest_path` and renamed
    /// into place once complete; the partial file is removed on failure.
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = part_path(dest_path);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::HttpStatus {
                            url: url.to_string(),
                            status: response.status().as_u16(),
                        });
                    }

                    // Write to temporary file first
                    let mut file = File::create(&temp_path)?;
                    let copied = response.copy_to(&mut file);
                    drop(file);
                    if let Err(e) = copied {
                        let _ = fs::remove_file(&temp_path);
                        return Err(Error::Fetch {
                            url: url.to_string(),
                            source: e,
                        });
                    }

                    // Atomic rename from temp to final destination
                    if let Err(e) = fs::rename(&temp_path, dest_path) {
                        let _ = fs::remove_file(&temp_path);
                        return Err(e.into());
                    }

                    debug!("Successfully downloaded to {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Fetch {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Check that a remote file exists without downloading its body
    pub fn exists(&self, url: &str) -> Result<bool> {
        debug!("Probing {}", url);
        let response = self.client.head(url).send().map_err(|e| Error::Fetch {
            url: url.to_string(),
            source: e,
        })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest_path.with_file_name(name)
}

/// Reject absolute paths and `..` so fetched files stay inside their cache
fn checked_subpath(subpath: &str) -> Result<&Path> {
    let path = Path::new(subpath);
    let clean = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if subpath.is_empty() || !clean {
        return Err(Error::RepoMetadata(format!(
            "Refusing to fetch outside the repository: {}",
            subpath
        )));
    }
    Ok(path)
}

/// A place repository files can be obtained from
///
/// Format parsers only see this trait, so they never care whether a file was
/// downloaded, copied from a previous run, or read in place.
pub trait MetadataSource {
    /// Human-readable origin, used in error messages
    fn origin(&self) -> String;

    /// Make `subpath` available locally and return its path.
    ///
    /// The returned path may not exist when the resource does not have it.
    fn fetch(&self, subpath: &str, expected: Option<&Checksum>) -> Result<PathBuf>;

    /// Drop a fetched copy that failed verification
    fn discard(&self, subpath: &str) -> Result<()>;
}

/// Resource-agnostic fetch layer with an on-disk cache
///
/// Remote files of the current run land in a staging directory next to the
/// cache. [`MetadataFetcher::finish`] either promotes the staging directory to
/// become the cache for the next run, or throws it away.
pub struct MetadataFetcher {
    resource: Resource,
    cache_dir: PathBuf,
    staging: Option<TempDir>,
    client: HttpClient,
}

impl MetadataFetcher {
    pub fn new(resource: Resource, cache_dir: PathBuf, client: HttpClient) -> Result<Self> {
        let staging = match &resource {
            Resource::Local(_) => None,
            Resource::Remote(_) => {
                let parent = cache_dir
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                fs::create_dir_all(&parent)?;
                Some(
                    tempfile::Builder::new()
                        .prefix(".staging-")
                        .tempdir_in(&parent)?,
                )
            }
        };

        Ok(Self {
            resource,
            cache_dir,
            staging,
            client,
        })
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path a file has (or would have) in this run
    fn local_path(&self, subpath: &Path) -> PathBuf {
        match (&self.resource, &self.staging) {
            (Resource::Local(root), _) => root.join(subpath),
            (Resource::Remote(_), Some(staging)) => staging.path().join(subpath),
            (Resource::Remote(_), None) => self.cache_dir.join(subpath),
        }
    }

    /// Fetch `subpath` into this run's cache.
    ///
    /// Skips the download if the file was already fetched in this run, and
    /// copies the previous run's file instead when it matches `expected`.
    pub fn fetch_to_cache(&self, subpath: &str, expected: Option<&Checksum>) -> Result<PathBuf> {
        let relative = checked_subpath(subpath)?;
        let target = self.local_path(relative);
        if self.resource.is_local() || target.exists() {
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(expected) = expected {
            let previous = self.cache_dir.join(relative);
            if expected.matches_file(&previous)? {
                debug!("Reusing cached {} ({})", previous.display(), expected);
                fs::copy(&previous, &target)?;
                return Ok(target);
            }
        }

        let url = self.resource.url_for(subpath)?;
        self.client.download_file(&url, &target)?;
        Ok(target)
    }

    /// Detect the metadata format at this fetcher's resource
    pub fn probe_format(&self) -> Result<MetadataFormat> {
        probe_format(&self.resource, &self.client)
    }

    /// End this run.
    ///
    /// With `keep_cache` the staged files replace the previous cache; without
    /// it they are discarded and the previous cache stays as it was.
    pub fn finish(mut self, keep_cache: bool) -> Result<()> {
        let Some(staging) = self.staging.take() else {
            return Ok(());
        };

        if !keep_cache {
            debug!("Discarding staged files for {}", self.resource);
            return Ok(staging.close()?);
        }

        if self.cache_dir.is_dir() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        // The TempDir guard still drops afterwards; removing a path that no
        // longer exists is silently ignored.
        fs::rename(staging.path(), &self.cache_dir)?;
        debug!("Promoted staged files to {}", self.cache_dir.display());
        Ok(())
    }
}

impl MetadataSource for MetadataFetcher {
    fn origin(&self) -> String {
        self.resource.to_string()
    }

    fn fetch(&self, subpath: &str, expected: Option<&Checksum>) -> Result<PathBuf> {
        self.fetch_to_cache(subpath, expected)
    }

    fn discard(&self, subpath: &str) -> Result<()> {
        if self.resource.is_local() {
            return Ok(());
        }
        let path = self.local_path(checked_subpath(subpath)?);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Detect the metadata format at a resource by probing for marker files
pub fn probe_format(resource: &Resource, client: &HttpClient) -> Result<MetadataFormat> {
    for (marker, format) in MetadataFormat::MARKERS {
        let present = match resource {
            Resource::Local(root) => root.join(marker).is_file(),
            Resource::Remote(_) => client.exists(&resource.url_for(marker)?)?,
        };
        if present {
            debug!("Detected {} metadata at {}", format.style_name(), resource);
            return Ok(format);
        }
    }
    Ok(MetadataFormat::Unknown)
}

/// Record a successful refresh of `dir`
pub fn write_sync_stamp(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(SYNC_STAMP), current_timestamp())?;
    Ok(())
}

/// Check if the cache in `dir` needs a refresh
pub fn needs_sync(dir: &Path, max_age: Option<Duration>) -> bool {
    let Some(max_age) = max_age else {
        return true;
    };
    let Ok(stamp) = fs::read_to_string(dir.join(SYNC_STAMP)) else {
        return true; // Never synced
    };

    match parse_timestamp(stamp.trim()) {
        Ok(last_sync) => {
            let age = chrono::Utc::now().timestamp().saturating_sub(last_sync);
            age < 0 || age as u64 > max_age.as_secs()
        }
        Err(_) => true, // If we can't parse timestamp, force sync
    }
}

/// Get current timestamp as ISO 8601 string
fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse ISO 8601 timestamp to Unix seconds
fn parse_timestamp(timestamp: &str) -> Result<i64> {
    let dt = chrono::DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| Error::Config(format!("Invalid timestamp: {}", e)))?;
    Ok(dt.timestamp())
}
