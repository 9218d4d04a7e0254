// src/config.rs

//! Distribution registry
//!
//! Loaded from a TOML file and handed to the retrievers read-only:
//!
//! ```toml
//! cache_dir = "/var/cache/cptmatch"
//! jobs = 4
//! max_age_secs = 86400
//!
//! [[distribution]]
//! name = "Debian"
//! family = "apt"
//! archive_url = "http://ftp.debian.org/debian"
//! package_url = "https://packages.debian.org/{release}/{package}"
//! releases = [{ name = "bookworm", version = "12" }]
//!
//! [[distribution]]
//! name = "Fedora"
//! family = "rpm"
//! archive_url = "http://dl.fedoraproject.org/pub/fedora/linux"
//! repo_path = "releases/{version}/Everything/x86_64/os"
//! development_repo_path = "development/{version}/Everything/x86_64/os"
//! releases = [{ name = "38", version = 38 }, { name = "rawhide", version = "rawhide", development = true }]
//! ```

use crate::error::{Error, Result};
use crate::repository::parsers::PLACEHOLDER_URL;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of every cache the pipeline writes
    pub cache_dir: PathBuf,

    /// Worker pool size (defaults to the number of CPUs)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Caches younger than this are not refreshed unless forced
    #[serde(default)]
    pub max_age_secs: Option<u64>,

    #[serde(default, rename = "distribution")]
    pub distributions: Vec<DistroConfig>,
}

/// Which retriever handles a distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroFamily {
    /// Debian-style archives (Debian, Tanglu)
    Apt,
    /// RPM-MD or YaST2 repositories (Fedora, openSUSE)
    Rpm,
}

/// Metadata format of an RPM-family repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatHint {
    /// Probe the repository for marker files
    #[default]
    Auto,
    RpmMd,
    Yast2,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistroConfig {
    pub name: String,
    pub family: DistroFamily,
    pub archive_url: String,
    pub releases: Vec<ReleaseConfig>,

    /// Archive components (APT only)
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Binary architecture whose indices are fetched (APT only)
    #[serde(default = "default_architecture")]
    pub architecture: String,

    /// Path of a release's repository below `archive_url` (RPM only)
    #[serde(default)]
    pub repo_path: Option<String>,

    /// Same as `repo_path`, for development releases
    #[serde(default)]
    pub development_repo_path: Option<String>,

    #[serde(default)]
    pub format: FormatHint,

    /// Package page template with `{release}`, `{package}` and `{source}`
    #[serde(default)]
    pub package_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Codename ("bookworm") or display name ("38")
    pub name: String,

    /// Release number; TOML integers and floats are accepted
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    #[serde(default)]
    pub development: bool,
}

fn default_components() -> Vec<String> {
    ["main", "contrib", "non-free"].map(String::from).to_vec()
}

fn default_architecture() -> String {
    "amd64".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// A relative `cache_dir` is resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&text)?;

        if config.cache_dir.is_relative() {
            if let Some(base) = path.parent() {
                config.cache_dir = base.join(&config.cache_dir);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == Some(0) {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for distro in &self.distributions {
            if distro.name.trim().is_empty() {
                return Err(Error::Config("Distribution without a name".to_string()));
            }
            if !seen.insert(distro.name.as_str()) {
                return Err(Error::Config(format!(
                    "Distribution {} is configured twice",
                    distro.name
                )));
            }
            if distro.archive_url.trim().is_empty() {
                return Err(Error::Config(format!("{}: archive_url is empty", distro.name)));
            }
            if distro.releases.is_empty() {
                return Err(Error::Config(format!("{}: no releases configured", distro.name)));
            }

            let mut tags = HashSet::new();
            for release in &distro.releases {
                if !tags.insert(distro.release_tag(release)) {
                    return Err(Error::Config(format!(
                        "{}: release {} is configured twice",
                        distro.name, release.name
                    )));
                }
            }

            if distro.family == DistroFamily::Apt && distro.components.is_empty() {
                return Err(Error::Config(format!("{}: no components configured", distro.name)));
            }
        }
        Ok(())
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn distribution(&self, name: &str) -> Option<&DistroConfig> {
        self.distributions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

impl DistroConfig {
    /// Identifier stamped on records and used for cache paths.
    ///
    /// APT archives are addressed by suite codename, RPM repositories by
    /// release number.
    pub fn release_tag<'a>(&self, release: &'a ReleaseConfig) -> &'a str {
        match self.family {
            DistroFamily::Apt => &release.name,
            DistroFamily::Rpm => &release.version,
        }
    }

    /// Repository root of an RPM-family release
    pub fn repo_url(&self, release: &ReleaseConfig) -> String {
        let template = if release.development {
            self.development_repo_path
                .as_deref()
                .or(self.repo_path.as_deref())
        } else {
            self.repo_path.as_deref()
        };

        let base = self.archive_url.trim_end_matches('/');
        match template {
            Some(t) if !t.is_empty() => {
                let path = t
                    .replace("{name}", &release.name)
                    .replace("{version}", &release.version);
                format!("{}/{}", base, path.trim_start_matches('/'))
            }
            _ => base.to_string(),
        }
    }

    /// Detail page of a package, or the placeholder without a template
    pub fn package_url(&self, release: &str, package: &str, source: Option<&str>) -> String {
        match &self.package_url {
            Some(template) => template
                .replace("{release}", release)
                .replace("{package}", package)
                .replace("{source}", source.unwrap_or(package)),
            None => PLACEHOLDER_URL.to_string(),
        }
    }
}
