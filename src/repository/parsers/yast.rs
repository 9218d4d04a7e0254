// src/repository/parsers/yast.rs

//! openSUSE YaST2 repository metadata parser
//!
//! A YaST2 repository has a `content` file at its root. It must start with
//! `CONTENTSTYLE 11` and names the description directory (`DESCRDIR`) plus a
//! digest for the `packages.gz` catalog inside it (`META SHA256 <hash>
//! packages.gz`). The catalog is a line-oriented text file:
//!
//! ```text
//! =Ver: 2.0
//! =Pkg: gedit 44.2 1.1 x86_64
//! =Src: gedit 44.2 1.1 src
//! ```
//!
//! The format is parsed strictly: any deviation fails the whole release.

use super::PackageRecord;
use crate::error::{Error, Result};
use crate::repository::checksum::{Checksum, HashAlgorithm};
use crate::repository::MetadataSource;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Location of the content index below the repository root
pub const CONTENT_PATH: &str = "content";

/// Catalog file this parser consumes
const PACKAGES_FILE: &str = "packages.gz";

/// First line of a supported catalog
const CATALOG_HEADER: &str = "=Ver: 2.0";

/// What the `content` file tells us about the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentIndex {
    pub descrdir: String,
    pub distribution: Option<String>,
    pub version: Option<String>,
    pub packages_file: String,
    pub packages_checksum: Checksum,
}

impl ContentIndex {
    /// Path of the catalog relative to the repository root
    pub fn packages_subpath(&self) -> String {
        format!("{}/{}", self.descrdir.trim_end_matches('/'), self.packages_file)
    }
}

/// YaST2 parser for one release
pub struct YastParser {
    /// Release tag stamped on every record
    release: String,
}

/// One `=Pkg:` record and its optional `=Src:` line
struct PendingPackage {
    name: String,
    ver: String,
    rel: String,
    arch: String,
    source: Option<String>,
}

impl PendingPackage {
    fn build(self, release: &str) -> Result<PackageRecord> {
        let is_source = matches!(self.arch.as_str(), "src" | "nosrc");
        if self.source.is_none() && !is_source {
            return Err(Error::Yast2(format!("No source package for {}", self.name)));
        }

        let version = format!("{}-{}", self.ver, self.rel);
        let component = self.source.clone().unwrap_or_else(|| self.name.clone());
        Ok(
            PackageRecord::new(self.name, version, self.ver, release.to_string(), component)?
                .with_source_package(self.source)
                .with_architecture(Some(self.arch)),
        )
    }
}

/// Split a `=Tag:` line into its four data tokens
fn record_tokens<'a>(line: &'a str, tag: &str) -> Result<Vec<&'a str>> {
    let tokens: Vec<&str> = line[tag.len()..].split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(Error::Yast2(format!(
            "Cannot parse {} line: expected 4 items in '{}'",
            tag.trim_end_matches(':'),
            line
        )));
    }
    Ok(tokens)
}

/// Check the token count of a `content` key line
fn expect_items(items: &[&str], count: usize, line: &str) -> Result<()> {
    if items.len() != count {
        return Err(Error::Yast2(format!(
            "Cannot parse {} line in content: not the expected number of items in '{}'",
            items[0], line
        )));
    }
    Ok(())
}

/// Check the catalog against the digest announced in `content`
fn verify_catalog(stored: &[u8], label: &str, expected: &Checksum) -> Result<()> {
    expected.verify_bytes(stored, Path::new(label)).map_err(|e| {
        debug!("{}", e);
        Error::Yast2(format!(
            "Hash of {} is different from the expected value",
            label
        ))
    })
}

impl YastParser {
    pub fn new(release: String) -> Self {
        Self { release }
    }

    /// Parse the `content` index
    pub fn parse_content(&self, data: &[u8]) -> Result<ContentIndex> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| Error::Yast2("content is empty".to_string()))?;
        if header.split_whitespace().collect::<Vec<_>>() != ["CONTENTSTYLE", "11"] {
            return Err(Error::Yast2(format!(
                "Cannot parse content: unknown format '{}'",
                header
            )));
        }

        let mut descrdir = None;
        let mut distribution = None;
        let mut version = None;
        let mut packages = None;

        for line in lines {
            let items: Vec<&str> = line.split_whitespace().collect();
            let Some(key) = items.first() else {
                continue;
            };

            match *key {
                "DESCRDIR" => {
                    expect_items(&items, 2, line)?;
                    descrdir = Some(items[1].to_string());
                }
                "DISTRIBUTION" => {
                    expect_items(&items, 2, line)?;
                    distribution = Some(items[1].to_string());
                }
                "VERSION" => {
                    expect_items(&items, 2, line)?;
                    version = Some(items[1].to_string());
                }
                "META" => {
                    expect_items(&items, 4, line)?;
                    let algorithm = match items[1] {
                        "SHA1" => HashAlgorithm::Sha1,
                        "SHA256" => HashAlgorithm::Sha256,
                        other => {
                            return Err(Error::Yast2(format!("Unknown hash type '{}'", other)));
                        }
                    };
                    if items[3] != PACKAGES_FILE {
                        continue;
                    }
                    packages = Some(Checksum::new(algorithm, items[2]));
                }
                _ => {}
            }
        }

        let descrdir =
            descrdir.ok_or_else(|| Error::Yast2("No DESCRDIR in content".to_string()))?;
        let packages_checksum = packages
            .ok_or_else(|| Error::Yast2(format!("No checksum for {} in content", PACKAGES_FILE)))?;

        Ok(ContentIndex {
            descrdir,
            distribution,
            version,
            packages_file: PACKAGES_FILE.to_string(),
            packages_checksum,
        })
    }

    /// Verify and parse the `packages.gz` catalog
    pub fn parse_packages(
        &self,
        stored: &[u8],
        subpath: &str,
        expected: &Checksum,
    ) -> Result<Vec<PackageRecord>> {
        verify_catalog(stored, subpath, expected)?;
        self.decode_packages(stored, subpath)
    }

    fn decode_packages(&self, stored: &[u8], subpath: &str) -> Result<Vec<PackageRecord>> {
        // Some mirrors serve the catalog already decompressed.
        let text = if stored.starts_with(&[0x1f, 0x8b]) {
            let mut decompressed = String::new();
            GzDecoder::new(stored)
                .read_to_string(&mut decompressed)
                .map_err(|e| Error::Yast2(format!("Failed to decompress {}: {}", subpath, e)))?;
            decompressed
        } else {
            String::from_utf8_lossy(stored).into_owned()
        };

        self.parse_catalog(&text)
    }

    fn parse_catalog(&self, text: &str) -> Result<Vec<PackageRecord>> {
        let mut lines = text.lines();
        if lines.next() != Some(CATALOG_HEADER) {
            return Err(Error::Yast2(format!(
                "Cannot parse {}: unknown format",
                PACKAGES_FILE
            )));
        }

        let mut packages = Vec::new();
        let mut current: Option<PendingPackage> = None;

        for line in lines {
            if line.starts_with("=Pkg:") {
                if let Some(pkg) = current.take() {
                    packages.push(pkg.build(&self.release)?);
                }
                let tokens = record_tokens(line, "=Pkg:")?;
                current = Some(PendingPackage {
                    name: tokens[0].to_string(),
                    ver: tokens[1].to_string(),
                    rel: tokens[2].to_string(),
                    arch: tokens[3].to_string(),
                    source: None,
                });
            } else if line.starts_with("=Src:") {
                let Some(pkg) = current.as_mut() else {
                    continue;
                };
                if pkg.source.is_some() {
                    return Err(Error::Yast2(format!(
                        "Error while parsing package {}: two =Src lines",
                        pkg.name
                    )));
                }
                let tokens = record_tokens(line, "=Src:")?;
                pkg.source = Some(tokens[0].to_string());
            }
        }

        if let Some(pkg) = current.take() {
            packages.push(pkg.build(&self.release)?);
        }

        Ok(packages)
    }

    /// Parse `content`, then fetch, verify and parse the catalog it names.
    ///
    /// The catalog is not requested from the source until `content` has been
    /// validated.
    pub fn fetch_and_parse(&self, source: &dyn MetadataSource) -> Result<Vec<PackageRecord>> {
        info!("Syncing YaST2 repository {}", source.origin());

        let content_path = source.fetch(CONTENT_PATH, None)?;
        if !content_path.is_file() {
            return Err(Error::Yast2(format!(
                "{} in {} does not exist",
                CONTENT_PATH,
                source.origin()
            )));
        }
        let index = self.parse_content(&fs::read(&content_path)?)?;
        debug!(
            "content: {} {} in {}",
            index.distribution.as_deref().unwrap_or("unknown"),
            index.version.as_deref().unwrap_or("?"),
            index.descrdir
        );

        let subpath = index.packages_subpath();
        let path = source.fetch(&subpath, Some(&index.packages_checksum))?;
        if !path.is_file() {
            return Err(Error::Yast2(format!(
                "{} in {} does not exist",
                subpath,
                source.origin()
            )));
        }

        let stored = fs::read(&path)?;
        let label = format!("{} from {}", subpath, source.origin());
        if let Err(e) = verify_catalog(&stored, &label, &index.packages_checksum) {
            source.discard(&subpath)?;
            return Err(e);
        }
        let packages = self.decode_packages(&stored, &subpath)?;

        info!("Parsed {} packages from {}", packages.len(), source.origin());
        Ok(packages)
    }
}
