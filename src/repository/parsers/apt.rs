// src/repository/parsers/apt.rs

//! Debian/Tanglu repository index parser
//!
//! Parses Debian-style Packages files which use RFC 822-like stanzas
//! (key: value blocks separated by blank lines). The format is treated
//! leniently: a broken stanza is logged and skipped, the rest of the index is
//! still parsed.

use super::PackageRecord;
use crate::error::{Error, Result};
use crate::version::upstream_of;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Parser for one component of one suite
pub struct AptIndexParser {
    /// Suite codename (e.g., "bookworm", "aequorea")
    release: String,
    /// Archive component (e.g., "main", "contrib")
    component: String,
}

/// Fields of a Packages stanza this pipeline cares about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AptStanza {
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

impl AptIndexParser {
    pub fn new(release: String, component: String) -> Self {
        Self { release, component }
    }

    /// Lazily parse a decompressed index stream
    pub fn parse<R: BufRead>(&self, reader: R) -> AptRecords<'_, R> {
        AptRecords {
            parser: self,
            reader,
            done: false,
            skipped: 0,
        }
    }

    /// Parse a gzip-compressed Packages file into records
    pub fn parse_file(&self, path: &Path) -> Result<Vec<PackageRecord>> {
        debug!("Parsing {}", path.display());
        let file = File::open(path)?;
        let mut records = self.parse(BufReader::new(GzDecoder::new(file)));
        let parsed = records.by_ref().collect::<Result<Vec<_>>>()?;

        info!(
            "Parsed {} packages from {}/{} ({} skipped)",
            parsed.len(),
            self.release,
            self.component,
            records.skipped()
        );
        Ok(parsed)
    }

    /// Convert one stanza's text into a record
    fn record_from_stanza(&self, stanza: &str) -> Result<PackageRecord> {
        let mut entries: Vec<AptStanza> = rfc822_like::from_str(stanza)
            .map_err(|e| Error::BadPackageStanza(format!("unparsable stanza: {}", e)))?;
        let entry = entries
            .pop()
            .ok_or_else(|| Error::BadPackageStanza("empty stanza".to_string()))?;

        let name = entry
            .package
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::BadPackageStanza("stanza without Package field".to_string()))?;
        let version = entry
            .version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::BadPackageStanza(format!("package {} has no Version", name)))?;

        let upstream = upstream_of(&version).to_string();
        PackageRecord::new(
            name,
            version,
            upstream,
            self.release.clone(),
            self.component.clone(),
        )
    }
}

/// Iterator over the records of an index stream
///
/// Yields `Err` only for I/O failures of the underlying stream, after which it
/// stops. Defective stanzas are skipped and counted.
pub struct AptRecords<'a, R> {
    parser: &'a AptIndexParser,
    reader: R,
    done: bool,
    skipped: usize,
}

impl<R: BufRead> AptRecords<'_, R> {
    /// Number of stanzas dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Read the next blank-line-terminated stanza, `None` at end of stream
    fn next_stanza(&mut self) -> std::io::Result<Option<String>> {
        let mut stanza = String::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Ok((!stanza.is_empty()).then_some(stanza));
            }
            let text = String::from_utf8_lossy(&line);
            if text.trim().is_empty() {
                if stanza.is_empty() {
                    continue;
                }
                return Ok(Some(stanza));
            }
            stanza.push_str(text.trim_end_matches(['\r', '\n']));
            stanza.push('\n');
        }
    }
}

impl<R: BufRead> Iterator for AptRecords<'_, R> {
    type Item = Result<PackageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let stanza = match self.next_stanza() {
                Ok(Some(stanza)) => stanza,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            match self.parser.record_from_stanza(&stanza) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        "Skipping bad package data in {}/{}: {}",
                        self.parser.release, self.parser.component, e
                    );
                }
            }
        }
        None
    }
}
