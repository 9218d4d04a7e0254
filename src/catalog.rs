// src/catalog.rs

//! Normalized package catalogs of RPM-family releases
//!
//! After a successful ingest the filtered records of a release are stored as
//! gzip-compressed JSON lines, sorted by name. Matching later reads them back
//! instead of re-parsing the repository metadata.

use crate::error::{Error, Result};
use crate::repository::MetadataFormat;
use crate::repository::parsers::PackageRecord;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CATALOG_FILE: &str = "packages.json.gz";

/// Names the metadata format the catalog was built from
pub const STYLE_FILE: &str = "style";

/// `<cache_root>/<distro>/packages/<tag>/dist-<tag>`
pub fn catalog_dir(cache_root: &Path, distro: &str, tag: &str) -> PathBuf {
    cache_root
        .join(distro)
        .join("packages")
        .join(tag)
        .join(format!("dist-{}", tag))
}

/// Replace the catalog in `dir` with `records`
pub fn write_catalog(dir: &Path, format: MetadataFormat, records: &[PackageRecord]) -> Result<()> {
    fs::create_dir_all(dir)?;

    let mut sorted: Vec<&PackageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let temp = tempfile::NamedTempFile::new_in(dir)?;
    let mut encoder = GzEncoder::new(temp, Compression::default());
    for record in sorted {
        serde_json::to_writer(&mut encoder, record)?;
        encoder.write_all(b"\n")?;
    }
    let temp = encoder.finish()?;
    temp.persist(dir.join(CATALOG_FILE)).map_err(|e| e.error)?;

    fs::write(dir.join(STYLE_FILE), format.style_name())?;
    info!("Wrote {} packages to {}", records.len(), dir.display());
    Ok(())
}

/// Read the catalog in `dir`
pub fn read_catalog(dir: &Path) -> Result<Vec<PackageRecord>> {
    let path = dir.join(CATALOG_FILE);
    if !path.is_file() {
        return Err(Error::MissingIndex(format!("No packages found in {}", dir.display())));
    }
    debug!("Reading {}", path.display());

    let reader = BufReader::new(GzDecoder::new(File::open(&path)?));
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
