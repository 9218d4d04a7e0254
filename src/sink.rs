// src/sink.rs

//! Output side of the pipeline
//!
//! A [`VersionSink`] receives one [`SinkRecord`] per selected component.
//! Upserting into a database, indexing and icon mirroring belong to the
//! sink's owner.

use crate::error::Result;
use crate::matcher::ComponentVersionSelection;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One selected component version, flattened for consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub component: String,
    pub distro: String,
    pub release: String,
    pub package: String,
    pub version: String,
    pub upstream_version: String,
    pub package_url: String,
}

impl SinkRecord {
    pub fn from_selection(distro: &str, selection: &ComponentVersionSelection) -> Self {
        Self {
            component: selection.identifier.clone(),
            distro: distro.to_string(),
            release: selection.record.release.clone(),
            package: selection.package_name.clone(),
            version: selection.record.version.clone(),
            upstream_version: selection.upstream_version.clone(),
            package_url: selection.record.url.clone(),
        }
    }
}

pub trait VersionSink {
    fn accept(&mut self, record: &SinkRecord) -> Result<()>;

    /// Called once after the last record of a run
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl VersionSink for Vec<SinkRecord> {
    fn accept(&mut self, record: &SinkRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> VersionSink for JsonLinesSink<W> {
    fn accept(&mut self, record: &SinkRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }
}
