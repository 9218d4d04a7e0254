// src/lib.rs

//! cptmatch
//!
//! Cross-distribution package version tracking for AppStream components.
//!
//! # Architecture
//!
//! - Retrievers: one per configured distribution (APT, RPM-MD, YaST2)
//! - Fetching: local or HTTP repositories, staged on-disk caches, digest checks
//! - Parsers: lenient Debian indices, strict RPM-MD and YaST2 catalogs
//! - Reconciliation: one record per package and release, strict-greater wins
//! - Matching: highest upstream version per component across releases

pub mod appstream;
pub mod catalog;
pub mod config;
pub mod distro;
mod error;
pub mod matcher;
pub mod pipeline;
pub mod reconcile;
pub mod repository;
pub mod sink;
pub mod version;

pub use error::{Error, Result};

/// Prepare process-wide parser state.
///
/// Call once from the entry point before any parsing; repeated calls are
/// no-ops.
pub fn init_once() {
    repository::parsers::init_once();
}
