// src/error.rs

use crate::version::VersionError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for cptmatch
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network transport failure while fetching a repository file
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("Failed to fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Fetched file does not match the digest declared by the repository index
    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// repomd.xml is missing, unreadable or has no primary entry
    #[error("Repository metadata error: {0}")]
    RepoMetadata(String),

    /// primary.xml violates the RPM-MD format
    #[error("RPM-MD error: {0}")]
    RpmMd(String),

    /// YaST2 content or packages catalog violates the format
    #[error("YaST2 error: {0}")]
    Yast2(String),

    /// Version string could not be parsed
    #[error("Malformed version: {0}")]
    MalformedVersion(#[from] VersionError),

    /// A single stanza of a lenient index could not be used
    #[error("Bad package stanza: {0}")]
    BadPackageStanza(String),

    /// No usable package index for a release
    #[error("No package index found: {0}")]
    MissingIndex(String),

    /// Checksum algorithm not supported
    #[error("Unknown digest algorithm: {0}")]
    UnknownDigest(String),

    /// Repository format could not be determined or is not supported
    #[error("Unknown repository format: {0}")]
    UnknownFormat(String),

    /// Invalid or unreadable distro registry
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization of catalogs and component listings
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later can reasonably succeed.
    ///
    /// Only transport failures qualify; malformed or tampered metadata needs a
    /// fresh fetch rather than a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch { .. } | Error::HttpStatus { .. })
    }
}

/// Result type alias using cptmatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let status = Error::HttpStatus {
            url: "http://example.com/repomd.xml".to_string(),
            status: 503,
        };
        assert!(status.is_retryable());

        let mismatch = Error::ChecksumMismatch {
            path: PathBuf::from("primary.xml.gz"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(!mismatch.is_retryable());
        assert!(!Error::Yast2("bad header".to_string()).is_retryable());
    }
}
