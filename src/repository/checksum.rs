// src/repository/checksum.rs

//! Content digests declared by repository indices

use crate::error::{Error, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Hash algorithm named by repomd.xml or a YaST `content` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Parse an algorithm name. `sha` is an old alias of `sha1`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha" | "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(Error::UnknownDigest(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

/// An expected digest: algorithm plus lowercase hex value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, value: &str) -> Self {
        Self {
            algorithm,
            value: value.trim().to_ascii_lowercase(),
        }
    }

    /// Digest of in-memory bytes with the same algorithm
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        match self.algorithm {
            HashAlgorithm::Sha1 => format!("{:x}", Sha1::digest(data)),
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        }
    }

    /// Verify in-memory bytes, reporting `path` on mismatch
    pub fn verify_bytes(&self, data: &[u8], path: &Path) -> Result<()> {
        let actual = self.digest_bytes(data);
        if actual != self.value {
            return Err(Error::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: self.value.clone(),
                actual,
            });
        }
        debug!("Checksum verified for {}: {}", path.display(), self.value);
        Ok(())
    }

    /// Whether the file at `path` exists and matches
    pub fn matches_file(&self, path: &Path) -> Result<bool> {
        match hash_file(self.algorithm, path)? {
            Some(actual) => Ok(actual == self.value),
            None => Ok(false),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.value)
    }
}

/// Hash a file, returning `None` when it does not exist
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let digest = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(Some(digest))
}
