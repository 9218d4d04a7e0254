// src/version.rs

//! Version string parsing and ordering
//!
//! Every version comparison in the pipeline goes through this module, whatever
//! distro the version came from. Ordering follows Debian policy:
//! `[epoch:]upstream_version[-revision]`, epoch compared numerically first,
//! then upstream and revision with the interleaved non-digit/digit algorithm
//! where `~` sorts before everything, even the end of the string.
//!
//! RPM `ver-rel` strings fit the same shape, so Fedora and openSUSE versions
//! are ordered with the same rules.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("epoch component is not numeric in {0:?}")]
    EpochNonNumeric(String),

    #[error("epoch out of range in {0:?}: {1}")]
    EpochOutOfRange(String, ParseIntError),

    #[error("version contains whitespace: {0:?}")]
    IllegalWhitespace(String),
}

/// A parsed package version.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    revision: Option<String>,
}

impl PackageVersion {
    /// Parse a version string.
    ///
    /// The epoch is everything before the first colon and must be numeric.
    /// For ordering purposes the revision is everything after the last hyphen.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(VersionError::IllegalWhitespace(s.to_string()));
        }

        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let epoch = match epoch {
            Some(epoch) => {
                if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(VersionError::EpochNonNumeric(s.to_string()));
                }
                Some(
                    u32::from_str(epoch)
                        .map_err(|e| VersionError::EpochOutOfRange(s.to_string(), e))?,
                )
            }
            None => None,
        };

        if remainder.is_empty() {
            return Err(VersionError::Empty);
        }

        let (upstream, revision) = match remainder.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, Some(revision.to_string())),
            None => (remainder, None),
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            revision,
        })
    }

    /// Epoch, assuming `0` when absent.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.upstream_version)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_fragment(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                compare_fragment(
                    self.revision.as_deref().unwrap_or(""),
                    other.revision.as_deref().unwrap_or(""),
                )
            })
    }
}

/// Sort weight of a single character in the non-digit phase.
///
/// `~` sorts before the end of the string, letters sort before everything
/// else that is not a digit.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// Compare an upstream or revision fragment.
fn compare_fragment(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);
    let is_digit = |s: &[u8], k: usize| s.get(k).is_some_and(u8::is_ascii_digit);

    while i < a.len() || j < b.len() {
        // Non-digit prefixes, character by character.
        while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        // Digit runs: longer run wins, otherwise the first differing digit.
        let mut first_diff = Ordering::Equal;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a = PackageVersion::parse(a)?;
    let b = PackageVersion::parse(b)?;
    Ok(a.cmp(&b))
}

/// Remove a leading `epoch:` prefix.
pub fn strip_epoch(version: &str) -> &str {
    match version.split_once(':') {
        Some((_, rest)) => rest,
        None => version,
    }
}

/// Version without epoch and without distro revision.
///
/// Truncates at the first hyphen after the epoch has been removed.
pub fn upstream_of(version: &str) -> &str {
    let v = strip_epoch(version);
    match v.find('-') {
        Some(pos) => &v[..pos],
        None => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strictly increasing reference list.
    const SORTED: &[&str] = &[
        "0.9",
        "1.0~alpha",
        "1.0~beta1~svn1245",
        "1.0~beta1",
        "1.0",
        "1.0-1",
        "1.0-1ubuntu1",
        "1.0-2",
        "1.0a",
        "1.0+dfsg-1",
        "1.0.1",
        "1.2",
        "1.10",
        "2.0",
        "2.0.0.1",
        "10",
        "1:0.1",
        "1:1.4.3-2ubuntu1",
        "2:0.0",
    ];

    #[test]
    fn test_parse() {
        let v = PackageVersion::parse("1:4.7.0+dfsg1-2").unwrap();
        assert_eq!(v.epoch_assumed(), 1);
        assert_eq!(v.upstream_version(), "4.7.0+dfsg1");
        assert_eq!(v.revision(), Some("2"));

        let v = PackageVersion::parse("0.18.0+dfsg-2+b1").unwrap();
        assert_eq!(v.upstream_version(), "0.18.0+dfsg");
        assert_eq!(v.revision(), Some("2+b1"));

        let v = PackageVersion::parse("3.3.2.final~github").unwrap();
        assert_eq!(v.epoch_assumed(), 0);
        assert_eq!(v.revision(), None);
    }

    #[test]
    fn test_format_roundtrip() {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~github", "0.18.0+dfsg-2+b1"] {
            assert_eq!(PackageVersion::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_malformed() {
        assert_eq!(PackageVersion::parse(""), Err(VersionError::Empty));
        assert_eq!(PackageVersion::parse("1:"), Err(VersionError::Empty));
        assert!(matches!(
            PackageVersion::parse("a:1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse(":1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0 beta"),
            Err(VersionError::IllegalWhitespace(_))
        ));
        assert!(compare_versions("x:1", "1.0").is_err());
    }

    #[test]
    fn test_compare_fragment() {
        assert_eq!(compare_fragment("1.0~beta1~svn1245", "1.0~beta1"), Ordering::Less);
        assert_eq!(compare_fragment("1.0~beta1", "1.0"), Ordering::Less);
        assert_eq!(compare_fragment("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_fragment("1.001", "1.1"), Ordering::Equal);
        assert_eq!(compare_fragment("1.0a", "1.0+"), Ordering::Less);
        assert_eq!(compare_fragment("", "0"), Ordering::Equal);
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(compare_versions("1:0.1", "9.9").unwrap(), Ordering::Greater);
        assert_eq!(compare_versions("0:1.0", "1.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_sorted_reference_list() {
        for (i, a) in SORTED.iter().enumerate() {
            for (j, b) in SORTED.iter().enumerate() {
                let expected = i.cmp(&j);
                let forward = compare_versions(a, b).unwrap();
                let backward = compare_versions(b, a).unwrap();
                assert_eq!(forward, expected, "{} vs {}", a, b);
                assert_eq!(forward, backward.reverse(), "antisymmetry {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_sort_is_stable_against_shuffle() {
        let mut shuffled: Vec<PackageVersion> = SORTED
            .iter()
            .rev()
            .map(|s| PackageVersion::parse(s).unwrap())
            .collect();
        shuffled.swap(0, 7);
        shuffled.swap(3, 11);
        shuffled.sort();
        let rendered: Vec<String> = shuffled.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, SORTED);
    }

    #[test]
    fn test_strip_epoch_and_upstream() {
        assert_eq!(upstream_of("2:1.4.3-2ubuntu1"), "1.4.3");
        assert_eq!(upstream_of("1.0"), "1.0");
        assert_eq!(upstream_of("3.38.1-1.fc38"), "3.38.1");
        assert_eq!(strip_epoch("1:1.0"), "1.0");
        assert_eq!(strip_epoch("1.0-1"), "1.0-1");
    }
}
