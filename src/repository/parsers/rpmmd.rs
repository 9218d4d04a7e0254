// src/repository/parsers/rpmmd.rs

//! RPM-MD repository metadata parser
//!
//! Parses Fedora/openSUSE-style repomd.xml and primary.xml files which
//! contain RPM package metadata in XML format. The protocol has two phases:
//! repomd.xml names the primary file and its digest, and the primary file is
//! only parsed once it matches that digest.
//!
//! Unlike the Debian index, primary.xml is parsed strictly: a package node
//! missing a required field fails the whole parse.

use super::{PackageRecord, patterns};
use crate::error::{Error, Result};
use crate::repository::checksum::{Checksum, HashAlgorithm};
use crate::repository::MetadataSource;
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

/// Location of repomd.xml below the repository root
pub const REPOMD_PATH: &str = "repodata/repomd.xml";

/// A `<data>` entry of repomd.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMdEntry {
    /// `location@href`, relative to the repository root
    pub location: String,
    /// Declared digest of the file as stored
    pub checksum: Checksum,
}

/// What repomd.xml tells us about the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMdIndex {
    pub primary: RepoMdEntry,
    pub filelists: Option<RepoMdEntry>,
}

/// RPM-MD parser for one release
pub struct RpmMdParser {
    /// Release tag stamped on every record (e.g., "38", "opensuse-factory")
    release: String,
}

/// Partially read `<data>` element
#[derive(Default)]
struct DataBuilder {
    data_type: String,
    location: Option<String>,
    checksum_type: Option<String>,
    checksum: Option<String>,
}

impl DataBuilder {
    fn build(self) -> Result<RepoMdEntry> {
        let location = self.location.ok_or_else(|| {
            Error::RepoMetadata(format!("{} entry has no location", self.data_type))
        })?;
        let (Some(checksum_type), Some(value)) = (self.checksum_type, self.checksum) else {
            return Err(Error::RepoMetadata(format!(
                "{} entry has no checksum",
                self.data_type
            )));
        };
        let algorithm = HashAlgorithm::from_name(&checksum_type)?;

        Ok(RepoMdEntry {
            location,
            checksum: Checksum::new(algorithm, &value),
        })
    }
}

/// Fetch an attribute value by name
fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

impl RpmMdParser {
    pub fn new(release: String) -> Self {
        Self { release }
    }

    /// Phase one: parse repomd.xml
    pub fn parse_repomd(&self, data: &[u8]) -> Result<RepoMdIndex> {
        let mut reader = Reader::from_reader(data);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut saw_root = false;
        let mut current: Option<DataBuilder> = None;
        let mut in_checksum = false;
        let mut primary = None;
        let mut filelists = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"repomd" => saw_root = true,
                    b"data" if saw_root => {
                        current = Some(DataBuilder {
                            data_type: attribute(&e, b"type").unwrap_or_default(),
                            ..Default::default()
                        });
                    }
                    b"checksum" => {
                        if let Some(ref mut data) = current {
                            data.checksum_type = attribute(&e, b"type");
                            in_checksum = true;
                        }
                    }
                    b"location" => {
                        if let Some(ref mut data) = current {
                            data.location = attribute(&e, b"href");
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"repomd" => saw_root = true,
                    b"location" => {
                        if let Some(ref mut data) = current {
                            data.location = attribute(&e, b"href");
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) if in_checksum => {
                    if let Some(ref mut data) = current {
                        let text = e.unescape().map_err(|e| {
                            Error::RepoMetadata(format!("Failed to parse repomd.xml: {}", e))
                        })?;
                        data.checksum = Some(text.to_string());
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"checksum" => in_checksum = false,
                    b"data" => {
                        if let Some(data) = current.take() {
                            match data.data_type.as_str() {
                                "primary" => primary = Some(data.build()?),
                                "filelists" => match data.build() {
                                    Ok(entry) => filelists = Some(entry),
                                    Err(e) => warn!("Ignoring filelists entry: {}", e),
                                },
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::RepoMetadata(format!(
                        "Failed to parse repomd.xml: {}",
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(Error::RepoMetadata(
                "repomd.xml has no <repomd> root element".to_string(),
            ));
        }
        let primary = primary.ok_or_else(|| {
            Error::RepoMetadata("Could not find primary data location in repomd.xml".to_string())
        })?;

        debug!("repomd.xml: primary at {} ({})", primary.location, primary.checksum);
        Ok(RepoMdIndex { primary, filelists })
    }

    /// Phase two: verify and parse the compressed primary file.
    ///
    /// `location` is the href from repomd.xml; its suffix selects the
    /// decompressor. The digest is checked over the bytes as stored.
    pub fn parse_primary(
        &self,
        compressed: &[u8],
        location: &str,
        expected: &Checksum,
    ) -> Result<Vec<PackageRecord>> {
        expected.verify_bytes(compressed, Path::new(location))?;
        let xml = decompress(compressed, location)?;
        debug!("Decompressed {}: {} bytes", location, xml.len());
        self.parse_primary_xml(&xml)
    }

    /// Parse decompressed primary.xml
    fn parse_primary_xml(&self, xml: &[u8]) -> Result<Vec<PackageRecord>> {
        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut packages = Vec::new();
        let mut buf = Vec::new();

        // Current package being built
        let mut current_package: Option<PackageBuilder> = None;
        let mut current_tag = Vec::new();
        let mut in_format = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    current_tag = e.local_name().as_ref().to_vec();
                    match current_tag.as_slice() {
                        b"package" => current_package = Some(PackageBuilder::default()),
                        b"format" => {
                            in_format = true;
                            if let Some(ref mut pkg) = current_package {
                                pkg.has_format = true;
                            }
                        }
                        b"version" => {
                            if let Some(ref mut pkg) = current_package {
                                pkg.read_version(&e);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"version" if !in_format => {
                        if let Some(ref mut pkg) = current_package {
                            pkg.read_version(&e);
                        }
                    }
                    b"format" => {
                        if let Some(ref mut pkg) = current_package {
                            pkg.has_format = true;
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if let Some(ref mut pkg) = current_package {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::RpmMd(format!("Failed to parse primary.xml: {}", e)))?
                            .to_string();
                        match (current_tag.as_slice(), in_format) {
                            (b"name", false) => pkg.name = Some(text),
                            (b"arch", false) => pkg.arch = Some(text),
                            (b"sourcerpm", true) => pkg.sourcerpm = Some(text),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    current_tag.clear();
                    match e.local_name().as_ref() {
                        b"package" => {
                            if let Some(builder) = current_package.take() {
                                packages.push(builder.build(&self.release)?);
                            }
                        }
                        b"format" => in_format = false,
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::RpmMd(format!("Failed to parse primary.xml: {}", e)));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(packages)
    }

    /// Run both phases against a metadata source.
    ///
    /// A primary (or filelists) file that fails verification is discarded
    /// from the source before the error is returned.
    pub fn fetch_and_parse(&self, source: &dyn MetadataSource) -> Result<Vec<PackageRecord>> {
        info!("Syncing RPM-MD repository {}", source.origin());

        let repomd_path = source.fetch(REPOMD_PATH, None)?;
        if !repomd_path.is_file() {
            return Err(Error::RepoMetadata(format!(
                "{} in {} does not exist",
                REPOMD_PATH,
                source.origin()
            )));
        }
        let index = self.parse_repomd(&fs::read(&repomd_path)?)?;

        // Filelists are verified but never parsed
        if let Some(filelists) = &index.filelists {
            let path = source.fetch(&filelists.location, Some(&filelists.checksum))?;
            let data = read_existing(&path, &filelists.location, source)?;
            if let Err(e) = filelists
                .checksum
                .verify_bytes(&data, Path::new(&filelists.location))
            {
                source.discard(&filelists.location)?;
                return Err(e);
            }
        }

        let primary = &index.primary;
        let path = source.fetch(&primary.location, Some(&primary.checksum))?;
        let data = read_existing(&path, &primary.location, source)?;
        let packages = match self.parse_primary(&data, &primary.location, &primary.checksum) {
            Ok(packages) => packages,
            Err(e) => {
                if matches!(e, Error::ChecksumMismatch { .. }) {
                    source.discard(&primary.location)?;
                }
                return Err(e);
            }
        };

        info!(
            "Parsed {} packages from {}",
            packages.len(),
            source.origin()
        );
        Ok(packages)
    }
}

fn read_existing(path: &Path, location: &str, source: &dyn MetadataSource) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::RpmMd(format!(
            "{} in {} does not exist",
            location,
            source.origin()
        )));
    }
    Ok(fs::read(path)?)
}

/// Decompress by file suffix (zstd, xz, gzip, or plain)
fn decompress(data: &[u8], location: &str) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    if location.ends_with(".zst") {
        decompressed = zstd::decode_all(data)
            .map_err(|e| Error::RpmMd(format!("Failed to decompress {}: {}", location, e)))?;
    } else if location.ends_with(".xz") {
        XzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::RpmMd(format!("Failed to decompress {}: {}", location, e)))?;
    } else if location.ends_with(".gz") {
        GzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::RpmMd(format!("Failed to decompress {}: {}", location, e)))?;
    } else {
        decompressed = data.to_vec();
    }
    Ok(decompressed)
}

/// Builder for constructing PackageRecord from XML parsing
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    arch: Option<String>,
    has_version: bool,
    ver: Option<String>,
    rel: Option<String>,
    has_format: bool,
    sourcerpm: Option<String>,
}

impl PackageBuilder {
    fn read_version(&mut self, e: &BytesStart) {
        self.has_version = true;
        self.ver = attribute(e, b"ver");
        self.rel = attribute(e, b"rel");
    }

    fn build(self, release: &str) -> Result<PackageRecord> {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::RpmMd("No name found for package".to_string()))?;

        let arch = self
            .arch
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::RpmMd(format!("No arch found for package {}", name)))?;

        if !self.has_format {
            return Err(Error::RpmMd(format!("No <format> tag for {}", name)));
        }

        let source = self.sourcerpm.as_deref().and_then(|srpm| {
            patterns()
                .source_rpm
                .captures(srpm)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        });
        if source.is_none() && arch != "src" {
            return Err(Error::RpmMd(format!("No source package for {}", name)));
        }

        if !self.has_version {
            return Err(Error::RpmMd(format!("No <version> tag for {}", name)));
        }
        let ver = self.ver.filter(|v| !v.is_empty()).ok_or_else(|| {
            Error::RpmMd(format!("No upstream version found in <version> tag for {}", name))
        })?;
        let rel = self.rel.filter(|r| !r.is_empty()).ok_or_else(|| {
            Error::RpmMd(format!("No release found in <version> tag for {}", name))
        })?;

        let version = format!("{}-{}", ver, rel);
        let component = source.clone().unwrap_or_else(|| name.clone());

        Ok(PackageRecord::new(name, version, ver, release.to_string(), component)?
            .with_source_package(source)
            .with_architecture(Some(arch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{HttpClient, MetadataFetcher, Resource};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use sha2::{Digest, Sha256};
    use std::io::Write;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1681234567</revision>
  <data type="primary">
    <checksum type="sha">0123456789abcdef0123456789abcdef01234567</checksum>
    <open-checksum type="sha256">ffff</open-checksum>
    <location href="repodata/abc-primary.xml.gz"/>
    <size>1234</size>
  </data>
  <data type="filelists">
    <checksum type="sha256">AABB</checksum>
    <location href="repodata/def-filelists.xml.gz"/>
  </data>
</repomd>
"#;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>gedit</name>
  <arch>x86_64</arch>
  <version epoch="2" ver="44.2" rel="1.fc38"/>
  <checksum type="sha256" pkgid="YES">abc</checksum>
  <summary>Text editor for the GNOME desktop</summary>
  <format>
    <rpm:license>GPL-2.0-or-later</rpm:license>
    <rpm:sourcerpm>gedit-44.2-1.fc38.src.rpm</rpm:sourcerpm>
    <rpm:provides>
      <rpm:entry name="gedit" flags="EQ" epoch="2" ver="44.2" rel="1.fc38"/>
    </rpm:provides>
  </format>
</package>
<package type="rpm">
  <name>gedit</name>
  <arch>src</arch>
  <version epoch="2" ver="44.2" rel="1.fc38"/>
  <format>
    <rpm:sourcerpm/>
  </format>
</package>
</metadata>
"#;

    fn parser() -> RpmMdParser {
        RpmMdParser::new("38".to_string())
    }

    fn gzip(data: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn sha256(data: &[u8]) -> Checksum {
        Checksum::new(HashAlgorithm::Sha256, &format!("{:x}", Sha256::digest(data)))
    }

    #[test]
    fn test_parse_repomd() {
        let index = parser().parse_repomd(REPOMD.as_bytes()).unwrap();
        assert_eq!(index.primary.location, "repodata/abc-primary.xml.gz");
        assert_eq!(index.primary.checksum.algorithm, HashAlgorithm::Sha1);
        assert_eq!(
            index.primary.checksum.value,
            "0123456789abcdef0123456789abcdef01234567"
        );

        let filelists = index.filelists.unwrap();
        assert_eq!(filelists.location, "repodata/def-filelists.xml.gz");
        assert_eq!(filelists.checksum.value, "aabb");
    }

    #[test]
    fn test_repomd_without_root_or_primary() {
        assert!(matches!(
            parser().parse_repomd(b"<metadata/>"),
            Err(Error::RepoMetadata(_))
        ));

        let no_primary = r#"<repomd><data type="other"><checksum type="sha256">aa</checksum><location href="x"/></data></repomd>"#;
        assert!(matches!(
            parser().parse_repomd(no_primary.as_bytes()),
            Err(Error::RepoMetadata(_))
        ));

        let no_checksum = r#"<repomd><data type="primary"><location href="x"/></data></repomd>"#;
        assert!(matches!(
            parser().parse_repomd(no_checksum.as_bytes()),
            Err(Error::RepoMetadata(_))
        ));
    }

    #[test]
    fn test_parse_primary() {
        let compressed = gzip(PRIMARY);
        let records = parser()
            .parse_primary(&compressed, "repodata/abc-primary.xml.gz", &sha256(&compressed))
            .unwrap();

        assert_eq!(records.len(), 2);
        let binary = &records[0];
        assert_eq!(binary.name, "gedit");
        assert_eq!(binary.version, "44.2-1.fc38");
        assert_eq!(binary.upstream_version, "44.2");
        assert_eq!(binary.source_package.as_deref(), Some("gedit"));
        assert_eq!(binary.architecture.as_deref(), Some("x86_64"));
        assert_eq!(binary.release, "38");

        let source = &records[1];
        assert_eq!(source.architecture.as_deref(), Some("src"));
        assert!(source.source_package.is_none());
    }

    #[test]
    fn test_primary_checksum_mismatch() {
        let compressed = gzip(PRIMARY);
        let mut corrupted = compressed.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        let result = parser().parse_primary(
            &corrupted,
            "repodata/abc-primary.xml.gz",
            &sha256(&compressed),
        );
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_missing_required_fields_fail_whole_parse() {
        let cases = [
            (
                "<metadata><package><arch>x86_64</arch><version ver=\"1\" rel=\"1\"/><format><rpm:sourcerpm>a-1-1.src.rpm</rpm:sourcerpm></format></package></metadata>",
                "No name",
            ),
            (
                "<metadata><package><name>a</name><version ver=\"1\" rel=\"1\"/><format><rpm:sourcerpm>a-1-1.src.rpm</rpm:sourcerpm></format></package></metadata>",
                "No arch",
            ),
            (
                "<metadata><package><name>a</name><arch>noarch</arch><version ver=\"1\" rel=\"1\"/></package></metadata>",
                "No <format>",
            ),
            (
                "<metadata><package><name>a</name><arch>noarch</arch><version ver=\"1\" rel=\"1\"/><format><rpm:sourcerpm>garbage</rpm:sourcerpm></format></package></metadata>",
                "No source package",
            ),
            (
                "<metadata><package><name>a</name><arch>noarch</arch><format><rpm:sourcerpm>a-1-1.src.rpm</rpm:sourcerpm></format></package></metadata>",
                "No <version>",
            ),
            (
                "<metadata><package><name>a</name><arch>noarch</arch><version rel=\"1\"/><format><rpm:sourcerpm>a-1-1.src.rpm</rpm:sourcerpm></format></package></metadata>",
                "No upstream version",
            ),
        ];

        for (xml, expected) in cases {
            match parser().parse_primary_xml(xml.as_bytes()) {
                Err(Error::RpmMd(msg)) => assert!(msg.contains(expected), "{}: {}", expected, msg),
                other => panic!("expected RpmMd error for {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_decompress_variants() {
        let plain = PRIMARY.as_bytes();
        assert_eq!(decompress(plain, "primary.xml").unwrap(), plain);
        assert_eq!(decompress(&gzip(PRIMARY), "primary.xml.gz").unwrap(), plain);

        let zst = zstd::encode_all(plain, 0).unwrap();
        assert_eq!(decompress(&zst, "primary.xml.zst").unwrap(), plain);

        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(plain).unwrap();
        let xz = encoder.finish().unwrap();
        assert_eq!(decompress(&xz, "primary.xml.xz").unwrap(), plain);

        assert!(decompress(b"junk", "primary.xml.gz").is_err());
    }

    /// Lay out a repository with primary and filelists; returns its root
    fn write_repo(dir: &std::path::Path, filelists_digest_of: &[u8]) -> std::path::PathBuf {
        let repodata = dir.join("repodata");
        fs::create_dir_all(&repodata).unwrap();
        let primary = gzip(PRIMARY);
        fs::write(repodata.join("primary.xml.gz"), &primary).unwrap();
        fs::write(repodata.join("filelists.xml.gz"), gzip("<filelists/>")).unwrap();

        let repomd = format!(
            "<repomd><data type=\"primary\"><checksum type=\"sha256\">{}</checksum><location href=\"repodata/primary.xml.gz\"/></data><data type=\"filelists\"><checksum type=\"sha256\">{}</checksum><location href=\"repodata/filelists.xml.gz\"/></data></repomd>",
            sha256(&primary).value,
            sha256(filelists_digest_of).value
        );
        fs::write(repodata.join("repomd.xml"), repomd).unwrap();
        dir.to_path_buf()
    }

    fn fetcher(root: std::path::PathBuf, cache: &std::path::Path) -> MetadataFetcher {
        MetadataFetcher::new(
            Resource::Local(root),
            cache.join("38"),
            HttpClient::new().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_fetch_and_parse_verifies_filelists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let root = write_repo(dir.path(), &gzip("<filelists/>"));

        let records = parser().fetch_and_parse(&fetcher(root, cache.path())).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_corrupted_filelists_fail_the_release() {
        let dir = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let root = write_repo(dir.path(), b"something else");

        let result = parser().fetch_and_parse(&fetcher(root, cache.path()));
        match result {
            Err(Error::ChecksumMismatch { path, .. }) => {
                assert!(path.ends_with("filelists.xml.gz"))
            }
            other => panic!("expected a checksum mismatch, got {:?}", other),
        }
    }
}
