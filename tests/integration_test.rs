// tests/integration_test.rs

//! Integration tests for cptmatch
//!
//! These tests run the whole pipeline against repositories built on the fly
//! in temporary directories.

use cptmatch::appstream::ComponentListSource;
use cptmatch::config::Config;
use cptmatch::pipeline::{Pipeline, RunOptions};
use cptmatch::repository::parsers::rpmmd::RpmMdParser;
use cptmatch::repository::{HttpClient, MetadataFetcher, MetadataFormat, Resource, probe_format};
use cptmatch::sink::{JsonLinesSink, SinkRecord};
use cptmatch::Error;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn write_apt_index(archive: &Path, suite: &str, text: &str) {
    let dir = archive.join("dists").join(suite).join("main/binary-amd64");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Packages.gz"), gzip(text)).unwrap();
}

fn primary_xml(packages: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\">\n",
    );
    for (name, ver, rel) in packages {
        xml.push_str(&format!(
            "<package type=\"rpm\"><name>{name}</name><arch>x86_64</arch><version epoch=\"0\" ver=\"{ver}\" rel=\"{rel}\"/><format><rpm:sourcerpm>{name}-{ver}-{rel}.src.rpm</rpm:sourcerpm></format></package>\n"
        ));
    }
    xml.push_str("</metadata>\n");
    xml
}

/// Write an RPM-MD repository and return the path of its primary file
fn write_rpmmd_repo(root: &Path, packages: &[(&str, &str, &str)]) -> PathBuf {
    let repodata = root.join("repodata");
    fs::create_dir_all(&repodata).unwrap();

    let primary = gzip(&primary_xml(packages));
    let primary_path = repodata.join("primary.xml.gz");
    fs::write(&primary_path, &primary).unwrap();

    let repomd = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n  <data type=\"primary\">\n    <checksum type=\"sha256\">{:x}</checksum>\n    <location href=\"repodata/primary.xml.gz\"/>\n  </data>\n</repomd>\n",
        Sha256::digest(&primary)
    );
    fs::write(repodata.join("repomd.xml"), repomd).unwrap();
    primary_path
}

fn write_components(cache: &Path, distro: &str, tag: &str, json: &str) {
    let dir = cache.join(distro).join("metadata").join(tag);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("components.json"), json).unwrap();
}

const COMPONENTS: &str = r#"[
    {"id": "org.gnome.gedit", "name": "gedit", "kind": "desktop-app", "packages": ["gedit"]},
    {"id": "org.vim.Vim", "name": "Vim", "kind": "desktop-app", "packages": ["vim", "vim-common"]},
    {"id": "org.kde.kate", "name": "Kate", "kind": "desktop-app", "packages": ["kate"]}
]"#;

struct Fixture {
    _root: TempDir,
    config: Arc<Config>,
    primary: PathBuf,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let debian = root.path().join("debian");
    let fedora = root.path().join("fedora");
    let cache = root.path().join("cache");

    write_apt_index(
        &debian,
        "a",
        "Package: gedit\nVersion: 1.0-1\n\nPackage: vim\nVersion: 2:9.0-1\n\nPackage: nover\n",
    );
    write_apt_index(
        &debian,
        "b",
        "Package: gedit\nVersion: 2.0-3\n\nPackage: gedit\nVersion: 2.0-1\n\nPackage: vim\nVersion: 2:8.2-5\n",
    );
    let primary = write_rpmmd_repo(
        &fedora.join("38"),
        &[("gedit", "44.2", "1.fc38"), ("gedit-debuginfo", "44.2", "1.fc38"), ("kate", "23.04", "2.fc38")],
    );

    write_components(&cache, "Debian", "a", COMPONENTS);
    write_components(&cache, "Fedora", "38", COMPONENTS);

    let text = format!(
        r#"
cache_dir = "{cache}"
jobs = 2

[[distribution]]
name = "Debian"
family = "apt"
archive_url = "{debian}"
package_url = "https://packages.debian.org/{{release}}/{{package}}"
releases = [{{ name = "a", version = "11" }}, {{ name = "b", version = "12" }}]

[[distribution]]
name = "Fedora"
family = "rpm"
archive_url = "{fedora}"
repo_path = "{{version}}"
package_url = "https://packages.fedoraproject.org/pkgs/{{source}}/{{package}}"
releases = [{{ name = "Thirty Eight", version = 38 }}]
"#,
        cache = cache.display(),
        debian = debian.display(),
        fedora = fedora.display(),
    );

    Fixture {
        config: Arc::new(Config::from_toml_str(&text).unwrap()),
        _root: root,
        primary,
    }
}

fn run(config: &Arc<Config>, options: RunOptions) -> (Vec<u8>, cptmatch::pipeline::RunReport) {
    let pipeline = Pipeline::new(Arc::clone(config), Box::new(ComponentListSource)).unwrap();
    let mut sink = JsonLinesSink::new(Vec::new());
    let report = pipeline.run(options, &mut sink).unwrap();
    (sink.into_inner(), report)
}

fn refresh() -> RunOptions {
    RunOptions {
        refresh: true,
        force: true,
    }
}

fn find<'a>(records: &'a [SinkRecord], distro: &str, component: &str) -> Option<&'a SinkRecord> {
    records
        .iter()
        .find(|r| r.distro == distro && r.component == component)
}

#[test]
fn test_end_to_end_selection() {
    cptmatch::init_once();
    let fixture = fixture();
    let (_, report) = run(&fixture.config, refresh());

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);

    // Release b carries the higher upstream version
    let gedit = find(&report.records, "Debian", "org.gnome.gedit").unwrap();
    assert_eq!(gedit.release, "b");
    assert_eq!(gedit.upstream_version, "2.0");
    assert_eq!(gedit.version, "2.0-3");
    assert_eq!(gedit.package_url, "https://packages.debian.org/b/gedit");

    // 9.0 beats 8.2 although both carry epoch 2
    let vim = find(&report.records, "Debian", "org.vim.Vim").unwrap();
    assert_eq!(vim.release, "a");
    assert_eq!(vim.upstream_version, "9.0");

    assert!(find(&report.records, "Debian", "org.kde.kate").is_none());

    let kate = find(&report.records, "Fedora", "org.kde.kate").unwrap();
    assert_eq!(kate.release, "38");
    assert_eq!(kate.version, "23.04-2.fc38");
    assert_eq!(
        kate.package_url,
        "https://packages.fedoraproject.org/pkgs/kate/kate"
    );

    // Distributions in configuration order, identifiers sorted within each
    let order: Vec<(&str, &str)> = report
        .records
        .iter()
        .map(|r| (r.distro.as_str(), r.component.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("Debian", "org.gnome.gedit"),
            ("Debian", "org.vim.Vim"),
            ("Fedora", "org.gnome.gedit"),
            ("Fedora", "org.kde.kate"),
        ]
    );
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let fixture = fixture();
    let (first, _) = run(&fixture.config, refresh());
    let (second, _) = run(&fixture.config, refresh());
    let (cached, _) = run(&fixture.config, RunOptions::default());

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first, cached);
}

#[test]
fn test_corrupted_primary_fails_only_that_release() {
    let fixture = fixture();
    let (_, report) = run(&fixture.config, refresh());
    assert!(find(&report.records, "Fedora", "org.kde.kate").is_some());

    let mut data = fs::read(&fixture.primary).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    fs::write(&fixture.primary, &data).unwrap();

    let (_, report) = run(&fixture.config, refresh());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].distro, "Fedora");
    assert!(report.failures[0].error.contains("Checksum mismatch"));
    assert!(!report.failures[0].retryable);

    assert!(report.records.iter().all(|r| r.distro != "Fedora"));
    assert!(find(&report.records, "Debian", "org.gnome.gedit").is_some());

    // The same through the parser directly
    let repo = fixture.primary.parent().unwrap().parent().unwrap();
    let fetcher = MetadataFetcher::new(
        Resource::resolve(&repo.display().to_string()).unwrap(),
        fixture.config.cache_dir.join("direct"),
        HttpClient::new().unwrap(),
    )
    .unwrap();
    let result = RpmMdParser::new("38".to_string()).fetch_and_parse(&fetcher);
    assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
}

#[test]
fn test_missing_catalog_without_refresh() {
    let fixture = fixture();
    let (output, report) = run(&fixture.config, RunOptions::default());

    assert!(output.is_empty());
    let failed: Vec<(&str, &str)> = report
        .failures
        .iter()
        .map(|f| (f.distro.as_str(), f.release.as_str()))
        .collect();
    assert_eq!(failed, vec![("Debian", "a"), ("Debian", "b"), ("Fedora", "38")]);
}

#[test]
fn test_probe_fixture_formats() {
    let fixture = fixture();
    let client = HttpClient::new().unwrap();
    let fedora = fixture.primary.parent().unwrap().parent().unwrap();

    let format = probe_format(&Resource::Local(fedora.to_path_buf()), &client).unwrap();
    assert_eq!(format, MetadataFormat::RpmMd);

    let empty = tempfile::tempdir().unwrap();
    let format = probe_format(&Resource::Local(empty.path().to_path_buf()), &client).unwrap();
    assert_eq!(format, MetadataFormat::Unknown);
}
