use flate2::write::GzEncoder;
use flate2::Compression;
use fjson_gen::archive::{extract, fetch_and_extract, ArchiveSource, FetchError, PathFilter};
use fjson_gen::catalog::{CatalogError, ReleaseFilter, ReleaseId, TagEntry, TagSource};
use fjson_gen::config::GenConfig;
use fjson_gen::Generator;
use std::fs;
use std::io::{Cursor, Read};
use tempfile::TempDir;

const ENCODE_GO: &str = "package json

import \"bytes\"

type encodeState struct {
\tbytes.Buffer
}

func (e *encodeState) error(err error) {
\tpanic(jsonError{err})
}

func (e *encodeState) marshal(v any) (err error) {
\tif v == nil {
\t\te.error(&UnsupportedValueError{})
\t}
\treturn nil
}
";

const BENCH_TEST_GO: &str = "package json

import (
\t\"internal/testenv\"
\t\"testing\"
)

func BenchmarkCodeEncoder(b *testing.B) {
\ttestenv.SkipIfShortAndSlow(b)
}
";

fn go_source_archive() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    builder
        .append_data(&mut dir, "go/src/encoding/json/", std::io::empty())
        .unwrap();

    for (path, data) in [
        ("go/src/encoding/json/encode.go", ENCODE_GO),
        ("go/src/encoding/json/bench_test.go", BENCH_TEST_GO),
        ("go/src/encoding/json/testdata/code.json.gz", "not really gzip"),
        ("go/src/internal/testenv/testenv.go", "package testenv\n"),
        ("go/src/encoding/xml/xml.go", "package xml\n"),
        ("go/VERSION", "go1.21\n"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

fn default_filters() -> Vec<PathFilter> {
    GenConfig::default().archive.filters
}

struct Fixture;

impl ArchiveSource for Fixture {
    fn open(&self, _release: &ReleaseId) -> Result<Box<dyn Read + Send>, FetchError> {
        Ok(Box::new(Cursor::new(go_source_archive())))
    }
}

struct NoTags;

impl TagSource for NoTags {
    fn fetch_page(&self, _page: u32) -> Result<Vec<TagEntry>, CatalogError> {
        Ok(Vec::new())
    }
}

fn go1_21() -> ReleaseId {
    let filter = ReleaseFilter::new(r"^go([0-9]+)(?:\.([0-9]+))?$", &[], None).unwrap();
    filter.accept("go1.21").unwrap()
}

#[test]
fn default_filters_lay_out_the_fork() {
    let dir = TempDir::new().unwrap();
    let archive = go_source_archive();

    let summary = extract(&archive[..], dir.path(), &default_filters()).unwrap();

    assert_eq!(summary.files, 4);
    assert_eq!(summary.skipped, 2);
    assert!(dir.path().join("encode.go").is_file());
    assert!(dir.path().join("bench_test.go").is_file());
    assert!(dir.path().join("testdata/code.json.gz").is_file());
    assert_eq!(
        fs::read_to_string(dir.path().join("internal/testenv/testenv.go")).unwrap(),
        "package testenv\n"
    );
    assert!(!dir.path().join("xml.go").exists());
    assert!(!dir.path().join("VERSION").exists());
    assert!(!dir.path().join("go").exists());
}

#[test]
fn extracted_tree_is_patched_in_place() {
    let root = TempDir::new().unwrap();
    let mut config = GenConfig::default();
    config.output.root = root.path().to_path_buf();
    config.format.enabled = false;

    let release = go1_21();
    let dest = root.path().join(release.number());
    fetch_and_extract(&Fixture, &release, &dest, &config.archive.filters).unwrap();

    let generator = Generator::new(config, Box::new(NoTags), Box::new(Fixture));
    let reports = generator.patch_dir(&dest).unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].rewritten, 1);
    assert_eq!(reports[1].rewritten, 1);

    let encode = fs::read_to_string(dest.join("encode.go")).unwrap();
    assert!(encode.contains(
        r#"e.WriteString(fmt.Sprintf("\"%s\"", (&UnsupportedValueError{}).Error()))"#
    ));
    assert!(encode.contains("panic(jsonError{err})"));

    let bench = fs::read_to_string(dest.join("bench_test.go")).unwrap();
    assert!(bench.contains("\t\"testenv\"\n"));
    assert!(!dest.join("_gosrc.tar.gz").exists());
}

#[test]
fn empty_catalog_runs_nothing() {
    let root = TempDir::new().unwrap();
    let mut config = GenConfig::default();
    config.output.root = root.path().to_path_buf();

    let summary = Generator::new(config, Box::new(NoTags), Box::new(Fixture))
        .run()
        .unwrap();

    assert_eq!(summary.total(), 0);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}
