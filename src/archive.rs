//! Release archive download and filtered extraction.
//!
//! The archive is streamed to disk, then read back through gzip and tar one
//! entry at a time. Only entries under a configured prefix are written, with
//! the prefix's strip part removed from their path.

use crate::catalog::ReleaseId;
use crate::safety::{OutputGuard, SafetyError};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the downloaded archive inside the destination directory.
pub const ARCHIVE_FILE_NAME: &str = "_gosrc.tar.gz";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("archive request failed for {url}: {message}")]
    Http { url: String, message: String },

    #[error("failed to store archive at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read archive: {0}")]
    Read(#[source] io::Error),

    #[error("unsupported entry type {kind} for {path}")]
    UnsupportedEntry { path: String, kind: String },

    #[error(transparent)]
    Unsafe(#[from] SafetyError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The downloaded archive could not be removed. `primary` holds the
    /// error that happened before cleanup, if any.
    #[error("failed to remove {path}: {cleanup}{}", after_primary(.primary))]
    Cleanup {
        path: PathBuf,
        #[source]
        cleanup: io::Error,
        primary: Option<Box<ArchiveError>>,
    },
}

fn after_primary(primary: &Option<Box<ArchiveError>>) -> String {
    primary
        .as_ref()
        .map(|p| format!(" (after: {p})"))
        .unwrap_or_default()
}

/// Selects archive entries by prefix and decides their output path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathFilter {
    /// Entries whose path starts with this are kept
    pub prefix: String,
    /// Leading part removed from kept paths; defaults to `prefix`
    #[serde(default)]
    pub strip: Option<String>,
}

impl PathFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            strip: None,
        }
    }

    pub fn with_strip(prefix: impl Into<String>, strip: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            strip: Some(strip.into()),
        }
    }

    pub fn strip(&self) -> &str {
        self.strip.as_deref().unwrap_or(&self.prefix)
    }

    /// The output path for `entry`, or `None` when the filter does not apply.
    pub fn output_path<'a>(&self, entry: &'a str) -> Option<&'a str> {
        if !entry.starts_with(&self.prefix) {
            return None;
        }
        entry.strip_prefix(self.strip())
    }
}

/// Counts from one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// Extract the entries of a gzip-compressed tar stream selected by `filters`
/// into `dest`.
///
/// The first matching filter wins. Entries matching no filter are skipped;
/// selected entries that are neither directories nor regular files abort the
/// extraction.
pub fn extract<R: Read>(
    reader: R,
    dest: &Path,
    filters: &[PathFilter],
) -> Result<ExtractSummary, ExtractError> {
    fs::create_dir_all(dest).map_err(|source| ExtractError::Write {
        path: dest.to_path_buf(),
        source,
    })?;
    let guard = OutputGuard::new(dest)?;

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut summary = ExtractSummary::default();

    for entry in archive.entries().map_err(ExtractError::Read)? {
        let mut entry = entry.map_err(ExtractError::Read)?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let Some(relative) = filters.iter().find_map(|f| f.output_path(&raw)) else {
            summary.skipped += 1;
            continue;
        };
        if relative.trim_matches('/').is_empty() {
            continue;
        }
        let target = guard.entry_path(relative)?;

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target).map_err(|source| ExtractError::Write {
                path: target.clone(),
                source,
            })?;
            summary.directories += 1;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| ExtractError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let mut out = File::create(&target).map_err(|source| ExtractError::Write {
                path: target.clone(),
                source,
            })?;
            io::copy(&mut entry, &mut out).map_err(|source| ExtractError::Write {
                path: target.clone(),
                source,
            })?;
            summary.files += 1;
        } else {
            return Err(ExtractError::UnsupportedEntry {
                path: raw,
                kind: format!("{kind:?}"),
            });
        }
        debug!(entry = %raw, target = %target.display(), "extracted");
    }

    Ok(summary)
}

/// Where release archives come from.
pub trait ArchiveSource {
    /// Open the archive of `release` as a byte stream.
    fn open(&self, release: &ReleaseId) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// Archives served over HTTP from a URL template containing `{version}`.
#[derive(Clone, Debug)]
pub struct HttpArchiveSource {
    agent: ureq::Agent,
    url_template: String,
}

impl HttpArchiveSource {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new(),
            url_template: url_template.into(),
        }
    }

    pub fn url_for(&self, release: &ReleaseId) -> String {
        self.url_template.replace("{version}", release.tag())
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn open(&self, release: &ReleaseId) -> Result<Box<dyn Read + Send>, FetchError> {
        let url = self.url_for(release);
        info!(url = %url, "downloading archive");
        let response = self.agent.get(&url).call().map_err(|e| FetchError::Http {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(response.into_reader())
    }
}

/// Stream the archive of `release` into `path`. Returns the bytes written.
pub fn download(
    source: &dyn ArchiveSource,
    release: &ReleaseId,
    path: &Path,
) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = source.open(release)?;
    let mut file = File::create(path).map_err(io_err)?;
    io::copy(&mut reader, &mut file).map_err(io_err)
}

/// Download the archive of `release` into `dest`, extract it with `filters`
/// and remove the downloaded file.
///
/// The archive file is removed whether or not extraction succeeded. A
/// failed removal is reported together with the earlier error.
pub fn fetch_and_extract(
    source: &dyn ArchiveSource,
    release: &ReleaseId,
    dest: &Path,
    filters: &[PathFilter],
) -> Result<ExtractSummary, ArchiveError> {
    fs::create_dir_all(dest).map_err(|source| FetchError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    let archive_path = dest.join(ARCHIVE_FILE_NAME);

    let result = download(source, release, &archive_path)
        .map_err(ArchiveError::from)
        .and_then(|bytes| {
            debug!(bytes, "archive downloaded");
            let file = File::open(&archive_path).map_err(ExtractError::Read)?;
            Ok(extract(BufReader::new(file), dest, filters)?)
        });

    match fs::remove_file(&archive_path) {
        Ok(()) => result,
        Err(e) if e.kind() == io::ErrorKind::NotFound && result.is_err() => result,
        Err(cleanup) => {
            warn!(path = %archive_path.display(), error = %cleanup, "failed to remove archive");
            Err(ArchiveError::Cleanup {
                path: archive_path,
                cleanup,
                primary: result.err().map(Box::new),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use regex::Regex;

    fn tar_gz(entries: &[(&str, tar::EntryType, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, kind, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(*kind);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            if *kind == tar::EntryType::Symlink {
                header.set_link_name("target").unwrap();
            }
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn release(tag: &str) -> ReleaseId {
        ReleaseId::parse(tag, &Regex::new(r"^go([0-9]+)(?:\.([0-9]+))?$").unwrap()).unwrap()
    }

    struct FixtureSource(Vec<u8>);

    impl ArchiveSource for FixtureSource {
        fn open(&self, _release: &ReleaseId) -> Result<Box<dyn Read + Send>, FetchError> {
            Ok(Box::new(io::Cursor::new(self.0.clone())))
        }
    }

    struct FailingSource;

    impl ArchiveSource for FailingSource {
        fn open(&self, release: &ReleaseId) -> Result<Box<dyn Read + Send>, FetchError> {
            Err(FetchError::Http {
                url: format!("https://go.dev/dl/{release}.src.tar.gz"),
                message: "status code 404".to_string(),
            })
        }
    }

    #[test]
    fn output_path_strips() {
        let json = PathFilter::new("go/src/encoding/json/");
        assert_eq!(json.output_path("go/src/encoding/json/encode.go"), Some("encode.go"));
        assert_eq!(json.output_path("go/src/encoding/xml/read.go"), None);

        let testenv = PathFilter::with_strip("go/src/internal/testenv/", "go/src/");
        assert_eq!(
            testenv.output_path("go/src/internal/testenv/testenv.go"),
            Some("internal/testenv/testenv.go")
        );
    }

    #[test]
    fn extracts_only_filtered_entries() {
        let data = tar_gz(&[
            ("pkg/a.go", tar::EntryType::Regular, b"package a\n"),
            ("pkg/sub/b.go", tar::EntryType::Regular, b"package sub\n"),
            ("other/c.go", tar::EntryType::Regular, b"package c\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let summary = extract(&data[..], dir.path(), &[PathFilter::new("pkg/")]).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.go")).unwrap(), "package a\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("sub/b.go")).unwrap(),
            "package sub\n"
        );
        assert!(!dir.path().join("c.go").exists());
        assert!(!dir.path().join("other").exists());
    }

    #[test]
    fn directory_entries_created() {
        let data = tar_gz(&[
            ("go/src/encoding/json/", tar::EntryType::Directory, b""),
            ("go/src/encoding/json/testdata/", tar::EntryType::Directory, b""),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let summary = extract(
            &data[..],
            dir.path(),
            &[PathFilter::new("go/src/encoding/json/")],
        )
        .unwrap();

        assert_eq!(summary.directories, 1);
        assert!(dir.path().join("testdata").is_dir());
    }

    #[test]
    fn unsupported_entry_aborts() {
        let data = tar_gz(&[
            ("pkg/link.go", tar::EntryType::Symlink, b""),
            ("pkg/a.go", tar::EntryType::Regular, b"package a\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let result = extract(&data[..], dir.path(), &[PathFilter::new("pkg/")]);

        assert!(matches!(result, Err(ExtractError::UnsupportedEntry { .. })));
        assert!(!dir.path().join("a.go").exists());
    }

    #[test]
    fn unsupported_entry_outside_filters_ignored() {
        let data = tar_gz(&[
            ("other/link.go", tar::EntryType::Symlink, b""),
            ("pkg/a.go", tar::EntryType::Regular, b"package a\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let summary = extract(&data[..], dir.path(), &[PathFilter::new("pkg/")]).unwrap();
        assert_eq!(summary.files, 1);
    }

    #[test]
    fn fetch_and_extract_removes_archive() {
        let data = tar_gz(&[(
            "go/src/encoding/json/encode.go",
            tar::EntryType::Regular,
            b"package json\n",
        )]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.21");

        let summary = fetch_and_extract(
            &FixtureSource(data),
            &release("go1.21"),
            &dest,
            &[PathFilter::new("go/src/encoding/json/")],
        )
        .unwrap();

        assert_eq!(summary.files, 1);
        assert!(dest.join("encode.go").is_file());
        assert!(!dest.join(ARCHIVE_FILE_NAME).exists());
    }

    #[test]
    fn corrupt_archive_is_an_extract_error_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.21");

        let result = fetch_and_extract(
            &FixtureSource(b"not a gzip stream".to_vec()),
            &release("go1.21"),
            &dest,
            &[PathFilter::new("go/src/encoding/json/")],
        );

        assert!(matches!(result, Err(ArchiveError::Extract(_))));
        assert!(!dest.join(ARCHIVE_FILE_NAME).exists());
    }

    #[test]
    fn fetch_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetch_and_extract(
            &FailingSource,
            &release("go1.21"),
            dir.path(),
            &[PathFilter::new("go/src/encoding/json/")],
        );

        assert!(matches!(result, Err(ArchiveError::Fetch(FetchError::Http { .. }))));
    }

    #[test]
    fn failed_removal_wraps_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.21");
        // A non-empty directory in the archive's place: creating the file and
        // removing it both fail.
        let blocker = dest.join(ARCHIVE_FILE_NAME);
        fs::create_dir_all(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let err = fetch_and_extract(
            &FixtureSource(tar_gz(&[])),
            &release("go1.21"),
            &dest,
            &[PathFilter::new("go/src/encoding/json/")],
        )
        .unwrap_err();

        let ArchiveError::Cleanup {
            path,
            primary: Some(primary),
            ..
        } = &err
        else {
            panic!("expected cleanup error with primary, got {err:?}");
        };
        assert_eq!(path, &blocker);
        assert!(matches!(**primary, ArchiveError::Fetch(FetchError::Io { .. })));

        let message = err.to_string();
        assert!(message.contains("failed to remove"), "{message}");
        assert!(message.contains("failed to store archive"), "{message}");
        assert!(blocker.join("keep").is_file());
    }

    #[test]
    fn cleanup_error_keeps_primary_message() {
        let err = ArchiveError::Cleanup {
            path: PathBuf::from("1.21/_gosrc.tar.gz"),
            cleanup: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            primary: Some(Box::new(ArchiveError::Extract(ExtractError::UnsupportedEntry {
                path: "go/src/encoding/json/link".to_string(),
                kind: "Symlink".to_string(),
            }))),
        };
        let message = err.to_string();
        assert!(message.contains("permission denied"));
        assert!(message.contains("unsupported entry type Symlink"));
    }
}
