//! Release discovery.
//!
//! Lists tags from the upstream tag registry page by page, keeps the ones
//! shaped like a release (`go1`, `go1.21`), drops the denylist and orders
//! the rest newest first.

use regex::Regex;
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("tag registry request failed for {url}: {message}")]
    Http { url: String, message: String },

    #[error("malformed tag registry response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid release pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid version requirement '{value}': {source}")]
    InvalidRequirement {
        value: String,
        #[source]
        source: semver::Error,
    },
}

/// One object of the registry's tag listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub commit: TagCommit,
}

/// Commit reference of a tag. Only its presence is required.
#[derive(Debug, Clone, Deserialize)]
pub struct TagCommit {
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub url: String,
}

/// A release tag such as `go1.21`.
///
/// Equality is by tag; ordering is by release recency.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseId {
    tag: String,
    major: u64,
    minor: Option<u64>,
}

impl ReleaseId {
    /// Parse `tag` against a release pattern whose first two capture groups
    /// are the major and (optional) minor numbers.
    pub fn parse(tag: &str, pattern: &Regex) -> Option<Self> {
        let caps = pattern.captures(tag)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = match caps.get(2) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some(Self {
            tag: tag.to_string(),
            major,
            minor,
        })
    }

    /// The tag as published, e.g. `go1.21`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The tag without its leading non-numeric prefix, e.g. `1.21`.
    ///
    /// Used for denylist matching and as the output directory name.
    pub fn number(&self) -> &str {
        self.tag.trim_start_matches(|c: char| !c.is_ascii_digit())
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> Option<u64> {
        self.minor
    }

    /// `major.minor.0`, for requirement matching.
    pub fn to_semver(&self) -> Version {
        Version::new(self.major, self.minor.unwrap_or(0), 0)
    }
}

impl Ord for ReleaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor)
            .cmp(&(other.major, other.minor))
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for ReleaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// Filtering applied to the raw tag names.
#[derive(Debug, Clone)]
pub struct ReleaseFilter {
    pattern: Regex,
    denylist: Vec<String>,
    requirement: Option<VersionReq>,
}

impl ReleaseFilter {
    pub fn new(
        pattern: &str,
        denylist: &[String],
        requirement: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let compiled = Regex::new(pattern).map_err(|source| CatalogError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let requirement = requirement
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| {
                VersionReq::parse(r).map_err(|source| CatalogError::InvalidRequirement {
                    value: r.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            pattern: compiled,
            denylist: denylist.to_vec(),
            requirement,
        })
    }

    /// Parse and check one tag name. `None` means the tag is not retained.
    pub fn accept(&self, name: &str) -> Option<ReleaseId> {
        let release = ReleaseId::parse(name, &self.pattern)?;
        if self.denylist.iter().any(|d| d == release.number()) {
            debug!(tag = name, "denylisted release skipped");
            return None;
        }
        if let Some(req) = &self.requirement {
            if !req.matches(&release.to_semver()) {
                return None;
            }
        }
        Some(release)
    }

    /// Retained releases, deduplicated and sorted newest first.
    pub fn retain<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<ReleaseId> {
        let unique: BTreeSet<ReleaseId> = names.into_iter().filter_map(|n| self.accept(n)).collect();
        unique.into_iter().rev().collect()
    }
}

/// A paginated source of tag entries.
pub trait TagSource {
    /// Fetch one page (1-based). An empty page ends the listing.
    fn fetch_page(&self, page: u32) -> Result<Vec<TagEntry>, CatalogError>;
}

/// The tag registry over HTTP.
#[derive(Clone, Debug)]
pub struct HttpTagSource {
    agent: ureq::Agent,
    endpoint: String,
    per_page: u32,
    token: Option<String>,
}

impl HttpTagSource {
    pub fn new(endpoint: impl Into<String>, per_page: u32, token: Option<String>) -> Self {
        Self {
            agent: ureq::Agent::new(),
            endpoint: endpoint.into(),
            per_page,
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl TagSource for HttpTagSource {
    fn fetch_page(&self, page: u32) -> Result<Vec<TagEntry>, CatalogError> {
        let url = format!(
            "{}?per_page={}&page={}",
            self.endpoint, self.per_page, page
        );

        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", concat!("fjson-gen/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let response = request.call().map_err(|e| CatalogError::Http {
            url: url.clone(),
            message: e.to_string(),
        })?;
        response
            .into_json::<Vec<TagEntry>>()
            .map_err(|source| CatalogError::Decode { url, source })
    }
}

/// Page through `source` until an empty page and return the retained releases.
pub fn list_releases(
    source: &dyn TagSource,
    filter: &ReleaseFilter,
) -> Result<Vec<ReleaseId>, CatalogError> {
    let mut names = Vec::new();
    for page in 1.. {
        let entries = source.fetch_page(page)?;
        if entries.is_empty() {
            break;
        }
        debug!(page, tags = entries.len(), "fetched tag page");
        names.extend(entries.into_iter().map(|e| e.name));
    }

    let releases = filter.retain(names.iter().map(String::as_str));
    info!(tags = names.len(), releases = releases.len(), "listed releases");
    Ok(releases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const PATTERN: &str = r"^go([0-9]+)(?:\.([0-9]+))?$";

    fn filter(denylist: &[&str], req: Option<&str>) -> ReleaseFilter {
        let denylist: Vec<String> = denylist.iter().map(|s| s.to_string()).collect();
        ReleaseFilter::new(PATTERN, &denylist, req).unwrap()
    }

    fn tags(releases: &[ReleaseId]) -> Vec<&str> {
        releases.iter().map(ReleaseId::tag).collect()
    }

    struct FixturePages {
        pages: Vec<Vec<&'static str>>,
        requested: RefCell<Vec<u32>>,
    }

    impl TagSource for FixturePages {
        fn fetch_page(&self, page: u32) -> Result<Vec<TagEntry>, CatalogError> {
            self.requested.borrow_mut().push(page);
            let names = self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(names
                .into_iter()
                .map(|name| TagEntry {
                    name: name.to_string(),
                    commit: TagCommit {
                        sha: "0".repeat(40),
                        url: String::new(),
                    },
                })
                .collect())
        }
    }

    #[test]
    fn pattern_and_denylist() {
        let retained = filter(&["1", "1.2"], None).retain(["go1", "go1.2", "go1.21", "go2.0beta1"]);
        assert_eq!(tags(&retained), vec!["go1.21"]);
    }

    #[test]
    fn patch_releases_and_prereleases_dropped() {
        let retained = filter(&[], None).retain(["go1.21.3", "go1.22rc1", "weekly.2011-01-01", "go1.22"]);
        assert_eq!(tags(&retained), vec!["go1.22"]);
    }

    #[test]
    fn ordered_newest_first_and_deduplicated() {
        let retained = filter(&[], None).retain(["go1.9", "go1.21", "go1", "go1.10", "go1.21"]);
        assert_eq!(tags(&retained), vec!["go1.21", "go1.10", "go1.9", "go1"]);
    }

    #[test]
    fn version_requirement_limits_range() {
        let retained = filter(&[], Some(">=1.16, <1.20")).retain(["go1.15", "go1.16", "go1.19", "go1.20"]);
        assert_eq!(tags(&retained), vec!["go1.19", "go1.16"]);
    }

    #[test]
    fn invalid_pattern_and_requirement_rejected() {
        assert!(matches!(
            ReleaseFilter::new("(", &[], None),
            Err(CatalogError::InvalidPattern { .. })
        ));
        assert!(matches!(
            ReleaseFilter::new(PATTERN, &[], Some(">=bad")),
            Err(CatalogError::InvalidRequirement { .. })
        ));
    }

    #[test]
    fn number_strips_prefix() {
        let release = ReleaseId::parse("go1.21", &Regex::new(PATTERN).unwrap()).unwrap();
        assert_eq!(release.number(), "1.21");
        assert_eq!(release.major(), 1);
        assert_eq!(release.minor(), Some(21));
        assert_eq!(release.to_semver(), Version::new(1, 21, 0));
    }

    #[test]
    fn go1_orders_before_go1_0() {
        let re = Regex::new(PATTERN).unwrap();
        let go1 = ReleaseId::parse("go1", &re).unwrap();
        let go1_0 = ReleaseId::parse("go1.0", &re).unwrap();
        assert!(go1 < go1_0);
    }

    #[test]
    fn paginates_until_empty_page() {
        let source = FixturePages {
            pages: vec![vec!["go1.22", "go1.22rc1"], vec!["go1.21", "go1.4"]],
            requested: RefCell::new(Vec::new()),
        };
        let releases = list_releases(&source, &filter(&["1.4"], None)).unwrap();

        assert_eq!(tags(&releases), vec!["go1.22", "go1.21"]);
        assert_eq!(*source.requested.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn tag_payload_requires_commit() {
        let ok: Vec<TagEntry> = serde_json::from_str(
            r#"[{"name":"go1.21","commit":{"sha":"abc","url":"https://example.invalid"},"node_id":"x"}]"#,
        )
        .unwrap();
        assert_eq!(ok[0].name, "go1.21");

        let missing: Result<Vec<TagEntry>, _> = serde_json::from_str(r#"[{"name":"go1.21"}]"#);
        assert!(missing.is_err());
    }
}
