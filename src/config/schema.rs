use crate::archive::PathFilter;
use crate::format::Formatter;
use crate::patch::{CallPattern, ImportRewrite, RewriteRule};
use regex::Regex;
use semver::VersionReq;
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_TAGS_URL: &str = "https://api.github.com/repos/golang/go/tags";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_RELEASE_PATTERN: &str = r"^go([0-9]+)(?:\.([0-9]+))?$";
pub const DEFAULT_DENYLIST: [&str; 4] = ["1", "1.1", "1.2", "1.3"];
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_ARCHIVE_URL: &str = "https://go.dev/dl/{version}.src.tar.gz";

/// Everything one generation run needs. Every field has a default, so an
/// empty file is a complete configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct GenConfig {
    pub catalog: CatalogConfig,
    pub archive: ArchiveConfig,
    pub output: OutputConfig,
    pub format: FormatConfig,
    pub patches: Vec<CallPatchConfig>,
    pub imports: Vec<ImportPatchConfig>,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            archive: ArchiveConfig::default(),
            output: OutputConfig::default(),
            format: FormatConfig::default(),
            patches: default_patches(),
            imports: default_imports(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub tags_url: String,
    pub per_page: u32,
    /// First capture group is the major number, second the optional minor
    pub release_pattern: String,
    /// Compared against the tag with its prefix removed (`1.2`, not `go1.2`)
    pub denylist: Vec<String>,
    /// Env var holding the registry bearer token
    pub token_env: String,
    pub version_req: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            tags_url: DEFAULT_TAGS_URL.to_string(),
            per_page: DEFAULT_PER_PAGE,
            release_pattern: DEFAULT_RELEASE_PATTERN.to_string(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            version_req: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// URL with a `{version}` placeholder for the release tag
    pub url_template: String,
    pub filters: Vec<PathFilter>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_ARCHIVE_URL.to_string(),
            filters: vec![
                PathFilter::new("go/src/encoding/json/"),
                PathFilter::with_strip("go/src/internal/testenv/", "go/src/"),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Parent of the per-release directories
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub enabled: bool,
    pub command: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec!["gofmt".to_string()],
        }
    }
}

impl FormatConfig {
    pub fn formatter(&self) -> Formatter {
        if self.enabled {
            Formatter::from_command(self.command.iter().cloned())
        } else {
            Formatter::disabled()
        }
    }
}

/// A call rewrite applied to one file of each release.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CallPatchConfig {
    /// Path relative to the release directory
    pub file: String,
    #[serde(default)]
    pub pattern: CallPattern,
    #[serde(default)]
    pub rule: RewriteRule,
}

/// Import path substitutions applied to one file of each release.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ImportPatchConfig {
    pub file: String,
    pub rewrites: Vec<ImportRewrite>,
}

fn default_patches() -> Vec<CallPatchConfig> {
    vec![CallPatchConfig {
        file: "encode.go".to_string(),
        pattern: CallPattern::default(),
        rule: RewriteRule::default(),
    }]
}

fn default_imports() -> Vec<ImportPatchConfig> {
    vec![ImportPatchConfig {
        file: "bench_test.go".to_string(),
        rewrites: vec![ImportRewrite::new("internal/testenv", "testenv")],
    }]
}

impl GenConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let catalog = &self.catalog;
        if catalog.tags_url.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "catalog",
                field: "tags_url",
            });
        }
        if catalog.per_page == 0 || catalog.per_page > 100 {
            issues.push(ValidationIssue::Invalid {
                section: "catalog",
                message: format!("per_page must be between 1 and 100, got {}", catalog.per_page),
            });
        }
        match Regex::new(&catalog.release_pattern) {
            Ok(re) if re.captures_len() < 3 => issues.push(ValidationIssue::Invalid {
                section: "catalog",
                message: "release_pattern needs capture groups for major and minor".to_string(),
            }),
            Ok(_) => {}
            Err(e) => issues.push(ValidationIssue::Invalid {
                section: "catalog",
                message: format!("release_pattern does not compile: {e}"),
            }),
        }
        if let Some(req) = catalog.version_req.as_deref().filter(|r| !r.trim().is_empty()) {
            if let Err(e) = VersionReq::parse(req.trim()) {
                issues.push(ValidationIssue::Invalid {
                    section: "catalog",
                    message: format!("version_req '{req}' is invalid: {e}"),
                });
            }
        }

        let archive = &self.archive;
        if !archive.url_template.contains("{version}") {
            issues.push(ValidationIssue::Invalid {
                section: "archive",
                message: "url_template must contain {version}".to_string(),
            });
        }
        if archive.filters.is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "archive",
                field: "filters",
            });
        }
        for filter in &archive.filters {
            if filter.prefix.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    section: "archive.filters",
                    field: "prefix",
                });
            } else if !filter.prefix.starts_with(filter.strip()) {
                issues.push(ValidationIssue::Invalid {
                    section: "archive.filters",
                    message: format!(
                        "strip '{}' is not a prefix of '{}'",
                        filter.strip(),
                        filter.prefix
                    ),
                });
            }
        }

        if self.format.enabled && self.format.command.is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "format",
                field: "command",
            });
        }

        for patch in &self.patches {
            check_relative_file("patches", &patch.file, &mut issues);
            for (field, value) in [
                ("pattern.method", &patch.pattern.method),
                ("pattern.receiver_type", &patch.pattern.receiver_type),
                ("rule.replacement_method", &patch.rule.replacement_method),
                ("rule.describe_method", &patch.rule.describe_method),
            ] {
                if !is_go_identifier(value) {
                    issues.push(ValidationIssue::Invalid {
                        section: "patches",
                        message: format!("{field} '{value}' is not a Go identifier"),
                    });
                }
            }
        }

        for import in &self.imports {
            check_relative_file("imports", &import.file, &mut issues);
            if import.rewrites.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    section: "imports",
                    field: "rewrites",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn check_relative_file(section: &'static str, file: &str, issues: &mut Vec<ValidationIssue>) {
    if file.trim().is_empty() {
        issues.push(ValidationIssue::MissingField {
            section,
            field: "file",
        });
        return;
    }
    let plain = Path::new(file)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        issues.push(ValidationIssue::Invalid {
            section,
            message: format!("file '{file}' must be relative to the release directory"),
        });
    }
}

fn is_go_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    Invalid {
        section: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { section, field } => {
                write!(f, "[{section}] missing required field '{field}'")
            }
            ValidationIssue::Invalid { section, message } => {
                write!(f, "[{section}] {message}")
            }
        }
    }
}
