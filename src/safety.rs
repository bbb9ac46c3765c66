use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps every extracted or patched path inside one release's output
/// directory.
#[derive(Debug, Clone)]
pub struct OutputGuard {
    /// Canonical path of the output directory
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside the output directory: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("unsafe archive path: {0}")]
    UnsafeEntryPath(String),

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl OutputGuard {
    /// Create a guard for an existing directory.
    ///
    /// The root is canonicalized so symlinked parents compare correctly.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    /// Map a relative archive path onto the output directory.
    ///
    /// Only plain components are accepted; `.` is dropped, while `..`, root
    /// and drive prefixes are rejected.
    pub fn entry_path(&self, relative: &str) -> Result<PathBuf, SafetyError> {
        let mut out = self.root.clone();
        let mut depth = 0;
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    out.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SafetyError::UnsafeEntryPath(relative.to_string()));
                }
            }
        }
        if depth == 0 {
            return Err(SafetyError::UnsafeEntryPath(relative.to_string()));
        }
        Ok(out)
    }

    /// Check that an existing file resolves inside the output directory.
    ///
    /// Relative paths are resolved against the root. Returns the canonical
    /// path.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = absolute.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }

        Ok(canonical)
    }

    /// The canonical output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
