use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Rewrites are planned as a list of edits against the original text and
/// applied in one pass, so planning never mutates the syntax tree it reads.
/// A zero-width span is an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to put at [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find at the span before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}: found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("overlapping edits at bytes {first_end} and {second_start}")]
    Overlap {
        first_end: usize,
        second_start: usize,
    },

    #[error("edit boundary at byte {0} is not a UTF-8 character boundary")]
    NotCharBoundary(usize),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Edit {
    /// Replace `[byte_start, byte_end)` of `source` with `new_text`.
    ///
    /// The current text of the span becomes the expected before-text.
    pub fn replace(
        source: &str,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
    ) -> Self {
        let before = source.get(byte_start..byte_end).unwrap_or_default();
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(before),
        }
    }

    /// Insert `new_text` at `offset`.
    pub fn insert(offset: usize, new_text: impl Into<String>) -> Self {
        Self {
            byte_start: offset,
            byte_end: offset,
            new_text: new_text.into(),
            expected_before: EditVerification::ExactMatch(String::new()),
        }
    }

    /// Whether this edit only adds text.
    pub fn is_insertion(&self) -> bool {
        self.byte_start == self.byte_end
    }

    fn validate(&self, source: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > source.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: source.len(),
            });
        }
        for offset in [self.byte_start, self.byte_end] {
            if !source.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary(offset));
            }
        }

        let current = &source[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(())
    }
}

/// Apply a batch of edits to `source`, returning the new text.
///
/// Edits are validated against the original text, sorted by position and
/// spliced front to back. Insertions at the same offset keep their relative
/// order. Overlapping replacements are rejected.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, EditError> {
    for edit in edits {
        edit.validate(source)?;
    }

    let mut ordered: Vec<&Edit> = edits.iter().collect();
    // Stable: same-offset insertions stay in planning order.
    ordered.sort_by_key(|e| (e.byte_start, e.byte_end));

    for pair in ordered.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if first.byte_end > second.byte_start {
            return Err(EditError::Overlap {
                first_end: first.byte_end,
                second_start: second.byte_start,
            });
        }
    }

    let added: usize = edits.iter().map(|e| e.new_text.len()).sum();
    let mut out = String::with_capacity(source.len() + added);
    let mut cursor = 0;
    for edit in ordered {
        out.push_str(&source[cursor..edit.byte_start]);
        out.push_str(&edit.new_text);
        cursor = edit.byte_end;
    }
    out.push_str(&source[cursor..]);

    Ok(out)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
