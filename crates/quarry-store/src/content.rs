//! Local filesystem content storage
//!
//! Accepts two reference shapes:
//!
//! - `file:///absolute/path`, which must lie under the root
//! - a bare relative key (`cases/42/statement.pdf`), resolved under the root
//!
//! Anything else (`http://`, `s3://`, `data:`, absolute keys, `..` segments,
//! `file://` paths outside the root) is rejected before touching the filesystem.
//! Symlinks inside the root are followed.

use async_trait::async_trait;
use quarry_domain::traits::ContentStorage;
use quarry_domain::StorageError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const FILE_SCHEME: &str = "file://";

/// Content storage backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalContentStorage {
    root: PathBuf,
}

impl LocalContentStorage {
    /// Create storage rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a content reference to a filesystem path, or reject it
    pub fn resolve(&self, content_ref: &str) -> Result<PathBuf, StorageError> {
        let reject = |reason: &str| StorageError::Rejected {
            reference: content_ref.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = content_ref.trim();
        if trimmed.is_empty() {
            return Err(reject("empty reference"));
        }

        if let Some(rest) = trimmed.strip_prefix(FILE_SCHEME) {
            let path = Path::new(rest);
            if !path.is_absolute() {
                return Err(reject("file:// references must be absolute"));
            }
            if has_parent_segment(path) {
                return Err(reject("path traversal is not allowed"));
            }
            let root = std::path::absolute(&self.root)
                .map_err(|e| reject(&format!("storage root cannot be resolved: {}", e)))?;
            if !path.starts_with(&root) {
                return Err(reject("outside the storage root"));
            }
            return Ok(path.to_path_buf());
        }

        if has_scheme(trimmed) {
            return Err(reject("scheme not allowed"));
        }

        let key = Path::new(trimmed);
        if key.is_absolute() || trimmed.starts_with('\\') {
            return Err(reject("absolute keys are not allowed"));
        }
        if has_parent_segment(key) {
            return Err(reject("path traversal is not allowed"));
        }

        Ok(self.root.join(key))
    }
}

/// `scheme:` prefix as in RFC 3986 (letter, then letters, digits, `+`, `-`, `.`)
fn has_scheme(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn has_parent_segment(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

#[async_trait]
impl ContentStorage for LocalContentStorage {
    async fn get_bytes(&self, content_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(content_ref)?;
        debug!(path = %path.display(), "Reading document content");

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(content_ref.to_string()),
            _ => StorageError::Io(format!("{}: {}", path.display(), e)),
        })
    }
}
