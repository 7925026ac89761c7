//! Content-addressed Markdown paths
//!
//! A [`StackEditPath`] turns a file's ancestry and its attachment etag into
//! `<root>/<n1>/.../<nN>.<hexDigest>.generated.md`. Two revisions of the same
//! file never share a path, so the previous revision becomes a pruning
//! candidate instead of being overwritten.

use crate::error::SyncError;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix of every generated Markdown file.
pub const GENERATED_SUFFIX: &str = ".generated.md";

/// Derived location of one file's current body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEditPath {
    pub names: Vec<String>,
    etag: String,
    digest: String,
    pub content_id: Option<String>,
}

impl StackEditPath {
    /// Create a path; the etag must be base64 and every name a single
    /// path component.
    pub fn new(
        names: Vec<String>,
        etag: impl Into<String>,
        content_id: Option<String>,
    ) -> Result<Self, SyncError> {
        if let Some(name) = names.iter().find(|name| !is_safe_name(name)) {
            return Err(SyncError::UnsafeName { name: name.clone() });
        }
        let etag = etag.into();
        let digest = digest_from_etag(&etag)?;
        Ok(Self {
            names,
            etag,
            digest,
            content_id,
        })
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Hex form of the etag.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Full path of the generated Markdown file under `root`.
    pub fn markdown_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        let names: Vec<&str> = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .collect();
        let Some((last, parents)) = names.split_last() else {
            return path.join(format!("{}{}", self.digest, GENERATED_SUFFIX));
        };
        for name in parents {
            path.push(name);
        }
        path.push(format!("{}.{}{}", strip_markdown_suffix(last), self.digest, GENERATED_SUFFIX));
        path
    }

    /// Generated files next to this one with the same stem and another digest.
    pub fn sibling_paths(&self, root: &Path) -> Vec<PathBuf> {
        let target = self.markdown_path(root);
        let Some(dir) = target.parent() else {
            return Vec::new();
        };
        let Some(file_name) = target.file_name().and_then(|name| name.to_str()) else {
            return Vec::new();
        };
        let stem = file_name
            .strip_suffix(&format!(".{}{}", self.digest, GENERATED_SUFFIX))
            .unwrap_or(file_name);

        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                name != file_name
                    && name
                        .strip_prefix(stem)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .and_then(digest_from_generated_rest)
                        .is_some()
            })
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Delete generated siblings left behind by earlier revisions.
    pub async fn prune_siblings(&self, root: &Path) -> usize {
        let mut removed = 0;
        for sibling in self.sibling_paths(root) {
            match tokio::fs::remove_file(&sibling).await {
                Ok(()) => {
                    debug!(path = %sibling.display(), "Pruned stale revision");
                    removed += 1;
                }
                Err(e) => warn!(path = %sibling.display(), error = %e, "Failed to prune"),
            }
        }
        removed
    }

    /// Write `body` to the generated path, creating parent directories.
    pub async fn write_markdown(&self, root: &Path, body: &[u8]) -> Result<PathBuf, SyncError> {
        let path = self.markdown_path(root);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SyncError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| SyncError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Hex encoding of a base64 etag.
pub fn digest_from_etag(etag: &str) -> Result<String, SyncError> {
    base64::engine::general_purpose::STANDARD
        .decode(etag.trim_matches('"'))
        .map(hex::encode)
        .map_err(|e| SyncError::InvalidEtag {
            etag: etag.to_string(),
            reason: e.to_string(),
        })
}

/// Digest encoded in a generated file name (`<stem>.<hex>.generated.md`).
pub fn digest_from_file_name(file_name: &str) -> Option<&str> {
    let without = file_name.strip_suffix(GENERATED_SUFFIX)?;
    let (_, digest) = without.rsplit_once('.')?;
    is_hex(digest).then_some(digest)
}

fn digest_from_generated_rest(rest: &str) -> Option<&str> {
    let digest = rest.strip_suffix(GENERATED_SUFFIX)?;
    is_hex(digest).then_some(digest)
}

fn strip_markdown_suffix(name: &str) -> &str {
    if let Some(stem) = name.strip_suffix(GENERATED_SUFFIX) {
        return match stem.rsplit_once('.') {
            Some((base, digest)) if is_hex(digest) => base,
            _ => stem,
        };
    }
    name.strip_suffix(".md").unwrap_or(name)
}

/// A name must not climb out of or split across directories.
fn is_safe_name(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}
