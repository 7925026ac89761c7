//! Filesystem Reconciler
//!
//! Compares the generated Markdown files on disk with the paths the tree
//! requires, then deletes what is no longer wanted and reports what must be
//! downloaded. Files whose body no longer matches the digest in their name
//! are treated as absent.

pub mod checksum;
pub mod mounts;

pub use checksum::{ChecksumVerifier, GzipMd5Verifier};
pub use mounts::{write_hugo_config, Mount};

use crate::concurrency::bounded;
use crate::config::SitePaths;
use crate::error::SyncError;
use crate::path::{StackEditPath, GENERATED_SUFFIX};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files to delete and files to download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub delete: BTreeSet<PathBuf>,
    pub download: BTreeSet<PathBuf>,
}

/// Set algebra of one reconciliation.
///
/// `delete = local - required` and `download = required - local`; an invalid
/// path joins `download` when required and `delete` otherwise.
pub fn plan(
    local: &BTreeSet<PathBuf>,
    required: &BTreeSet<PathBuf>,
    invalid: &[PathBuf],
) -> ReconcilePlan {
    let mut delete: BTreeSet<PathBuf> = local.difference(required).cloned().collect();
    let mut download: BTreeSet<PathBuf> = required.difference(local).cloned().collect();
    for path in invalid {
        if required.contains(path) {
            download.insert(path.clone());
        } else {
            delete.insert(path.clone());
        }
    }
    ReconcilePlan { delete, download }
}

/// Generated Markdown files under `root`
pub fn scan_generated(root: &Path) -> BTreeSet<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(GENERATED_SUFFIX))
        .map(|entry| entry.into_path())
        .collect()
}

/// One reconciliation pass over a content directory
pub struct FileSynchronizer {
    required: Vec<StackEditPath>,
    by_path: BTreeMap<PathBuf, usize>,
    local: BTreeSet<PathBuf>,
    invalid: Vec<PathBuf>,
    plan: ReconcilePlan,
}

impl FileSynchronizer {
    /// Scan `root` and index the required paths.
    pub fn scan(root: &Path, required: Vec<StackEditPath>) -> Self {
        let by_path = required
            .iter()
            .enumerate()
            .map(|(position, path)| (path.markdown_path(root), position))
            .collect();
        let local = scan_generated(root);
        debug!(root = %root.display(), local = local.len(), "Scanned generated files");
        Self {
            required,
            by_path,
            local,
            invalid: Vec::new(),
            plan: ReconcilePlan::default(),
        }
    }

    pub fn local(&self) -> &BTreeSet<PathBuf> {
        &self.local
    }

    /// Ask `verifier` which local files fail their checksum.
    pub async fn process_invalid_checksums(
        &mut self,
        verifier: &dyn ChecksumVerifier,
    ) -> Result<usize, SyncError> {
        if self.local.is_empty() {
            return Ok(0);
        }
        let files: Vec<PathBuf> = self.local.iter().cloned().collect();
        self.invalid = verifier.invalid_paths(&files).await?;
        if !self.invalid.is_empty() {
            info!(count = self.invalid.len(), "Files failing their checksum");
        }
        Ok(self.invalid.len())
    }

    /// Compute the delete and download sets.
    pub fn calculate(&mut self) -> &ReconcilePlan {
        let required: BTreeSet<PathBuf> = self.by_path.keys().cloned().collect();
        self.plan = plan(&self.local, &required, &self.invalid);
        info!(
            local = self.local.len(),
            required = required.len(),
            invalid = self.invalid.len(),
            delete = self.plan.delete.len(),
            download = self.plan.download.len(),
            "Reconciliation"
        );
        &self.plan
    }

    /// Delete every delete candidate; returns how many were removed.
    pub async fn prune(&self, concurrency: usize) -> usize {
        let results = bounded(&self.plan.delete, concurrency, |path| async move {
            match tokio::fs::remove_file(path).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete");
                    false
                }
            }
        })
        .await;
        results.into_iter().filter(|removed| *removed).count()
    }

    /// Paths to fetch, in path order.
    pub fn download_candidates(&self) -> Vec<&StackEditPath> {
        self.plan
            .download
            .iter()
            .filter_map(|path| self.by_path.get(path))
            .map(|&position| &self.required[position])
            .collect()
    }

    /// Write the Hugo mount mapping for the required paths.
    pub async fn write_hugo_config(&self, site: &SitePaths) -> Result<PathBuf, SyncError> {
        write_hugo_config(&self.required, site).await
    }
}
