//! Synchronization engine
//!
//! [`bootstrap`] builds the content index and tree from the store, repairs
//! the frontmatter side-index and reconciles the content directory.
//! [`ChangeConsumer`] keeps the result current from the change feed.

pub mod changes;

pub use changes::{ChangeConsumer, EventOutcome, PendingRetry};

use crate::concurrency::bounded;
use crate::config::{SitePaths, SyncConfig, SyncSettings};
use crate::error::{SyncError, TreeError};
use crate::frontmatter::{
    delete_front_matter_docs, insert_front_matter_docs, process_front_matters, FrontMatterDoc,
};
use crate::index::ContentIndex;
use crate::path::StackEditPath;
use crate::reconcile::{ChecksumVerifier, FileSynchronizer};
use crate::store::DocumentStore;
use crate::tree::TreeModel;
use crate::types::DATA_ATTACHMENT;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Map function of the frontmatter view, as stored in the design document.
pub const FRONTMATTER_MAP: &str = r#"function (doc) {
  if (doc.item.type === 'content') {
    emit([doc._id, 0], doc.item);
    emit([doc._id, 1], {
      _id: 'frontmatter.' + doc.item.hash,
    });
  }
}"#;

/// Shared dependencies of the engine, built once at startup
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn DocumentStore>,
    pub verifier: Arc<dyn ChecksumVerifier>,
    pub site: SitePaths,
    pub settings: SyncSettings,
    pub design_document: String,
    pub view: String,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn ChecksumVerifier>,
        site: SitePaths,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            site,
            settings: config.sync.clone(),
            design_document: config.couch.design_document.clone(),
            view: config.couch.view.clone(),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

/// In-memory model produced by a bootstrap pass
#[derive(Debug, Default)]
pub struct SyncState {
    pub index: ContentIndex,
    pub tree: TreeModel,
    pub frontmatter: Vec<FrontMatterDoc>,
}

/// Counts of one bootstrap pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub missing_frontmatter: usize,
    pub frontmatter_inserted: usize,
    pub frontmatter_merged: usize,
    pub stale_frontmatter: usize,
    pub invalid: usize,
    pub deleted: usize,
    pub downloaded: usize,
}

/// Expected body of the design document, without `_rev`.
pub fn expected_design_document(ddoc: &str, view: &str) -> Value {
    json!({
        "_id": format!("_design/{}", ddoc),
        "language": "javascript",
        "views": {
            view: { "map": FRONTMATTER_MAP },
        },
    })
}

/// Fail unless the design document holds exactly the expected view.
pub async fn assert_design_document(
    store: &dyn DocumentStore,
    ddoc: &str,
    view: &str,
) -> Result<(), SyncError> {
    let mut found = store.design_document(ddoc).await?;
    if let Some(object) = found.as_object_mut() {
        object.remove("_rev");
    }
    let expected = expected_design_document(ddoc, view);
    if found != expected {
        return Err(SyncError::ViewMismatch {
            ddoc: ddoc.to_string(),
            expected,
            found,
        });
    }
    debug!(ddoc, view, "Design document matches");
    Ok(())
}

/// Build the model from the store and bring the content directory in line.
pub async fn bootstrap(ctx: &SyncContext) -> Result<(SyncState, BootstrapReport), SyncError> {
    let store = ctx.store();
    let concurrency = ctx.settings.io_concurrency;
    let mut report = BootstrapReport::default();

    let (rows, structure) = tokio::try_join!(
        store.view_rows(&ctx.design_document, &ctx.view),
        store.find_structure()
    )?;

    let mut index = ContentIndex::from_rows(rows)?;

    let items = structure.iter().filter_map(|doc| doc.item.clone());
    let mut tree = TreeModel::build(items, ctx.settings.orphans)?;
    for doc in &structure {
        if let Some(item) = &doc.item {
            if tree.contains(&item.id) {
                tree.assign_doc_id(&doc.id, &item.id);
            }
        }
    }
    tree.assign_attributes(&index);

    // Only content of files on the tree gets frontmatter.
    let (missing, offtree): (Vec<_>, Vec<_>) =
        index.take_missing_frontmatter().into_iter().partition(|doc| {
            doc.item
                .as_ref()
                .map(|item| tree.contains(item.file_id()))
                .unwrap_or(false)
        });
    report.missing_frontmatter = missing.len();
    info!(
        hashes = index.hash_count(),
        etags = index.etag_count(),
        missing_frontmatter = missing.len(),
        skipped = offtree.len(),
        "Built content index"
    );
    if !missing.is_empty() {
        let outcome = insert_front_matter_docs(store, &missing, concurrency).await?;
        report.frontmatter_inserted = outcome.inserted;
        report.frontmatter_merged = outcome.merged;
    }

    let mut frontmatter = Vec::new();
    let mut stale = Vec::new();
    for doc in process_front_matters(store, &index).await? {
        match tree.append_frontmatter_note(&doc) {
            Ok(_) => frontmatter.push(doc),
            Err(TreeError::StaleFrontmatter { hash, content_ids }) => {
                debug!(hash, ?content_ids, "Frontmatter without a live file");
                stale.push(doc);
            }
            Err(e) => return Err(e.into()),
        }
    }
    if !stale.is_empty() {
        report.stale_frontmatter = delete_front_matter_docs(store, &stale).await?;
    }

    let mut synchronizer = FileSynchronizer::scan(&ctx.site.content_dir, tree.stackedit_paths());
    report.invalid = synchronizer
        .process_invalid_checksums(ctx.verifier.as_ref())
        .await?;
    synchronizer.calculate();
    report.deleted = synchronizer.prune(concurrency).await;
    synchronizer.write_hugo_config(&ctx.site).await?;
    report.downloaded = download_markdowns(
        store,
        &synchronizer.download_candidates(),
        &ctx.site.content_dir,
        concurrency,
    )
    .await;

    info!(?report, "Bootstrap complete");
    Ok((
        SyncState {
            index,
            tree,
            frontmatter,
        },
        report,
    ))
}

/// Fetch and write the bodies of `paths`; returns how many were written.
///
/// A body whose etag moved on since the tree was built is written under the
/// path of the etag actually received.
pub async fn download_markdowns(
    store: &dyn DocumentStore,
    paths: &[&StackEditPath],
    root: &Path,
    concurrency: usize,
) -> usize {
    let results = bounded(paths, concurrency, |&path| async move {
        let Some(content_id) = path.content_id.as_deref() else {
            warn!(names = ?path.names, "No content document for file");
            return false;
        };
        let attachment = match store.get_attachment(content_id, DATA_ATTACHMENT).await {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(content_id, error = %e, "Failed to download body");
                return false;
            }
        };
        let target = if attachment.etag == path.etag() {
            path.clone()
        } else {
            debug!(content_id, expected = path.etag(), found = %attachment.etag, "Etag moved");
            match StackEditPath::new(
                path.names.clone(),
                attachment.etag.clone(),
                path.content_id.clone(),
            ) {
                Ok(moved) => moved,
                Err(e) => {
                    warn!(content_id, error = %e, "Unusable etag");
                    return false;
                }
            }
        };
        match target.write_markdown(root, &attachment.body).await {
            Ok(written) => {
                debug!(path = %written.display(), "Downloaded");
                true
            }
            Err(e) => {
                warn!(content_id, error = %e, "Failed to write body");
                false
            }
        }
    })
    .await;
    results.into_iter().filter(|written| *written).count()
}
