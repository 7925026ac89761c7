//! Frontmatter documents in the store

use super::FrontMatterDoc;
use crate::concurrency::bounded;
use crate::error::SyncError;
use crate::index::ContentIndex;
use crate::store::DocumentStore;
use crate::types::{hash_from_frontmatter_id, Document, DATA_ATTACHMENT, FRONTMATTER_PREFIX};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Counts of a frontmatter insertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Documents created by the bulk write
    pub inserted: usize,
    /// Back-references appended to documents that already existed
    pub merged: usize,
}

/// Create the frontmatter documents of `content_docs`.
///
/// Bodies are fetched with at most `concurrency` requests in flight. Content
/// sharing a hash collapses into one document naming every source. Documents
/// that already exist are merged by appending their back-references.
pub async fn insert_front_matter_docs(
    store: &dyn DocumentStore,
    content_docs: &[Document],
    concurrency: usize,
) -> Result<InsertOutcome, SyncError> {
    let fetched = bounded(content_docs, concurrency, |doc| async move {
        let hash = doc.item.as_ref().and_then(|item| item.hash);
        let Some(hash) = hash else {
            warn!(doc_id = %doc.id, "Content document without hash");
            return None;
        };
        match store.get_attachment(&doc.id, DATA_ATTACHMENT).await {
            Ok(attachment) => Some((hash, doc.id.clone(), attachment.text())),
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "Failed to fetch content body");
                None
            }
        }
    })
    .await;

    let mut by_hash: BTreeMap<i64, (String, Vec<String>)> = BTreeMap::new();
    for (hash, doc_id, body) in fetched.into_iter().flatten() {
        by_hash
            .entry(hash)
            .or_insert_with(|| (body, Vec::new()))
            .1
            .push(doc_id);
    }
    if by_hash.is_empty() {
        return Ok(InsertOutcome::default());
    }

    let docs: Vec<FrontMatterDoc> = by_hash
        .into_iter()
        .map(|(hash, (body, doc_ids))| FrontMatterDoc::from_body(hash, &body, doc_ids))
        .collect();
    info!(count = docs.len(), "Inserting frontmatter documents");

    let results = store
        .bulk_docs(docs.iter().map(FrontMatterDoc::to_value).collect())
        .await?;
    let inserted = results.iter().filter(|result| result.is_ok()).count();
    let failures: Vec<_> = results.iter().filter(|result| !result.is_ok()).collect();
    if failures.is_empty() {
        return Ok(InsertOutcome {
            inserted,
            merged: 0,
        });
    }

    let summarize = |failures: &[&crate::types::BulkResult]| {
        failures
            .iter()
            .map(|result| {
                format!(
                    "{} - {}",
                    result.error.as_deref().unwrap_or("unknown"),
                    result.reason.as_deref().unwrap_or("unknown")
                )
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let (conflicts, others): (Vec<_>, Vec<_>) =
        failures.into_iter().partition(|result| result.is_conflict());
    if conflicts.is_empty() {
        return Err(SyncError::FrontMatterInsert(summarize(&others)));
    }
    if !others.is_empty() {
        warn!(errors = %summarize(&others), "Frontmatter insertion partially failed");
    }

    let conflicted: BTreeSet<&str> = conflicts.iter().map(|result| result.id.as_str()).collect();
    let to_merge: Vec<FrontMatterDoc> = docs
        .into_iter()
        .filter(|doc| conflicted.contains(doc.id.as_str()))
        .collect();
    let merged = append_front_matter_attachments(store, &to_merge).await?;
    Ok(InsertOutcome { inserted, merged })
}

/// Append the back-references of `docs` to their existing counterparts.
///
/// Attachments of one document are put one after the other, each with the
/// revision returned by the previous put. Returns the number of puts.
pub async fn append_front_matter_attachments(
    store: &dyn DocumentStore,
    docs: &[FrontMatterDoc],
) -> Result<usize, SyncError> {
    if docs.is_empty() {
        return Ok(0);
    }
    let keys: Vec<String> = docs.iter().map(|doc| doc.id.clone()).collect();
    let revisions = store.revisions(&keys).await?;

    let mut calls = 0;
    for (doc, rev) in docs.iter().zip(revisions) {
        let Some(mut rev) = rev else {
            warn!(doc_id = %doc.id, "Conflicted frontmatter document disappeared");
            continue;
        };
        for content_id in doc.attachments.keys() {
            rev = store
                .put_attachment(&doc.id, &rev, content_id, Vec::new(), "application/octet-stream")
                .await?;
            calls += 1;
        }
        debug!(doc_id = %doc.id, rev = %rev, "Merged frontmatter back-references");
    }
    Ok(calls)
}

/// Create or extend the frontmatter document of a single content document.
pub async fn upsert_front_matter(
    store: &dyn DocumentStore,
    content_doc_id: &str,
    hash: i64,
    body: &str,
) -> Result<FrontMatterDoc, SyncError> {
    let doc = FrontMatterDoc::from_body(hash, body, [content_doc_id.to_string()]);
    match store.post_document(doc.to_value()).await {
        Ok(_) => Ok(doc),
        Err(e) if e.is_conflict() => {
            append_front_matter_attachments(store, std::slice::from_ref(&doc)).await?;
            Ok(doc)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load every frontmatter document, keeping those whose hash is indexed.
///
/// The rest are deleted in one bulk request.
pub async fn process_front_matters(
    store: &dyn DocumentStore,
    index: &ContentIndex,
) -> Result<Vec<FrontMatterDoc>, SyncError> {
    let mut kept = Vec::new();
    let mut stale = Vec::new();
    for value in store.docs_with_prefix(FRONTMATTER_PREFIX).await? {
        let id = value.get("_id").and_then(Value::as_str).unwrap_or_default();
        let live = hash_from_frontmatter_id(id)
            .map(|hash| index.contains_hash(hash))
            .unwrap_or(false);
        if !live {
            stale.push(tombstone(&value));
            continue;
        }
        match serde_json::from_value::<FrontMatterDoc>(value.clone()) {
            Ok(doc) => kept.push(doc),
            Err(e) => warn!(doc_id = %id, error = %e, "Unreadable frontmatter document"),
        }
    }

    if !stale.is_empty() {
        info!(count = stale.len(), "Deleting stale frontmatter documents");
        delete_values(store, stale).await?;
    }
    Ok(kept)
}

/// Delete frontmatter documents in one bulk request.
pub async fn delete_front_matter_docs(
    store: &dyn DocumentStore,
    docs: &[FrontMatterDoc],
) -> Result<usize, SyncError> {
    let tombstones: Vec<Value> = docs
        .iter()
        .filter(|doc| doc.rev.is_some())
        .map(|doc| json!({ "_id": doc.id, "_rev": doc.rev, "_deleted": true }))
        .collect();
    if tombstones.is_empty() {
        return Ok(0);
    }
    delete_values(store, tombstones).await
}

fn tombstone(doc: &Value) -> Value {
    json!({
        "_id": doc.get("_id").cloned().unwrap_or(Value::Null),
        "_rev": doc.get("_rev").cloned().unwrap_or(Value::Null),
        "_deleted": true,
    })
}

async fn delete_values(store: &dyn DocumentStore, tombstones: Vec<Value>) -> Result<usize, SyncError> {
    let results = store.bulk_docs(tombstones).await?;
    let mut deleted = 0;
    for result in results {
        if result.is_ok() {
            deleted += 1;
        } else {
            warn!(
                doc_id = %result.id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Failed to delete frontmatter document"
            );
        }
    }
    Ok(deleted)
}
