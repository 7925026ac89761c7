//! Content Index
//!
//! Maps content hashes to file ids and file ids to the live attachment etag,
//! built from the rows of the frontmatter view.

use crate::error::SyncError;
use crate::types::{Document, Item, ItemType, ViewRow};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Content row of the view that is waiting for its sentinel row.
#[derive(Debug)]
struct PendingContent {
    doc: Document,
}

/// Content index: hash -> file id, file id -> etag
#[derive(Debug, Default)]
pub struct ContentIndex {
    id_by_hash: HashMap<i64, String>,
    hash_by_id: HashMap<String, i64>,
    etag_by_id: HashMap<String, String>,
    content_doc_by_id: HashMap<String, String>,
    missing_frontmatter: Vec<Document>,
    prev: Option<PendingContent>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from view rows in view order.
    pub fn from_rows<I>(rows: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = ViewRow>,
    {
        let mut index = Self::new();
        for row in rows {
            index.consume(row)?;
        }
        Ok(index)
    }

    /// Consume one view row.
    ///
    /// Content rows (`[docId, 0]`) record the content's etag. Sentinel rows
    /// (`[docId, 1]`) queue the preceding content document for frontmatter
    /// backfill when its frontmatter document is absent or does not list it.
    pub fn consume(&mut self, row: ViewRow) -> Result<(), SyncError> {
        let item = match row.key.1 {
            0 => serde_json::from_value::<Item>(row.value.clone()).ok(),
            _ => None,
        };

        match item {
            Some(item) if item.item_type == ItemType::Content => {
                let doc: Document = match row.doc {
                    Some(doc) => serde_json::from_value(doc)?,
                    None => {
                        return Err(SyncError::MissingDigest { doc_id: row.id });
                    }
                };
                let etag = doc
                    .data_etag()
                    .ok_or_else(|| SyncError::MissingDigest { doc_id: row.id.clone() })?;
                self.update_content(&item, &etag, &row.id);
                self.prev = Some(PendingContent { doc });
            }
            _ => self.consume_sentinel(&row),
        }
        Ok(())
    }

    fn consume_sentinel(&mut self, row: &ViewRow) {
        let Some(prev) = self.prev.take() else {
            debug!(row_id = %row.id, "Sentinel row without preceding content row");
            return;
        };
        let referenced = row
            .doc
            .as_ref()
            .and_then(|doc| doc.get("_attachments"))
            .and_then(|attachments| attachments.get(&prev.doc.id))
            .is_some();
        if !referenced {
            self.missing_frontmatter.push(prev.doc);
        }
    }

    /// Record the live etag and hash of a content item.
    ///
    /// A previous hash of the same file is dropped so stale hashes never
    /// accumulate.
    pub fn update_content(&mut self, item: &Item, etag: &str, content_doc_id: &str) {
        let id = item.file_id().to_string();
        let Some(hash) = item.hash else {
            warn!(item_id = %item.id, "Content item without hash");
            self.etag_by_id.insert(id.clone(), etag.to_string());
            self.content_doc_by_id.insert(id, content_doc_id.to_string());
            return;
        };

        if let Some(old_hash) = self.hash_by_id.insert(id.clone(), hash) {
            if old_hash != hash && self.id_by_hash.get(&old_hash) == Some(&id) {
                self.id_by_hash.remove(&old_hash);
            }
        }
        self.id_by_hash.insert(hash, id.clone());
        self.etag_by_id.insert(id.clone(), etag.to_string());
        self.content_doc_by_id.insert(id, content_doc_id.to_string());
    }

    /// Drain the content documents whose frontmatter needs backfilling.
    pub fn take_missing_frontmatter(&mut self) -> Vec<Document> {
        std::mem::take(&mut self.missing_frontmatter)
    }

    pub fn missing_frontmatter_count(&self) -> usize {
        self.missing_frontmatter.len()
    }

    pub fn id_for_hash(&self, hash: i64) -> Option<&str> {
        self.id_by_hash.get(&hash).map(String::as_str)
    }

    pub fn contains_hash(&self, hash: i64) -> bool {
        self.id_by_hash.contains_key(&hash)
    }

    pub fn hash_for(&self, id: &str) -> Option<i64> {
        self.hash_by_id.get(id).copied()
    }

    pub fn etag_for(&self, id: &str) -> Option<&str> {
        self.etag_by_id.get(id).map(String::as_str)
    }

    pub fn content_doc_for(&self, id: &str) -> Option<&str> {
        self.content_doc_by_id.get(id).map(String::as_str)
    }

    /// Iterate over (file id, etag) pairs.
    pub fn etags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.etag_by_id
            .iter()
            .map(|(id, etag)| (id.as_str(), etag.as_str()))
    }

    pub fn hash_count(&self) -> usize {
        self.id_by_hash.len()
    }

    pub fn etag_count(&self) -> usize {
        self.etag_by_id.len()
    }
}
