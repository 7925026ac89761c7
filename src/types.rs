//! Core types shared by the synchronization engine.
//!
//! These mirror the JSON envelopes StackEdit writes into the document store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id prefix of the frontmatter side-index documents.
pub const FRONTMATTER_PREFIX: &str = "frontmatter.";

/// Name of the attachment carrying a content body.
pub const DATA_ATTACHMENT: &str = "data";

const CONTENT_SUFFIX: &str = "/content";

/// Kind of a StackEdit item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Folder,
    File,
    Content,
    #[serde(other)]
    Unknown,
}

impl ItemType {
    pub fn is_structural(self) -> bool {
        matches!(self, ItemType::Folder | ItemType::File)
    }
}

/// A node of the logical tree as stored by StackEdit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<i64>,
}

impl Item {
    /// Id of the file item owning this content item (`<fileId>/content`).
    pub fn file_id(&self) -> &str {
        file_id_of(&self.id)
    }
}

/// Strip the `/content` suffix of a content item id.
pub fn file_id_of(item_id: &str) -> &str {
    item_id.strip_suffix(CONTENT_SUFFIX).unwrap_or(item_id)
}

/// Frontmatter document id for a content hash.
pub fn frontmatter_id(hash: i64) -> String {
    format!("{}{}", FRONTMATTER_PREFIX, hash)
}

/// Parse the content hash back out of a frontmatter document id.
pub fn hash_from_frontmatter_id(id: &str) -> Option<i64> {
    id.strip_prefix(FRONTMATTER_PREFIX)?.parse().ok()
}

/// Attachment metadata as returned with a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentStub {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<bool>,
}

/// Storage envelope of a StackEdit item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    #[serde(rename = "_attachments", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, AttachmentStub>,
}

impl Document {
    /// Etag of the data attachment: its digest without the `md5-` prefix.
    pub fn data_etag(&self) -> Option<String> {
        let digest = self.attachments.get(DATA_ATTACHMENT)?.digest.as_deref()?;
        let etag = digest.strip_prefix("md5-").unwrap_or(digest);
        if etag.is_empty() {
            None
        } else {
            Some(etag.to_string())
        }
    }

    pub fn item_type(&self) -> Option<ItemType> {
        self.item.as_ref().map(|item| item.item_type)
    }
}

/// A body fetched from the store together with its etag.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub etag: String,
    pub body: bytes::Bytes,
}

impl Attachment {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Row of the frontmatter view, keyed `[docId, 0 | 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub id: String,
    pub key: (String, u8),
    pub value: serde_json::Value,
    #[serde(default)]
    pub doc: Option<serde_json::Value>,
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(default)]
    pub seq: serde_json::Value,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Decode the embedded document; `None` when absent or not a StackEdit envelope.
    pub fn document(&self) -> Option<Document> {
        self.doc
            .as_ref()
            .and_then(|doc| serde_json::from_value(doc.clone()).ok())
    }
}

/// Outcome of one document in a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub id: String,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.ok.unwrap_or(self.rev.is_some())
    }

    pub fn is_conflict(&self) -> bool {
        self.error.as_deref() == Some("conflict")
    }
}
