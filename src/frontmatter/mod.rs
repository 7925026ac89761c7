//! Frontmatter Subsystem
//!
//! Keeps one `frontmatter.<hash>` document per distinct content hash. The
//! document holds the parsed header fields and names every content document
//! with that hash through an empty attachment.

pub mod parser;
pub mod sync;

pub use parser::{parse, FrontMatter, FrontMatterError};
pub use sync::{
    append_front_matter_attachments, delete_front_matter_docs, insert_front_matter_docs,
    process_front_matters, upsert_front_matter, InsertOutcome,
};

use crate::types::frontmatter_id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Side-index document for one content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatterDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub hash: i64,
    #[serde(rename = "hasFrontMatter", default)]
    pub has_front_matter: bool,
    #[serde(rename = "frontMatterError", default, skip_serializing_if = "Option::is_none")]
    pub front_matter_error: Option<FrontMatterError>,
    /// Back-references keyed by content document id
    #[serde(rename = "_attachments", default)]
    pub attachments: BTreeMap<String, Value>,
    /// Header fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

const RESERVED_FIELDS: &[&str] = &["hash", "hasFrontMatter", "frontMatterError"];

impl FrontMatterDoc {
    /// Parse `body` and build the document for `hash`, referencing `doc_ids`.
    pub fn from_body<I>(hash: i64, body: &str, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let attachments = doc_ids
            .into_iter()
            .map(|id| (id, back_reference()))
            .collect();
        let mut doc = Self {
            id: frontmatter_id(hash),
            rev: None,
            hash,
            has_front_matter: false,
            front_matter_error: None,
            attachments,
            fields: Map::new(),
        };

        match parse(body) {
            FrontMatter::Absent => {}
            FrontMatter::Parsed(fields) => {
                doc.has_front_matter = true;
                for (key, value) in fields {
                    if key.starts_with('_') || RESERVED_FIELDS.contains(&key.as_str()) {
                        warn!(hash, key = %key, "Skipping reserved frontmatter key");
                        continue;
                    }
                    doc.fields.insert(key, value);
                }
            }
            FrontMatter::Malformed(error) => {
                warn!(
                    hash,
                    line = error.line,
                    column = error.column,
                    detail = %error.detail,
                    "Malformed frontmatter"
                );
                doc.front_matter_error = Some(error);
            }
        }
        doc
    }

    /// Ids of the content documents referencing this document.
    pub fn content_ids(&self) -> Vec<String> {
        self.attachments.keys().cloned().collect()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Inline attachment standing for one back-reference
fn back_reference() -> Value {
    json!({
        "content_type": "application/octet-stream",
        "data": "",
    })
}
