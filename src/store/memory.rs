//! In-memory document store

use super::{ChangeStream, DocumentStore};
use crate::error::StoreError;
use crate::types::{Attachment, BulkResult, ChangeEvent, Document, Item, ViewRow, DATA_ATTACHMENT};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<String, Value>,
    bodies: HashMap<(String, String), (String, Vec<u8>)>,
    changes: VecDeque<ChangeEvent>,
    bulk_errors: HashMap<String, String>,
    calls: HashMap<&'static str, usize>,
    seq: u64,
}

impl MemoryState {
    fn count(&mut self, op: &'static str) {
        *self.calls.entry(op).or_default() += 1;
    }

    fn store(&mut self, mut doc: Value) -> Result<String, StoreError> {
        let id = doc_id(&doc)?;
        let generation = self
            .docs
            .get(&id)
            .and_then(rev_of)
            .and_then(|rev| rev.split('-').next().and_then(|n| n.parse::<u64>().ok()))
            .unwrap_or(0);
        self.seq += 1;
        let rev = format!("{}-{:x}", generation + 1, self.seq);
        doc["_rev"] = json!(rev);
        self.docs.insert(id, doc);
        Ok(rev)
    }
}

/// Document store kept in memory.
///
/// Mirrors the CouchDB semantics the engine relies on: revision checks,
/// per-document bulk results and the frontmatter view layout. Every trait
/// call is counted so tests can assert on traffic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw document, replacing any existing revision.
    pub fn insert_doc(&self, doc: Value) -> Result<String, StoreError> {
        self.state.lock().store(doc)
    }

    /// Store a folder or file item under a document of the same id.
    pub fn insert_item(&self, item: &Item) -> Result<String, StoreError> {
        self.insert_doc(json!({ "_id": item.id, "item": item }))
    }

    /// Store a content document with its data attachment.
    pub fn insert_content(
        &self,
        doc_id: &str,
        item: &Item,
        etag: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        state.bodies.insert(
            (doc_id.to_string(), DATA_ATTACHMENT.to_string()),
            (etag.to_string(), body.as_bytes().to_vec()),
        );
        state.store(json!({
            "_id": doc_id,
            "item": item,
            "_attachments": {
                DATA_ATTACHMENT: {
                    "content_type": "text/plain",
                    "digest": format!("md5-{}", etag),
                    "length": body.len(),
                    "stub": true,
                }
            }
        }))
    }

    pub fn get_doc(&self, id: &str) -> Option<Value> {
        self.state.lock().docs.get(id).cloned()
    }

    pub fn remove_doc(&self, id: &str) -> Option<Value> {
        self.state.lock().docs.remove(id)
    }

    /// Queue an event for the next change subscription.
    pub fn push_change(&self, event: ChangeEvent) {
        self.state.lock().changes.push_back(event);
    }

    /// Make the next bulk write of `id` fail with `error`.
    pub fn inject_bulk_error(&self, id: &str, error: &str) {
        self.state
            .lock()
            .bulk_errors
            .insert(id.to_string(), error.to_string());
    }

    /// Number of calls made to a trait operation, by method name.
    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }
}

fn doc_id(doc: &Value) -> Result<String, StoreError> {
    doc.get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidResponse("document without _id".to_string()))
}

fn rev_of(doc: &Value) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

fn is_content(doc: &Value) -> bool {
    doc.pointer("/item/type").and_then(Value::as_str) == Some("content")
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn design_document(&self, ddoc: &str) -> Result<Value, StoreError> {
        let mut state = self.state.lock();
        state.count("design_document");
        let id = format!("_design/{}", ddoc);
        state.docs.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn view_rows(&self, _ddoc: &str, _view: &str) -> Result<Vec<ViewRow>, StoreError> {
        let mut state = self.state.lock();
        state.count("view_rows");
        let mut rows = Vec::new();
        for (id, doc) in state.docs.iter().filter(|(_, doc)| is_content(doc)) {
            let item = doc.get("item").cloned().unwrap_or(Value::Null);
            let sentinel = format!(
                "frontmatter.{}",
                item.get("hash").cloned().unwrap_or(Value::Null)
            );
            rows.push(ViewRow {
                id: id.clone(),
                key: (id.clone(), 0),
                value: item,
                doc: Some(doc.clone()),
            });
            rows.push(ViewRow {
                id: id.clone(),
                key: (id.clone(), 1),
                value: json!({ "_id": sentinel }),
                doc: state.docs.get(&sentinel).cloned(),
            });
        }
        Ok(rows)
    }

    async fn find_structure(&self) -> Result<Vec<Document>, StoreError> {
        let mut state = self.state.lock();
        state.count("find_structure");
        let docs = state
            .docs
            .values()
            .filter(|doc| {
                matches!(
                    doc.pointer("/item/type").and_then(Value::as_str),
                    Some("folder") | Some("file")
                ) && doc.pointer("/item/parentId").and_then(Value::as_str) != Some("trash")
            })
            .filter_map(|doc| serde_json::from_value(doc.clone()).ok())
            .collect();
        Ok(docs)
    }

    async fn get_attachment(&self, doc_id: &str, name: &str) -> Result<Attachment, StoreError> {
        let mut state = self.state.lock();
        state.count("get_attachment");
        state
            .bodies
            .get(&(doc_id.to_string(), name.to_string()))
            .map(|(etag, body)| Attachment {
                etag: etag.clone(),
                body: bytes::Bytes::from(body.clone()),
            })
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", doc_id, name)))
    }

    async fn post_document(&self, doc: Value) -> Result<BulkResult, StoreError> {
        let mut state = self.state.lock();
        state.count("post_document");
        let id = doc_id(&doc)?;
        if state.docs.contains_key(&id) {
            return Err(StoreError::Conflict(id));
        }
        let rev = state.store(doc)?;
        Ok(BulkResult {
            id,
            ok: Some(true),
            rev: Some(rev),
            error: None,
            reason: None,
        })
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> Result<Vec<BulkResult>, StoreError> {
        let mut state = self.state.lock();
        state.count("bulk_docs");
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc_id(&doc)?;
            let failure = |error: &str| BulkResult {
                id: id.clone(),
                ok: None,
                rev: None,
                error: Some(error.to_string()),
                reason: None,
            };

            if let Some(error) = state.bulk_errors.remove(&id) {
                results.push(failure(&error));
                continue;
            }
            let current = state.docs.get(&id).and_then(rev_of).map(str::to_string);
            if current.as_deref() != rev_of(&doc) {
                results.push(failure("conflict"));
                continue;
            }
            if doc.get("_deleted").and_then(Value::as_bool) == Some(true) {
                state.docs.remove(&id);
                results.push(BulkResult {
                    id,
                    ok: Some(true),
                    rev: current,
                    error: None,
                    reason: None,
                });
                continue;
            }
            let rev = state.store(doc)?;
            results.push(BulkResult {
                id,
                ok: Some(true),
                rev: Some(rev),
                error: None,
                reason: None,
            });
        }
        Ok(results)
    }

    async fn revisions(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let mut state = self.state.lock();
        state.count("revisions");
        Ok(keys
            .iter()
            .map(|key| state.docs.get(key).and_then(rev_of).map(str::to_string))
            .collect())
    }

    async fn docs_with_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        let mut state = self.state.lock();
        state.count("docs_with_prefix");
        Ok(state
            .docs
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn put_attachment(
        &self,
        doc_id: &str,
        rev: &str,
        name: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        state.count("put_attachment");
        let Some(mut doc) = state.docs.get(doc_id).cloned() else {
            return Err(StoreError::NotFound(doc_id.to_string()));
        };
        if rev_of(&doc) != Some(rev) {
            return Err(StoreError::Conflict(doc_id.to_string()));
        }
        if !doc.get("_attachments").map(Value::is_object).unwrap_or(false) {
            doc["_attachments"] = json!({});
        }
        doc["_attachments"][name] = json!({
            "content_type": content_type,
            "length": body.len(),
            "stub": true,
        });
        state
            .bodies
            .insert((doc_id.to_string(), name.to_string()), (String::new(), body));
        state.store(doc)
    }

    async fn changes(&self, _since: &str) -> Result<ChangeStream, StoreError> {
        let mut state = self.state.lock();
        state.count("changes");
        let events: Vec<_> = state.changes.drain(..).map(Ok).collect();
        Ok(futures::stream::iter(events).boxed())
    }
}
