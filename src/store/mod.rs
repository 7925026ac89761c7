//! Document Store
//!
//! The engine talks to the remote store only through [`DocumentStore`].
//! [`CouchClient`] speaks the CouchDB HTTP API; [`MemoryStore`] keeps
//! documents in memory for tests and dry runs.

pub mod couch;
pub mod memory;

pub use couch::CouchClient;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{Attachment, BulkResult, ChangeEvent, Document, ViewRow};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Feed of change events; ends when the subscription is closed remotely.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, StoreError>>;

/// Operations the engine needs from a CouchDB-protocol store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch `_design/<ddoc>`.
    async fn design_document(&self, ddoc: &str) -> Result<Value, StoreError>;

    /// Rows of a view with `include_docs`, in view order.
    async fn view_rows(&self, ddoc: &str, view: &str) -> Result<Vec<ViewRow>, StoreError>;

    /// Folder and file documents outside the trash.
    async fn find_structure(&self) -> Result<Vec<Document>, StoreError>;

    /// Body and etag of an attachment.
    async fn get_attachment(&self, doc_id: &str, name: &str) -> Result<Attachment, StoreError>;

    /// Create a document; fails with [`StoreError::Conflict`] when it exists.
    async fn post_document(&self, doc: Value) -> Result<BulkResult, StoreError>;

    /// Write several documents at once; per-document failures are in the results.
    async fn bulk_docs(&self, docs: Vec<Value>) -> Result<Vec<BulkResult>, StoreError>;

    /// Current revision of each key, `None` for missing documents.
    async fn revisions(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Documents whose id starts with `prefix`.
    async fn docs_with_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError>;

    /// Add an attachment to an existing document; returns the new revision.
    async fn put_attachment(
        &self,
        doc_id: &str,
        rev: &str,
        name: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Subscribe to the change feed starting after `since`.
    async fn changes(&self, since: &str) -> Result<ChangeStream, StoreError>;
}
