//! Error types for the synchronization engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document update conflict: {0}")]
    Conflict(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidResponse(err.to_string())
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Structural errors of the tree model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Missing node on tree: {0}")]
    MissingNode(String),

    #[error("Items reference parents that never appear: {0:?}")]
    DanglingParents(Vec<String>),

    #[error("Stale frontmatter for hash {hash} (content ids {content_ids:?})")]
    StaleFrontmatter { hash: i64, content_ids: Vec<String> },
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("No attachment digest on content document {doc_id}")]
    MissingDigest { doc_id: String },

    #[error("Invalid etag {etag:?}: {reason}")]
    InvalidEtag { etag: String, reason: String },

    #[error("Item name {name:?} cannot be used as a path component")]
    UnsafeName { name: String },

    #[error("Checksum tool failed: {0}")]
    ChecksumTool(String),

    #[error("Frontmatter insertion failed: {0}")]
    FrontMatterInsert(String),

    #[error("Design document _design/{ddoc} does not match the expected view definition")]
    ViewMismatch {
        ddoc: String,
        expected: serde_json::Value,
        found: serde_json::Value,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
