//! stacksync: StackEdit to Hugo content synchronization
//!
//! Mirrors the folder/file tree StackEdit keeps in a CouchDB database onto a
//! Hugo content directory, one content-addressed Markdown file per file, and
//! keeps a frontmatter side-index in the database.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod index;
pub mod logging;
pub mod path;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod tooling;
pub mod tree;
pub mod types;
