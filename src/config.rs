//! Configuration
//!
//! [`SyncConfig`] is assembled by the `config` crate from built-in defaults,
//! `<site>/stacksync.toml`, an optional explicit file and `STACKSYNC__*`
//! environment variables, in increasing precedence.

pub mod facade;
pub mod merge {
    pub mod service;
}
pub mod sources {
    pub mod environment;
    pub mod site_file;
}
pub mod site {
    pub mod paths;
}

pub use facade::ConfigLoader;
pub use site::paths::{SiteConfig, SitePaths};

use crate::error::SyncError;
use crate::logging::LoggingConfig;
use crate::tree::OrphanPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub couch: CouchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Document store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_design_document")]
    pub design_document: String,
    #[serde(default = "default_view")]
    pub view: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_url() -> String {
    "http://127.0.0.1:5984".to_string()
}

fn default_database() -> String {
    "stackedit".to_string()
}

fn default_design_document() -> String {
    "hugo".to_string()
}

fn default_view() -> String {
    "frontmatter".to_string()
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            design_document: default_design_document(),
            view: default_view(),
            username: None,
            password: None,
        }
    }
}

impl CouchConfig {
    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<(), SyncError> {
        let scheme = self.url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("http") | Some("https")) {
            return Err(SyncError::Config(format!(
                "couch.url must be an http(s) URL, got {:?}",
                self.url
            )));
        }
        if self.database.trim().is_empty() {
            return Err(SyncError::Config("couch.database must not be empty".to_string()));
        }
        if self.design_document.trim().is_empty() || self.view.trim().is_empty() {
            return Err(SyncError::Config(
                "couch.design_document and couch.view must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Concurrent downloads, writes and deletions within one pass
    #[serde(default = "default_io_concurrency")]
    pub io_concurrency: usize,
    #[serde(default)]
    pub orphans: OrphanPolicy,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_io_concurrency() -> usize {
    16
}

fn default_heartbeat_ms() -> u64 {
    30_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            io_concurrency: default_io_concurrency(),
            orphans: OrphanPolicy::default(),
            heartbeat_ms: default_heartbeat_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl SyncSettings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
