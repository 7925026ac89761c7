//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::SyncConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a site, with an optional explicit file on top.
    pub fn load(site_root: &Path, explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
        MergeService::load(site_root, explicit)
    }
}
