//! MergeService: orchestrates sources and deserializes to SyncConfig.

use crate::config::sources::{environment, site_file};
use crate::config::SyncConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config for a site.
    /// Precedence: defaults (lowest) -> site file -> explicit file -> environment (highest).
    pub fn load(site_root: &Path, explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = site_file::add_to_builder(builder, site_root)?;
        let builder = match explicit {
            Some(path) => builder.add_source(File::from(path.to_path_buf()).required(true)),
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&SyncConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
