//! SiteConfig and the resolved site layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_hugo_config() -> PathBuf {
    PathBuf::from("hugo.yml")
}

fn default_generated_config() -> PathBuf {
    PathBuf::from("config/_default/hugo.json")
}

/// Site layout (relative to the site root)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory receiving the generated Markdown files
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Hugo config holding the site's own `module.mounts`
    #[serde(default = "default_hugo_config")]
    pub hugo_config: PathBuf,

    /// Generated mount-mapping JSON
    #[serde(default = "default_generated_config")]
    pub generated_config: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            hugo_config: default_hugo_config(),
            generated_config: default_generated_config(),
        }
    }
}

/// Site layout resolved against a site root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub hugo_config: PathBuf,
    pub generated_config: PathBuf,
}

impl SitePaths {
    /// Join the configured entries onto `site_root`; absolute entries are kept.
    pub fn resolve(site_root: &Path, config: &SiteConfig) -> Self {
        Self {
            root: site_root.to_path_buf(),
            content_dir: site_root.join(&config.content_dir),
            hugo_config: site_root.join(&config.hugo_config),
            generated_config: site_root.join(&config.generated_config),
        }
    }

    /// `path` relative to the site root, as Hugo expects in mounts.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
