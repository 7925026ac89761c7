//! Hugo mount mapping for section index pages
//!
//! Hugo only recognises `_index.md` and `index.<lang>.md` under their plain
//! names, so generated section pages are mounted onto those names through
//! `module.mounts`.

use crate::config::SitePaths;
use crate::error::SyncError;
use crate::path::{digest_from_file_name, StackEditPath, GENERATED_SUFFIX};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

/// One `module.mounts` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
}

/// Whether a file's names make it a section index page.
pub fn is_section_index(names: &[String]) -> bool {
    match names {
        [.., last] if last == "_index" => true,
        [.., parent, last] => parent == "_index" && last.starts_with("index."),
        _ => false,
    }
}

/// Mount target of a generated source path.
///
/// The first `/index` segment goes away and `<digest>.generated.md` becomes `md`.
pub fn mount_target(source: &str) -> String {
    let target = source.replacen("/index", "", 1);
    let file_name = target.rsplit('/').next().unwrap_or(&target);
    match digest_from_file_name(file_name) {
        Some(digest) => {
            let suffix = format!("{}{}", digest, GENERATED_SUFFIX);
            match target.strip_suffix(&suffix) {
                Some(stem) => format!("{}md", stem),
                None => target,
            }
        }
        None => target,
    }
}

/// Mounts for the section index pages among `paths`.
pub fn generated_mounts(paths: &[StackEditPath], site: &SitePaths) -> Vec<Mount> {
    paths
        .iter()
        .filter(|path| is_section_index(&path.names))
        .map(|path| {
            let source = site
                .relative(&path.markdown_path(&site.content_dir))
                .to_string_lossy()
                .replace('\\', "/");
            let target = mount_target(&source);
            Mount { source, target }
        })
        .collect()
}

/// Existing `module.mounts` of the site's Hugo config.
///
/// A missing config file or a config without mounts yields no entries.
pub async fn existing_mounts(site: &SitePaths) -> Result<Vec<Value>, SyncError> {
    let text = match tokio::fs::read_to_string(&site.hugo_config).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %site.hugo_config.display(), "No Hugo config");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let config: Value = serde_yaml::from_str(&text)?;
    Ok(config
        .pointer("/module/mounts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Write the generated mounts followed by the existing ones.
pub async fn write_hugo_config(
    paths: &[StackEditPath],
    site: &SitePaths,
) -> Result<PathBuf, SyncError> {
    let generated = generated_mounts(paths, site);
    let existing = existing_mounts(site).await?;
    info!(generated = generated.len(), existing = existing.len(), "Writing Hugo mounts");

    let mut mounts: Vec<Value> = generated
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()?;
    mounts.extend(existing);
    let document = json!({ "module": { "mounts": mounts } });

    let target = site.generated_config.clone();
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| SyncError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(&target, serde_json::to_vec(&document)?)
        .await
        .map_err(|source| SyncError::Write {
            path: target.clone(),
            source,
        })?;
    Ok(target)
}
