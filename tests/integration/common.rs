use async_trait::async_trait;
use stacksync::config::{SiteConfig, SitePaths, SyncConfig};
use stacksync::error::SyncError;
use stacksync::reconcile::ChecksumVerifier;
use stacksync::store::MemoryStore;
use stacksync::sync::SyncContext;
use stacksync::types::{Item, ItemType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Verifier that trusts every local file
pub struct TrustAll;

#[async_trait]
impl ChecksumVerifier for TrustAll {
    async fn invalid_paths(&self, _files: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError> {
        Ok(Vec::new())
    }
}

pub fn folder(id: &str, parent: Option<&str>, name: &str) -> Item {
    Item {
        id: id.to_string(),
        parent_id: parent.map(str::to_string),
        name: name.to_string(),
        item_type: ItemType::Folder,
        hash: None,
    }
}

pub fn file(id: &str, parent: Option<&str>, name: &str) -> Item {
    Item {
        item_type: ItemType::File,
        ..folder(id, parent, name)
    }
}

pub fn content(file_id: &str, hash: i64) -> Item {
    Item {
        id: format!("{}/content", file_id),
        parent_id: None,
        name: String::new(),
        item_type: ItemType::Content,
        hash: Some(hash),
    }
}

/// A memory store and a temporary site wired into a [`SyncContext`]
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub site: TempDir,
    pub ctx: SyncContext,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let site = TempDir::new().unwrap();
        let mut config = SyncConfig::default();
        config.sync.reconnect_delay_ms = 50;
        let paths = SitePaths::resolve(site.path(), &SiteConfig::default());
        let ctx = SyncContext::new(store.clone(), Arc::new(TrustAll), paths, &config);
        Self { store, site, ctx }
    }

    pub fn content_dir(&self) -> &Path {
        &self.ctx.site.content_dir
    }

    /// Folder `A` holding file `b`, whose content `c1` has hash 42 and etag `Zg==`.
    pub fn with_single_file(body: &str) -> Self {
        let fixture = Self::new();
        fixture.store.insert_item(&folder("A", None, "A")).unwrap();
        fixture.store.insert_item(&file("b", Some("A"), "b")).unwrap();
        fixture
            .store
            .insert_content("c1", &content("b", 42), "Zg==", body)
            .unwrap();
        fixture
    }
}
