use crate::common::{content, file, folder, Fixture};
use stacksync::sync::bootstrap;
use std::fs;

const BODY: &str = "---\ntitle: Hello\n---\nbody\n";

#[tokio::test]
async fn bootstrap_writes_markdown_and_prunes_stale_revision() {
    let fixture = Fixture::with_single_file(BODY);
    let dir = fixture.content_dir().join("A");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("b.00.generated.md"), "old").unwrap();
    fs::write(dir.join("notes.txt"), "kept").unwrap();

    let (state, report) = bootstrap(&fixture.ctx).await.unwrap();

    let written = dir.join("b.66.generated.md");
    assert_eq!(fs::read_to_string(&written).unwrap(), BODY);
    assert!(!dir.join("b.00.generated.md").exists());
    assert!(dir.join("notes.txt").exists());

    assert_eq!(report.missing_frontmatter, 1);
    assert_eq!(report.frontmatter_inserted, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.downloaded, 1);

    assert_eq!(state.index.id_for_hash(42), Some("b"));
    assert_eq!(state.tree.len(), 2);
    assert_eq!(state.frontmatter.len(), 1);

    let doc = fixture.store.get_doc("frontmatter.42").unwrap();
    assert_eq!(doc["title"], "Hello");
    assert_eq!(doc["hasFrontMatter"], true);
    assert!(doc["_attachments"].get("c1").is_some());
}

#[tokio::test]
async fn second_bootstrap_changes_nothing() {
    let fixture = Fixture::with_single_file(BODY);
    bootstrap(&fixture.ctx).await.unwrap();
    let (_, report) = bootstrap(&fixture.ctx).await.unwrap();

    assert_eq!(report.missing_frontmatter, 0);
    assert_eq!(report.frontmatter_inserted, 0);
    assert_eq!(report.stale_frontmatter, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.downloaded, 0);
    assert!(fixture
        .content_dir()
        .join("A")
        .join("b.66.generated.md")
        .exists());
}

#[tokio::test]
async fn section_index_is_mounted_before_existing_mounts() {
    let fixture = Fixture::new();
    fixture.store.insert_item(&folder("p", None, "posts")).unwrap();
    fixture
        .store
        .insert_item(&file("i", Some("p"), "_index"))
        .unwrap();
    fixture
        .store
        .insert_content("c9", &content("i", 9), "Zg==", "# Posts\n")
        .unwrap();
    fs::write(
        fixture.site.path().join("hugo.yml"),
        "module:\n  mounts:\n    - source: static\n      target: static\n",
    )
    .unwrap();

    bootstrap(&fixture.ctx).await.unwrap();

    let generated = fs::read_to_string(&fixture.ctx.site.generated_config).unwrap();
    let config: serde_json::Value = serde_json::from_str(&generated).unwrap();
    let mounts = config["module"]["mounts"].as_array().unwrap();
    assert_eq!(mounts.len(), 2);
    assert_eq!(mounts[0]["source"], "content/posts/_index.66.generated.md");
    assert_eq!(mounts[0]["target"], "content/posts/_index.md");
    assert_eq!(mounts[1]["source"], "static");
}

#[tokio::test]
async fn trashed_files_are_not_written() {
    let fixture = Fixture::with_single_file(BODY);
    fixture
        .store
        .insert_item(&file("t", Some("trash"), "gone"))
        .unwrap();
    fixture
        .store
        .insert_content("ct", &content("t", 7), "Zm8=", "trashed\n")
        .unwrap();

    let (state, report) = bootstrap(&fixture.ctx).await.unwrap();

    assert!(!state.tree.contains("t"));
    assert_eq!(report.downloaded, 1);
    let written: Vec<_> = walkdir::WalkDir::new(fixture.content_dir())
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .collect();
    assert_eq!(written.len(), 1);
}

#[tokio::test]
async fn trashed_content_gets_no_frontmatter() {
    let fixture = Fixture::with_single_file(BODY);
    fixture
        .store
        .insert_item(&file("t", Some("trash"), "gone"))
        .unwrap();
    fixture
        .store
        .insert_content("ct", &content("t", 7), "Zm8=", "trashed\n")
        .unwrap();

    let (_, first) = bootstrap(&fixture.ctx).await.unwrap();
    assert_eq!(first.missing_frontmatter, 1);
    assert!(fixture.store.get_doc("frontmatter.7").is_none());
    let bulk_calls = fixture.store.calls("bulk_docs");

    for _ in 0..2 {
        let (_, report) = bootstrap(&fixture.ctx).await.unwrap();
        assert_eq!(report.missing_frontmatter, 0);
        assert_eq!(report.frontmatter_inserted, 0);
        assert_eq!(report.stale_frontmatter, 0);
    }
    assert_eq!(fixture.store.calls("bulk_docs"), bulk_calls);
}

#[tokio::test]
async fn traversal_names_are_not_written() {
    let fixture = Fixture::with_single_file(BODY);
    fixture
        .store
        .insert_item(&folder("up", Some("A"), ".."))
        .unwrap();
    fixture
        .store
        .insert_item(&file("x", Some("up"), "x"))
        .unwrap();
    fixture
        .store
        .insert_content("cx", &content("x", 8), "Zm8=", "escape\n")
        .unwrap();

    let (_, report) = bootstrap(&fixture.ctx).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert!(fixture.content_dir().join("A").join("b.66.generated.md").exists());
    assert!(!fixture.content_dir().join("x.666f.generated.md").exists());
    let outside: Vec<_> = walkdir::WalkDir::new(fixture.site.path())
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains("666f"))
        .collect();
    assert!(outside.is_empty());
}
