use crate::common::{content, file, folder, Fixture};
use serde_json::json;
use stacksync::sync::bootstrap;

#[tokio::test]
async fn shared_hash_collapses_into_one_document() {
    let fixture = Fixture::new();
    fixture.store.insert_item(&folder("A", None, "A")).unwrap();
    fixture.store.insert_item(&file("b", Some("A"), "b")).unwrap();
    fixture.store.insert_item(&file("c", Some("A"), "c")).unwrap();
    let body = "---\ntags: [x, y]\n---\n";
    fixture.store.insert_content("c1", &content("b", 42), "Zg==", body).unwrap();
    fixture.store.insert_content("c2", &content("c", 42), "Zg==", body).unwrap();

    let (state, report) = bootstrap(&fixture.ctx).await.unwrap();

    assert_eq!(report.missing_frontmatter, 2);
    assert_eq!(report.frontmatter_inserted, 1);
    let doc = fixture.store.get_doc("frontmatter.42").unwrap();
    assert_eq!(doc["tags"], json!(["x", "y"]));
    let attachments = doc["_attachments"].as_object().unwrap();
    assert!(attachments.contains_key("c1"));
    assert!(attachments.contains_key("c2"));
    assert_eq!(state.tree.select_by_hash(42).len(), 2);
}

#[tokio::test]
async fn conflicting_insert_merges_while_others_are_created() {
    let fixture = Fixture::with_single_file("plain\n");
    fixture
        .store
        .insert_doc(json!({
            "_id": "frontmatter.42",
            "hash": 42,
            "hasFrontMatter": false,
            "_attachments": {
                "c0": { "content_type": "application/octet-stream", "stub": true }
            }
        }))
        .unwrap();

    fixture.store.insert_item(&file("d", Some("A"), "d")).unwrap();
    fixture
        .store
        .insert_content("c2", &content("d", 43), "Zm8=", "---\ntitle: New\n---\n")
        .unwrap();

    let (_, report) = bootstrap(&fixture.ctx).await.unwrap();

    assert_eq!(report.missing_frontmatter, 2);
    assert_eq!(report.frontmatter_inserted, 1);
    assert_eq!(report.frontmatter_merged, 1);
    assert_eq!(fixture.store.calls("put_attachment"), 1);
    let doc = fixture.store.get_doc("frontmatter.42").unwrap();
    let attachments = doc["_attachments"].as_object().unwrap();
    assert!(attachments.contains_key("c0"));
    assert!(attachments.contains_key("c1"));
    let created = fixture.store.get_doc("frontmatter.43").unwrap();
    assert_eq!(created["title"], "New");
    assert!(created["_attachments"].get("c2").is_some());
}

#[tokio::test]
async fn unknown_hashes_are_deleted() {
    let fixture = Fixture::with_single_file("plain\n");
    fixture
        .store
        .insert_doc(json!({ "_id": "frontmatter.99", "hash": 99 }))
        .unwrap();

    bootstrap(&fixture.ctx).await.unwrap();

    assert!(fixture.store.get_doc("frontmatter.99").is_none());
    assert!(fixture.store.get_doc("frontmatter.42").is_some());
}

#[tokio::test]
async fn malformed_header_is_recorded() {
    let fixture = Fixture::with_single_file("---\ntitle: [unclosed\n---\nbody\n");

    bootstrap(&fixture.ctx).await.unwrap();

    let doc = fixture.store.get_doc("frontmatter.42").unwrap();
    assert_eq!(doc["hasFrontMatter"], false);
    let error = &doc["frontMatterError"];
    assert!(error["line"].as_u64().is_some());
    assert!(doc.get("title").is_none());
}

#[tokio::test]
async fn failed_insert_is_an_error() {
    let fixture = Fixture::with_single_file("plain\n");
    fixture.store.inject_bulk_error("frontmatter.42", "forbidden");

    let err = bootstrap(&fixture.ctx).await.unwrap_err();
    assert!(err.to_string().contains("forbidden"));
}
