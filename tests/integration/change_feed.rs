use crate::common::{content, file, folder, Fixture};
use serde_json::json;
use stacksync::sync::{bootstrap, ChangeConsumer, EventOutcome, PendingRetry};
use stacksync::types::{ChangeEvent, Item};
use std::fs;
use std::time::Duration;

fn event(seq: &str, item: &Item, doc_id: &str) -> ChangeEvent {
    ChangeEvent {
        seq: json!(seq),
        id: doc_id.to_string(),
        deleted: false,
        doc: Some(json!({ "_id": doc_id, "item": item })),
    }
}

#[tokio::test]
async fn content_waits_for_its_file() {
    let fixture = Fixture::new();
    fixture.store.insert_item(&folder("A", None, "A")).unwrap();
    let (state, _) = bootstrap(&fixture.ctx).await.unwrap();
    let mut consumer = ChangeConsumer::new(fixture.ctx.clone(), state);

    let body = "---\ntitle: Late\n---\n";
    let item = content("b", 42);
    fixture.store.insert_content("c1", &item, "Zg==", body).unwrap();
    let outcome = consumer.handle_event(event("1-a", &item, "c1")).await.unwrap();
    assert_eq!(outcome, EventOutcome::Deferred("b".to_string()));
    assert!(matches!(
        consumer.pending(),
        PendingRetry::Content { doc_id, frontmatter: Some(_), .. } if doc_id == "c1"
    ));

    let file_item = file("b", Some("A"), "b");
    fixture.store.insert_item(&file_item).unwrap();
    let outcome = consumer.handle_event(event("2-b", &file_item, "b")).await.unwrap();

    let written = fixture.content_dir().join("A").join("b.66.generated.md");
    assert_eq!(
        outcome,
        EventOutcome::Rebuilt {
            replayed: Some(Box::new(EventOutcome::Written(written.clone())))
        }
    );
    assert_eq!(consumer.pending(), &PendingRetry::None);
    assert_eq!(fs::read_to_string(written).unwrap(), body);
    assert_eq!(consumer.state().index.id_for_hash(42), Some("b"));

    // The replay reuses the frontmatter written on the first attempt.
    assert_eq!(fixture.store.calls("post_document"), 1);
    assert_eq!(fixture.store.calls("put_attachment"), 0);
    let doc = fixture.store.get_doc("frontmatter.42").unwrap();
    assert_eq!(doc["title"], "Late");
}

#[tokio::test]
async fn new_revision_replaces_previous_file() {
    let fixture = Fixture::with_single_file("first\n");
    let (state, _) = bootstrap(&fixture.ctx).await.unwrap();
    let mut consumer = ChangeConsumer::new(fixture.ctx.clone(), state);
    let dir = fixture.content_dir().join("A");
    assert!(dir.join("b.66.generated.md").exists());

    let item = content("b", 43);
    fixture.store.insert_content("c1", &item, "Zm8=", "second\n").unwrap();
    let outcome = consumer.handle_event(event("3-c", &item, "c1")).await.unwrap();

    let written = dir.join("b.666f.generated.md");
    assert_eq!(outcome, EventOutcome::Written(written.clone()));
    assert_eq!(fs::read_to_string(written).unwrap(), "second\n");
    assert!(!dir.join("b.66.generated.md").exists());

    assert_eq!(consumer.state().index.id_for_hash(43), Some("b"));
    assert_eq!(consumer.state().index.id_for_hash(42), None);
    let doc = fixture.store.get_doc("frontmatter.43").unwrap();
    assert_eq!(doc["hasFrontMatter"], false);
}

#[tokio::test]
async fn side_index_and_design_changes_are_ignored() {
    let fixture = Fixture::new();
    let (state, _) = bootstrap(&fixture.ctx).await.unwrap();
    let mut consumer = ChangeConsumer::new(fixture.ctx.clone(), state);

    for id in ["frontmatter.42", "_design/hugo"] {
        let outcome = consumer
            .handle_event(ChangeEvent {
                seq: json!("4-d"),
                id: id.to_string(),
                deleted: false,
                doc: Some(json!({ "_id": id })),
            })
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
    }
    assert_eq!(fixture.store.calls("view_rows"), 1);
}

#[tokio::test]
async fn deleted_document_rebuilds_the_model() {
    let fixture = Fixture::with_single_file("gone soon\n");
    let (state, _) = bootstrap(&fixture.ctx).await.unwrap();
    let mut consumer = ChangeConsumer::new(fixture.ctx.clone(), state);
    let written = fixture.content_dir().join("A").join("b.66.generated.md");
    assert!(written.exists());

    fixture.store.remove_doc("b");
    let outcome = consumer
        .handle_event(ChangeEvent {
            seq: json!("5-e"),
            id: "b".to_string(),
            deleted: true,
            doc: Some(json!({ "_id": "b", "_deleted": true })),
        })
        .await
        .unwrap();

    assert_eq!(outcome, EventOutcome::Rebuilt { replayed: None });
    assert!(!consumer.state().tree.contains("b"));
    assert!(!written.exists());
}

#[tokio::test]
async fn run_follows_feed_until_shutdown() {
    let fixture = Fixture::new();
    let (state, _) = bootstrap(&fixture.ctx).await.unwrap();
    let mut consumer = ChangeConsumer::new(fixture.ctx.clone(), state);
    for (seq, id) in [("1-a", "frontmatter.1"), ("2-b", "_design/hugo")] {
        fixture.store.push_change(ChangeEvent {
            seq: json!(seq),
            id: id.to_string(),
            deleted: false,
            doc: None,
        });
    }

    let handled = consumer
        .run(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert_eq!(handled, 2);
    assert_eq!(consumer.since(), "2-b");
    assert!(fixture.store.calls("changes") >= 2);
}
