use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::json;
use stacksync::error::StoreError;
use stacksync::store::{CouchClient, DocumentStore};
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

async fn start() -> Option<MockServer> {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return None;
    }
    Some(MockServer::start_async().await)
}

fn client(server: &MockServer) -> CouchClient {
    CouchClient::new(&server.base_url(), "stackedit").unwrap()
}

#[tokio::test]
async fn attachment_etag_is_unquoted() {
    let Some(server) = start().await else {
        return;
    };
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/stackedit/c1/data");
            then.status(200)
                .header("ETag", "\"Zg==\"")
                .body("# Hello\n");
        })
        .await;

    let attachment = client(&server).get_attachment("c1", "data").await.unwrap();

    mock.assert_async().await;
    assert_eq!(attachment.etag, "Zg==");
    assert_eq!(attachment.text(), "# Hello\n");
}

#[tokio::test]
async fn status_codes_map_to_store_errors() {
    let Some(server) = start().await else {
        return;
    };
    server
        .mock_async(|when, then| {
            when.method(POST).path("/stackedit");
            then.status(409)
                .json_body(json!({ "error": "conflict", "reason": "Document update conflict." }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/stackedit/_design/hugo");
            then.status(404).json_body(json!({ "error": "not_found" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/stackedit/_bulk_docs");
            then.status(500).body("boom");
        })
        .await;

    let client = client(&server);
    let err = client
        .post_document(json!({ "_id": "frontmatter.1" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(id) if id == "frontmatter.1"));

    let err = client.design_document("hugo").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let err = client.bulk_docs(vec![]).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 500, ref body, .. } if body == "boom"));
}

#[tokio::test]
async fn short_find_page_ends_pagination() {
    let Some(server) = start().await else {
        return;
    };
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/stackedit/_find")
                .json_body_partial(r#"{ "limit": 1000 }"#);
            then.status(200).json_body(json!({
                "docs": [
                    { "_id": "A", "item": { "id": "A", "type": "folder", "name": "A" } },
                    { "_id": "b", "item": { "id": "b", "parentId": "A", "type": "file", "name": "b" } }
                ],
                "bookmark": "g1"
            }));
        })
        .await;

    let docs = client(&server).find_structure().await.unwrap();

    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1].item.as_ref().unwrap().parent_id.as_deref(), Some("A"));
}

#[tokio::test]
async fn missing_keys_have_no_revision() {
    let Some(server) = start().await else {
        return;
    };
    server
        .mock_async(|when, then| {
            when.method(POST).path("/stackedit/_all_docs");
            then.status(200).json_body(json!({
                "rows": [
                    { "id": "frontmatter.1", "key": "frontmatter.1", "value": { "rev": "2-ab" } },
                    { "key": "frontmatter.2", "error": "not_found" }
                ]
            }));
        })
        .await;

    let revisions = client(&server)
        .revisions(&["frontmatter.1".to_string(), "frontmatter.2".to_string()])
        .await
        .unwrap();

    assert_eq!(revisions, vec![Some("2-ab".to_string()), None]);
}

#[tokio::test]
async fn put_attachment_sends_revision() {
    let Some(server) = start().await else {
        return;
    };
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/stackedit/frontmatter.1/c1")
                .query_param("rev", "1-aa")
                .header("content-type", "application/octet-stream");
            then.status(201)
                .json_body(json!({ "ok": true, "id": "frontmatter.1", "rev": "2-bb" }));
        })
        .await;

    let rev = client(&server)
        .put_attachment("frontmatter.1", "1-aa", "c1", Vec::new(), "application/octet-stream")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(rev, "2-bb");
}

#[tokio::test]
async fn continuous_feed_skips_heartbeats() {
    let Some(server) = start().await else {
        return;
    };
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/stackedit/_changes")
                .query_param("feed", "continuous")
                .query_param("since", "now")
                .query_param("heartbeat", "1000");
            then.status(200).body(concat!(
                "\n",
                r#"{"seq":"1-a","id":"c1","changes":[{"rev":"1-x"}],"doc":{"_id":"c1"}}"#,
                "\n\n",
                r#"{"seq":"2-b","id":"b","deleted":true,"changes":[{"rev":"2-y"}]}"#,
                "\n",
                r#"{"last_seq":"2-b","pending":0}"#,
                "\n"
            ));
        })
        .await;

    let client = client(&server).with_heartbeat(Duration::from_secs(1));
    let events: Vec<_> = client.changes("now").await.unwrap().collect().await;

    assert_eq!(events.len(), 2);
    let first = events[0].as_ref().unwrap();
    assert_eq!(first.id, "c1");
    let second = events[1].as_ref().unwrap();
    assert!(second.deleted);
    assert_eq!(second.seq, json!("2-b"));
}

#[tokio::test]
async fn basic_auth_is_sent() {
    let Some(server) = start().await else {
        return;
    };
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/stackedit/_design/hugo")
                .header("authorization", "Basic dXNlcjpzZWNyZXQ=");
            then.status(200).json_body(json!({ "_id": "_design/hugo" }));
        })
        .await;

    let client = client(&server).with_basic_auth("user", Some("secret".to_string()));
    client.design_document("hugo").await.unwrap();

    mock.assert_async().await;
}
