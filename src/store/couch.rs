//! CouchDB HTTP client

use super::{ChangeStream, DocumentStore};
use crate::config::CouchConfig;
use crate::error::StoreError;
use crate::types::{Attachment, BulkResult, ChangeEvent, Document, ViewRow};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const FIND_PAGE_SIZE: usize = 1000;

/// Client for one database of a CouchDB-protocol server
#[derive(Clone)]
pub struct CouchClient {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    credentials: Option<(String, Option<String>)>,
    heartbeat: Duration,
}

#[derive(Deserialize)]
struct RowsResponse<T> {
    rows: Vec<T>,
}

#[derive(Deserialize)]
struct FindResponse {
    docs: Vec<Document>,
    #[serde(default)]
    bookmark: Option<String>,
    #[serde(default)]
    warning: Option<String>,
}

#[derive(Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    value: Option<RevValue>,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Deserialize)]
struct RevValue {
    rev: String,
}

#[derive(Deserialize)]
struct PutResponse {
    rev: String,
}

impl CouchClient {
    pub fn new(base_url: &str, database: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidResponse(format!("invalid server URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidResponse(format!(
                "server URL cannot be a base: {}",
                base_url
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            database: database.to_string(),
            credentials: None,
            heartbeat: Duration::from_secs(30),
        })
    }

    pub fn from_config(config: &CouchConfig, heartbeat: Duration) -> Result<Self, StoreError> {
        let client = Self::new(&config.url, &config.database)?.with_heartbeat(heartbeat);
        Ok(match &config.username {
            Some(username) => client.with_basic_auth(username, config.password.clone()),
            None => client,
        })
    }

    pub fn with_basic_auth(mut self, username: &str, password: Option<String>) -> Self {
        self.credentials = Some((username.to_string(), password));
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, target: &str) -> Result<Response, StoreError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::CONFLICT => Err(StoreError::Conflict(target.to_string())),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(target.to_string())),
            _ => {
                let url = response.url().to_string();
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Status {
                    status: status.as_u16(),
                    url,
                    body,
                })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        target: &str,
    ) -> Result<T, StoreError> {
        let response = self.send(builder, target).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| StoreError::InvalidResponse(format!("{}: {}", target, e)))
    }
}

/// Parse one line of a continuous change feed.
///
/// Heartbeats (blank lines) and the closing `last_seq` line yield `None`.
pub(crate) fn parse_change_line(line: &[u8]) -> Option<Result<ChangeEvent, StoreError>> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return Some(Err(StoreError::InvalidResponse(format!("change line: {}", e)))),
    };
    if value.get("id").is_none() {
        if value.get("last_seq").is_none() {
            warn!(line, "Unrecognised change feed line");
        }
        return None;
    }
    Some(
        serde_json::from_value(value)
            .map_err(|e| StoreError::InvalidResponse(format!("change event: {}", e))),
    )
}

#[async_trait]
impl DocumentStore for CouchClient {
    async fn design_document(&self, ddoc: &str) -> Result<Value, StoreError> {
        let url = self.url(&["_design", ddoc]);
        self.send_json(self.request(Method::GET, url), &format!("_design/{}", ddoc))
            .await
    }

    async fn view_rows(&self, ddoc: &str, view: &str) -> Result<Vec<ViewRow>, StoreError> {
        let url = self.url(&["_design", ddoc, "_view", view]);
        let response: RowsResponse<ViewRow> = self
            .send_json(
                self.request(Method::POST, url).json(&json!({ "include_docs": true })),
                view,
            )
            .await?;
        Ok(response.rows)
    }

    async fn find_structure(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs = Vec::new();
        let mut bookmark: Option<String> = None;
        loop {
            let mut body = json!({
                "selector": {
                    "item": {
                        "type": { "$in": ["folder", "file"] },
                        "parentId": { "$ne": "trash" },
                    }
                },
                "limit": FIND_PAGE_SIZE,
            });
            if let Some(bookmark) = &bookmark {
                body["bookmark"] = json!(bookmark);
            }
            let page: FindResponse = self
                .send_json(
                    self.request(Method::POST, self.url(&["_find"])).json(&body),
                    "_find",
                )
                .await?;
            if let Some(warning) = &page.warning {
                debug!(warning = %warning, "Index warning from _find");
            }
            let count = page.docs.len();
            docs.extend(page.docs);
            match page.bookmark {
                Some(next) if count == FIND_PAGE_SIZE => bookmark = Some(next),
                _ => break,
            }
        }
        Ok(docs)
    }

    async fn get_attachment(&self, doc_id: &str, name: &str) -> Result<Attachment, StoreError> {
        let target = format!("{}/{}", doc_id, name);
        let response = self
            .send(self.request(Method::GET, self.url(&[doc_id, name])), &target)
            .await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| StoreError::InvalidResponse(format!("no etag for {}", target)))?;
        let body = response.bytes().await?;
        Ok(Attachment { etag, body })
    }

    async fn post_document(&self, doc: Value) -> Result<BulkResult, StoreError> {
        let target = doc
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or("document")
            .to_string();
        self.send_json(self.request(Method::POST, self.url(&[])).json(&doc), &target)
            .await
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> Result<Vec<BulkResult>, StoreError> {
        self.send_json(
            self.request(Method::POST, self.url(&["_bulk_docs"]))
                .json(&json!({ "docs": docs })),
            "_bulk_docs",
        )
        .await
    }

    async fn revisions(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let response: RowsResponse<AllDocsRow> = self
            .send_json(
                self.request(Method::POST, self.url(&["_all_docs"]))
                    .json(&json!({ "keys": keys })),
                "_all_docs",
            )
            .await?;
        Ok(response
            .rows
            .into_iter()
            .map(|row| row.value.map(|value| value.rev))
            .collect())
    }

    async fn docs_with_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        let start = serde_json::to_string(prefix)?;
        let end = serde_json::to_string(&format!("{}\u{fff0}", prefix))?;
        let request = self
            .request(Method::GET, self.url(&["_all_docs"]))
            .query(&[
                ("startkey", start.as_str()),
                ("endkey", end.as_str()),
                ("include_docs", "true"),
            ]);
        let response: RowsResponse<AllDocsRow> = self.send_json(request, "_all_docs").await?;
        Ok(response.rows.into_iter().filter_map(|row| row.doc).collect())
    }

    async fn put_attachment(
        &self,
        doc_id: &str,
        rev: &str,
        name: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let target = format!("{}/{}", doc_id, name);
        let request = self
            .request(Method::PUT, self.url(&[doc_id, name]))
            .query(&[("rev", rev)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        let response: PutResponse = self.send_json(request, &target).await?;
        Ok(response.rev)
    }

    async fn changes(&self, since: &str) -> Result<ChangeStream, StoreError> {
        let heartbeat = self.heartbeat.as_millis().to_string();
        let request = self
            .request(Method::GET, self.url(&["_changes"]))
            .query(&[
                ("feed", "continuous"),
                ("include_docs", "true"),
                ("since", since),
                ("heartbeat", heartbeat.as_str()),
            ]);
        let response = self.send(request, "_changes").await?;
        let bytes = response.bytes_stream().boxed();

        let stream = futures::stream::unfold(
            (bytes, Vec::<u8>::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    if let Some(position) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=position).collect();
                        match parse_change_line(&line) {
                            Some(event) => return Some((event, (bytes, buffer))),
                            None => continue,
                        }
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => return Some((Err(StoreError::Http(e)), (bytes, buffer))),
                        None => {
                            let rest = std::mem::take(&mut buffer);
                            return parse_change_line(&rest).map(|event| (event, (bytes, buffer)));
                        }
                    }
                }
            },
        );
        Ok(stream.boxed())
    }
}
