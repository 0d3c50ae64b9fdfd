//! Firestore REST client for the shared post collection.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::document::{self, Document};
use super::{CommentSubscription, RemoteStore};
use crate::error::{Error, Result};
use crate::models::{CommentId, CommentRecord, PostEdit, PostId, PostRecord};
use crate::util::{compact_text, is_http_url, unix_millis_now};

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const POSTS_COLLECTION: &str = "posts";
const COMMENTS_COLLECTION: &str = "comments";

/// Connection settings for one Firestore project.
#[derive(Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub base_url: String,
    /// Bearer ID token issued by the sign-in flow
    pub id_token: Option<String>,
    pub timeout: Duration,
    /// How often comment subscriptions poll for new entries
    pub poll_interval: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
            id_token: None,
            timeout: DEFAULT_REMOTE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl fmt::Debug for FirestoreConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("base_url", &self.base_url)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// [`RemoteStore`] backed by the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreRemoteStore {
    client: Client,
    /// `projects/{project}/databases/(default)/documents`
    documents_name: String,
    /// Absolute URL of `documents_name`
    documents_url: String,
    id_token: Option<String>,
    poll_interval: Duration,
}

impl FirestoreRemoteStore {
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        let project_id = config.project_id.trim();
        if project_id.is_empty() || project_id.contains('/') {
            return Err(Error::InvalidConfig(
                "Firestore project id must be a non-empty name".to_string(),
            ));
        }
        let base_url = config.base_url.trim().trim_end_matches('/');
        if !is_http_url(base_url) {
            return Err(Error::InvalidConfig(format!(
                "Firestore base URL must be http(s): {base_url}"
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| Error::InvalidConfig(format!("HTTP client: {error}")))?;

        let documents_name = format!("projects/{project_id}/databases/(default)/documents");
        Ok(Self {
            client,
            documents_url: format!("{base_url}/{documents_name}"),
            documents_name,
            id_token: config.id_token.filter(|token| !token.trim().is_empty()),
            poll_interval: config.poll_interval,
        })
    }

    fn post_url(&self, id: &PostId) -> String {
        format!("{}/{POSTS_COLLECTION}/{}", self.documents_url, id.as_str())
    }

    fn post_name(&self, id: &PostId) -> String {
        format!("{}/{POSTS_COLLECTION}/{}", self.documents_name, id.as_str())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, parse_api_error(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|error| Error::RemoteRejected(format!("unexpected response body: {error}")))
    }

    async fn run_query(&self, parent_url: &str, query: Value) -> Result<Vec<Document>> {
        let entries: Vec<RunQueryEntry> = self
            .send_json(
                self.client
                    .post(format!("{parent_url}:runQuery"))
                    .json(&json!({ "structuredQuery": query })),
            )
            .await?;
        Ok(entries.into_iter().filter_map(|entry| entry.document).collect())
    }

    async fn get_document(&self, id: &PostId) -> Result<Option<Document>> {
        match self.send_json(self.client.get(self.post_url(id))).await {
            Ok(document) => Ok(Some(document)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn list_comments(&self, post_id: &PostId) -> Result<Vec<CommentRecord>> {
        let documents = self
            .run_query(
                &self.post_url(post_id),
                json!({
                    "from": [{ "collectionId": COMMENTS_COLLECTION }],
                    "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "ASCENDING" }],
                }),
            )
            .await?;

        let mut comments: Vec<CommentRecord> = documents
            .iter()
            .filter_map(|doc| match document::decode_comment(doc) {
                Ok(comment) => Some(comment),
                Err(reason) => {
                    tracing::warn!("Skipping undecodable comment {}: {}", doc.name, reason);
                    None
                }
            })
            .collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn with_comments(&self, mut post: PostRecord) -> Result<PostRecord> {
        if let Some(id) = post.id.clone() {
            post.comments = self.list_comments(&id).await?;
        }
        Ok(post)
    }

    async fn commit(&self, writes: Vec<Value>) -> Result<CommitResponse> {
        self.send_json(
            self.client
                .post(format!("{}:commit", self.documents_url))
                .json(&json!({ "writes": writes })),
        )
        .await
    }
}

impl RemoteStore for FirestoreRemoteStore {
    async fn create(&self, record: &PostRecord) -> Result<PostId> {
        let fields = document::encode_post(record)?;
        let created: Document = self
            .send_json(
                self.client
                    .post(format!("{}/{POSTS_COLLECTION}", self.documents_url))
                    .json(&json!({ "fields": fields })),
            )
            .await?;

        let id = PostId::new(created.id());
        tracing::info!("Created remote post {}", id);
        Ok(id)
    }

    async fn fetch_all(&self) -> Result<Vec<PostRecord>> {
        let documents = self
            .run_query(
                &self.documents_url,
                json!({
                    "from": [{ "collectionId": POSTS_COLLECTION }],
                    "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "DESCENDING" }],
                }),
            )
            .await?;
        tracing::debug!("Fetched {} remote post documents", documents.len());

        let mut posts = Vec::with_capacity(documents.len());
        for doc in &documents {
            match document::decode_post(doc) {
                Ok(post) => posts.push(self.with_comments(post).await?),
                Err(reason) => {
                    tracing::warn!("Skipping undecodable post {}: {}", doc.name, reason);
                }
            }
        }
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn get(&self, id: &PostId) -> Result<Option<PostRecord>> {
        let Some(doc) = self.get_document(id).await? else {
            return Ok(None);
        };
        let post = document::decode_post(&doc).map_err(Error::RemoteRejected)?;
        Ok(Some(self.with_comments(post).await?))
    }

    async fn delete(&self, id: &PostId) -> Result<()> {
        let comments = self.list_comments(id).await?;
        let mut writes: Vec<Value> = comments
            .iter()
            .map(|comment| {
                json!({
                    "delete": format!(
                        "{}/{COMMENTS_COLLECTION}/{}",
                        self.post_name(id),
                        comment.id.as_str()
                    )
                })
            })
            .collect();
        writes.push(json!({ "delete": self.post_name(id) }));

        self.commit(writes).await?;
        tracing::info!("Deleted remote post {} ({} comments)", id, comments.len());
        Ok(())
    }

    async fn increment_likes(&self, id: &PostId, by: u64) -> Result<u64> {
        let response = self
            .commit(vec![json!({
                "transform": {
                    "document": self.post_name(id),
                    "fieldTransforms": [{
                        "fieldPath": "likes",
                        "increment": { "integerValue": by.to_string() },
                    }],
                },
                "currentDocument": { "exists": true },
            })])
            .await
            .map_err(|error| match error {
                Error::NotFound(_) => Error::NotFound(format!("post {id}")),
                other => other,
            })?;

        let likes = response
            .write_results
            .first()
            .and_then(|result| result.transform_results.first())
            .and_then(document::integer_from_value)
            .ok_or_else(|| Error::RemoteRejected("increment returned no value".to_string()))?;
        u64::try_from(likes).map_err(|_| {
            Error::RemoteRejected(format!("like counter of post {id} is negative: {likes}"))
        })
    }

    async fn update_fields(&self, id: &PostId, edit: &PostEdit) -> Result<PostRecord> {
        let mut post = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        edit.apply(&mut post)?;

        let changed = edit.changed_fields();
        if changed.is_empty() {
            return Ok(post);
        }

        let fields = document::encode_post_fields(&post, &changed)?;
        let mut query: Vec<(&str, &str)> = changed
            .iter()
            .map(|field| ("updateMask.fieldPaths", *field))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let updated: Document = self
            .send_json(
                self.client
                    .patch(self.post_url(id))
                    .query(&query)
                    .json(&json!({ "fields": fields })),
            )
            .await?;

        let mut refreshed = document::decode_post(&updated).map_err(Error::RemoteRejected)?;
        refreshed.comments = post.comments;
        tracing::info!("Updated remote post {} fields {:?}", id, changed);
        Ok(refreshed)
    }

    async fn append_comment(&self, comment: &CommentRecord) -> Result<CommentId> {
        comment.validate()?;
        if self.get_document(&comment.post_id).await?.is_none() {
            return Err(Error::NotFound(format!("post {}", comment.post_id)));
        }

        let result = self
            .send(
                self.client
                    .post(format!(
                        "{}/{COMMENTS_COLLECTION}",
                        self.post_url(&comment.post_id)
                    ))
                    .query(&[("documentId", comment.id.as_str())])
                    .json(&json!({ "fields": document::encode_comment(comment) })),
            )
            .await;

        match result {
            Ok(_) => Ok(comment.id.clone()),
            // Retried append of a comment that already landed
            Err(Error::RemoteRejected(message)) if message.contains("(409)") => {
                Ok(comment.id.clone())
            }
            Err(error) => Err(error),
        }
    }

    fn subscribe(&self, post_id: &PostId) -> CommentSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Comment subscription requires a Tokio runtime");
            return CommentSubscription::new(receiver, None);
        };

        let store = self.clone();
        let post_id = post_id.clone();
        let since = unix_millis_now();
        let task = runtime.spawn(async move {
            let mut seen = HashSet::new();
            loop {
                match store.list_comments(&post_id).await {
                    Ok(comments) => {
                        for comment in comments {
                            if comment.timestamp < since || !seen.insert(comment.id.clone()) {
                                continue;
                            }
                            if sender.send(comment).is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        tracing::debug!("Comment poll for {} failed: {}", post_id, error);
                    }
                }
                tokio::time::sleep(store.poll_interval).await;
            }
        });

        CommentSubscription::new(receiver, Some(task))
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryEntry {
    document: Option<Document>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Transient statuses surface as `Network`, client mistakes as rejections.
fn classify_status(status: StatusCode, message: String) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(message)
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Error::Network(message)
    } else {
        Error::RemoteRejected(message)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GoogleErrorResponse>(body) {
        if let Some(message) = payload.error.message.or(payload.error.status) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
