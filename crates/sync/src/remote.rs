// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote authority abstraction.
//!
//! The [`Remote`] trait is the seam between the sync subsystem and the
//! network:
//! - [`HttpRemote`] speaks JSON over HTTP for production
//! - In-memory authorities stand in for it in tests

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kn_core::{
    CachedDocument, HttpMethod, QueuedAction, SyncRequest, SyncResponse, VectorClock,
};

use crate::config::RemoteConfig;

/// HTTP statuses worth retrying.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Error type for remote calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// The authority answered with a non-2xx status.
    #[error("remote returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true for transient network failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout => true,
            RemoteError::Status { code, message } => {
                RETRYABLE_STATUSES.contains(code) || mentions_network(message)
            }
            RemoteError::Decode(message) => mentions_network(message),
        }
    }

    /// HTTP status, if the authority answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

fn mentions_network(message: &str) -> bool {
    let message = message.to_lowercase();
    ["timeout", "network", "connection"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by [`Remote`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// A document as served by `GET /documents/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub vector_clock: VectorClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteDocument {
    /// Builds the synced local copy.
    pub fn into_cached(self, now: DateTime<Utc>) -> CachedDocument {
        let mut doc = CachedDocument::new(self.id, self.workspace_id, self.updated_at.unwrap_or(now))
            .with_title(self.title)
            .with_content(self.content);
        doc.collection_id = self.collection_id;
        doc.vector_clock = self.vector_clock;
        doc
    }
}

impl From<&CachedDocument> for RemoteDocument {
    fn from(doc: &CachedDocument) -> Self {
        RemoteDocument {
            id: doc.id.clone(),
            workspace_id: doc.workspace_id.clone(),
            collection_id: doc.collection_id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            vector_clock: doc.vector_clock.clone(),
            updated_at: Some(doc.last_modified),
        }
    }
}

/// The authoritative remote store.
pub trait Remote: Send + Sync {
    /// Performs the REST call mapped from the action's kind and resource.
    fn deliver(&self, action: QueuedAction) -> RemoteFuture<'_, ()>;

    /// `POST /sync`: sends local deltas, receives outstanding remote ones.
    fn exchange(&self, request: SyncRequest) -> RemoteFuture<'_, SyncResponse>;

    /// Fetches a document, returning `None` if the authority has none.
    fn fetch_document(&self, id: &str) -> RemoteFuture<'_, Option<RemoteDocument>>;
}

/// JSON-over-HTTP client for the remote authority.
pub struct HttpRemote {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a client for the configured authority.
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| RemoteError::Transport("no remote URL configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(HttpRemote {
            base_url: url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request, mapping non-2xx responses to [`RemoteError::Status`].
    async fn send(&self, builder: reqwest::RequestBuilder) -> RemoteResult<String> {
        let response = builder.send().await.map_err(RemoteError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(RemoteError::from_reqwest)?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message: error_message(&text, status),
            });
        }
        Ok(text)
    }
}

/// Extracts `error` or `message` from a JSON error body, else the raw text.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        v.get("error")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    match field {
        Some(message) => message,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        None => body.trim().to_string(),
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

impl Remote for HttpRemote {
    fn deliver(&self, action: QueuedAction) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let endpoint = action.endpoint();
            let body = action
                .payload
                .body()
                .map_err(|e| RemoteError::Decode(e.to_string()))?;

            let mut builder = self.request(to_reqwest_method(endpoint.method), &endpoint.path);
            if let Some(body) = body {
                builder = builder.json(&body);
            }
            debug!(action = %action.id, endpoint = %endpoint, "delivering action");
            self.send(builder).await.map(|_| ())
        })
    }

    fn exchange(&self, request: SyncRequest) -> RemoteFuture<'_, SyncResponse> {
        Box::pin(async move {
            let builder = self.request(reqwest::Method::POST, "/sync").json(&request);
            let text = self.send(builder).await?;
            if text.trim().is_empty() {
                return Ok(SyncResponse::default());
            }
            serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
        })
    }

    fn fetch_document(&self, id: &str) -> RemoteFuture<'_, Option<RemoteDocument>> {
        let path = format!("/documents/{id}");
        Box::pin(async move {
            match self.send(self.request(reqwest::Method::GET, &path)).await {
                Ok(text) => serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| RemoteError::Decode(e.to_string())),
                Err(RemoteError::Status { code: 404, .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
