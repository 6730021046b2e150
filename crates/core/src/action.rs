// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable outbound mutation requests.
//!
//! A [`QueuedAction`] is created for every mutation that must reach the
//! remote authority. Its payload is an [`ActionPayload`], a tagged union with
//! one variant per valid `(resource_type, kind)` pair, so an action can
//! never carry a payload that does not match its endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// What an action does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Move,
    Share,
}

impl ActionKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Move => "move",
            ActionKind::Share => "share",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            "move" => Ok(ActionKind::Move),
            "share" => Ok(ActionKind::Share),
            _ => Err(Error::InvalidActionKind(s.to_string())),
        }
    }
}

/// The kind of resource an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Collection,
    Workspace,
    Comment,
}

impl ResourceType {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Collection => "collection",
            ResourceType::Workspace => "workspace",
            ResourceType::Comment => "comment",
        }
    }

    /// Path segment of the resource's REST collection.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceType::Document => "documents",
            ResourceType::Collection => "collections",
            ResourceType::Workspace => "workspaces",
            ResourceType::Comment => "comments",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "document" => Ok(ResourceType::Document),
            "collection" => Ok(ResourceType::Collection),
            "workspace" => Ok(ResourceType::Workspace),
            "comment" => Ok(ResourceType::Comment),
            _ => Err(Error::InvalidResourceType(s.to_string())),
        }
    }
}

/// Delivery priority. Variants are declared from most to least urgent, so
/// the derived ordering sorts critical first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Sort key; lower is delivered first.
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

/// Lifecycle state of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for delivery (possibly after a backoff).
    Pending,
    /// A delivery attempt is in flight.
    Processing,
    /// Dead-lettered: non-retryable error or retries exhausted.
    Failed,
}

impl ActionStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Processing => "processing",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ActionStatus::Pending),
            "processing" => Ok(ActionStatus::Processing),
            "failed" => Ok(ActionStatus::Failed),
            _ => Err(Error::InvalidActionStatus(s.to_string())),
        }
    }
}

/// Access level granted by a share action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    View,
    Comment,
    Edit,
}

/// Typed payload, one variant per `(resource_type, kind)` pair.
///
/// Workspaces cannot be moved; comments can be neither moved nor shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    CreateDocument {
        title: String,
        #[serde(default)]
        content: String,
        workspace_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection_id: Option<String>,
    },
    UpdateDocument {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    DeleteDocument,
    MoveDocument {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
    },
    ShareDocument {
        grantee: String,
        permission: SharePermission,
    },
    CreateCollection {
        name: String,
        workspace_id: String,
    },
    UpdateCollection {
        name: String,
    },
    DeleteCollection,
    MoveCollection {
        workspace_id: String,
    },
    ShareCollection {
        grantee: String,
        permission: SharePermission,
    },
    CreateWorkspace {
        name: String,
    },
    UpdateWorkspace {
        name: String,
    },
    DeleteWorkspace,
    ShareWorkspace {
        grantee: String,
        permission: SharePermission,
    },
    CreateComment {
        document_id: String,
        body: String,
    },
    UpdateComment {
        body: String,
    },
    DeleteComment,
}

impl ActionPayload {
    /// Validates a loosely typed JSON payload against `(kind, resource_type)`.
    pub fn from_parts(
        kind: ActionKind,
        resource_type: ResourceType,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let tag = format!("{}_{}", kind.as_str(), resource_type.as_str());
        let mut object = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(Error::InvalidAction(format!(
                    "payload for {kind} {resource_type} must be an object, got {other}"
                )))
            }
        };
        object.insert("type".to_string(), serde_json::Value::String(tag));

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            if e.to_string().contains("unknown variant") {
                Error::InvalidAction(format!("cannot {kind} a {resource_type}"))
            } else {
                Error::InvalidAction(format!("invalid {kind} {resource_type} payload: {e}"))
            }
        })
    }

    /// The action kind implied by this payload.
    pub fn kind(&self) -> ActionKind {
        use ActionPayload::*;
        match self {
            CreateDocument { .. } | CreateCollection { .. } | CreateWorkspace { .. }
            | CreateComment { .. } => ActionKind::Create,
            UpdateDocument { .. } | UpdateCollection { .. } | UpdateWorkspace { .. }
            | UpdateComment { .. } => ActionKind::Update,
            DeleteDocument | DeleteCollection | DeleteWorkspace | DeleteComment => {
                ActionKind::Delete
            }
            MoveDocument { .. } | MoveCollection { .. } => ActionKind::Move,
            ShareDocument { .. } | ShareCollection { .. } | ShareWorkspace { .. } => {
                ActionKind::Share
            }
        }
    }

    /// The resource type implied by this payload.
    pub fn resource_type(&self) -> ResourceType {
        use ActionPayload::*;
        match self {
            CreateDocument { .. } | UpdateDocument { .. } | DeleteDocument
            | MoveDocument { .. } | ShareDocument { .. } => ResourceType::Document,
            CreateCollection { .. } | UpdateCollection { .. } | DeleteCollection
            | MoveCollection { .. } | ShareCollection { .. } => ResourceType::Collection,
            CreateWorkspace { .. } | UpdateWorkspace { .. } | DeleteWorkspace
            | ShareWorkspace { .. } => ResourceType::Workspace,
            CreateComment { .. } | UpdateComment { .. } | DeleteComment => ResourceType::Comment,
        }
    }

    /// JSON request body without the type tag; `None` for deletes.
    pub fn body(&self) -> Result<Option<serde_json::Value>> {
        if self.kind() == ActionKind::Delete {
            return Ok(None);
        }
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("type");
        }
        Ok(Some(value))
    }
}

/// HTTP verb used to deliver an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verb and path an action is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
}

impl Endpoint {
    /// Maps `(kind, resource_type, resource_id)` to a REST endpoint.
    pub fn for_action(kind: ActionKind, resource_type: ResourceType, resource_id: &str) -> Self {
        let plural = resource_type.plural();
        let (method, path) = match kind {
            ActionKind::Create => (HttpMethod::Post, format!("/{plural}")),
            ActionKind::Update => (HttpMethod::Put, format!("/{plural}/{resource_id}")),
            ActionKind::Delete => (HttpMethod::Delete, format!("/{plural}/{resource_id}")),
            ActionKind::Move => (HttpMethod::Post, format!("/{plural}/{resource_id}/move")),
            ActionKind::Share => (HttpMethod::Post, format!("/{plural}/{resource_id}/share")),
        };
        Endpoint { method, path }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A mutation request before it is assigned an ID and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub resource_id: String,
    pub payload: ActionPayload,
    pub priority: Priority,
}

impl ActionRequest {
    /// Creates a normal-priority request.
    pub fn new(resource_id: impl Into<String>, payload: ActionPayload) -> Self {
        ActionRequest {
            resource_id: resource_id.into(),
            payload,
            priority: Priority::Normal,
        }
    }

    /// Builds a request from loose parts, validating the payload.
    pub fn from_parts(
        kind: ActionKind,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let resource_id = resource_id.into();
        if resource_id.trim().is_empty() {
            return Err(Error::InvalidAction("resource id cannot be empty".into()));
        }
        let payload = ActionPayload::from_parts(kind, resource_type, payload)?;
        Ok(ActionRequest::new(resource_id, payload))
    }

    /// Sets the delivery priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A durable outbound mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: String,
    pub resource_id: String,
    pub payload: ActionPayload,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub status: ActionStatus,
    pub priority: Priority,
    /// Earliest time the next delivery attempt may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Creates a pending action from a request.
    pub fn from_request(id: String, request: ActionRequest, created_at: DateTime<Utc>) -> Self {
        QueuedAction {
            id,
            resource_id: request.resource_id,
            payload: request.payload,
            created_at,
            retry_count: 0,
            status: ActionStatus::Pending,
            priority: request.priority,
            next_attempt_at: None,
            last_error: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.payload.resource_type()
    }

    /// Where this action is delivered.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::for_action(self.kind(), self.resource_type(), &self.resource_id)
    }

    /// Returns true if the action may be attempted at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Generate an action ID from the resource and creation time.
/// Format: `act-{hash}` where hash is the first 8 hex chars of
/// SHA256(resource_id + kind + created_at).
pub fn generate_id(resource_id: &str, kind: ActionKind, created_at: &DateTime<Utc>) -> String {
    let input = format!("{}{}{}", resource_id, kind, created_at.to_rfc3339());
    let hash = Sha256::digest(input.as_bytes());
    format!("act-{}", hex::encode(&hash[..4]))
}

/// Generate a unique ID, handling collisions by appending an incrementing suffix.
pub fn generate_unique_id<F>(
    resource_id: &str,
    kind: ActionKind,
    created_at: &DateTime<Utc>,
    exists: F,
) -> String
where
    F: Fn(&str) -> bool,
{
    let base_id = generate_id(resource_id, kind, created_at);
    if !exists(&base_id) {
        return base_id;
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base_id, suffix);
        if !exists(&id) {
            return id;
        }
        suffix += 1;
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
