// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local store.
//!
//! The [`LocalStore`] is the single source of truth on a client. It holds
//! cached documents, queued actions, preferences, sync bookkeeping and a
//! media cache. Every mutation path writes here before any network effect
//! is attempted.
//!
//! Writes enforce storage ceilings. When a write would exceed a ceiling the
//! quota check fails with [`Error::QuotaExceeded`], an eviction pass runs,
//! and the write is retried once. Eviction never removes `pending` or
//! `conflict` documents, nor actions that are not `failed`.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::action::{generate_unique_id, ActionRequest, ActionStatus, QueuedAction};
use crate::clock::{from_millis, ClockSource, SystemClock};
use crate::document::{CachedDocument, SyncStatus};
use crate::error::{Error, Result};
use crate::protocol::SyncMetadata;

/// SQL schema for the local store.
pub const SCHEMA: &str = r#"
-- Cached documents; timestamps are epoch milliseconds
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    collection_id TEXT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    base_content TEXT NOT NULL DEFAULT '',
    version INTEGER NOT NULL,
    last_modified INTEGER NOT NULL,
    sync_status TEXT NOT NULL,
    local_changes TEXT NOT NULL DEFAULT '[]',
    vector_clock TEXT NOT NULL DEFAULT '{}',
    conflict TEXT,
    history TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    size_bytes INTEGER NOT NULL
);

-- Outbound actions; seq breaks ties between equal creation times
CREATE TABLE IF NOT EXISTS actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    priority TEXT NOT NULL DEFAULT 'normal',
    priority_rank INTEGER NOT NULL DEFAULT 2
);

CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Singleton row
CREATE TABLE IF NOT EXISTS sync_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    node_id TEXT NOT NULL,
    last_sync_time INTEGER,
    vector_clock TEXT NOT NULL DEFAULT '{}',
    conflict_strategy TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(sync_status, last_modified);
CREATE INDEX IF NOT EXISTS idx_actions_queue ON actions(status, priority_rank, created_at, seq);
CREATE INDEX IF NOT EXISTS idx_media_created ON media(created_at);
"#;

/// Run schema creation and all migrations on a database connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_action_retry_columns(conn)?;
    migrate_add_document_history_column(conn)?;
    Ok(())
}

/// Migration: Add the rebase history column to the documents table.
fn migrate_add_document_history_column(conn: &Connection) -> Result<()> {
    let has_column: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('documents') WHERE name = 'history'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);
    if !has_column {
        conn.execute(
            "ALTER TABLE documents ADD COLUMN history TEXT NOT NULL DEFAULT '[]'",
            [],
        )?;
    }
    Ok(())
}

/// Migration: Add backoff bookkeeping columns to the actions table.
fn migrate_add_action_retry_columns(conn: &Connection) -> Result<()> {
    for column in ["next_attempt_at INTEGER", "last_error TEXT"] {
        let name = column.split(' ').next().unwrap_or(column);
        let has_column: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('actions') WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_column {
            conn.execute(&format!("ALTER TABLE actions ADD COLUMN {column}"), [])?;
        }
    }
    Ok(())
}

/// Storage ceilings enforced on writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quota {
    pub max_document_bytes: u64,
    pub max_media_bytes: u64,
    pub max_actions: u64,
}

impl Default for Quota {
    fn default() -> Self {
        Quota {
            max_document_bytes: 500 * 1024 * 1024,
            max_media_bytes: 1024 * 1024 * 1024,
            max_actions: 10_000,
        }
    }
}

/// What the backing storage can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// False when the store degraded to memory-only.
    pub persistent: bool,
}

/// Rows removed by an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub documents: usize,
    pub media: usize,
    pub actions: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.documents + self.media + self.actions
    }
}

/// Number of queued actions per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

impl ActionCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}

/// Who is writing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOrigin {
    /// An edit on this client: stamp, bump version, mark pending.
    Local,
    /// State received from or confirmed by the remote authority.
    Sync,
}

/// Parse a string value from the database, returning a rusqlite error on parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| corrupted(format!("invalid value '{value}' in column '{column}'")))
}

/// Parse a JSON column from the database.
fn parse_json<T: DeserializeOwned>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(value)
        .map_err(|e| corrupted(format!("invalid JSON in column '{column}': {e}")))
}

fn corrupted(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(Error::CorruptedData(message)),
    )
}

const DOCUMENT_COLUMNS: &str = "id, workspace_id, collection_id, title, content, base_content,
     version, last_modified, sync_status, local_changes, vector_clock, conflict, metadata,
     history";

fn document_from_row(row: &Row<'_>) -> std::result::Result<CachedDocument, rusqlite::Error> {
    let status: String = row.get(8)?;
    let changes: String = row.get(9)?;
    let clock: String = row.get(10)?;
    let conflict: Option<String> = row.get(11)?;
    let metadata: String = row.get(12)?;
    let history: String = row.get(13)?;

    Ok(CachedDocument {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        collection_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        base_content: row.get(5)?,
        version: row.get(6)?,
        last_modified: from_millis(row.get(7)?),
        sync_status: parse_db(&status, "sync_status")?,
        local_changes: parse_json(&changes, "local_changes")?,
        vector_clock: parse_json(&clock, "vector_clock")?,
        conflict: conflict
            .map(|c| parse_json(&c, "conflict"))
            .transpose()?,
        history: parse_json(&history, "history")?,
        metadata: parse_json(&metadata, "metadata")?,
    })
}

const ACTION_COLUMNS: &str = "id, resource_id, payload, created_at, retry_count, status,
     priority, next_attempt_at, last_error";

fn action_from_row(row: &Row<'_>) -> std::result::Result<QueuedAction, rusqlite::Error> {
    let payload: String = row.get(2)?;
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let next_attempt_at: Option<i64> = row.get(7)?;

    Ok(QueuedAction {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        payload: parse_json(&payload, "payload")?,
        created_at: from_millis(row.get(3)?),
        retry_count: row.get(4)?,
        status: parse_db(&status, "status")?,
        priority: parse_db(&priority, "priority")?,
        next_attempt_at: next_attempt_at.map(from_millis),
        last_error: row.get(8)?,
    })
}

/// Durable, transactional storage for the sync subsystem.
pub struct LocalStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn ClockSource>,
    quota: Quota,
    capabilities: Capabilities,
}

impl LocalStore {
    /// Open a store at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn, true))
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn, false))
    }

    /// Open a store at the given path, degrading to memory-only storage
    /// when the path cannot be used.
    pub fn open_or_memory(path: &Path) -> Result<Self> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "storage unavailable, falling back to memory-only store");
                Self::open_in_memory()
            }
        }
    }

    fn from_connection(conn: Connection, persistent: bool) -> Self {
        LocalStore {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            quota: Quota::default(),
            capabilities: Capabilities { persistent },
        }
    }

    /// Replaces the clock used to stamp writes.
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the storage ceilings.
    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = quota;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- documents ---------------------------------------------------------

    /// Get a document by ID.
    pub fn get_document(&self, id: &str) -> Result<CachedDocument> {
        self.find_document(id)?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Get a document by ID, returning `None` when it is not cached.
    pub fn find_document(&self, id: &str) -> Result<Option<CachedDocument>> {
        find_document_in(&self.conn(), id)
    }

    /// Write a document edited on this client.
    ///
    /// Stamps `last_modified`, bumps `version`, and marks the document
    /// `pending` when its content changed while it was `synced`.
    pub fn put_document(&self, doc: &CachedDocument) -> Result<CachedDocument> {
        self.write_document(doc, WriteOrigin::Local)
    }

    /// Write a document as received from or confirmed by the remote
    /// authority. Timestamps are kept; `version` never decreases.
    pub fn put_synced_document(&self, doc: &CachedDocument) -> Result<CachedDocument> {
        self.write_document(doc, WriteOrigin::Sync)
    }

    fn write_document(&self, doc: &CachedDocument, origin: WriteOrigin) -> Result<CachedDocument> {
        let now = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing = find_document_in(&tx, &doc.id)?;

        let mut doc = doc.clone();
        match (origin, &existing) {
            (WriteOrigin::Local, Some(prev)) => {
                doc.last_modified = now;
                doc.version = doc.version.max(prev.version) + 1;
                if prev.sync_status == SyncStatus::Synced && prev.content != doc.content {
                    doc.sync_status = SyncStatus::Pending;
                }
            }
            (WriteOrigin::Local, None) => {
                doc.last_modified = now;
                doc.version = doc.version.max(0) + 1;
            }
            (WriteOrigin::Sync, Some(prev)) => {
                doc.version = doc.version.max(prev.version);
            }
            (WriteOrigin::Sync, None) => {}
        }
        doc.normalize();

        if let Err(e) = check_document_quota(&tx, &self.quota, &doc) {
            if !e.is_quota() {
                return Err(e);
            }
            let evicted = evict_documents(&tx, &self.quota, doc.size_bytes() as u64, Some(&doc.id))?;
            warn!(document = %doc.id, evicted, "document cache over quota, evicted synced documents");
            check_document_quota(&tx, &self.quota, &doc)?;
        }

        upsert_document(&tx, &doc)?;
        tx.commit()?;
        debug!(document = %doc.id, version = doc.version, status = %doc.sync_status, "document written");
        Ok(doc)
    }

    /// Delete a document. Returns true if it existed.
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Delete several documents in one transaction. Returns how many existed.
    pub fn delete_documents(&self, ids: &[&str]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// List documents, optionally filtered by status, oldest change first.
    pub fn list_documents(&self, status: Option<SyncStatus>) -> Result<Vec<CachedDocument>> {
        let conn = self.conn();
        let docs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE sync_status = ?1 ORDER BY last_modified, id"
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], document_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY last_modified, id"
                ))?;
                let rows = stmt
                    .query_map([], document_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(docs)
    }

    /// Documents with unreconciled local changes.
    pub fn pending_documents(&self) -> Result<Vec<CachedDocument>> {
        self.list_documents(Some(SyncStatus::Pending))
    }

    /// Total bytes held by cached documents.
    pub fn document_bytes(&self) -> Result<u64> {
        total_document_bytes(&self.conn(), None)
    }

    // -- actions -----------------------------------------------------------

    /// Persist a new pending action and return it with its assigned ID.
    pub fn enqueue_action(&self, request: ActionRequest) -> Result<QueuedAction> {
        let created_at = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if let Err(e) = check_action_quota(&tx, &self.quota) {
            if !e.is_quota() {
                return Err(e);
            }
            let evicted = evict_actions(&tx, &self.quota, 1)?;
            warn!(evicted, "action queue over quota, evicted failed actions");
            check_action_quota(&tx, &self.quota)?;
        }

        let kind = request.payload.kind();
        let id = generate_unique_id(&request.resource_id, kind, &created_at, |candidate| {
            action_exists_in(&tx, candidate).unwrap_or(true)
        });
        let action = QueuedAction::from_request(id, request, created_at);
        insert_action(&tx, &action)?;
        tx.commit()?;
        debug!(action = %action.id, kind = %kind, resource = %action.resource_id, "action enqueued");
        Ok(action)
    }

    /// Get an action by ID.
    pub fn get_action(&self, id: &str) -> Result<QueuedAction> {
        self.find_action(id)?
            .ok_or_else(|| Error::ActionNotFound(id.to_string()))
    }

    /// Get an action by ID, returning `None` when it does not exist.
    pub fn find_action(&self, id: &str) -> Result<Option<QueuedAction>> {
        let conn = self.conn();
        let action = conn
            .query_row(
                &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
                params![id],
                action_from_row,
            )
            .optional()?;
        Ok(action)
    }

    /// List actions in delivery order: priority, then creation time.
    pub fn list_actions(&self, status: Option<ActionStatus>) -> Result<Vec<QueuedAction>> {
        let conn = self.conn();
        let order = "ORDER BY priority_rank, created_at, seq";
        let actions = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTION_COLUMNS} FROM actions WHERE status = ?1 {order}"
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], action_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ACTION_COLUMNS} FROM actions {order}"))?;
                let rows = stmt
                    .query_map([], action_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(actions)
    }

    /// Pending actions in delivery order.
    pub fn pending_actions(&self) -> Result<Vec<QueuedAction>> {
        self.list_actions(Some(ActionStatus::Pending))
    }

    /// Pending actions whose backoff has elapsed, in delivery order.
    pub fn due_actions(&self, now: DateTime<Utc>) -> Result<Vec<QueuedAction>> {
        Ok(self
            .pending_actions()?
            .into_iter()
            .filter(|a| a.is_due(now))
            .collect())
    }

    /// Write back an action's mutable fields.
    pub fn update_action(&self, action: &QueuedAction) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE actions SET retry_count = ?1, status = ?2, next_attempt_at = ?3, last_error = ?4
             WHERE id = ?5",
            params![
                action.retry_count,
                action.status.as_str(),
                action.next_attempt_at.map(|t| t.timestamp_millis()),
                action.last_error,
                action.id,
            ],
        )?;
        if affected == 0 {
            return Err(Error::ActionNotFound(action.id.clone()));
        }
        Ok(())
    }

    /// Set an action's status.
    pub fn set_action_status(&self, id: &str, status: ActionStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE actions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if affected == 0 {
            return Err(Error::ActionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete an action. Returns true if it existed.
    pub fn delete_action(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM actions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Delete every action with the given status.
    pub fn delete_actions_with_status(&self, status: ActionStatus) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM actions WHERE status = ?1",
            params![status.as_str()],
        )?;
        Ok(affected)
    }

    /// Return actions interrupted mid-delivery to `pending`.
    pub fn reset_processing_actions(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE actions SET status = 'pending' WHERE status = 'processing'",
            [],
        )?;
        if affected > 0 {
            info!(count = affected, "recovered interrupted actions");
        }
        Ok(affected)
    }

    /// Count actions per status.
    pub fn action_counts(&self) -> Result<ActionCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM actions GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_db::<ActionStatus>(&status, "status")?, count as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = ActionCounts::default();
        for (status, count) in rows {
            match status {
                ActionStatus::Pending => counts.pending = count,
                ActionStatus::Processing => counts.processing = count,
                ActionStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    // -- preferences -------------------------------------------------------

    /// Get a preference value.
    pub fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    /// Set a preference value.
    pub fn set_preference(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    /// Delete a preference. Returns true if it existed.
    pub fn delete_preference(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// All preferences, sorted by key.
    pub fn list_preferences(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM preferences ORDER BY key")?;
        let prefs = stmt
            .query_map([], |row| {
                let value: String = row.get(1)?;
                Ok((row.get(0)?, parse_json(&value, "value")?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prefs)
    }

    // -- sync metadata -----------------------------------------------------

    /// Load the sync bookkeeping row, if this client has one.
    pub fn sync_metadata(&self) -> Result<Option<SyncMetadata>> {
        find_sync_metadata_in(&self.conn())
    }

    /// Replace the sync bookkeeping row.
    pub fn put_sync_metadata(&self, meta: &SyncMetadata) -> Result<()> {
        upsert_sync_metadata(&self.conn(), meta)
    }

    // -- media cache -------------------------------------------------------

    /// Cache a media blob, optionally expiring after `ttl`.
    pub fn put_media(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now();
        let expires_at = ttl.map(|ttl| (now + ttl).timestamp_millis());
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if let Err(e) = check_media_quota(&tx, &self.quota, key, data.len() as u64) {
            if !e.is_quota() {
                return Err(e);
            }
            let evicted = evict_media(&tx, &self.quota, now, data.len() as u64, Some(key))?;
            warn!(evicted, "media cache over quota, evicted entries");
            check_media_quota(&tx, &self.quota, key, data.len() as u64)?;
        }

        tx.execute(
            "INSERT INTO media (key, data, size_bytes, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data,
                 size_bytes = excluded.size_bytes, created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
            params![key, data, data.len() as i64, now.timestamp_millis(), expires_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get a cached media blob. Expired entries read as absent.
    pub fn get_media(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now().timestamp_millis();
        let data = self
            .conn()
            .query_row(
                "SELECT data FROM media WHERE key = ?1
                 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    /// Delete a media entry. Returns true if it existed.
    pub fn delete_media(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM media WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Total bytes held by the media cache.
    pub fn media_bytes(&self) -> Result<u64> {
        total_media_bytes(&self.conn(), None)
    }

    // -- quota -------------------------------------------------------------

    /// Run a full eviction pass against the configured ceilings.
    pub fn enforce_quota(&self) -> Result<EvictionReport> {
        let now = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let report = EvictionReport {
            documents: evict_documents(&tx, &self.quota, 0, None)?,
            media: evict_media(&tx, &self.quota, now, 0, None)?,
            actions: evict_actions(&tx, &self.quota, 0)?,
        };
        tx.commit()?;
        if report.total() > 0 {
            info!(
                documents = report.documents,
                media = report.media,
                actions = report.actions,
                "quota eviction pass"
            );
        }
        Ok(report)
    }
}

pub(crate) fn find_document_in(conn: &Connection, id: &str) -> Result<Option<CachedDocument>> {
    let doc = conn
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            document_from_row,
        )
        .optional()?;
    Ok(doc)
}

pub(crate) fn upsert_document(conn: &Connection, doc: &CachedDocument) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (id, workspace_id, collection_id, title, content, base_content,
             version, last_modified, sync_status, local_changes, vector_clock, conflict,
             metadata, size_bytes, history)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
             workspace_id = excluded.workspace_id,
             collection_id = excluded.collection_id,
             title = excluded.title,
             content = excluded.content,
             base_content = excluded.base_content,
             version = excluded.version,
             last_modified = excluded.last_modified,
             sync_status = excluded.sync_status,
             local_changes = excluded.local_changes,
             vector_clock = excluded.vector_clock,
             conflict = excluded.conflict,
             metadata = excluded.metadata,
             size_bytes = excluded.size_bytes,
             history = excluded.history",
        params![
            doc.id,
            doc.workspace_id,
            doc.collection_id,
            doc.title,
            doc.content,
            doc.base_content,
            doc.version,
            doc.last_modified.timestamp_millis(),
            doc.sync_status.as_str(),
            serde_json::to_string(&doc.local_changes)?,
            serde_json::to_string(&doc.vector_clock)?,
            doc.conflict.as_ref().map(serde_json::to_string).transpose()?,
            serde_json::to_string(&doc.metadata)?,
            doc.size_bytes() as i64,
            serde_json::to_string(&doc.history)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_action(conn: &Connection, action: &QueuedAction) -> Result<()> {
    conn.execute(
        "INSERT INTO actions (id, kind, resource_type, resource_id, payload, created_at,
             retry_count, status, priority, priority_rank, next_attempt_at, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            action.id,
            action.kind().as_str(),
            action.resource_type().as_str(),
            action.resource_id,
            serde_json::to_string(&action.payload)?,
            action.created_at.timestamp_millis(),
            action.retry_count,
            action.status.as_str(),
            action.priority.as_str(),
            action.priority.rank(),
            action.next_attempt_at.map(|t| t.timestamp_millis()),
            action.last_error,
        ],
    )?;
    Ok(())
}

fn action_exists_in(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM actions WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn find_sync_metadata_in(conn: &Connection) -> Result<Option<SyncMetadata>> {
    let meta = conn
        .query_row(
            "SELECT node_id, last_sync_time, vector_clock, conflict_strategy
             FROM sync_metadata WHERE id = 1",
            [],
            |row| {
                let last_sync: Option<i64> = row.get(1)?;
                let clock: String = row.get(2)?;
                let strategy: String = row.get(3)?;
                Ok(SyncMetadata {
                    node_id: row.get(0)?,
                    last_sync_time: last_sync.map(from_millis),
                    vector_clock: parse_json(&clock, "vector_clock")?,
                    conflict_strategy: parse_db(&strategy, "conflict_strategy")?,
                })
            },
        )
        .optional()?;
    Ok(meta)
}

pub(crate) fn upsert_sync_metadata(conn: &Connection, meta: &SyncMetadata) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_metadata (id, node_id, last_sync_time, vector_clock, conflict_strategy)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET node_id = excluded.node_id,
             last_sync_time = excluded.last_sync_time,
             vector_clock = excluded.vector_clock,
             conflict_strategy = excluded.conflict_strategy",
        params![
            meta.node_id,
            meta.last_sync_time.map(|t| t.timestamp_millis()),
            serde_json::to_string(&meta.vector_clock)?,
            meta.conflict_strategy.as_str(),
        ],
    )?;
    Ok(())
}

fn total_document_bytes(conn: &Connection, exclude: Option<&str>) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM documents WHERE id IS NOT ?1",
        params![exclude],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

fn total_media_bytes(conn: &Connection, exclude: Option<&str>) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM media WHERE key IS NOT ?1",
        params![exclude],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

fn action_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn check_document_quota(conn: &Connection, quota: &Quota, doc: &CachedDocument) -> Result<()> {
    let others = total_document_bytes(conn, Some(&doc.id))?;
    if others + doc.size_bytes() as u64 > quota.max_document_bytes {
        return Err(Error::QuotaExceeded {
            collection: "documents",
        });
    }
    Ok(())
}

fn check_action_quota(conn: &Connection, quota: &Quota) -> Result<()> {
    if action_count(conn)? + 1 > quota.max_actions {
        return Err(Error::QuotaExceeded {
            collection: "actions",
        });
    }
    Ok(())
}

fn check_media_quota(conn: &Connection, quota: &Quota, key: &str, incoming: u64) -> Result<()> {
    if total_media_bytes(conn, Some(key))? + incoming > quota.max_media_bytes {
        return Err(Error::QuotaExceeded { collection: "media" });
    }
    Ok(())
}

/// Evict the oldest synced documents until `incoming` more bytes fit.
fn evict_documents(
    conn: &Connection,
    quota: &Quota,
    incoming: u64,
    keep: Option<&str>,
) -> Result<usize> {
    let mut evicted = 0;
    while total_document_bytes(conn, keep)? + incoming > quota.max_document_bytes {
        let oldest: Option<String> = conn
            .query_row(
                "SELECT id FROM documents WHERE sync_status = 'synced' AND id IS NOT ?1
                 ORDER BY last_modified, id LIMIT 1",
                params![keep],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = oldest else { break };
        conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        debug!(document = %id, "evicted synced document");
        evicted += 1;
    }
    Ok(evicted)
}

/// Evict expired media, then the oldest entries until `incoming` more bytes fit.
fn evict_media(
    conn: &Connection,
    quota: &Quota,
    now: DateTime<Utc>,
    incoming: u64,
    keep: Option<&str>,
) -> Result<usize> {
    let mut evicted = conn.execute(
        "DELETE FROM media WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![now.timestamp_millis()],
    )?;
    while total_media_bytes(conn, keep)? + incoming > quota.max_media_bytes {
        let removed = conn.execute(
            "DELETE FROM media WHERE key = (
                 SELECT key FROM media WHERE key IS NOT ?1 ORDER BY created_at, key LIMIT 1)",
            params![keep],
        )?;
        if removed == 0 {
            break;
        }
        evicted += removed;
    }
    Ok(evicted)
}

/// Evict the oldest failed actions until `incoming` more actions fit.
fn evict_actions(conn: &Connection, quota: &Quota, incoming: u64) -> Result<usize> {
    let mut evicted = 0;
    while action_count(conn)? + incoming > quota.max_actions {
        let removed = conn.execute(
            "DELETE FROM actions WHERE seq = (
                 SELECT seq FROM actions WHERE status = 'failed'
                 ORDER BY created_at, seq LIMIT 1)",
            [],
        )?;
        if removed == 0 {
            break;
        }
        evicted += removed;
    }
    Ok(evicted)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
