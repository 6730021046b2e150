// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JSON backup and restore of the local store.

use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::action::QueuedAction;
use crate::document::CachedDocument;
use crate::error::{Error, Result};
use crate::protocol::SyncMetadata;
use crate::store::{insert_action, upsert_document, upsert_sync_metadata, LocalStore};

/// Format version written by [`LocalStore::export_snapshot`].
pub const SNAPSHOT_VERSION: &str = "1.0";

/// A stored preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub key: String,
    pub value: serde_json::Value,
}

/// Full copy of the durable local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    #[serde(default)]
    pub documents: Vec<CachedDocument>,
    #[serde(default)]
    pub actions: Vec<QueuedAction>,
    #[serde(default)]
    pub preferences: Vec<PreferenceEntry>,
    #[serde(default)]
    pub sync_metadata: Vec<SyncMetadata>,
}

impl Snapshot {
    /// Returns an error unless this snapshot's major version matches ours.
    pub fn check_version(&self) -> Result<()> {
        let major = |v: &str| v.split('.').next().unwrap_or_default().trim().to_string();
        let expected = major(SNAPSHOT_VERSION);
        if major(&self.version) != expected || self.version.trim().is_empty() {
            return Err(Error::IncompatibleSnapshot {
                found: self.version.clone(),
                expected,
            });
        }
        Ok(())
    }

    /// Reads a snapshot from a JSON stream.
    pub fn read_from(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(reader))?)
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::read_from(std::fs::File::open(path)?)
    }

    /// Writes a snapshot file, replacing any existing one.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.write_to(std::fs::File::create(path)?)
    }
}

impl LocalStore {
    /// Copy documents, actions, preferences and sync metadata.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let documents = self.list_documents(None)?;
        let actions = self.list_actions(None)?;
        let preferences = self
            .list_preferences()?
            .into_iter()
            .map(|(key, value)| PreferenceEntry { key, value })
            .collect();
        let sync_metadata = self.sync_metadata()?.into_iter().collect();

        Ok(Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            documents,
            actions,
            preferences,
            sync_metadata,
        })
    }

    /// Replace all local state with a snapshot's contents.
    ///
    /// Runs in one transaction; on error nothing changes. The media cache is
    /// cleared.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.check_version()?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM documents;
             DELETE FROM actions;
             DELETE FROM preferences;
             DELETE FROM sync_metadata;
             DELETE FROM media;",
        )?;

        for doc in &snapshot.documents {
            let mut doc = doc.clone();
            doc.normalize();
            upsert_document(&tx, &doc)?;
        }
        for action in &snapshot.actions {
            insert_action(&tx, action)?;
        }
        for pref in &snapshot.preferences {
            tx.execute(
                "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
                rusqlite::params![pref.key, serde_json::to_string(&pref.value)?],
            )?;
        }
        if let Some(meta) = snapshot.sync_metadata.last() {
            upsert_sync_metadata(&tx, meta)?;
        }
        tx.commit()?;

        info!(
            documents = snapshot.documents.len(),
            actions = snapshot.actions.len(),
            preferences = snapshot.preferences.len(),
            sync_metadata = !snapshot.sync_metadata.is_empty(),
            "snapshot imported"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
