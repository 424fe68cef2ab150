//! Snapshot types for persisting and restoring memory store state.
//!
//! A snapshot holds committed rows only. Pending changes of open contexts are
//! not part of it.

use crate::{error::Result, EntityName, Error, MemoryStore, Record, Schema, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of committed store state.
///
/// Uses BTreeMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Schema version at time of snapshot
    pub schema_version: SchemaVersion,
    /// Next object key the store would hand out
    pub next_key: u64,
    /// Rows by entity, then by object key
    pub entities: BTreeMap<EntityName, BTreeMap<u64, Record>>,
}

impl StoreSnapshot {
    pub fn new(schema_version: SchemaVersion) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version,
            next_key: 1,
            entities: BTreeMap::new(),
        }
    }

    /// Add a record, keeping `next_key` ahead of every stored key.
    pub fn add_record(&mut self, record: Record) {
        self.next_key = self.next_key.max(record.id.key + 1);
        self.entities
            .entry(record.id.entity.clone())
            .or_default()
            .insert(record.id.key, record);
    }

    /// Count total records across all entities.
    pub fn record_count(&self) -> usize {
        self.entities.values().map(|rows| rows.len()).sum()
    }

    /// Validate the snapshot against a schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.schema_version != schema.version {
            return Err(Error::SchemaVersionMismatch {
                expected: schema.version,
                actual: self.schema_version,
            });
        }

        for (entity, rows) in &self.entities {
            let description = schema.require(entity)?;
            for (key, record) in rows {
                if record.id.key != *key || &record.id.entity != entity {
                    return Err(Error::InvalidSnapshot(format!(
                        "record {} filed under {entity}#{key}",
                        record.id
                    )));
                }
                if *key >= self.next_key {
                    return Err(Error::InvalidSnapshot(format!(
                        "record {} is not below next key {}",
                        record.id, self.next_key
                    )));
                }
                description.validate_payload(&record.payload)?;
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

impl MemoryStore {
    /// Export committed rows as a snapshot.
    pub fn export_snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version: state.schema.version,
            next_key: state.next_key,
            entities: state.rows.clone(),
        }
    }

    /// Replace committed rows with a snapshot's.
    ///
    /// Contexts opened before the import keep the objects they already
    /// registered; open fresh contexts to observe the imported state.
    pub fn import_snapshot(&self, snapshot: StoreSnapshot) -> Result<()> {
        let mut state = self.lock();
        snapshot.validate(&state.schema)?;

        state.next_key = state.next_key.max(snapshot.next_key);
        state.rows = snapshot.entities;

        tracing::debug!(
            rows = state.rows.values().map(BTreeMap::len).sum::<usize>(),
            "snapshot imported"
        );
        Ok(())
    }
}
