//! Persisted migration records
//!
//! One record per applied migration, keyed `migration/<version>` with a
//! zero-padded version so lexical key order equals numeric order. The
//! record stores the inverse operation verbatim; rollback executes it
//! mechanically with no knowledge of what the migration did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keyspace prefix owned exclusively by the migration engine.
pub const MIGRATION_KEY_PREFIX: &str = "migration/";

/// One entry of a value-restoring rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreEntry {
    pub key: String,
    /// `None` restores absence (the key did not exist before the
    /// migration).
    pub value: Option<Vec<u8>>,
}

/// Recorded inverse of a migration's forward operation.
///
/// A closed set of mechanical operations: the rollback path never runs
/// migration code, only replays these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RollbackScript {
    /// No inverse was supplied; rolling back only deletes the record.
    Noop,
    /// Delete keys the migration created.
    DeleteKeys { keys: Vec<String> },
    /// Restore keys to their pre-migration values (or absence).
    RestoreValues { entries: Vec<RestoreEntry> },
}

/// An applied migration, immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: u32,
    pub applied_at: DateTime<Utc>,
    pub rollback: RollbackScript,
}

impl MigrationRecord {
    pub fn new(version: u32, rollback: RollbackScript) -> Self {
        Self {
            version,
            applied_at: Utc::now(),
            rollback,
        }
    }

    /// Storage key for this record.
    pub fn key(&self) -> String {
        Self::key_for_version(self.version)
    }

    /// Storage key for a given version.
    pub fn key_for_version(version: u32) -> String {
        format!("{}{:010}", MIGRATION_KEY_PREFIX, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_padding_preserves_order() {
        let low = MigrationRecord::key_for_version(2);
        let high = MigrationRecord::key_for_version(10);
        assert!(low < high);
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = MigrationRecord::new(
            3,
            RollbackScript::RestoreValues {
                entries: vec![RestoreEntry {
                    key: "chart/1000".into(),
                    value: None,
                }],
            },
        );
        let bytes = serde_json::to_vec(&record).unwrap();
        let decoded: MigrationRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
