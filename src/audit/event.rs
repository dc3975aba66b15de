//! Audit event records
//!
//! A draft is what callers hand to the ledger at mutation time; the
//! sequence number, chain hashes and algorithm tag are assigned by the
//! flush routine so the chain order matches persistence order exactly.
//! Persisted events are immutable and retained forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::hash::{canonical_json, HashAlgorithm};

/// Keyspace prefix owned exclusively by the audit ledger.
pub const AUDIT_KEY_PREFIX: &str = "audit/";

/// Chain-head pointer key.
pub const AUDIT_HEAD_KEY: &str = "audit/head";

/// A not-yet-persisted audit event.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub change_payload: Value,
    pub context_metadata: Value,
    /// Critical events trigger an immediate flush instead of waiting for
    /// the periodic timer.
    pub critical: bool,
}

impl AuditDraft {
    /// Create a draft for a mutating action.
    pub fn new(
        action: impl Into<String>,
        actor_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        change_payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.into(),
            actor_id: actor_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            change_payload,
            context_metadata: Value::Null,
            critical: false,
        }
    }

    /// Attach context metadata.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context_metadata = context;
        self
    }

    /// Mark this event critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Canonical content string the chain hash covers.
    ///
    /// Exactly these five fields, canonically rendered; ids and context
    /// metadata are deliberately outside the hash so re-persisting an
    /// identical mutation produces an identical hash.
    pub fn hash_content(&self) -> String {
        let content = serde_json::json!({
            "action": self.action,
            "entity_type": self.entity_type,
            "entity_id": self.entity_id,
            "change_payload": self.change_payload,
            "timestamp": self.timestamp.to_rfc3339(),
        });
        canonical_json(&content)
    }
}

/// A persisted, chained audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Position in the chain, starting at 1.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub change_payload: Value,
    pub changes_hash: String,
    /// `None` only for the chain's first event.
    pub previous_hash: Option<String>,
    pub context_metadata: Value,
    pub algorithm: HashAlgorithm,
}

impl AuditEvent {
    /// Storage key for this event.
    pub fn key(&self) -> String {
        Self::key_for_sequence(self.sequence)
    }

    /// Storage key for a given sequence number.
    pub fn key_for_sequence(sequence: u64) -> String {
        format!("{}{:016}", AUDIT_KEY_PREFIX, sequence)
    }

    /// Canonical content string the chain hash covers.
    pub fn hash_content(&self) -> String {
        let content = serde_json::json!({
            "action": self.action,
            "entity_type": self.entity_type,
            "entity_id": self.entity_id,
            "change_payload": self.change_payload,
            "timestamp": self.timestamp.to_rfc3339(),
        });
        canonical_json(&content)
    }
}

/// Persisted chain-head pointer: the last event's sequence and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence: u64,
    pub changes_hash: String,
}
