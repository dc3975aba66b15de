//! Audit error types
//!
//! Chain breaks are integrity violations and must never be silently
//! accepted; flush failures surface to observers while the affected
//! events stay queued.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Audit trail errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Persisting a batch failed; the batch has been requeued at the
    /// front of the pending queue.
    #[error("Audit batch persistence failed ({requeued} events requeued): {source}")]
    FlushFailed {
        requeued: usize,
        source: StoreError,
    },

    /// A persisted audit record does not deserialize.
    #[error("Corrupt audit record at '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Storage failure outside batch persistence (head lookup, scans).
    #[error("Audit storage failure: {0}")]
    Store(#[from] StoreError),

    /// Event serialization failure.
    #[error("Audit serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_failure_reports_requeued_count() {
        let err = AuditError::FlushFailed {
            requeued: 42,
            source: StoreError::all_tiers_failed("write", "audit/7"),
        };
        let text = err.to_string();
        assert!(text.contains("42 events requeued"));
        assert!(text.contains("LGR_STORE_ALL_TIERS_FAILED"));
    }
}
