//! Migration error types
//!
//! Migration failures must be distinguishable from ordinary runtime
//! errors: a failed migration halts startup schema evolution, so the
//! error carries the failed version and the phase it died in.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Which step of a migration application failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratePhase {
    /// The migration's forward operation.
    Forward,
    /// Executing a recorded inverse operation.
    Inverse,
    /// Committing the staged transaction.
    Commit,
}

impl std::fmt::Display for MigratePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigratePhase::Forward => write!(f, "forward"),
            MigratePhase::Inverse => write!(f, "inverse"),
            MigratePhase::Commit => write!(f, "commit"),
        }
    }
}

/// Migration and rollback errors.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Applying a pending migration failed; later migrations were not
    /// attempted.
    #[error("Migration v{version} failed during {phase}: {reason}")]
    MigrationFailed {
        version: u32,
        phase: MigratePhase,
        reason: String,
    },

    /// Rolling back an applied migration failed; the current version
    /// stays at the last successfully rolled-back point.
    #[error("Rollback of migration v{version} failed during {phase}: {reason}")]
    RollbackFailed {
        version: u32,
        phase: MigratePhase,
        reason: String,
    },

    /// Two registered migrations share a version.
    #[error("Duplicate migration version v{0}")]
    DuplicateVersion(u32),

    /// A persisted migration record does not deserialize.
    #[error("Corrupt migration record at '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Storage failure outside a single migration's transaction.
    #[error("Migration storage failure: {0}")]
    Store(#[from] StoreError),

    /// Failure raised by migration code itself.
    #[error("{0}")]
    Custom(String),
}

impl MigrateError {
    /// Shortcut for failures inside migration authors' forward code.
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_version_and_phase() {
        let err = MigrateError::MigrationFailed {
            version: 7,
            phase: MigratePhase::Forward,
            reason: "seed data missing".into(),
        };
        let text = err.to_string();
        assert!(text.contains("v7"));
        assert!(text.contains("forward"));
        assert!(text.contains("seed data missing"));
    }
}
