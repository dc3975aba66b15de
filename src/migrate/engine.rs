//! Migration engine
//!
//! Per MIGRATIONS.md §3, each migration moves through
//! `Pending -> Applying -> Applied`, or `Applying -> RolledBack` on the
//! failure path. The engine owns the `migration/` keyspace exclusively;
//! nothing else writes those keys.

use std::sync::Arc;

use crate::observability::Logger;
use crate::store::FallbackRouter;

use super::errors::{MigrateError, MigratePhase, MigrateResult};
use super::record::{MigrationRecord, RollbackScript, MIGRATION_KEY_PREFIX};
use super::txn::MigrationTxn;

/// A registered schema migration.
///
/// `up` runs against a staged transaction; it must not touch storage
/// through any other path. The rollback script is recorded alongside the
/// migration and replayed mechanically on rollback.
pub trait Migration: Send + Sync {
    /// Strictly positive, unique among registered migrations. Gaps are
    /// fine.
    fn version(&self) -> u32;

    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// The forward operation.
    fn up(&self, txn: &mut MigrationTxn<'_>) -> MigrateResult<()>;

    /// The recorded inverse. Defaults to no inverse: rolling back such a
    /// migration only lowers the current version.
    fn rollback_script(&self) -> RollbackScript {
        RollbackScript::Noop
    }
}

/// Outcome of a `migrate()` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateSummary {
    /// Versions applied by this run, ascending. Empty when already
    /// current.
    pub applied: Vec<u32>,
    pub current_version: u32,
}

/// Outcome of a `rollback()` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackSummary {
    /// Versions rolled back by this run, descending.
    pub rolled_back: Vec<u32>,
    pub current_version: u32,
}

/// Applies registered migrations in version order through the fallback
/// router.
pub struct MigrationEngine {
    router: Arc<FallbackRouter>,
    logger: Logger,
    registered: Vec<Arc<dyn Migration>>,
}

impl MigrationEngine {
    pub fn new(router: Arc<FallbackRouter>, logger: Logger) -> Self {
        Self {
            router,
            logger: logger.for_subsystem("migrate"),
            registered: Vec::new(),
        }
    }

    /// Registers a migration. Duplicate versions are rejected.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> MigrateResult<()> {
        if self
            .registered
            .iter()
            .any(|m| m.version() == migration.version())
        {
            return Err(MigrateError::DuplicateVersion(migration.version()));
        }
        self.registered.push(migration);
        Ok(())
    }

    /// Loads persisted migration records, ascending by version.
    pub fn applied_records(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let entries = self.router.scan_prefix(MIGRATION_KEY_PREFIX)?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let record: MigrationRecord =
                serde_json::from_slice(&bytes).map_err(|e| MigrateError::CorruptRecord {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    /// The persisted current version: maximum applied version, 0 when no
    /// migration has ever run.
    pub fn current_version(&self) -> MigrateResult<u32> {
        Ok(self
            .applied_records()?
            .last()
            .map(|r| r.version)
            .unwrap_or(0))
    }

    /// Applies every registered migration with a version above the
    /// current one, ascending, fail-fast.
    ///
    /// A no-op (and `Ok`) when the current version already equals the
    /// highest registered version.
    pub fn migrate(&self) -> MigrateResult<MigrateSummary> {
        let current = self.current_version()?;
        let mut pending: Vec<&Arc<dyn Migration>> = self
            .registered
            .iter()
            .filter(|m| m.version() > current)
            .collect();
        pending.sort_by_key(|m| m.version());

        let mut applied = Vec::new();
        for migration in pending {
            let version = migration.version();
            let version_str = version.to_string();
            self.logger.info(
                "MIGRATION_APPLYING",
                &[("name", migration.name()), ("version", &version_str)],
            );

            let mut txn = MigrationTxn::new(&self.router);
            migration
                .up(&mut txn)
                .map_err(|e| MigrateError::MigrationFailed {
                    version,
                    phase: MigratePhase::Forward,
                    reason: e.to_string(),
                })?;

            // The record commits in the same transaction as the forward
            // operation: both land or neither does.
            let record = MigrationRecord::new(version, migration.rollback_script());
            let record_bytes =
                serde_json::to_vec(&record).map_err(|e| MigrateError::MigrationFailed {
                    version,
                    phase: MigratePhase::Commit,
                    reason: e.to_string(),
                })?;
            txn.write(record.key(), record_bytes);

            txn.commit().map_err(|e| {
                self.logger.error(
                    "MIGRATION_FAILED",
                    &[("version", &version_str), ("phase", "commit")],
                );
                MigrateError::MigrationFailed {
                    version,
                    phase: MigratePhase::Commit,
                    reason: e.to_string(),
                }
            })?;

            self.logger
                .info("MIGRATION_APPLIED", &[("version", &version_str)]);
            applied.push(version);
        }

        Ok(MigrateSummary {
            current_version: applied.last().copied().unwrap_or(current),
            applied,
        })
    }

    /// Rolls back every applied migration with a version above `target`,
    /// descending. A step failure re-raises immediately, leaving the
    /// current version at the last successfully rolled-back point.
    pub fn rollback(&self, target: u32) -> MigrateResult<RollbackSummary> {
        let mut records: Vec<MigrationRecord> = self
            .applied_records()?
            .into_iter()
            .filter(|r| r.version > target)
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.version));

        let mut rolled_back = Vec::new();
        for record in records {
            let version = record.version;
            let version_str = version.to_string();
            self.logger
                .info("MIGRATION_ROLLING_BACK", &[("version", &version_str)]);

            let mut txn = MigrationTxn::new(&self.router);
            self.stage_inverse(&mut txn, &record.rollback)
                .map_err(|e| MigrateError::RollbackFailed {
                    version,
                    phase: MigratePhase::Inverse,
                    reason: e.to_string(),
                })?;
            txn.delete(record.key());

            txn.commit().map_err(|e| MigrateError::RollbackFailed {
                version,
                phase: MigratePhase::Commit,
                reason: e.to_string(),
            })?;

            self.logger
                .info("MIGRATION_ROLLED_BACK", &[("version", &version_str)]);
            rolled_back.push(version);
        }

        Ok(RollbackSummary {
            rolled_back,
            current_version: self.current_version()?,
        })
    }

    fn stage_inverse(
        &self,
        txn: &mut MigrationTxn<'_>,
        script: &RollbackScript,
    ) -> MigrateResult<()> {
        match script {
            RollbackScript::Noop => {}
            RollbackScript::DeleteKeys { keys } => {
                for key in keys {
                    txn.delete(key.clone());
                }
            }
            RollbackScript::RestoreValues { entries } => {
                for entry in entries {
                    match &entry.value {
                        Some(value) => txn.write(entry.key.clone(), value.clone()),
                        None => txn.delete(entry.key.clone()),
                    }
                }
            }
        }
        Ok(())
    }
}
