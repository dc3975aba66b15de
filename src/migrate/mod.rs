//! Schema migration engine
//!
//! Per MIGRATIONS.md, schema evolution runs once at startup through
//! ordered, versioned migrations:
//!
//! - Versions form a strictly increasing, gap-tolerant sequence; the
//!   current version equals the maximum applied version (0 when none)
//! - Each application is transactional: forward operation and the
//!   migration record commit together or not at all
//! - A failure halts remaining pending migrations (fail-fast)
//! - Rollback replays recorded inverse operations in descending version
//!   order; a rollback failure leaves the current version at the last
//!   successfully rolled-back point
//! - Records are immutable once written; rollback deletes the record
//!   rather than mutating history

mod engine;
mod errors;
mod record;
mod txn;

pub use engine::{Migration, MigrationEngine, MigrateSummary, RollbackSummary};
pub use errors::{MigrateError, MigratePhase, MigrateResult};
pub use record::{MigrationRecord, RestoreEntry, RollbackScript, MIGRATION_KEY_PREFIX};
pub use txn::MigrationTxn;
