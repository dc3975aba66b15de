//! Migration Engine Invariant Tests
//!
//! Tests for the transactional migration engine:
//! - `migrate()` is idempotent: a second run with no new registrations
//!   applies nothing and leaves the current version unchanged
//! - A forward failure leaves the current version unchanged and no
//!   partial record persisted
//! - Rollback replays recorded inverses in descending version order

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ledgercore::migrate::{
    MigrateError, MigratePhase, MigrateResult, Migration, MigrationEngine, MigrationTxn,
    RestoreEntry, RollbackScript,
};
use ledgercore::observability::{Logger, Severity};
use ledgercore::store::{
    FallbackRouter, FileTier, LogTier, MemTier, StorageTier, StoreError, StoreResult,
    TierCapabilities,
};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn quiet_logger() -> Logger {
    Logger::new("test", Severity::Fatal)
}

fn disk_router(dir: &TempDir) -> Arc<FallbackRouter> {
    let tiers: Vec<Arc<dyn StorageTier>> = vec![
        Arc::new(FileTier::open(dir.path(), 1).unwrap()),
        Arc::new(LogTier::open(dir.path(), 2).unwrap()),
        Arc::new(MemTier::new(3, None)),
    ];
    Arc::new(FallbackRouter::new(tiers, quiet_logger()))
}

/// An in-memory tier whose writes and deletes can be made to fail.
struct BalkyTier {
    name: &'static str,
    priority: u8,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl BalkyTier {
    fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            data: Mutex::new(HashMap::new()),
        }
    }

    fn seed(&self, key: &str, value: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
    }
}

impl StorageTier for BalkyTier {
    fn name(&self) -> &'static str {
        self.name
    }
    fn priority(&self) -> u8 {
        self.priority
    }
    fn probe(&self) -> bool {
        true
    }
    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities::all()
    }
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }
    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write_failed_no_source("writes rejected"));
        }
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
    fn delete(&self, key: &str) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::write_failed_no_source("deletes rejected"));
        }
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.data.lock().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// v1: create the customers table.
struct CreateCustomers;

impl Migration for CreateCustomers {
    fn version(&self) -> u32 {
        1
    }
    fn name(&self) -> &str {
        "create_customers"
    }
    fn up(&self, txn: &mut MigrationTxn<'_>) -> MigrateResult<()> {
        txn.write(
            "schema/customers".to_string(),
            br#"{"columns":["id","name","region"]}"#.to_vec(),
        );
        Ok(())
    }
    fn rollback_script(&self) -> RollbackScript {
        RollbackScript::DeleteKeys {
            keys: vec!["schema/customers".to_string()],
        }
    }
}

/// v2: create the tax_config table and seed five region rates.
struct CreateTaxConfig;

const TAX_REGIONS: [(&str, f64); 5] = [
    ("US-CA", 0.0725),
    ("US-NY", 0.04),
    ("DE", 0.19),
    ("FR", 0.20),
    ("JP", 0.10),
];

impl Migration for CreateTaxConfig {
    fn version(&self) -> u32 {
        2
    }
    fn name(&self) -> &str {
        "create_tax_config"
    }
    fn up(&self, txn: &mut MigrationTxn<'_>) -> MigrateResult<()> {
        txn.write(
            "schema/tax_config".to_string(),
            br#"{"columns":["region","rate"]}"#.to_vec(),
        );
        for (region, rate) in TAX_REGIONS {
            txn.write(
                format!("tax_config/{}", region),
                serde_json::json!({"rate": rate}).to_string().into_bytes(),
            );
        }
        Ok(())
    }
    fn rollback_script(&self) -> RollbackScript {
        let mut keys = vec!["schema/tax_config".to_string()];
        keys.extend(TAX_REGIONS.iter().map(|(region, _)| format!("tax_config/{}", region)));
        RollbackScript::DeleteKeys { keys }
    }
}

/// A migration that writes then fails partway through.
struct FailsHalfway;

impl Migration for FailsHalfway {
    fn version(&self) -> u32 {
        3
    }
    fn name(&self) -> &str {
        "fails_halfway"
    }
    fn up(&self, txn: &mut MigrationTxn<'_>) -> MigrateResult<()> {
        txn.write("schema/half_done".to_string(), b"{}".to_vec());
        Err(MigrateError::custom("constraint violation on backfill"))
    }
}

// =============================================================================
// Scenario: two ordered migrations from a fresh store
// =============================================================================

#[test]
fn test_two_migrations_apply_in_order_with_two_records() {
    let dir = TempDir::new().unwrap();
    let router = disk_router(&dir);
    let mut engine = MigrationEngine::new(router.clone(), quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(CreateTaxConfig)).unwrap();

    assert_eq!(engine.current_version().unwrap(), 0);
    let summary = engine.migrate().unwrap();

    assert_eq!(summary.applied, vec![1, 2]);
    assert_eq!(summary.current_version, 2);
    assert_eq!(engine.applied_records().unwrap().len(), 2);

    // Seeded rows landed through the same transaction.
    assert!(router.read("schema/customers").unwrap().is_some());
    for (region, _) in TAX_REGIONS {
        assert!(router
            .read(&format!("tax_config/{}", region))
            .unwrap()
            .is_some());
    }
}

#[test]
fn test_migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let router = disk_router(&dir);
    let mut engine = MigrationEngine::new(router, quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(CreateTaxConfig)).unwrap();

    engine.migrate().unwrap();
    let second = engine.migrate().unwrap();

    assert!(second.applied.is_empty());
    assert_eq!(second.current_version, 2);
    assert_eq!(engine.applied_records().unwrap().len(), 2);
}

#[test]
fn test_already_applied_versions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let router = disk_router(&dir);
        let mut engine = MigrationEngine::new(router, quiet_logger());
        engine.register(Arc::new(CreateCustomers)).unwrap();
        engine.migrate().unwrap();
    }

    // A fresh engine over the same store sees the persisted version and
    // applies only the new migration.
    let router = disk_router(&dir);
    let mut engine = MigrationEngine::new(router, quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(CreateTaxConfig)).unwrap();

    let summary = engine.migrate().unwrap();
    assert_eq!(summary.applied, vec![2]);
    assert_eq!(summary.current_version, 2);
}

// =============================================================================
// Atomicity
// =============================================================================

#[test]
fn test_forward_failure_is_atomic() {
    let dir = TempDir::new().unwrap();
    let router = disk_router(&dir);
    let mut engine = MigrationEngine::new(router.clone(), quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(CreateTaxConfig)).unwrap();
    engine.register(Arc::new(FailsHalfway)).unwrap();

    assert!(engine.migrate().is_err());

    // v1 and v2 committed; v3 left no partial state or record.
    assert_eq!(engine.current_version().unwrap(), 2);
    assert_eq!(engine.applied_records().unwrap().len(), 2);
    assert_eq!(router.read("schema/half_done").unwrap(), None);
}

// =============================================================================
// Rollback
// =============================================================================

/// v2: overwrite a tax rate; the inverse restores the old value.
struct RewriteRate;

impl Migration for RewriteRate {
    fn version(&self) -> u32 {
        2
    }
    fn name(&self) -> &str {
        "rewrite_rate"
    }
    fn up(&self, txn: &mut MigrationTxn<'_>) -> MigrateResult<()> {
        txn.write("tax_config/US-CA".to_string(), br#"{"rate":0.08}"#.to_vec());
        Ok(())
    }
    fn rollback_script(&self) -> RollbackScript {
        RollbackScript::RestoreValues {
            entries: vec![RestoreEntry {
                key: "tax_config/US-CA".to_string(),
                value: Some(br#"{"rate":0.0725}"#.to_vec()),
            }],
        }
    }
}

#[test]
fn test_rollback_partial_delete_fails_the_step() {
    // The key also lives in a second tier after a historical fallback;
    // that tier refuses the delete.
    let first = Arc::new(BalkyTier::new("first", 1));
    let second = Arc::new(BalkyTier::new("second", 2));
    let router = Arc::new(FallbackRouter::new(
        vec![
            first.clone() as Arc<dyn StorageTier>,
            second.clone() as Arc<dyn StorageTier>,
        ],
        quiet_logger(),
    ));
    let mut engine = MigrationEngine::new(router.clone(), quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.migrate().unwrap();

    second.seed("schema/customers", b"{}");
    second.fail_deletes.store(true, Ordering::SeqCst);

    let err = engine.rollback(0).unwrap_err();
    assert!(matches!(
        err,
        MigrateError::RollbackFailed { version: 1, .. }
    ));

    // The step did not commit: the key is still readable and the
    // migration still counts as applied.
    assert!(router.read("schema/customers").unwrap().is_some());
    assert_eq!(engine.current_version().unwrap(), 1);
    assert_eq!(engine.applied_records().unwrap().len(), 1);
}

#[test]
fn test_rollback_step_failure_leaves_version_at_last_success() {
    let tier = Arc::new(BalkyTier::new("only", 1));
    let router = Arc::new(FallbackRouter::new(
        vec![tier.clone() as Arc<dyn StorageTier>],
        quiet_logger(),
    ));
    let mut engine = MigrationEngine::new(router, quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(RewriteRate)).unwrap();
    engine.migrate().unwrap();
    assert_eq!(engine.current_version().unwrap(), 2);

    // The v2 inverse restores a value, which needs a write; reject it.
    tier.fail_writes.store(true, Ordering::SeqCst);
    let err = engine.rollback(0).unwrap_err();
    assert!(matches!(
        err,
        MigrateError::RollbackFailed {
            version: 2,
            phase: MigratePhase::Commit,
            ..
        }
    ));

    tier.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(engine.current_version().unwrap(), 2);
    assert_eq!(engine.applied_records().unwrap().len(), 2);
}

#[test]
fn test_rollback_to_target_replays_inverses_descending() {
    let dir = TempDir::new().unwrap();
    let router = disk_router(&dir);
    let mut engine = MigrationEngine::new(router.clone(), quiet_logger());
    engine.register(Arc::new(CreateCustomers)).unwrap();
    engine.register(Arc::new(CreateTaxConfig)).unwrap();
    engine.migrate().unwrap();

    let summary = engine.rollback(0).unwrap();
    assert_eq!(summary.rolled_back, vec![2, 1]);
    assert_eq!(summary.current_version, 0);

    assert_eq!(router.read("schema/customers").unwrap(), None);
    assert_eq!(router.read("schema/tax_config").unwrap(), None);
    assert_eq!(router.read("tax_config/US-CA").unwrap(), None);
    assert!(engine.applied_records().unwrap().is_empty());
}
