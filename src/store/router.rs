//! Storage fallback router
//!
//! Per DURABILITY.md §5 the router is a stateless operation router: it
//! owns no data, only the ordered tier list. Semantics:
//!
//! - `read`: first present value in ascending priority order; tier errors
//!   are logged and skipped; exhaustion is `Ok(None)`
//! - `write`: first tier that accepts the value, then stop (at most one
//!   tier is ever written); exhaustion is `LGR_STORE_ALL_TIERS_FAILED`
//! - `delete`: every capable available tier is attempted (a key may exist
//!   in several tiers after historical fallbacks); the outcome reports
//!   partial completion rather than stopping at the first success
//!
//! Per CONCURRENCY.md the chain is strictly sequential by priority, never
//! attempted concurrently across tiers.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::observability::Logger;

use super::errors::{StoreError, StoreResult};
use super::tier::{validate_key, StorageTier};

/// Result of a fan-out delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Every attempted tier deleted the key (or never held it).
    Complete,
    /// At least one tier failed; the key may survive in those tiers.
    Partial { failed: Vec<&'static str> },
}

impl DeleteOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, DeleteOutcome::Complete)
    }
}

/// Prioritized fallback router over the tier chain.
pub struct FallbackRouter {
    tiers: Vec<Arc<dyn StorageTier>>,
    logger: Logger,
}

impl FallbackRouter {
    /// Builds the router. Tiers are kept sorted ascending by priority;
    /// registration order between equal priorities is preserved.
    pub fn new(mut tiers: Vec<Arc<dyn StorageTier>>, logger: Logger) -> Self {
        tiers.sort_by_key(|t| t.priority());
        Self {
            tiers,
            logger: logger.for_subsystem("store"),
        }
    }

    /// Tier names in fallback order, for diagnostics.
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Reads `key`, returning the first present value in priority order.
    ///
    /// Absence everywhere is `Ok(None)`: "not found" is a valid outcome.
    pub fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        for tier in &self.tiers {
            if !tier.capabilities().read {
                continue;
            }
            if !tier.probe() {
                self.log_skip("read", key, tier.name());
                continue;
            }
            match tier.read(key) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => continue,
                Err(e) => {
                    self.log_tier_failure("read", key, tier.name(), &e);
                    continue;
                }
            }
        }
        Ok(None)
    }

    /// Writes `key` to the first available tier that accepts it.
    ///
    /// At-most-one-tier-write: once a tier succeeds, no further tier is
    /// attempted. If every available tier fails, the whole operation
    /// fails with `LGR_STORE_ALL_TIERS_FAILED`.
    pub fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        for tier in &self.tiers {
            if !tier.capabilities().write {
                continue;
            }
            if !tier.probe() {
                self.log_skip("write", key, tier.name());
                continue;
            }
            match tier.write(key, value) {
                Ok(()) => {
                    self.logger.log(
                        crate::observability::Severity::Trace,
                        "TIER_WRITE",
                        &[("key", key), ("tier", tier.name())],
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.log_tier_failure("write", key, tier.name(), &e);
                    continue;
                }
            }
        }
        Err(StoreError::all_tiers_failed("write", key))
    }

    /// Deletes `key` from every capable available tier.
    pub fn delete(&self, key: &str) -> StoreResult<DeleteOutcome> {
        validate_key(key)?;
        let mut failed = Vec::new();
        for tier in &self.tiers {
            if !tier.capabilities().delete {
                continue;
            }
            if !tier.probe() {
                self.log_skip("delete", key, tier.name());
                continue;
            }
            if let Err(e) = tier.delete(key) {
                self.log_tier_failure("delete", key, tier.name(), &e);
                failed.push(tier.name());
            }
        }
        if failed.is_empty() {
            Ok(DeleteOutcome::Complete)
        } else {
            Ok(DeleteOutcome::Partial { failed })
        }
    }

    /// Lists every key under `prefix` across all available tiers and
    /// reads each through the normal fallback path. Used by the
    /// migration and audit keyspace scans.
    pub fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut keys = BTreeSet::new();
        for tier in &self.tiers {
            if !tier.capabilities().read || !tier.probe() {
                continue;
            }
            match tier.keys() {
                Ok(tier_keys) => {
                    keys.extend(tier_keys.into_iter().filter(|k| k.starts_with(prefix)));
                }
                Err(e) => {
                    self.log_tier_failure("scan", prefix, tier.name(), &e);
                }
            }
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.read(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    fn log_skip(&self, operation: &str, key: &str, tier: &str) {
        self.logger.log(
            crate::observability::Severity::Trace,
            "TIER_SKIPPED",
            &[("key", key), ("operation", operation), ("tier", tier)],
        );
    }

    fn log_tier_failure(&self, operation: &str, key: &str, tier: &str, error: &StoreError) {
        self.logger.warn(
            "TIER_FAILED",
            &[
                ("code", error.code().code()),
                ("error", error.message()),
                ("key", key),
                ("operation", operation),
                ("tier", tier),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;
    use crate::store::errors::StoreError;
    use crate::store::tier::TierCapabilities;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Instrumented tier: scriptable availability/failure, call counts.
    pub struct ScriptedTier {
        name: &'static str,
        priority: u8,
        available: AtomicBool,
        fail_writes: AtomicBool,
        pub write_calls: AtomicUsize,
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl ScriptedTier {
        pub fn new(name: &'static str, priority: u8) -> Self {
            Self {
                name,
                priority,
                available: AtomicBool::new(true),
                fail_writes: AtomicBool::new(false),
                write_calls: AtomicUsize::new(0),
                entries: Mutex::new(HashMap::new()),
            }
        }

        pub fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl StorageTier for ScriptedTier {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> u8 {
            self.priority
        }
        fn probe(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }
        fn capabilities(&self) -> TierCapabilities {
            TierCapabilities::all()
        }
        fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::write_failed_no_source("scripted failure"));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }
        fn delete(&self, key: &str) -> StoreResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
        fn keys(&self) -> StoreResult<Vec<String>> {
            let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
            keys.sort();
            Ok(keys)
        }
    }

    fn router(tiers: Vec<Arc<dyn StorageTier>>) -> FallbackRouter {
        FallbackRouter::new(tiers, Logger::new("test", Severity::Fatal))
    }

    #[test]
    fn test_tiers_sorted_by_priority() {
        let r = router(vec![
            Arc::new(ScriptedTier::new("c", 3)),
            Arc::new(ScriptedTier::new("a", 1)),
            Arc::new(ScriptedTier::new("b", 2)),
        ]);
        assert_eq!(r.tier_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_write_stops_at_first_success() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        let r = router(vec![first.clone(), second.clone()]);

        r.write("k", b"v").unwrap();

        assert_eq!(first.write_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.write_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unavailable_tier_never_attempted() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        first.set_available(false);
        let r = router(vec![first.clone(), second.clone()]);

        r.write("k", b"v").unwrap();

        assert_eq!(first.write_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.write_calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.read("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_failing_tier_falls_through() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        first.set_fail_writes(true);
        let r = router(vec![first.clone(), second.clone()]);

        r.write("k", b"v").unwrap();
        assert_eq!(r.read("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_all_tiers_failing_is_fatal() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        first.set_fail_writes(true);
        second.set_available(false);
        let r = router(vec![first, second]);

        let err = r.write("k", b"v").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code().code(), "LGR_STORE_ALL_TIERS_FAILED");
    }

    #[test]
    fn test_read_absent_everywhere_is_none() {
        let r = router(vec![
            Arc::new(ScriptedTier::new("first", 1)),
            Arc::new(ScriptedTier::new("second", 2)),
        ]);
        assert_eq!(r.read("missing").unwrap(), None);
    }

    #[test]
    fn test_read_prefers_higher_priority_value() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        second.write("k", b"older").unwrap();
        first.write("k", b"newer").unwrap();
        let r = router(vec![first, second]);

        assert_eq!(r.read("k").unwrap(), Some(b"newer".to_vec()));
    }

    #[test]
    fn test_delete_fans_out() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        first.write("k", b"a").unwrap();
        second.write("k", b"b").unwrap();
        let r = router(vec![first.clone(), second.clone()]);

        let outcome = r.delete("k").unwrap();
        assert!(outcome.is_complete());
        assert_eq!(first.read("k").unwrap(), None);
        assert_eq!(second.read("k").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_merges_tiers() {
        let first = Arc::new(ScriptedTier::new("first", 1));
        let second = Arc::new(ScriptedTier::new("second", 2));
        first.write("audit/1", b"a").unwrap();
        second.write("audit/2", b"b").unwrap();
        second.write("migration/1", b"m").unwrap();
        let r = router(vec![first, second]);

        let entries = r.scan_prefix("audit/").unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["audit/1", "audit/2"]);
    }
}
