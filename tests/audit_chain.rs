//! Audit Chain Integrity Tests
//!
//! Tests for the hash-chained audit ledger:
//! - For all i > 0, `event[i].previous_hash == event[i-1].changes_hash`,
//!   including across batch boundaries
//! - Tampering with a persisted event is detected by verification
//! - A reopened ledger continues the persisted chain
//! - A failed flush requeues the batch in order

use std::sync::Arc;

use ledgercore::audit::{AuditDraft, AuditLedger, HashEngine};
use ledgercore::observability::{Logger, Severity};
use ledgercore::store::{FallbackRouter, MemTier, StorageTier};
use serde_json::json;

// =============================================================================
// Test Utilities
// =============================================================================

fn quiet_logger() -> Logger {
    Logger::new("test", Severity::Fatal)
}

fn mem_router() -> Arc<FallbackRouter> {
    Arc::new(FallbackRouter::new(
        vec![Arc::new(MemTier::new(1, None)) as Arc<dyn StorageTier>],
        quiet_logger(),
    ))
}

fn draft(n: usize) -> AuditDraft {
    AuditDraft::new(
        "update",
        "user-1",
        "journal_entry",
        format!("je-{}", n),
        json!({"amount": n}),
    )
}

// =============================================================================
// Chain Linkage
// =============================================================================

#[test]
fn test_chain_links_across_batch_boundaries() {
    let router = mem_router();
    let ledger = AuditLedger::new(router, HashEngine::new(), 2, quiet_logger());

    for n in 0..5 {
        ledger.log_event(draft(n)).unwrap();
    }
    // 5 events, batch size 2: three flushes.
    assert_eq!(ledger.flush_pending().unwrap(), 5);

    let events = ledger.persisted_events().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].previous_hash, None);
    for pair in events.windows(2) {
        assert_eq!(
            pair[1].previous_hash.as_deref(),
            Some(pair[0].changes_hash.as_str())
        );
    }

    let verification = ledger.verify_chain().unwrap();
    assert!(verification.intact);
    assert_eq!(verification.length, 5);
    assert!(verification.weak_links.is_empty());
}

#[test]
fn test_reopened_ledger_continues_the_chain() {
    let router = mem_router();
    {
        let ledger = AuditLedger::new(router.clone(), HashEngine::new(), 10, quiet_logger());
        ledger.log_event(draft(0)).unwrap();
        ledger.log_event(draft(1)).unwrap();
        ledger.flush_pending().unwrap();
    }

    // A fresh instance over the same store picks up the persisted head.
    let ledger = AuditLedger::new(router, HashEngine::new(), 10, quiet_logger());
    ledger.log_event(draft(2)).unwrap();
    ledger.flush_pending().unwrap();

    let verification = ledger.verify_chain().unwrap();
    assert!(verification.intact, "break: {:?}", verification.first_break);
    assert_eq!(verification.length, 3);
}

#[test]
fn test_critical_event_flushes_immediately() {
    let router = mem_router();
    let ledger = AuditLedger::new(router, HashEngine::new(), 100, quiet_logger());

    ledger.log_event(draft(0)).unwrap();
    assert_eq!(ledger.pending_len(), 1);
    assert!(ledger.persisted_events().unwrap().is_empty());

    ledger.log_event(draft(1).critical()).unwrap();
    assert_eq!(ledger.pending_len(), 0);
    assert_eq!(ledger.persisted_events().unwrap().len(), 2);
}

// =============================================================================
// Tamper Detection
// =============================================================================

#[test]
fn test_tampered_payload_breaks_verification() {
    let router = mem_router();
    let ledger = AuditLedger::new(router.clone(), HashEngine::new(), 10, quiet_logger());
    for n in 0..3 {
        ledger.log_event(draft(n)).unwrap();
    }
    ledger.flush_pending().unwrap();

    // Rewrite event 2 with a doctored amount but the original hashes.
    let mut events = ledger.persisted_events().unwrap();
    let victim = &mut events[1];
    victim.change_payload = json!({"amount": 9999});
    router
        .write(&victim.key(), &serde_json::to_vec(victim).unwrap())
        .unwrap();

    let verification = ledger.verify_chain().unwrap();
    assert!(!verification.intact);
    let report = verification.first_break.unwrap();
    assert_eq!(report.sequence, 2);
    assert!(report.reason.contains("content hash"));
}

#[test]
fn test_fallback_hashed_events_are_flagged_weak_not_broken() {
    let router = mem_router();
    let ledger = AuditLedger::new(
        router,
        HashEngine::with_fallback(),
        10,
        quiet_logger(),
    );
    for n in 0..3 {
        ledger.log_event(draft(n)).unwrap();
    }
    ledger.flush_pending().unwrap();

    let verification = ledger.verify_chain().unwrap();
    assert!(verification.intact);
    assert_eq!(verification.weak_links, vec![1, 2, 3]);
}

#[test]
fn test_mixed_algorithm_chain_flags_only_fallback_links() {
    let router = mem_router();
    {
        // Two events hashed with the primary algorithm.
        let ledger = AuditLedger::new(router.clone(), HashEngine::new(), 10, quiet_logger());
        ledger.log_event(draft(0)).unwrap();
        ledger.log_event(draft(1)).unwrap();
        ledger.flush_pending().unwrap();
    }

    // The cipher host degrades; later events use the fallback hash but
    // still extend the same chain.
    let ledger = AuditLedger::new(router, HashEngine::with_fallback(), 10, quiet_logger());
    ledger.log_event(draft(2)).unwrap();
    ledger.log_event(draft(3)).unwrap();
    ledger.flush_pending().unwrap();

    let verification = ledger.verify_chain().unwrap();
    assert!(verification.intact, "break: {:?}", verification.first_break);
    assert_eq!(verification.length, 4);
    assert_eq!(verification.weak_links, vec![3, 4]);
}

// =============================================================================
// Flush Failure Handling
// =============================================================================

/// A tier that rejects every write.
struct RefusingTier;

impl StorageTier for RefusingTier {
    fn name(&self) -> &'static str {
        "refusing"
    }
    fn priority(&self) -> u8 {
        1
    }
    fn probe(&self) -> bool {
        true
    }
    fn read(&self, _key: &str) -> ledgercore::store::StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }
    fn write(&self, _key: &str, _value: &[u8]) -> ledgercore::store::StoreResult<()> {
        Err(ledgercore::store::StoreError::write_failed_no_source(
            "tier refuses all writes",
        ))
    }
    fn delete(&self, _key: &str) -> ledgercore::store::StoreResult<()> {
        Ok(())
    }
    fn keys(&self) -> ledgercore::store::StoreResult<Vec<String>> {
        Ok(vec![])
    }
}

#[test]
fn test_failed_flush_requeues_events_in_order() {
    let router = Arc::new(FallbackRouter::new(
        vec![Arc::new(RefusingTier) as Arc<dyn StorageTier>],
        quiet_logger(),
    ));
    let ledger = AuditLedger::new(router, HashEngine::new(), 10, quiet_logger());
    for n in 0..3 {
        ledger.log_event(draft(n)).unwrap();
    }

    assert!(ledger.flush_pending().is_err());
    // Nothing was lost; the batch went back to the front of the queue.
    assert_eq!(ledger.pending_len(), 3);
}
