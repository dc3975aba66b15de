//! Audit ledger: pending queue, batched chained flush, verification
//!
//! Per AUDIT.md §4:
//! - `log_event` appends to the pending queue; critical events trigger
//!   an immediate flush instead of waiting for the periodic timer
//! - A flush takes up to `batch_size` events from the front, hashes them
//!   in submission order against the persisted chain head, and persists
//!   them through the fallback router
//! - On persistence failure the whole batch returns to the front of the
//!   queue in original order and the error surfaces; nothing is dropped
//! - Batches never run concurrently; the chain-head guard serializes
//!   the flush path (single-writer discipline)
//! - The periodic flush is an explicit loop with a stop signal; shutdown
//!   drains all pending events before returning

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::observability::Logger;
use crate::store::FallbackRouter;

use super::errors::{AuditError, AuditResult};
use super::event::{AuditDraft, AuditEvent, ChainHead, AUDIT_HEAD_KEY, AUDIT_KEY_PREFIX};
use super::hash::HashEngine;

/// Where a chain verification found the first inconsistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub sequence: u64,
    pub reason: String,
}

/// Result of a full-chain verification scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// True when every link checks out.
    pub intact: bool,
    /// Number of persisted events scanned.
    pub length: u64,
    /// First broken link, if any.
    pub first_break: Option<ChainBreak>,
    /// Sequences hashed with the weak fallback algorithm. These links
    /// are deterministic but not collision-resistant; any exported
    /// report must flag them.
    pub weak_links: Vec<u64>,
}

/// Buffered, hash-chained audit ledger.
pub struct AuditLedger {
    router: Arc<FallbackRouter>,
    logger: Logger,
    hasher: HashEngine,
    batch_size: usize,
    pending: Mutex<VecDeque<AuditDraft>>,
    /// Chain-head cache. Holding this lock for the whole batch is what
    /// keeps batches strictly sequential.
    head: Mutex<Option<ChainHead>>,
}

impl AuditLedger {
    pub fn new(
        router: Arc<FallbackRouter>,
        hasher: HashEngine,
        batch_size: usize,
        logger: Logger,
    ) -> Self {
        Self {
            router,
            logger: logger.for_subsystem("audit"),
            hasher,
            batch_size: batch_size.max(1),
            pending: Mutex::new(VecDeque::new()),
            head: Mutex::new(None),
        }
    }

    /// Queues an event. Critical events flush immediately; the flush
    /// error (if any) surfaces to the caller while the events stay
    /// queued.
    pub fn log_event(&self, draft: AuditDraft) -> AuditResult<()> {
        let critical = draft.critical;
        {
            let mut pending = self.pending.lock().expect("audit pending lock poisoned");
            pending.push_back(draft);
        }
        if critical {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Number of events waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .expect("audit pending lock poisoned")
            .len()
    }

    /// Flushes batches until the pending queue is empty. Returns the
    /// number of events persisted.
    pub fn flush_pending(&self) -> AuditResult<usize> {
        let mut total = 0;
        loop {
            let flushed = self.flush_batch()?;
            if flushed == 0 {
                return Ok(total);
            }
            total += flushed;
        }
    }

    /// Flushes at most one batch. Returns the number of events
    /// persisted (0 when the queue was empty).
    pub fn flush_batch(&self) -> AuditResult<usize> {
        // Serializes batches; also caches the head between them.
        let mut head_guard = self.head.lock().expect("audit head lock poisoned");

        let batch: Vec<AuditDraft> = {
            let mut pending = self.pending.lock().expect("audit pending lock poisoned");
            let take = self.batch_size.min(pending.len());
            pending.drain(..take).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }
        let batch_len = batch.len();

        let head = match *head_guard {
            Some(ref head) => Some(head.clone()),
            None => match self.load_head() {
                Ok(head) => head,
                Err(e) => {
                    self.requeue_front(batch);
                    return Err(e);
                }
            },
        };

        match self.persist_batch(&batch, head) {
            Ok(new_head) => {
                *head_guard = Some(new_head);
                self.logger
                    .info("AUDIT_BATCH_FLUSHED", &[("events", &batch_len.to_string())]);
                Ok(batch_len)
            }
            Err(source) => {
                self.requeue_front(batch);
                self.logger.error(
                    "AUDIT_BATCH_FAILED",
                    &[("requeued", &batch_len.to_string())],
                );
                Err(AuditError::FlushFailed {
                    requeued: batch_len,
                    source,
                })
            }
        }
    }

    /// Persists a batch in submission order, chaining from `head`.
    ///
    /// The head pointer is only advanced after every event landed, so a
    /// partial failure leaves the head untouched and the deterministic
    /// recomputation on retry overwrites any orphaned event keys with
    /// identical content.
    fn persist_batch(
        &self,
        batch: &[AuditDraft],
        head: Option<ChainHead>,
    ) -> Result<ChainHead, crate::store::StoreError> {
        let mut sequence = head.as_ref().map(|h| h.sequence).unwrap_or(0);
        let mut previous_hash = head.map(|h| h.changes_hash);

        for draft in batch {
            sequence += 1;
            let (changes_hash, algorithm) = self.hasher.hash(&draft.hash_content());
            let event = AuditEvent {
                id: draft.id,
                sequence,
                timestamp: draft.timestamp,
                action: draft.action.clone(),
                actor_id: draft.actor_id.clone(),
                entity_type: draft.entity_type.clone(),
                entity_id: draft.entity_id.clone(),
                change_payload: draft.change_payload.clone(),
                changes_hash: changes_hash.clone(),
                previous_hash: previous_hash.take(),
                context_metadata: draft.context_metadata.clone(),
                algorithm,
            };
            let bytes = serde_json::to_vec(&event).map_err(|e| {
                crate::store::StoreError::write_failed_no_source(format!(
                    "audit event serialization failed: {}",
                    e
                ))
            })?;
            self.router.write(&event.key(), &bytes)?;
            previous_hash = Some(changes_hash);
        }

        let new_head = ChainHead {
            sequence,
            changes_hash: previous_hash.unwrap_or_default(),
        };
        let head_bytes = serde_json::to_vec(&new_head).map_err(|e| {
            crate::store::StoreError::write_failed_no_source(format!(
                "audit head serialization failed: {}",
                e
            ))
        })?;
        self.router.write(AUDIT_HEAD_KEY, &head_bytes)?;
        Ok(new_head)
    }

    fn requeue_front(&self, batch: Vec<AuditDraft>) {
        let mut pending = self.pending.lock().expect("audit pending lock poisoned");
        for draft in batch.into_iter().rev() {
            pending.push_front(draft);
        }
    }

    fn load_head(&self) -> AuditResult<Option<ChainHead>> {
        match self.router.read(AUDIT_HEAD_KEY)? {
            Some(bytes) => {
                let head: ChainHead =
                    serde_json::from_slice(&bytes).map_err(|e| AuditError::CorruptRecord {
                        key: AUDIT_HEAD_KEY.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(head))
            }
            None => Ok(None),
        }
    }

    /// Loads every persisted event, ascending by sequence.
    pub fn persisted_events(&self) -> AuditResult<Vec<AuditEvent>> {
        let entries = self.router.scan_prefix(AUDIT_KEY_PREFIX)?;
        let mut events = Vec::new();
        for (key, bytes) in entries {
            if key == AUDIT_HEAD_KEY {
                continue;
            }
            let event: AuditEvent =
                serde_json::from_slice(&bytes).map_err(|e| AuditError::CorruptRecord {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            events.push(event);
        }
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    /// Full-chain verification scan: recomputes every content hash with
    /// the event's tagged algorithm and checks every link.
    pub fn verify_chain(&self) -> AuditResult<ChainVerification> {
        let events = self.persisted_events()?;
        let mut weak_links = Vec::new();
        let mut first_break = None;

        let mut expected_sequence = 1u64;
        let mut previous_hash: Option<String> = None;

        for event in &events {
            if !event.algorithm.is_strong() {
                weak_links.push(event.sequence);
            }
            if first_break.is_some() {
                continue;
            }

            if event.sequence != expected_sequence {
                first_break = Some(ChainBreak {
                    sequence: event.sequence,
                    reason: format!(
                        "sequence gap: expected {}, found {}",
                        expected_sequence, event.sequence
                    ),
                });
                continue;
            }
            expected_sequence += 1;

            let recomputed = self.hasher.hash_with(&event.hash_content(), event.algorithm);
            if recomputed != event.changes_hash {
                first_break = Some(ChainBreak {
                    sequence: event.sequence,
                    reason: "content hash mismatch".to_string(),
                });
                continue;
            }

            if event.previous_hash != previous_hash {
                first_break = Some(ChainBreak {
                    sequence: event.sequence,
                    reason: "previous_hash does not match prior event".to_string(),
                });
                continue;
            }
            previous_hash = Some(event.changes_hash.clone());
        }

        Ok(ChainVerification {
            intact: first_break.is_none(),
            length: events.len() as u64,
            first_break,
            weak_links,
        })
    }

    /// Periodic flush loop, owned by the ledger.
    ///
    /// Runs until `stop` observes `true`, then drains every pending
    /// event before returning. There is no fire-and-forget timer: the
    /// caller holds the join handle and the stop sender.
    pub async fn run(self: Arc<Self>, interval: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_off_runtime("AUDIT_FLUSH_FAILED").await;
                }
                changed = stop.changed() => {
                    let stopping = changed.is_err() || *stop.borrow();
                    if stopping {
                        self.flush_off_runtime("AUDIT_DRAIN_FAILED").await;
                        return;
                    }
                }
            }
        }
    }

    /// Runs `flush_pending` on the blocking pool: the file tier fsyncs,
    /// which must not stall the async workers.
    async fn flush_off_runtime(self: &Arc<Self>, failure_code: &'static str) {
        let ledger = Arc::clone(self);
        match tokio::task::spawn_blocking(move || ledger.flush_pending()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.logger
                    .error(failure_code, &[("error", &e.to_string())]);
            }
            Err(e) => {
                self.logger
                    .error(failure_code, &[("error", &e.to_string())]);
            }
        }
    }
}
