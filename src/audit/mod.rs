//! Tamper-evident audit trail
//!
//! Per AUDIT.md every mutating action produces an event in an
//! append-only, hash-chained trail:
//!
//! - Events are buffered in a pending queue and flushed in fixed-size
//!   batches; critical events flush immediately
//! - Within a batch, events are hashed and persisted in the exact order
//!   they were appended; batches are strictly sequential
//! - `previous_hash` of every event equals the `changes_hash` of the
//!   immediately preceding persisted event
//! - A failed batch is pushed back to the front of the queue in its
//!   original order; events are never silently dropped
//! - Each event is tagged with the hash algorithm that produced it; the
//!   weak fallback algorithm is flagged in verification reports

mod errors;
mod event;
mod hash;
mod ledger;

pub use errors::{AuditError, AuditResult};
pub use event::{AuditDraft, AuditEvent, ChainHead, AUDIT_HEAD_KEY, AUDIT_KEY_PREFIX};
pub use hash::{canonical_json, HashAlgorithm, HashEngine};
pub use ledger::{AuditLedger, ChainBreak, ChainVerification};
