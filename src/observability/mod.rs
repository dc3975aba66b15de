//! Observability for ledgercore
//!
//! Structured JSON logging only. Per OBSERVABILITY.md:
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Logging failure must never fail the logged operation
//! 4. Deterministic output (stable key ordering)

mod logger;

pub use logger::{Logger, Severity};
