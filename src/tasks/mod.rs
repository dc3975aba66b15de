//! Background task orchestrator
//!
//! Per TASKS.md, expensive or key-touching work never runs on the
//! interactive path. The orchestrator keeps a bounded pool of long-lived
//! workers (one per task kind, lazily spawned), communicates with them
//! only by message passing, races each dispatch against a per-task
//! timeout, and discards any worker that misses its deadline — a worker
//! that blew a timeout cannot be trusted to still be consistent.
//!
//! Payloads are a closed, typed set: every kind carries its own payload
//! shape and there is no dynamic envelope to misparse.

mod errors;
mod pool;
mod task;

pub use errors::{TaskError, TaskResult};
pub use pool::{Orchestrator, OrchestratorConfig};
pub use task::{execute, TaskKind, TaskOutcome, TaskPayload};
