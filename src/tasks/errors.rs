//! Task orchestrator error types
//!
//! A timeout rejects the task and discards the worker but never crashes
//! the orchestrator; the queue keeps processing on a fresh worker.

use thiserror::Error;
use uuid::Uuid;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Task submission and execution errors.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task exceeded its deadline. The worker that held it has been
    /// terminated and removed from the pool.
    #[error("Task {task_id} timed out after {timeout_ms} ms")]
    Timeout { task_id: Uuid, timeout_ms: u64 },

    /// The worker died before replying.
    #[error("Worker lost while executing task {task_id}")]
    WorkerLost { task_id: Uuid },

    /// The task's work itself failed (cipher rejection, bad input).
    #[error("Task execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The orchestrator is shutting down and accepts no new work.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}
