//! Bounded worker pool
//!
//! Per TASKS.md §5:
//! - At most `max_workers` live workers; one long-lived worker per task
//!   kind, spawned lazily on first use and reused
//! - Beyond capacity, submissions wait in FIFO order on the dispatch
//!   semaphore and proceed as permits free up
//! - Each dispatch races the worker's oneshot reply against the task
//!   timeout; whichever arrives first resolves the task exactly once
//! - On timeout the worker is aborted and removed from the pool; it
//!   cannot be trusted to still be consistent
//! - Workers idle past the configured window are reaped
//! - Dispatched tasks cannot be cancelled; a caller that drops its
//!   submit future while still queued simply withdraws the task

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::observability::Logger;

use super::errors::{TaskError, TaskResult};
use super::task::{execute, TaskKind, TaskOutcome, TaskPayload};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum live workers (and maximum in-flight tasks).
    pub max_workers: usize,
    /// Idle window after which a worker is eligible for teardown.
    pub idle_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            idle_window: Duration::from_secs(60),
        }
    }
}

struct Job {
    task_id: Uuid,
    payload: TaskPayload,
    reply: oneshot::Sender<TaskResult<TaskOutcome>>,
}

struct WorkerHandle {
    sender: mpsc::Sender<Job>,
    join: JoinHandle<()>,
    /// Jobs dispatched but not yet replied to.
    outstanding: Arc<AtomicUsize>,
    last_dispatch: Instant,
}

impl WorkerHandle {
    fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }
}

/// Bounded pool of per-kind background workers.
pub struct Orchestrator {
    config: OrchestratorConfig,
    logger: Logger,
    workers: Mutex<HashMap<TaskKind, WorkerHandle>>,
    /// FIFO admission: one permit per allowed in-flight task.
    slots: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, logger: Logger) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_workers)),
            config: OrchestratorConfig {
                max_workers,
                ..config
            },
            logger: logger.for_subsystem("tasks"),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Submits a task and waits for its result, bounded by `timeout`.
    pub async fn submit(
        &self,
        payload: TaskPayload,
        timeout: Duration,
    ) -> TaskResult<TaskOutcome> {
        // Queued-but-undispatched tasks live here: dropping the future
        // while waiting for a permit withdraws the task.
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| TaskError::ShuttingDown)?;

        let kind = payload.kind();
        let task_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        let (sender, outstanding) = self.checkout_worker(kind).await?;
        outstanding.fetch_add(1, Ordering::SeqCst);

        let send_result = sender
            .send(Job {
                task_id,
                payload,
                reply: reply_tx,
            })
            .await;
        if send_result.is_err() {
            outstanding.fetch_sub(1, Ordering::SeqCst);
            // Channel closed: the worker died between checkout and send.
            self.discard_worker(kind).await;
            return Err(TaskError::WorkerLost { task_id });
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.discard_worker(kind).await;
                Err(TaskError::WorkerLost { task_id })
            }
            Err(_) => {
                // Deadline missed: terminate and forget the worker.
                self.discard_worker(kind).await;
                self.logger.warn(
                    "TASK_TIMEOUT",
                    &[
                        ("kind", kind.as_str()),
                        ("task_id", &task_id.to_string()),
                        ("timeout_ms", &timeout.as_millis().to_string()),
                    ],
                );
                Err(TaskError::Timeout {
                    task_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Number of live workers.
    pub async fn live_workers(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Whether a worker for `kind` is currently live.
    pub async fn has_worker(&self, kind: TaskKind) -> bool {
        self.workers.lock().await.contains_key(&kind)
    }

    /// Tears down workers idle for longer than the configured window.
    /// Returns how many were reaped.
    pub async fn reap_idle(&self) -> usize {
        let mut workers = self.workers.lock().await;
        let before = workers.len();
        let idle_window = self.config.idle_window;
        workers.retain(|kind, handle| {
            let keep = !handle.is_idle() || handle.last_dispatch.elapsed() < idle_window;
            if !keep {
                self.logger
                    .info("WORKER_REAPED", &[("kind", kind.as_str())]);
            }
            keep
        });
        before - workers.len()
    }

    /// Stops accepting work and tears down every worker.
    pub async fn shutdown(&self) {
        self.slots.close();
        let mut workers = self.workers.lock().await;
        for (kind, handle) in workers.drain() {
            // Dropping the sender ends the worker loop; abort covers a
            // worker stuck mid-job.
            drop(handle.sender);
            handle.join.abort();
            self.logger
                .info("WORKER_STOPPED", &[("kind", kind.as_str())]);
        }
    }

    /// Returns the job channel of the live worker for `kind`, spawning
    /// one lazily if needed.
    async fn checkout_worker(
        &self,
        kind: TaskKind,
    ) -> TaskResult<(mpsc::Sender<Job>, Arc<AtomicUsize>)> {
        let mut workers = self.workers.lock().await;

        if let Some(handle) = workers.get_mut(&kind) {
            handle.last_dispatch = Instant::now();
            return Ok((handle.sender.clone(), handle.outstanding.clone()));
        }

        // Pool full: evict the longest-idle worker of another kind. An
        // idle one always exists because in-flight tasks hold permits.
        if workers.len() >= self.config.max_workers {
            let evict = workers
                .iter()
                .filter(|(_, handle)| handle.is_idle())
                .min_by_key(|(_, handle)| handle.last_dispatch)
                .map(|(k, _)| *k);
            match evict {
                Some(victim) => {
                    if let Some(handle) = workers.remove(&victim) {
                        handle.join.abort();
                        self.logger
                            .info("WORKER_EVICTED", &[("kind", victim.as_str())]);
                    }
                }
                None => return Err(TaskError::ShuttingDown),
            }
        }

        let handle = self.spawn_worker(kind);
        let result = (handle.sender.clone(), handle.outstanding.clone());
        workers.insert(kind, handle);
        Ok(result)
    }

    fn spawn_worker(&self, kind: TaskKind) -> WorkerHandle {
        let (sender, mut receiver) = mpsc::channel::<Job>(self.config.max_workers.max(4));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let worker_outstanding = outstanding.clone();
        let logger = self.logger.clone();

        let join = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                // The blocking pool keeps CPU-heavy work off the async
                // threads; the await point is where an abort lands.
                let result = tokio::task::spawn_blocking(move || execute(job.payload)).await;
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => Err(TaskError::ExecutionFailed {
                        reason: format!("worker panic: {}", e),
                    }),
                };
                worker_outstanding.fetch_sub(1, Ordering::SeqCst);
                if job.reply.send(outcome).is_err() {
                    // Submitter gave up (timed out); result discarded.
                    logger.log(
                        crate::observability::Severity::Trace,
                        "TASK_REPLY_DROPPED",
                        &[("task_id", &job.task_id.to_string())],
                    );
                }
            }
        });

        self.logger
            .info("WORKER_SPAWNED", &[("kind", kind.as_str())]);
        WorkerHandle {
            sender,
            join,
            outstanding,
            last_dispatch: Instant::now(),
        }
    }

    async fn discard_worker(&self, kind: TaskKind) {
        let mut workers = self.workers.lock().await;
        if let Some(handle) = workers.remove(&kind) {
            handle.join.abort();
        }
    }
}
