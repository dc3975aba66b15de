//! Core configuration
//!
//! Per BOOT.md, all subsystems receive their configuration explicitly at
//! construction time. There are no module-level defaults read at import
//! time and no environment probing inside subsystems.

use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::KdfParams;

/// Top-level configuration for the ledger core.
///
/// `Default` gives a usable local configuration; callers override fields
/// before passing the config to [`crate::services::CoreServices::start`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root data directory for the on-disk storage tiers.
    pub data_dir: PathBuf,

    /// Maximum events per audit flush batch.
    pub audit_batch_size: usize,

    /// Interval between periodic audit flushes.
    pub audit_flush_interval: Duration,

    /// Maximum live background workers. `None` means the host's reported
    /// parallelism (minimum 1).
    pub max_workers: Option<usize>,

    /// Idle window after which a worker with no outstanding task is
    /// eligible for teardown.
    pub worker_idle_window: Duration,

    /// Upper bound for key derivation on a background worker.
    pub kdf_timeout: Duration,

    /// Key derivation parameters.
    pub kdf_params: KdfParams,

    /// Byte capacity of the in-memory last-resort tier.
    pub mem_tier_quota: Option<usize>,

    /// Minimum severity emitted by the structured logger.
    pub log_floor: crate::observability::Severity,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("ledgercore_data"),
            audit_batch_size: 100,
            audit_flush_interval: Duration::from_secs(30),
            max_workers: None,
            worker_idle_window: Duration::from_secs(60),
            kdf_timeout: Duration::from_secs(10),
            kdf_params: KdfParams::default(),
            mem_tier_quota: Some(5 * 1024 * 1024),
            log_floor: crate::observability::Severity::Info,
        }
    }
}

impl CoreConfig {
    /// Resolved worker bound: configured value, else host parallelism,
    /// never below 1.
    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1)
    }
}
