//! Service wiring and lifecycle
//!
//! Per BOOT.md, subsystems come up in dependency order: storage tiers
//! first, then migrations (a migration failure is a distinct boot
//! failure, not a storage failure), then the audit ledger with its
//! periodic flush loop, then the orchestrator and the crypto gateway.
//! Shutdown reverses the order and drains the audit queue before the
//! flush loop exits.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audit::{AuditLedger, HashEngine};
use crate::config::CoreConfig;
use crate::crypto::CryptoGateway;
use crate::migrate::{MigrateError, Migration, MigrationEngine};
use crate::observability::Logger;
use crate::store::{FallbackRouter, FileTier, LogTier, MemTier, StorageTier, StoreError};
use crate::tasks::{Orchestrator, OrchestratorConfig};

/// Boot and shutdown failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The storage stack could not come up.
    #[error("Storage startup failed: {0}")]
    Storage(#[from] StoreError),

    /// Pending migrations could not be applied. The store is healthy
    /// but the schema is not at the expected version.
    #[error("Migration startup failed: {0}")]
    Migration(#[from] MigrateError),
}

/// The assembled ledger core.
///
/// Owns every subsystem for its lifetime; dropping without calling
/// [`CoreServices::shutdown`] aborts the flush loop without a final
/// drain.
pub struct CoreServices {
    pub router: Arc<FallbackRouter>,
    pub migrations: MigrationEngine,
    pub audit: Arc<AuditLedger>,
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: CryptoGateway,
    logger: Logger,
    stop: watch::Sender<bool>,
    flush_loop: Option<JoinHandle<()>>,
    reaper_loop: Option<JoinHandle<()>>,
}

impl CoreServices {
    /// Brings up the full stack and applies any pending migrations.
    pub async fn start(
        config: CoreConfig,
        migrations: Vec<Arc<dyn Migration>>,
    ) -> Result<Self, ServiceError> {
        let logger = Logger::new("core", config.log_floor);

        let file_tier = FileTier::open(&config.data_dir, 1)?;
        let log_tier = LogTier::open(&config.data_dir, 2)?;
        let mem_tier = MemTier::new(3, config.mem_tier_quota);
        let tiers: Vec<Arc<dyn StorageTier>> = vec![
            Arc::new(file_tier),
            Arc::new(log_tier),
            Arc::new(mem_tier),
        ];
        let router = Arc::new(FallbackRouter::new(tiers, logger.clone()));

        let mut engine = MigrationEngine::new(router.clone(), logger.clone());
        for migration in migrations {
            engine.register(migration)?;
        }
        let summary = engine.migrate()?;
        logger.info(
            "MIGRATIONS_APPLIED",
            &[
                ("applied", &summary.applied.len().to_string()),
                ("current_version", &summary.current_version.to_string()),
            ],
        );

        let audit = Arc::new(AuditLedger::new(
            router.clone(),
            HashEngine::new(),
            config.audit_batch_size,
            logger.clone(),
        ));
        let (stop, stop_rx) = watch::channel(false);
        let flush_interval = config.audit_flush_interval;
        let flush_audit = audit.clone();
        let flush_loop = tokio::spawn(async move {
            flush_audit.run(flush_interval, stop_rx).await;
        });

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig {
                max_workers: config.effective_max_workers(),
                idle_window: config.worker_idle_window,
            },
            logger.clone(),
        ));
        // Maintenance loop: tear down workers that sat idle for a full
        // window. Shares the flush loop's stop signal.
        let reaper_orchestrator = orchestrator.clone();
        let mut reaper_stop = stop.subscribe();
        let idle_window = config.worker_idle_window;
        let reaper_loop = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle_window);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        reaper_orchestrator.reap_idle().await;
                    }
                    changed = reaper_stop.changed() => {
                        if changed.is_err() || *reaper_stop.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        let gateway = CryptoGateway::new(
            orchestrator.clone(),
            config.kdf_params,
            config.kdf_timeout,
            logger.clone(),
        );

        logger.info(
            "CORE_STARTED",
            &[("tiers", &router.tier_names().join(","))],
        );
        Ok(Self {
            router,
            migrations: engine,
            audit,
            orchestrator,
            gateway,
            logger,
            stop,
            flush_loop: Some(flush_loop),
            reaper_loop: Some(reaper_loop),
        })
    }

    /// Stops the flush loop (draining pending audit events first) and
    /// tears down the worker pool.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.flush_loop.take() {
            if handle.await.is_err() {
                self.logger.error("FLUSH_LOOP_PANICKED", &[]);
            }
        }
        if let Some(handle) = self.reaper_loop.take() {
            let _ = handle.await;
        }
        self.orchestrator.shutdown().await;
        self.logger.info("CORE_STOPPED", &[]);
    }
}
