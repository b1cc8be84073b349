//! Deferred garbage collector.
//!
//! Operations never remove content from the pool inline. They append the
//! root address of every dereferenced tree to the pending-delete queue
//! (`delObj/{uuid}`), and the [`GarbageCollector`] drains that queue in the
//! background.
//!
//! A cycle only runs when the host looks idle according to an
//! [`IdleProbe`], and each cycle is bounded by its own deadline. A pool
//! failure stops the cycle at the failing entry, which stays queued for the
//! next one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dagstore_kv::MetaDb;
use dagstore_pool::{ContentAddress, DagPool, PoolError};
use parking_lot::Mutex;
use sysinfo::System;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::state::PendingDelete;
use crate::utils::PENDING_DELETE_PREFIX;

// ---------------------------------------------------------------------------
// Idle probes
// ---------------------------------------------------------------------------

/// Decides whether the host has capacity for a collection cycle.
#[async_trait]
pub trait IdleProbe: Send + Sync + fmt::Debug {
    /// Whether a cycle may run now.
    async fn is_idle(&self) -> bool;
}

/// Probe that always reports the host as idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysIdle;

#[async_trait]
impl IdleProbe for AlwaysIdle {
    async fn is_idle(&self) -> bool {
        true
    }
}

/// Probe that samples host CPU and memory usage.
pub struct SystemIdleProbe {
    system: Mutex<System>,
    max_cpu_percent: f32,
    max_memory_percent: f32,
}

impl SystemIdleProbe {
    /// Create a probe with explicit thresholds, in percent.
    #[must_use]
    pub fn new(max_cpu_percent: f32, max_memory_percent: f32) -> Self {
        Self {
            system: Mutex::new(System::new()),
            max_cpu_percent,
            max_memory_percent,
        }
    }

    /// Create a probe with the thresholds from `config`.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.gc_max_cpu_percent, config.gc_max_memory_percent)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn sample(&self) -> (f32, f32) {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let total = system.total_memory();
        let memory = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f64 * 100.0 / total as f64) as f32
        };
        (system.global_cpu_usage(), memory)
    }
}

impl fmt::Debug for SystemIdleProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemIdleProbe")
            .field("max_cpu_percent", &self.max_cpu_percent)
            .field("max_memory_percent", &self.max_memory_percent)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdleProbe for SystemIdleProbe {
    async fn is_idle(&self) -> bool {
        // CPU usage is the delta between two refreshes.
        self.system.lock().refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let (cpu, memory) = self.sample();
        debug!(cpu, memory, "sampled host load");
        cpu < self.max_cpu_percent && memory < self.max_memory_percent
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// The host was busy and the queue was not touched.
    pub skipped: bool,
    /// Trees released from the pool.
    pub removed: usize,
    /// Malformed or already-missing entries dropped from the queue.
    pub discarded: usize,
    /// The cycle stopped early on a pool failure, deadline or shutdown.
    pub aborted: bool,
}

/// Background collector draining the pending-delete queue.
#[derive(Debug)]
pub struct GarbageCollector {
    db: MetaDb,
    pool: Arc<dyn DagPool>,
    probe: Arc<dyn IdleProbe>,
    period: Duration,
    timeout: Duration,
}

impl GarbageCollector {
    /// Create a collector with an explicit period and per-cycle deadline.
    #[must_use]
    pub fn new(
        db: MetaDb,
        pool: Arc<dyn DagPool>,
        probe: Arc<dyn IdleProbe>,
        period: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            pool,
            probe,
            period,
            timeout,
        }
    }

    /// Create a collector using the cadence from `config`.
    #[must_use]
    pub fn from_config(
        db: MetaDb,
        pool: Arc<dyn DagPool>,
        probe: Arc<dyn IdleProbe>,
        config: &StoreConfig,
    ) -> Self {
        Self::new(db, pool, probe, config.gc_period(), config.gc_timeout())
    }

    /// Run exactly one cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> StoreResult<GcReport> {
        let mut report = GcReport::default();
        if !self.probe.is_idle().await {
            debug!("host busy, skipping garbage collection");
            report.skipped = true;
            return Ok(report);
        }

        match tokio::time::timeout(self.timeout, self.sweep(cancel, &mut report)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "garbage collection cycle hit its deadline");
                report.aborted = true;
            }
        }
        if report.removed > 0 || report.discarded > 0 || report.aborted {
            info!(
                removed = report.removed,
                discarded = report.discarded,
                aborted = report.aborted,
                "garbage collection cycle finished"
            );
        }
        Ok(report)
    }

    async fn sweep(&self, cancel: &CancellationToken, report: &mut GcReport) -> StoreResult<()> {
        let mut rx = self.db.read_all(PENDING_DELETE_PREFIX, None);
        while let Some(entry) = rx.recv().await {
            if cancel.is_cancelled() {
                report.aborted = true;
                return Ok(());
            }
            let entry = entry?;

            let address = match entry
                .decode::<PendingDelete>()
                .map_err(|e| e.to_string())
                .and_then(|p| p.address.parse::<ContentAddress>().map_err(|e| e.to_string()))
            {
                Ok(address) => address,
                Err(reason) => {
                    warn!(key = %entry.key, %reason, "discarding malformed pending-delete entry");
                    self.db.delete(&entry.key)?;
                    report.discarded += 1;
                    continue;
                }
            };

            match self.pool.remove_dag(&address).await {
                Ok(()) => {
                    self.db.delete(&entry.key)?;
                    report.removed += 1;
                    debug!(%address, "released tree");
                }
                Err(PoolError::NotFound { .. }) => {
                    warn!(%address, "pending-delete entry references missing tree");
                    self.db.delete(&entry.key)?;
                    report.discarded += 1;
                }
                Err(e) => {
                    error!(%address, error = %e, "failed to release tree, stopping cycle");
                    report.aborted = true;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Run cycles every period until `shutdown` is canceled.
    ///
    /// The first cycle runs one full period after the call.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.period.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?period, "garbage collector started");

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_cycle(&shutdown).await {
                            error!(error = %e, "garbage collection cycle failed");
                        }
                    }
                }
            }
            info!("garbage collector stopped");
        })
    }
}
