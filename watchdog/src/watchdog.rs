use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::WatchdogConfig;
use crate::fetcher::HttpFetcher;
use crate::registry::check_registry;
use crate::restart::Restarter;
use crate::sync;
use crate::types::{CycleOutcome, RegistryStatus, RestartInvocation, RestartReason};

/// Counters reported on shutdown.
#[derive(Debug, Default)]
pub struct WatchdogStats {
    pub cycles: AtomicU64,
    /// Restarts actually issued (spawned or dry run).
    pub restarts: AtomicU64,
    /// Restarts decided on but not issued, e.g. the command could not be spawned.
    pub failed_restarts: AtomicU64,
    pub skipped: AtomicU64,
}

pub struct Watchdog {
    config: Arc<WatchdogConfig>,
    fetcher: HttpFetcher,
    restarter: Arc<dyn Restarter>,
    /// Held for the duration of a cycle; never awaited.
    cycle_lock: Mutex<()>,
    tasks: TaskTracker,
    stats: WatchdogStats,
}

impl Watchdog {
    pub fn new(
        config: Arc<WatchdogConfig>,
        fetcher: HttpFetcher,
        restarter: Arc<dyn Restarter>,
    ) -> Self {
        Self {
            config,
            fetcher,
            restarter,
            cycle_lock: Mutex::new(()),
            tasks: TaskTracker::new(),
            stats: WatchdogStats::default(),
        }
    }

    pub fn stats(&self) -> &WatchdogStats {
        &self.stats
    }

    /// Run one check-and-decide cycle. Returns `None` without doing anything
    /// if another cycle is still in progress.
    pub async fn run_cycle(&self) -> Option<CycleOutcome> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Previous cycle still running, skipping this one");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let span = info_span!(
            "cycle",
            id = %Uuid::new_v4(),
            network = %self.config.network,
            node = %self.config.node_id
        );
        let outcome = self.evaluate().instrument(span).await;

        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        match outcome.restart_invocation() {
            Some(RestartInvocation::Failed(_)) => {
                self.stats.failed_restarts.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.stats.restarts.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
        Some(outcome)
    }

    async fn evaluate(&self) -> CycleOutcome {
        let cfg = &self.config;

        match check_registry(&self.fetcher, &cfg.registry_url, &cfg.node_id, cfg.registry_match)
            .await
        {
            Err(e) => {
                warn!("Registry unreachable, not restarting: {}", e);
                return CycleOutcome::RegistryUnreachable { status: None };
            }
            Ok(RegistryStatus::Unavailable { status }) => {
                warn!("Registry returned status {}, not restarting", status);
                return CycleOutcome::RegistryUnreachable {
                    status: Some(status),
                };
            }
            Ok(RegistryStatus::Listed {
                status,
                present: false,
            }) => {
                warn!(
                    "Node {} not listed by registry (status {}), restarting",
                    cfg.node_id, status
                );
                let restart = self.restart(RestartReason::Unregistered);
                return CycleOutcome::NodeNotRegistered { restart };
            }
            Ok(RegistryStatus::Listed {
                status,
                present: true,
            }) => {
                info!("Node {} listed by registry (status {})", cfg.node_id, status);
            }
        }

        let verdict =
            match sync::evaluate(&self.fetcher, &cfg.local_url, &cfg.reference_url, cfg.tolerance)
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("Cannot judge sync, not restarting: {}", e);
                    return CycleOutcome::IndicesUnavailable;
                }
            };

        if verdict.synced {
            info!(
                "Node synced: local={}, reference={}, diff={}, tolerance={}",
                verdict.local, verdict.reference, verdict.diff, verdict.tolerance
            );
            return CycleOutcome::Synced(verdict);
        }

        warn!(
            "Node out of sync: local={}, reference={}, diff={} > tolerance={}, restarting",
            verdict.local, verdict.reference, verdict.diff, verdict.tolerance
        );
        let restart = self.restart(RestartReason::Lag {
            diff: verdict.diff,
            tolerance: verdict.tolerance,
        });
        CycleOutcome::UnsyncedRestarted { verdict, restart }
    }

    fn restart(&self, reason: RestartReason) -> RestartInvocation {
        let invocation = self.restarter.restart(reason, &self.tasks);
        match &invocation {
            RestartInvocation::Failed(e) => error!("Restart not issued ({}): {}", reason, e),
            other => info!("Restart {} ({})", other, reason),
        }
        invocation
    }

    /// Run cycles on the configured interval until `shutdown` fires. A
    /// cycle in flight at shutdown is abandoned.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting watchdog loop (every {}s, tolerance {})",
            self.config.interval.as_secs(),
            self.config.tolerance
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during cycle, abandoning it");
                    break;
                }
                outcome = self.run_cycle() => {
                    if let Some(outcome) = outcome {
                        info!("Cycle outcome: {}", outcome);
                    }
                }
            }
        }
    }

    /// Wait for outstanding restart commands to be reaped, up to `limit`.
    pub async fn drain(&self, limit: Duration) {
        self.tasks.close();
        if tokio::time::timeout(limit, self.tasks.wait()).await.is_err() {
            warn!(
                "{} restart command(s) still running after {}s",
                self.tasks.len(),
                limit.as_secs()
            );
        }

        let stats = self.stats();
        info!(
            "Watchdog stopped: cycles={}, restarts={}, failed_restarts={}, skipped={}",
            stats.cycles.load(Ordering::Relaxed),
            stats.restarts.load(Ordering::Relaxed),
            stats.failed_restarts.load(Ordering::Relaxed),
            stats.skipped.load(Ordering::Relaxed)
        );
    }
}
