//! Scheduled engine maintenance
//!
//! Two independent timers: an inactivity sweep every `cleanup_interval` and
//! a restart sweep for failed strategies every `restart_interval`. Both stop
//! when the engine's cancellation token fires or the engine is dropped.

use crate::engine::StrategyExecutionEngine;
use crate::log_metrics;
use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use torq_config::EngineSettings;
use tracing::debug;

pub fn spawn(
    engine: Weak<StrategyExecutionEngine>,
    settings: &EngineSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let cleanup_every = settings.cleanup_interval();
    let restart_every = settings.restart_interval();

    tokio::spawn(async move {
        let mut cleanup = interval_at(Instant::now() + cleanup_every, cleanup_every);
        let mut restart = interval_at(Instant::now() + restart_every, restart_every);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        restart.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cleanup.tick() => {
                    let Some(engine) = engine.upgrade() else { break };
                    let stopped = engine.cleanup_inactive_strategies().await;
                    if !stopped.is_empty() {
                        log_metrics!("Inactivity sweep stopped {} strategies", stopped.len());
                    }
                }
                _ = restart.tick() => {
                    let Some(engine) = engine.upgrade() else { break };
                    let report = engine.restart_failed_strategies().await;
                    if !report.restarted.is_empty() || !report.failed.is_empty() {
                        log_metrics!(
                            "Restart sweep: {} restarted, {} still failed",
                            report.restarted.len(),
                            report.failed.len()
                        );
                    }
                }
            }
        }
        debug!("Maintenance scheduler stopped");
    })
}
