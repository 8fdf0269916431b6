//! # Strategy Execution Engine
//!
//! ## Purpose
//!
//! Registry and supervisor for every running strategy. Owns registration,
//! lifecycle delegation, market-data fan-out, signal dispatch into the
//! processor pipeline, and the scheduled maintenance that stops idle
//! strategies and restarts failed ones.
//!
//! ## Architecture Role
//!
//! ```text
//! MarketDataRouter ─► on_candle / on_indicators ─► ManagedStrategy (×N, concurrent)
//!                                                        │ forwarded signals
//! process_signal ─► gate ─► handle_signal ───────────────┤
//!                                                        ▼
//!                                              pipeline (mpsc) ─► SignalProcessor ─► order-requests
//! ```
//!
//! ## Concurrency
//!
//! The registry is a `DashMap` of `Arc<ManagedStrategy>`. Pipeline signals
//! are processed concurrently, bounded by `max_concurrent_orders`. Fan-out and
//! maintenance iterate a cloned snapshot of handles, so no shard lock is held
//! across an `.await`. Registration reserves the id before the async
//! initialize, making concurrent duplicate registration a no-op.

use crate::configuration::StrategyConfigurationService;
use crate::error::{EngineError, Result};
use crate::lifecycle::{HandleOutcome, ManagedStrategy};
use crate::maintenance;
use crate::signal_processor::{PairThrottle, ProcessorStatistics, SignalProcessor};
use crate::strategies::StrategyKind;
use crate::{log_error, log_restart, log_search, log_success, log_warning};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use message_sink::MessageSink;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use torq_config::EngineConfig;
use torq_strategy_shared::StrategyLogic;
use torq_types::{
    CandleData, Clock, IndicatorSet, Signal, SignalValidationError, StrategyConfiguration,
    StrategyInfo, StrategyPerformance, StrategyState, SystemClock,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered,
    /// Id already registered or being registered; nothing changed
    Duplicate,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dispatched,
    UnknownStrategy,
    NotActive(StrategyState),
    Throttled,
    Invalid(SignalValidationError),
    PublishFailed(String),
}

/// Outcome of one restart sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartReport {
    pub restarted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub registered: usize,
    pub active: usize,
    pub signals_received: u64,
    pub signals_dispatched: u64,
    pub signals_rejected: u64,
    pub orders_placed: u64,
    pub orders_failed: u64,
    pub processor: ProcessorStatistics,
}

#[derive(Debug, Default)]
struct EngineMetrics {
    signals_received: AtomicU64,
    signals_dispatched: AtomicU64,
    signals_rejected: AtomicU64,
    orders_placed: AtomicU64,
    orders_failed: AtomicU64,
}

/// Releases a registration reservation on every exit path
struct Reservation<'a> {
    reserved: &'a DashSet<String>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.reserved.remove(&self.id);
    }
}

#[derive(Debug)]
pub struct StrategyExecutionEngine {
    config: EngineConfig,
    strategies: DashMap<String, Arc<ManagedStrategy>>,
    reserved: DashSet<String>,
    configurations: Arc<StrategyConfigurationService>,
    processor: Arc<SignalProcessor>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    pipeline_tx: mpsc::Sender<Signal>,
    pipeline_rx: Mutex<Option<mpsc::Receiver<Signal>>>,
    dispatch_throttle: PairThrottle,
    metrics: EngineMetrics,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StrategyExecutionEngine {
    pub fn new(
        config: EngineConfig,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let processor = SignalProcessor::from_config(&config, sink.clone(), clock.clone())
            .map_err(EngineError::setup)?;
        let (pipeline_tx, pipeline_rx) = mpsc::channel(config.engine.pipeline_capacity.max(1));

        Ok(Self {
            dispatch_throttle: PairThrottle::new(config.engine.signal_timeout()),
            config,
            strategies: DashMap::new(),
            reserved: DashSet::new(),
            configurations: Arc::new(StrategyConfigurationService::new()),
            processor: Arc::new(processor),
            sink,
            clock,
            pipeline_tx,
            pipeline_rx: Mutex::new(Some(pipeline_rx)),
            metrics: EngineMetrics::default(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn with_system_clock(config: EngineConfig, sink: Arc<dyn MessageSink>) -> Result<Self> {
        Self::new(config, sink, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<SignalProcessor> {
        &self.processor
    }

    pub fn configurations(&self) -> &Arc<StrategyConfigurationService> {
        &self.configurations
    }

    fn snapshot(&self) -> Vec<Arc<ManagedStrategy>> {
        self.strategies.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn lookup(&self, id: &str) -> Option<Arc<ManagedStrategy>> {
        self.strategies.get(id).map(|s| Arc::clone(s.value()))
    }

    fn require(&self, id: &str) -> Result<Arc<ManagedStrategy>> {
        self.lookup(id).ok_or_else(|| {
            warn!(strategy_id = %id, "Strategy not registered");
            EngineError::NotFound(id.to_string())
        })
    }

    /// Register a built-in strategy for the configuration's type
    pub async fn register_strategy(&self, config: StrategyConfiguration) -> RegistrationOutcome {
        match StrategyKind::from_configuration(&config) {
            Ok(kind) => self.register(config, kind).await,
            Err(reason) => {
                warn!(strategy_id = %config.strategy_id, %reason, "Strategy rejected");
                RegistrationOutcome::Rejected(reason)
            }
        }
    }

    /// Register externally supplied logic under `config`
    pub async fn register_custom(
        &self,
        config: StrategyConfiguration,
        logic: Box<dyn StrategyLogic>,
    ) -> RegistrationOutcome {
        self.register(config, StrategyKind::custom(logic)).await
    }

    async fn register(&self, config: StrategyConfiguration, kind: StrategyKind) -> RegistrationOutcome {
        let id = config.strategy_id.clone();

        if !config.enabled {
            warn!(strategy_id = %id, "Refusing to register disabled strategy");
            return RegistrationOutcome::Rejected(EngineError::Disabled(id).to_string());
        }

        if !self.reserved.insert(id.clone()) {
            warn!(strategy_id = %id, "Strategy registration already in progress");
            return RegistrationOutcome::Duplicate;
        }
        let _reservation = Reservation {
            reserved: &self.reserved,
            id: id.clone(),
        };
        if self.strategies.contains_key(&id) {
            warn!(strategy_id = %id, "{}", EngineError::AlreadyRegistered(id.clone()));
            return RegistrationOutcome::Duplicate;
        }

        if let Err(err) = self.configurations.validate_configuration(&id, &config) {
            warn!(strategy_id = %id, error = %err, "Strategy configuration rejected");
            return RegistrationOutcome::Rejected(err.to_string());
        }

        let strategy = ManagedStrategy::new(
            config.clone(),
            kind,
            self.sink.clone(),
            self.clock.clone(),
        )
        .with_pipeline(self.pipeline_tx.clone());

        if let Err(reason) = strategy.validate_configuration().await {
            warn!(strategy_id = %id, %reason, "Strategy validation failed");
            return RegistrationOutcome::Rejected(reason);
        }

        if let Err(err) = strategy.initialize().await {
            log_error!("Strategy {} failed to initialize: {}", id, err);
            return RegistrationOutcome::Rejected(err.to_string());
        }

        if let Err(err) = self.configurations.save_configuration(&id, config) {
            return RegistrationOutcome::Rejected(err.to_string());
        }

        self.strategies.insert(id.clone(), Arc::new(strategy));
        log_success!("Registered strategy {} ({} registered)", id, self.strategies.len());
        RegistrationOutcome::Registered
    }

    /// Stop (if active) and forget a strategy; unknown ids are a warning no-op
    pub async fn unregister_strategy(&self, id: &str) -> bool {
        let Some(strategy) = self.lookup(id) else {
            warn!(strategy_id = %id, "Unregister of unknown strategy ignored");
            return false;
        };

        if strategy.state().is_active() {
            if let Err(err) = strategy.stop().await {
                warn!(strategy_id = %id, error = %err, "Stop during unregister failed");
            }
        }

        self.strategies.remove(id);
        self.dispatch_throttle.forget_strategy(id);
        self.processor.forget_strategy(id);
        if self.configurations.delete_configuration(id).is_err() {
            debug!(strategy_id = %id, "No stored configuration to delete");
        }

        info!(strategy_id = %id, "Strategy unregistered");
        true
    }

    pub async fn start_strategy(&self, id: &str) -> Result<()> {
        self.require(id)?.start().await
    }

    pub async fn stop_strategy(&self, id: &str) -> Result<()> {
        self.require(id)?.stop().await
    }

    pub async fn pause_strategy(&self, id: &str) -> Result<()> {
        self.require(id)?.pause().await
    }

    pub async fn resume_strategy(&self, id: &str) -> Result<()> {
        self.require(id)?.resume().await
    }

    pub fn update_performance(&self, id: &str, pnl: Decimal, equity: Decimal) -> Result<()> {
        self.require(id)?.update_performance_metrics(pnl, equity);
        Ok(())
    }

    /// Route an externally produced signal to its owning strategy
    pub async fn process_signal(&self, signal: Signal) -> DispatchOutcome {
        self.metrics.signals_received.fetch_add(1, Ordering::Relaxed);
        let outcome = self.dispatch(signal).await;
        match &outcome {
            DispatchOutcome::Dispatched => {
                self.metrics.signals_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            other => {
                debug!(outcome = ?other, "Signal not dispatched");
                self.metrics.signals_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    async fn dispatch(&self, signal: Signal) -> DispatchOutcome {
        let Some(strategy) = self.lookup(&signal.strategy_id) else {
            warn!(strategy_id = %signal.strategy_id, "Signal for unknown strategy");
            return DispatchOutcome::UnknownStrategy;
        };

        let state = strategy.state();
        if !state.is_active() {
            return DispatchOutcome::NotActive(state);
        }

        if let Err(reason) = signal.validate() {
            return DispatchOutcome::Invalid(reason);
        }

        if !self
            .dispatch_throttle
            .try_acquire(signal.key(), self.clock.now_ns())
        {
            return DispatchOutcome::Throttled;
        }

        match strategy.handle_signal(signal).await {
            HandleOutcome::Forwarded => DispatchOutcome::Dispatched,
            HandleOutcome::PublishFailed(message) => DispatchOutcome::PublishFailed(message),
            HandleOutcome::Rejected(reason) => DispatchOutcome::Invalid(reason),
        }
    }

    /// Fan a candle out to every strategy; returns signals forwarded
    pub async fn on_candle(&self, candle: &CandleData) -> usize {
        let strategies = self.snapshot();
        join_all(strategies.iter().map(|s| s.process_candle(candle)))
            .await
            .into_iter()
            .sum()
    }

    /// Fan an indicator set out to every strategy; returns signals forwarded
    pub async fn on_indicators(&self, indicators: &IndicatorSet) -> usize {
        let strategies = self.snapshot();
        join_all(strategies.iter().map(|s| s.process_indicators(indicators)))
            .await
            .into_iter()
            .sum()
    }

    /// Record the broker's verdict on an order; counters only
    pub fn handle_order_result(
        &self,
        strategy_id: &str,
        order_id: Uuid,
        success: bool,
        message: &str,
    ) {
        if success {
            self.metrics.orders_placed.fetch_add(1, Ordering::Relaxed);
            debug!(%strategy_id, %order_id, "Order placed");
        } else {
            self.metrics.orders_failed.fetch_add(1, Ordering::Relaxed);
            warn!(%strategy_id, %order_id, %message, "Order failed");
        }
    }

    pub fn get_active_strategies(&self) -> Vec<StrategyInfo> {
        let mut active: Vec<StrategyInfo> = self
            .snapshot()
            .iter()
            .filter(|s| s.state().is_active())
            .map(|s| s.info())
            .collect();
        active.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        active
    }

    pub fn get_strategy_info(&self, id: &str) -> Option<StrategyInfo> {
        self.lookup(id).map(|s| s.info())
    }

    pub fn get_strategy_performance(&self) -> Vec<StrategyPerformance> {
        let mut all: Vec<StrategyPerformance> =
            self.snapshot().iter().map(|s| s.performance()).collect();
        all.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        all
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Stop ACTIVE strategies idle for longer than the inactivity window
    pub async fn cleanup_inactive_strategies(&self) -> Vec<String> {
        let now = self.clock.now_ns();
        let window = self.config.engine.inactivity_timeout().as_nanos() as u64;

        let idle: Vec<Arc<ManagedStrategy>> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.state().is_active() && now.saturating_sub(s.last_update_ns()) > window)
            .collect();

        let mut stopped = Vec::with_capacity(idle.len());
        for strategy in idle {
            match strategy.stop().await {
                Ok(()) => {
                    log_search!("Stopped inactive strategy {}", strategy.id());
                    stopped.push(strategy.id().to_string());
                }
                Err(err) => log_warning!("Inactive strategy {} left in ERROR: {}", strategy.id(), err),
            }
        }
        stopped
    }

    /// Recover → pause → start every strategy in ERROR
    ///
    /// Logs exactly one outcome line per strategy per sweep.
    pub async fn restart_failed_strategies(&self) -> RestartReport {
        let failed: Vec<Arc<ManagedStrategy>> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.state() == StrategyState::Error)
            .collect();

        let mut report = RestartReport::default();
        for strategy in failed {
            let id = strategy.id().to_string();
            let result = match strategy.recover().await {
                Ok(()) => {
                    tokio::time::sleep(self.config.engine.restart_pause()).await;
                    strategy.start().await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {
                    log_restart!("Restarted strategy {}", id);
                    report.restarted.push(id);
                }
                Err(err) => {
                    log_error!("Restart of strategy {} failed: {}", id, err);
                    report.failed.push(id);
                }
            }
        }
        report
    }

    pub fn statistics(&self) -> EngineStatistics {
        let strategies = self.snapshot();
        EngineStatistics {
            registered: strategies.len(),
            active: strategies.iter().filter(|s| s.state().is_active()).count(),
            signals_received: self.metrics.signals_received.load(Ordering::Relaxed),
            signals_dispatched: self.metrics.signals_dispatched.load(Ordering::Relaxed),
            signals_rejected: self.metrics.signals_rejected.load(Ordering::Relaxed),
            orders_placed: self.metrics.orders_placed.load(Ordering::Relaxed),
            orders_failed: self.metrics.orders_failed.load(Ordering::Relaxed),
            processor: self.processor.statistics(),
        }
    }

    /// Spawn the pipeline drain and maintenance tasks
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let Some(rx) = self.pipeline_rx.lock().take() else {
            return Err(EngineError::Setup {
                message: "engine already started".to_string(),
            });
        };

        let pipeline = tokio::spawn(drain_pipeline(
            rx,
            Arc::clone(&self.processor),
            self.config.engine.max_concurrent_orders.max(1),
            self.shutdown.clone(),
        ));
        let maintenance = maintenance::spawn(
            Arc::downgrade(self),
            &self.config.engine,
            self.shutdown.clone(),
        );

        self.tasks.lock().extend([pipeline, maintenance]);
        log_success!("Strategy engine started");
        Ok(())
    }

    /// Cancel background tasks, stop every ACTIVE strategy and wait for the tasks
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let active: Vec<Arc<ManagedStrategy>> = self
            .snapshot()
            .into_iter()
            .filter(|s| s.state().is_active())
            .collect();
        for (strategy, result) in active
            .iter()
            .zip(join_all(active.iter().map(|s| s.stop())).await)
        {
            if let Err(err) = result {
                log_warning!("Strategy {} failed to stop during shutdown: {}", strategy.id(), err);
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(err) = result {
                warn!(error = %err, "Engine task ended abnormally");
            }
        }

        info!(strategies = self.strategies.len(), "Strategy engine shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Process queued signals concurrently, at most `limit` in flight
///
/// Stops taking new signals when `shutdown` fires, then closes the channel
/// and processes whatever was already queued.
async fn drain_pipeline(
    mut rx: mpsc::Receiver<Signal>,
    processor: Arc<SignalProcessor>,
    limit: usize,
    shutdown: CancellationToken,
) {
    let process = |signal: Signal| {
        let processor = Arc::clone(&processor);
        async move {
            processor.process_signal(signal).await;
        }
    };

    stream::poll_fn(|cx| rx.poll_recv(cx))
        .take_until(shutdown.cancelled())
        .for_each_concurrent(limit, process)
        .await;

    // Signals already queued still become orders
    rx.close();
    stream::poll_fn(|cx| rx.poll_recv(cx))
        .for_each_concurrent(limit, process)
        .await;
    debug!("Signal pipeline drained");
}
