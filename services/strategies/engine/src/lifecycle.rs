//! # Managed Strategy Lifecycle
//!
//! ## Purpose
//!
//! Wraps one concrete [`StrategyKind`] with the lifecycle state machine,
//! execution counters and performance tracking. Every failure inside a
//! concrete hook (returned error or panic) is caught here, logged and turned
//! into an `ERROR` transition; nothing escapes to the caller as a panic.
//!
//! ## Integration Points
//!
//! - **Sink**: every transition publishes a [`StrategyInfo`] on
//!   `strategy-states`; forwarded signals go to `trading-signals`
//! - **Pipeline**: forwarded signals are also queued for the signal processor
//! - **Engine**: owns `Arc<ManagedStrategy>` handles in its registry
//!
//! ## Concurrency
//!
//! All lifecycle and callback calls on one strategy run under that
//! strategy's async mutex. Snapshot reads (`state`, `info`, `performance`)
//! never wait on it.

use crate::error::{EngineError, Result};
use crate::strategies::StrategyKind;
use futures::FutureExt;
use message_sink::{publish_json, topics, MessageSink};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use torq_strategy_shared::{ExecutionCounters, PerformanceTracker, StrategyLogic};
use torq_types::{
    CandleData, Clock, IndicatorSet, Signal, SignalValidationError, StrategyConfiguration,
    StrategyInfo, StrategyPerformance, StrategyState,
};
use tracing::{debug, error, info, warn};

/// Result of handing one signal to a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Published on `trading-signals` and queued for processing
    Forwarded,
    /// Counted and queued, but the `trading-signals` publish failed
    PublishFailed(String),
    /// Failed shape validation; not counted, not forwarded
    Rejected(SignalValidationError),
}

/// Run a concrete hook, converting errors and panics into a message
async fn guarded<T, F>(hook: F) -> std::result::Result<T, String>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// One supervised strategy
#[derive(Debug)]
pub struct ManagedStrategy {
    config: StrategyConfiguration,
    logic: tokio::sync::Mutex<StrategyKind>,
    state: RwLock<StrategyState>,
    performance: Mutex<PerformanceTracker>,
    counters: ExecutionCounters,
    last_update_ns: AtomicU64,
    last_error: RwLock<Option<String>>,
    sink: Arc<dyn MessageSink>,
    pipeline: Option<mpsc::Sender<Signal>>,
    clock: Arc<dyn Clock>,
}

impl ManagedStrategy {
    pub fn new(
        config: StrategyConfiguration,
        logic: StrategyKind,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_ns();
        Self {
            config,
            logic: tokio::sync::Mutex::new(logic),
            state: RwLock::new(StrategyState::Initialized),
            performance: Mutex::new(PerformanceTracker::new()),
            counters: ExecutionCounters::new(),
            last_update_ns: AtomicU64::new(now),
            last_error: RwLock::new(None),
            sink,
            pipeline: None,
            clock,
        }
    }

    /// Queue forwarded signals on `pipeline` in addition to publishing them
    pub fn with_pipeline(mut self, pipeline: mpsc::Sender<Signal>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.strategy_id
    }

    pub fn configuration(&self) -> &StrategyConfiguration {
        &self.config
    }

    pub fn state(&self) -> StrategyState {
        *self.state.read()
    }

    pub fn last_update_ns(&self) -> u64 {
        self.last_update_ns.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn touch(&self) {
        self.last_update_ns
            .store(self.clock.now_ns(), Ordering::Release);
    }

    fn invalid_state(&self, operation: &'static str) -> EngineError {
        EngineError::InvalidState {
            id: self.id().to_string(),
            operation,
            state: self.state(),
        }
    }

    /// Apply an allowed transition, stamp it and publish the new state
    async fn transition(&self, next: StrategyState) {
        {
            let mut state = self.state.write();
            if !state.can_transition_to(next) {
                warn!(
                    strategy_id = %self.id(),
                    from = %*state,
                    to = %next,
                    "Ignoring disallowed transition"
                );
                return;
            }
            debug!(strategy_id = %self.id(), from = %*state, to = %next, "State transition");
            *state = next;
        }
        if next == StrategyState::Active {
            *self.last_error.write() = None;
        }
        self.touch();
        self.publish_state().await;
    }

    async fn fail(&self, operation: &'static str, message: String) -> EngineError {
        error!(
            strategy_id = %self.id(),
            operation,
            error = %message,
            "Strategy hook failed"
        );
        *self.last_error.write() = Some(message.clone());
        self.transition(StrategyState::Error).await;
        EngineError::Lifecycle {
            id: self.id().to_string(),
            message,
        }
    }

    async fn publish_state(&self) {
        let info = self.info();
        if let Err(e) = publish_json(
            self.sink.as_ref(),
            topics::STRATEGY_STATES,
            self.id(),
            &info,
        )
        .await
        {
            warn!(strategy_id = %self.id(), error = %e, "Failed to publish strategy state");
        }
    }

    /// Run concrete setup: INITIALIZED → ACTIVE, or ERROR on failure
    pub async fn initialize(&self) -> Result<()> {
        let mut logic = self.logic.lock().await;
        if self.state() != StrategyState::Initialized {
            return Err(self.invalid_state("initialize"));
        }
        match guarded(logic.initialize(&self.config)).await {
            Ok(()) => {
                info!(strategy_id = %self.id(), strategy = %logic.name(), "Strategy initialized");
                self.transition(StrategyState::Active).await;
                Ok(())
            }
            Err(message) => Err(self.fail("initialize", message).await),
        }
    }

    /// INITIALIZED | STOPPED → ACTIVE
    pub async fn start(&self) -> Result<()> {
        let mut logic = self.logic.lock().await;
        if !matches!(
            self.state(),
            StrategyState::Initialized | StrategyState::Stopped
        ) {
            return Err(self.invalid_state("start"));
        }
        match guarded(logic.start()).await {
            Ok(()) => {
                info!(strategy_id = %self.id(), "Strategy started");
                self.transition(StrategyState::Active).await;
                Ok(())
            }
            Err(message) => Err(self.fail("start", message).await),
        }
    }

    /// ACTIVE → STOPPED
    pub async fn stop(&self) -> Result<()> {
        let mut logic = self.logic.lock().await;
        if self.state() != StrategyState::Active {
            return Err(self.invalid_state("stop"));
        }
        match guarded(logic.stop()).await {
            Ok(()) => {
                info!(strategy_id = %self.id(), "Strategy stopped");
                self.transition(StrategyState::Stopped).await;
                Ok(())
            }
            Err(message) => Err(self.fail("stop", message).await),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let _logic = self.logic.lock().await;
        if self.state() != StrategyState::Active {
            return Err(self.invalid_state("pause"));
        }
        self.transition(StrategyState::Paused).await;
        info!(strategy_id = %self.id(), "Strategy paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let _logic = self.logic.lock().await;
        if self.state() != StrategyState::Paused {
            return Err(self.invalid_state("resume"));
        }
        self.transition(StrategyState::Active).await;
        info!(strategy_id = %self.id(), "Strategy resumed");
        Ok(())
    }

    /// ERROR → STOPPED after releasing resources through the stop hook
    ///
    /// A failing stop hook leaves the strategy in ERROR.
    pub async fn recover(&self) -> Result<()> {
        let mut logic = self.logic.lock().await;
        if self.state() != StrategyState::Error {
            return Err(self.invalid_state("recover"));
        }
        match guarded(logic.stop()).await {
            Ok(()) => {
                self.transition(StrategyState::Stopped).await;
                Ok(())
            }
            Err(message) => {
                warn!(strategy_id = %self.id(), error = %message, "Recovery stop hook failed");
                *self.last_error.write() = Some(message.clone());
                self.touch();
                Err(EngineError::Lifecycle {
                    id: self.id().to_string(),
                    message,
                })
            }
        }
    }

    /// Feed a candle; returns the number of signals forwarded
    pub async fn process_candle(&self, candle: &CandleData) -> usize {
        let mut logic = self.logic.lock().await;
        if !self.state().is_active() {
            return 0;
        }
        self.touch();
        match guarded(logic.on_candle(candle)).await {
            Ok(signals) => self.forward_all(signals).await,
            Err(message) => {
                self.fail("process_candle", message).await;
                0
            }
        }
    }

    /// Feed an indicator set; returns the number of signals forwarded
    pub async fn process_indicators(&self, indicators: &IndicatorSet) -> usize {
        let mut logic = self.logic.lock().await;
        if !self.state().is_active() {
            return 0;
        }
        self.touch();
        match guarded(logic.on_indicators(indicators)).await {
            Ok(signals) => self.forward_all(signals).await,
            Err(message) => {
                self.fail("process_indicators", message).await;
                0
            }
        }
    }

    async fn forward_all(&self, signals: Vec<Signal>) -> usize {
        let mut forwarded = 0;
        for signal in signals {
            if !matches!(self.forward_signal(signal).await, HandleOutcome::Rejected(_)) {
                forwarded += 1;
            }
        }
        forwarded
    }

    /// Validate and forward a signal produced for this strategy
    pub async fn handle_signal(&self, signal: Signal) -> HandleOutcome {
        let _logic = self.logic.lock().await;
        self.forward_signal(signal).await
    }

    async fn forward_signal(&self, signal: Signal) -> HandleOutcome {
        if let Err(reason) = signal.validate() {
            warn!(
                strategy_id = %self.id(),
                symbol = %signal.symbol,
                %reason,
                "Rejecting invalid signal"
            );
            return HandleOutcome::Rejected(reason);
        }

        self.counters.record_execution(self.clock.now_ns());
        self.touch();

        let outcome = match publish_json(
            self.sink.as_ref(),
            topics::TRADING_SIGNALS,
            &signal.symbol,
            &signal,
        )
        .await
        {
            Ok(()) => {
                self.counters.record_success();
                HandleOutcome::Forwarded
            }
            Err(e) => {
                self.counters.record_failure();
                warn!(strategy_id = %self.id(), symbol = %signal.symbol, error = %e, "Signal publish failed");
                HandleOutcome::PublishFailed(e.to_string())
            }
        };

        if let Some(pipeline) = &self.pipeline {
            if let Err(e) = pipeline.try_send(signal) {
                warn!(strategy_id = %self.id(), error = %e, "Signal pipeline unavailable, dropping");
            }
        }

        outcome
    }

    pub fn update_performance_metrics(&self, pnl: Decimal, equity: Decimal) {
        self.performance.lock().update(pnl, equity);
        self.touch();
    }

    /// Non-empty id and name, then the concrete validation hook
    pub async fn validate_configuration(&self) -> std::result::Result<(), String> {
        if self.config.strategy_id.trim().is_empty() {
            return Err("strategy_id must not be empty".to_string());
        }
        if self.config.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        let logic = self.logic.lock().await;
        logic.validate(&self.config)
    }

    pub fn performance(&self) -> StrategyPerformance {
        let counters = self.counters.snapshot();
        let tracker = self.performance.lock().clone();
        StrategyPerformance {
            strategy_id: self.id().to_string(),
            execution_count: counters.execution_count,
            success_count: counters.success_count,
            failure_count: counters.failure_count,
            total_pnl: tracker.total_pnl(),
            peak_equity: tracker.peak_equity(),
            max_drawdown: tracker.max_drawdown(),
            last_execution_ns: counters.last_execution_ns,
        }
    }

    pub fn info(&self) -> StrategyInfo {
        StrategyInfo {
            strategy_id: self.id().to_string(),
            name: self.config.name.clone(),
            strategy_type: self.config.strategy_type,
            state: self.state(),
            performance: self.performance(),
            last_update_ns: self.last_update_ns(),
            last_error: self.last_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use message_sink::test_utils::CollectorSink;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use torq_strategy_shared::{MockControl, MockStrategy};
    use torq_types::{ManualClock, SignalAction, StrategyType};

    struct Fixture {
        strategy: ManagedStrategy,
        control: Arc<MockControl>,
        sink: Arc<CollectorSink>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let mock = MockStrategy::new("mock");
        let control = mock.control();
        let sink = Arc::new(CollectorSink::connected());
        let clock = Arc::new(ManualClock::new(1_000));
        let config = StrategyConfiguration::new("s1", "Mock", StrategyType::Custom);
        let strategy = ManagedStrategy::new(
            config,
            StrategyKind::custom(Box::new(mock)),
            sink.clone(),
            clock.clone(),
        );
        Fixture {
            strategy,
            control,
            sink,
            clock,
        }
    }

    fn states(sink: &CollectorSink) -> Vec<StrategyState> {
        sink.decoded::<StrategyInfo>(topics::STRATEGY_STATES)
            .into_iter()
            .map(|i| i.state)
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_publishes_active() {
        let f = fixture();
        f.strategy.initialize().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Active);
        assert_eq!(states(&f.sink), vec![StrategyState::Active]);
    }

    #[tokio::test]
    async fn test_initialize_failure_moves_to_error() {
        let f = fixture();
        f.control.fail_initialize();
        let err = f.strategy.initialize().await.unwrap_err();
        assert!(matches!(err, EngineError::Lifecycle { .. }));
        assert_eq!(f.strategy.state(), StrategyState::Error);
        assert!(f.strategy.last_error().unwrap().contains("mock initialize failure"));
        assert_eq!(states(&f.sink), vec![StrategyState::Error]);
    }

    #[tokio::test]
    async fn test_panic_in_hook_is_caught() {
        let f = fixture();
        f.control.panic_on_start();
        let err = f.strategy.start().await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
        assert_eq!(f.strategy.state(), StrategyState::Error);
    }

    #[tokio::test]
    async fn test_stop_only_from_active() {
        let f = fixture();
        assert!(matches!(
            f.strategy.stop().await,
            Err(EngineError::InvalidState { .. })
        ));
        f.strategy.initialize().await.unwrap();
        f.strategy.stop().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Stopped);
        assert_eq!(f.control.calls(&f.control.stop_calls), 1);
    }

    #[tokio::test]
    async fn test_error_reaches_active_only_through_stopped() {
        let f = fixture();
        f.control.fail_initialize();
        let _ = f.strategy.initialize().await;
        assert_eq!(f.strategy.state(), StrategyState::Error);

        assert!(f.strategy.start().await.is_err());
        assert!(f.strategy.resume().await.is_err());
        assert_eq!(f.strategy.state(), StrategyState::Error);

        f.strategy.recover().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Stopped);
        f.strategy.start().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Active);
        assert_eq!(f.strategy.last_error(), None);
    }

    #[tokio::test]
    async fn test_recover_stays_in_error_when_stop_hook_fails() {
        let f = fixture();
        f.control.fail_initialize();
        let _ = f.strategy.initialize().await;
        f.control.fail_stop(true);
        assert!(f.strategy.recover().await.is_err());
        assert_eq!(f.strategy.state(), StrategyState::Error);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let f = fixture();
        f.strategy.initialize().await.unwrap();
        f.strategy.pause().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Paused);

        let set = IndicatorSet::new("NIFTY", 0);
        assert_eq!(f.strategy.process_indicators(&set).await, 0);
        assert_eq!(f.control.calls(&f.control.indicator_calls), 0);

        f.strategy.resume().await.unwrap();
        assert_eq!(f.strategy.state(), StrategyState::Active);
    }

    #[tokio::test]
    async fn test_invalid_signal_is_not_counted() {
        let f = fixture();
        f.strategy.initialize().await.unwrap();
        let signal = Signal::market("s1", "", SignalAction::Buy, dec!(1));
        assert_eq!(
            f.strategy.handle_signal(signal).await,
            HandleOutcome::Rejected(SignalValidationError::EmptySymbol)
        );
        assert_eq!(f.strategy.performance().execution_count, 0);
        assert!(f.sink.messages_on(topics::TRADING_SIGNALS).is_empty());
    }

    #[tokio::test]
    async fn test_forwarded_signals_update_counters() {
        let f = fixture();
        f.strategy.initialize().await.unwrap();
        f.clock.advance(Duration::from_secs(1));

        let signal = Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(1));
        assert_eq!(f.strategy.handle_signal(signal.clone()).await, HandleOutcome::Forwarded);

        f.sink.fail_next_send();
        assert!(matches!(
            f.strategy.handle_signal(signal).await,
            HandleOutcome::PublishFailed(_)
        ));

        let perf = f.strategy.performance();
        assert_eq!(perf.execution_count, 2);
        assert_eq!(perf.success_count, 1);
        assert_eq!(perf.failure_count, 1);
        assert_eq!(perf.last_execution_ns, 1_000 + 1_000_000_000);

        let published = f.sink.messages_on(topics::TRADING_SIGNALS);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key(), Some("NIFTY"));
    }

    #[tokio::test]
    async fn test_callback_signals_reach_pipeline() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(8);
        let strategy = f.strategy.with_pipeline(tx);
        strategy.initialize().await.unwrap();

        f.control.queue_signals(vec![
            Signal::market("s1", "NIFTY", SignalAction::Sell, dec!(2)),
            Signal::market("s1", "NIFTY", SignalAction::Sell, dec!(0)),
        ]);
        let set = IndicatorSet::new("NIFTY", 0);
        assert_eq!(strategy.process_indicators(&set).await, 1);

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.quantity, dec!(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_callback_failure_moves_to_error() {
        let f = fixture();
        f.strategy.initialize().await.unwrap();
        f.control.fail_callbacks(true);

        let candle = CandleData {
            symbol: "NIFTY".to_string(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
            timestamp_ns: 0,
        };
        assert_eq!(f.strategy.process_candle(&candle).await, 0);
        assert_eq!(f.strategy.state(), StrategyState::Error);
    }

    #[tokio::test]
    async fn test_performance_and_validation() {
        let f = fixture();
        f.strategy.update_performance_metrics(dec!(100), dec!(1100));
        f.strategy.update_performance_metrics(dec!(-220), dec!(880));
        let perf = f.strategy.performance();
        assert_eq!(perf.total_pnl, dec!(-120));
        assert_eq!(perf.peak_equity, dec!(1100));
        assert_eq!(perf.max_drawdown, dec!(0.2));

        assert!(f.strategy.validate_configuration().await.is_ok());
        f.control.reject_configuration("bad model");
        assert_eq!(
            f.strategy.validate_configuration().await,
            Err("bad model".to_string())
        );
    }
}
