//! # Signal Processor
//!
//! ## Purpose
//!
//! Converts validated signals into order requests. Each signal passes the
//! per-pair timeout gate and the ordered filter chain, then maps 1:1 to an
//! [`OrderRequest`] published on `order-requests` keyed by symbol.
//!
//! ## Integration Points
//!
//! - **Input**: signals drained from the engine pipeline, batches, and
//!   indicator sets evaluated by the built-in [`IndicatorRules`]
//! - **Output**: `order-requests` topic through the injected [`MessageSink`]
//! - **State**: last accepted timestamp and last order-producing signal per
//!   `(strategy_id, symbol)` pair
//!
//! ## Counting
//!
//! ```text
//! invalid shape ─┐
//! timeout gate ──┼─► orders_rejected
//! publish fail ──┘
//! filter chain ────► signals_filtered (+ per-filter count)
//! published ───────► orders_generated
//! ```

use crate::filters::{
    names, FilterDecision, FrequencyFilter, SignalFilter, TradingSessionFilter, VolatilityFilter,
};
use crate::indicator_rules::IndicatorRules;
use crate::log_execution;
use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use message_sink::{publish_json, topics, MessageSink};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use torq_config::{EngineConfig, RuleSettings};
use torq_types::{
    Clock, IndicatorSet, OrderRequest, Signal, SignalKey, SignalValidationError,
};
use tracing::{debug, info, warn};

/// Minimum spacing between accepted signals per strategy/symbol pair
///
/// Check-and-reserve happens under the pair's map entry, so two concurrent
/// callers cannot both pass inside one window.
#[derive(Debug)]
pub struct PairThrottle {
    interval_ns: u64,
    last_accepted: DashMap<SignalKey, u64>,
}

impl PairThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ns: interval.as_nanos() as u64,
            last_accepted: DashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    /// Read-only check; does not reserve the slot
    pub fn is_throttled(&self, key: &SignalKey, now_ns: u64) -> bool {
        self.last_accepted
            .get(key)
            .map(|last| now_ns.saturating_sub(*last) < self.interval_ns)
            .unwrap_or(false)
    }

    /// Reserve the pair's slot at `now_ns` if the window has elapsed
    pub fn try_acquire(&self, key: SignalKey, now_ns: u64) -> bool {
        match self.last_accepted.entry(key) {
            Entry::Occupied(mut entry) => {
                if now_ns.saturating_sub(*entry.get()) < self.interval_ns {
                    false
                } else {
                    entry.insert(now_ns);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now_ns);
                true
            }
        }
    }

    pub fn last_accepted(&self, key: &SignalKey) -> Option<u64> {
        self.last_accepted.get(key).map(|v| *v)
    }

    /// Drop every pair owned by `strategy_id`
    pub fn forget_strategy(&self, strategy_id: &str) {
        self.last_accepted.retain(|k, _| k.strategy_id != strategy_id);
    }

    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

/// What happened to one signal
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    OrderPublished(OrderRequest),
    Invalid(SignalValidationError),
    Throttled,
    Filtered { filter: String, reason: String },
    PublishFailed(String),
}

impl SignalOutcome {
    pub fn order(&self) -> Option<&OrderRequest> {
        match self {
            SignalOutcome::OrderPublished(order) => Some(order),
            _ => None,
        }
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorStatistics {
    pub signals_processed: u64,
    pub orders_generated: u64,
    pub orders_rejected: u64,
    pub signals_filtered: u64,
    pub filter_rejections: BTreeMap<String, u64>,
    pub active_filters: Vec<String>,
    pub tracked_pairs: usize,
}

#[derive(Debug)]
pub struct SignalProcessor {
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    throttle: PairThrottle,
    rules: IndicatorRules,
    filters: RwLock<Vec<(String, Arc<dyn SignalFilter>)>>,
    filter_rejections: DashMap<String, u64>,
    last_signal: DashMap<SignalKey, Signal>,
    order_permits: Semaphore,

    signals_processed: AtomicU64,
    orders_generated: AtomicU64,
    orders_rejected: AtomicU64,
    signals_filtered: AtomicU64,
}

impl SignalProcessor {
    /// Processor with an empty filter chain
    pub fn new(
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        signal_timeout: Duration,
        max_concurrent_orders: usize,
        rules: RuleSettings,
    ) -> Self {
        Self {
            sink,
            clock,
            throttle: PairThrottle::new(signal_timeout),
            rules: IndicatorRules::new(rules),
            filters: RwLock::new(Vec::new()),
            filter_rejections: DashMap::new(),
            last_signal: DashMap::new(),
            order_permits: Semaphore::new(max_concurrent_orders.max(1)),
            signals_processed: AtomicU64::new(0),
            orders_generated: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
            signals_filtered: AtomicU64::new(0),
        }
    }

    /// Processor with the enabled built-in filters installed
    pub fn from_config(
        config: &EngineConfig,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let processor = Self::new(
            sink,
            clock,
            config.engine.signal_timeout(),
            config.engine.max_concurrent_orders,
            config.rules.clone(),
        );

        let filters = &config.filters;
        if filters.session.enabled {
            processor.add_signal_filter(
                names::TRADING_SESSION,
                Arc::new(TradingSessionFilter::from_settings(&filters.session)?),
            );
        }
        if filters.volatility.enabled {
            processor.add_signal_filter(
                names::VOLATILITY,
                Arc::new(VolatilityFilter::from_settings(&filters.volatility)),
            );
        }
        if filters.frequency.enabled {
            processor.add_signal_filter(
                names::FREQUENCY,
                Arc::new(FrequencyFilter::from_settings(&filters.frequency)),
            );
        }

        info!(filters = ?processor.filter_names(), "Signal processor configured");
        Ok(processor)
    }

    /// Append a filter; an existing name is replaced in place
    pub fn add_signal_filter(&self, name: impl Into<String>, filter: Arc<dyn SignalFilter>) {
        let name = name.into();
        let mut filters = self.filters.write();
        match filters.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = filter,
            None => filters.push((name, filter)),
        }
    }

    pub fn remove_signal_filter(&self, name: &str) -> bool {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|(n, _)| n != name);
        filters.len() != before
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.read().iter().map(|(n, _)| n.clone()).collect()
    }

    fn run_filters(&self, signal: &Signal, now_ns: u64) -> Option<(String, String)> {
        let chain = self.filters.read().clone();
        chain.iter().find_map(|(name, filter)| match filter.evaluate(signal, now_ns) {
            FilterDecision::Pass => None,
            FilterDecision::Reject(reason) => Some((name.clone(), reason)),
        })
    }

    fn commit_filters(&self, signal: &Signal, now_ns: u64) {
        let chain = self.filters.read().clone();
        for (_, filter) in &chain {
            filter.on_accepted(signal, now_ns);
        }
    }

    fn reject(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn process_signal(&self, signal: Signal) -> SignalOutcome {
        self.signals_processed.fetch_add(1, Ordering::Relaxed);

        if let Err(reason) = signal.validate() {
            warn!(strategy_id = %signal.strategy_id, %reason, "Invalid signal dropped");
            self.reject();
            return SignalOutcome::Invalid(reason);
        }

        let key = signal.key();
        let now = self.clock.now_ns();
        if self.throttle.is_throttled(&key, now) {
            debug!(pair = %key, "Signal inside timeout window");
            self.reject();
            return SignalOutcome::Throttled;
        }

        if let Some((filter, reason)) = self.run_filters(&signal, now) {
            debug!(pair = %key, %filter, %reason, "Signal filtered");
            self.signals_filtered.fetch_add(1, Ordering::Relaxed);
            *self.filter_rejections.entry(filter.clone()).or_insert(0) += 1;
            return SignalOutcome::Filtered { filter, reason };
        }

        // Re-check under the entry: another task may have won this pair meanwhile
        if !self.throttle.try_acquire(key.clone(), now) {
            debug!(pair = %key, "Signal lost timeout race");
            self.reject();
            return SignalOutcome::Throttled;
        }

        let Some(order) = OrderRequest::from_signal(&signal, now) else {
            self.reject();
            return SignalOutcome::Invalid(SignalValidationError::MissingAction);
        };

        let Ok(_permit) = self.order_permits.acquire().await else {
            self.reject();
            return SignalOutcome::PublishFailed("order permits closed".to_string());
        };

        match publish_json(
            self.sink.as_ref(),
            topics::ORDER_REQUESTS,
            &order.symbol,
            &order,
        )
        .await
        {
            Ok(()) => {
                self.orders_generated.fetch_add(1, Ordering::Relaxed);
                log_execution!(
                    "Order {} {} {} x{} for {}",
                    order.order_id,
                    order.action,
                    order.symbol,
                    order.quantity,
                    order.strategy_id
                );
                self.commit_filters(&signal, now);
                self.last_signal.insert(key, signal);
                SignalOutcome::OrderPublished(order)
            }
            Err(e) => {
                warn!(pair = %key, error = %e, "Order request publish failed");
                self.reject();
                SignalOutcome::PublishFailed(e.to_string())
            }
        }
    }

    /// Process the most recent signal per symbol; older ones are dropped
    ///
    /// Outcomes are ordered by symbol.
    pub async fn process_signals(&self, batch: Vec<Signal>) -> Vec<SignalOutcome> {
        let mut latest: HashMap<String, Signal> = HashMap::new();
        for signal in batch {
            match latest.get(&signal.symbol) {
                Some(kept) if kept.timestamp_ns > signal.timestamp_ns => {}
                _ => {
                    latest.insert(signal.symbol.clone(), signal);
                }
            }
        }

        let mut selected: Vec<Signal> = latest.into_values().collect();
        selected.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        join_all(selected.into_iter().map(|s| self.process_signal(s))).await
    }

    /// Run the rule library for one pair and process each candidate in turn
    pub async fn process_indicator_signals(
        &self,
        strategy_id: &str,
        symbol: &str,
        set: &IndicatorSet,
    ) -> Vec<SignalOutcome> {
        let key = SignalKey::new(strategy_id, symbol);
        let previous = self
            .last_signal
            .get(&key)
            .and_then(|s| s.condition().map(str::to_string));

        let candidates = self
            .rules
            .evaluate(strategy_id, symbol, set, previous.as_deref());

        let mut outcomes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            outcomes.push(self.process_signal(candidate).await);
        }
        outcomes
    }

    /// Last signal that produced an order for the pair
    pub fn last_signal(&self, strategy_id: &str, symbol: &str) -> Option<Signal> {
        self.last_signal
            .get(&SignalKey::new(strategy_id, symbol))
            .map(|s| s.clone())
    }

    /// Drop every piece of per-pair state owned by `strategy_id`
    pub fn forget_strategy(&self, strategy_id: &str) {
        self.throttle.forget_strategy(strategy_id);
        self.last_signal.retain(|k, _| k.strategy_id != strategy_id);
        for (_, filter) in self.filters.read().iter() {
            filter.forget_strategy(strategy_id);
        }
    }

    pub fn statistics(&self) -> ProcessorStatistics {
        ProcessorStatistics {
            signals_processed: self.signals_processed.load(Ordering::Relaxed),
            orders_generated: self.orders_generated.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            signals_filtered: self.signals_filtered.load(Ordering::Relaxed),
            filter_rejections: self
                .filter_rejections
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            active_filters: self.filter_names(),
            tracked_pairs: self.throttle.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use message_sink::test_utils::CollectorSink;
    use rust_decimal_macros::dec;
    use torq_types::{ManualClock, SignalAction};

    fn processor(timeout: Duration) -> (SignalProcessor, Arc<CollectorSink>, Arc<ManualClock>) {
        let sink = Arc::new(CollectorSink::connected());
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let processor = SignalProcessor::new(
            sink.clone(),
            clock.clone(),
            timeout,
            4,
            RuleSettings::default(),
        );
        (processor, sink, clock)
    }

    fn buy(symbol: &str, ts: u64) -> Signal {
        Signal::market("s1", symbol, SignalAction::Buy, dec!(1)).with_timestamp(ts)
    }

    #[derive(Debug)]
    struct RejectAll;

    impl SignalFilter for RejectAll {
        fn evaluate(&self, _signal: &Signal, _now_ns: u64) -> FilterDecision {
            FilterDecision::Reject("closed".to_string())
        }
    }

    #[test]
    fn test_throttle_reserve_is_exclusive() {
        let throttle = PairThrottle::new(Duration::from_secs(5));
        let key = SignalKey::new("s1", "NIFTY");
        assert!(throttle.try_acquire(key.clone(), 100));
        assert!(!throttle.try_acquire(key.clone(), 100 + 4_999_999_999));
        assert!(throttle.try_acquire(key.clone(), 100 + 5_000_000_000));
        assert_eq!(throttle.last_accepted(&key), Some(100 + 5_000_000_000));

        throttle.forget_strategy("s1");
        assert!(throttle.is_empty());
    }

    #[tokio::test]
    async fn test_order_published_and_recorded() {
        let (processor, sink, _clock) = processor(Duration::from_secs(5));
        let outcome = processor.process_signal(buy("NIFTY", 7)).await;

        let order = outcome.order().unwrap();
        assert_eq!(order.signal_timestamp_ns, 7);
        let published = sink.decoded::<OrderRequest>(topics::ORDER_REQUESTS);
        assert_eq!(published, vec![order.clone()]);
        assert_eq!(sink.messages_on(topics::ORDER_REQUESTS)[0].key(), Some("NIFTY"));
        assert!(processor.last_signal("s1", "NIFTY").is_some());
    }

    #[tokio::test]
    async fn test_timeout_window_per_pair() {
        let (processor, _sink, clock) = processor(Duration::from_secs(5));
        assert!(processor.process_signal(buy("NIFTY", 1)).await.order().is_some());

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            processor.process_signal(buy("NIFTY", 2)).await,
            SignalOutcome::Throttled
        );
        assert!(processor.process_signal(buy("BANKNIFTY", 2)).await.order().is_some());

        clock.advance(Duration::from_secs(3));
        assert!(processor.process_signal(buy("NIFTY", 3)).await.order().is_some());

        let stats = processor.statistics();
        assert_eq!(stats.signals_processed, 4);
        assert_eq!(stats.orders_generated, 3);
        assert_eq!(stats.orders_rejected, 1);
    }

    #[tokio::test]
    async fn test_filter_chain_counts_and_replacement() {
        let (processor, sink, _clock) = processor(Duration::ZERO);
        processor.add_signal_filter("gate", Arc::new(RejectAll));
        processor.add_signal_filter("volatility", Arc::new(VolatilityFilter::new(3.0)));

        let outcome = processor.process_signal(buy("NIFTY", 1)).await;
        assert_eq!(
            outcome,
            SignalOutcome::Filtered {
                filter: "gate".to_string(),
                reason: "closed".to_string()
            }
        );
        assert_eq!(sink.message_count(), 0);

        // Replacing keeps position; the chain now passes
        processor.add_signal_filter("gate", Arc::new(VolatilityFilter::new(100.0)));
        assert_eq!(processor.filter_names(), vec!["gate", "volatility"]);
        assert!(processor.process_signal(buy("NIFTY", 2)).await.order().is_some());

        assert!(processor.remove_signal_filter("gate"));
        assert!(!processor.remove_signal_filter("gate"));

        let stats = processor.statistics();
        assert_eq!(stats.signals_filtered, 1);
        assert_eq!(stats.filter_rejections.get("gate"), Some(&1));
        assert_eq!(stats.active_filters, vec!["volatility"]);
    }

    #[tokio::test]
    async fn test_frequency_window_counts_only_published_orders() {
        let (processor, sink, clock) = processor(Duration::ZERO);
        processor.add_signal_filter(
            names::FREQUENCY,
            Arc::new(FrequencyFilter::new(Duration::from_secs(60))),
        );
        processor.add_signal_filter("after", Arc::new(RejectAll));

        assert!(matches!(
            processor.process_signal(buy("NIFTY", 1)).await,
            SignalOutcome::Filtered { ref filter, .. } if filter == "after"
        ));
        processor.remove_signal_filter("after");

        clock.advance(Duration::from_secs(10));
        assert!(processor.process_signal(buy("NIFTY", 2)).await.order().is_some());

        clock.advance(Duration::from_secs(61));
        sink.fail_next_send();
        assert!(matches!(
            processor.process_signal(buy("NIFTY", 3)).await,
            SignalOutcome::PublishFailed(_)
        ));
        clock.advance(Duration::from_secs(1));
        assert!(processor.process_signal(buy("NIFTY", 4)).await.order().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(matches!(
            processor.process_signal(buy("NIFTY", 5)).await,
            SignalOutcome::Filtered { ref filter, .. } if filter == names::FREQUENCY
        ));
    }

    #[tokio::test]
    async fn test_forget_strategy_clears_filter_windows() {
        let (processor, _sink, clock) = processor(Duration::from_secs(5));
        processor.add_signal_filter(
            names::FREQUENCY,
            Arc::new(FrequencyFilter::new(Duration::from_secs(60))),
        );
        assert!(processor.process_signal(buy("NIFTY", 1)).await.order().is_some());

        processor.forget_strategy("s1");
        assert_eq!(processor.statistics().tracked_pairs, 0);
        assert!(processor.last_signal("s1", "NIFTY").is_none());

        clock.advance(Duration::from_secs(10));
        assert!(processor.process_signal(buy("NIFTY", 2)).await.order().is_some());
    }

    #[tokio::test]
    async fn test_invalid_and_failed_publish_are_rejections() {
        let (processor, sink, _clock) = processor(Duration::ZERO);
        let invalid = Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(-1));
        assert!(matches!(
            processor.process_signal(invalid).await,
            SignalOutcome::Invalid(SignalValidationError::NonPositiveQuantity(_))
        ));

        sink.fail_next_send();
        assert!(matches!(
            processor.process_signal(buy("NIFTY", 1)).await,
            SignalOutcome::PublishFailed(_)
        ));
        assert!(processor.last_signal("s1", "NIFTY").is_none());

        let stats = processor.statistics();
        assert_eq!(stats.orders_rejected, 2);
        assert_eq!(stats.orders_generated, 0);
    }

    #[tokio::test]
    async fn test_batch_keeps_latest_per_symbol() {
        let (processor, sink, _clock) = processor(Duration::from_secs(5));
        let outcomes = processor
            .process_signals(vec![buy("A", 10), buy("A", 30), buy("B", 20), buy("A", 20)])
            .await;

        assert_eq!(outcomes.len(), 2);
        let orders = sink.decoded::<OrderRequest>(topics::ORDER_REQUESTS);
        let mut seen: Vec<(String, u64)> = orders
            .iter()
            .map(|o| (o.symbol.clone(), o.signal_timestamp_ns))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![("A".to_string(), 30), ("B".to_string(), 20)]);
    }

    #[tokio::test]
    async fn test_from_config_installs_enabled_filters() {
        let sink = Arc::new(CollectorSink::connected());
        let clock = Arc::new(ManualClock::new(0));
        let mut config = EngineConfig::default();
        config.filters.volatility.enabled = false;

        let processor = SignalProcessor::from_config(&config, sink, clock).unwrap();
        assert_eq!(
            processor.filter_names(),
            vec![names::TRADING_SESSION, names::FREQUENCY]
        );
    }
}
