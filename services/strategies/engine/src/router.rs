//! Market data routing into the engine
//!
//! Candles and untargeted indicator sets fan out to every strategy.
//! Indicator sets addressed to one strategy run through the processor's
//! built-in rule library for that strategy/symbol pair, but only while the
//! strategy is registered and ACTIVE; anything else is dropped.

use crate::engine::StrategyExecutionEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use torq_types::{CandleData, IndicatorSet};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Candle(CandleData),
    Indicators {
        #[serde(default)]
        strategy_id: Option<String>,
        set: IndicatorSet,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub events: u64,
    pub signals_forwarded: u64,
    pub rule_orders: u64,
    /// Addressed events dropped because the strategy is unknown or not ACTIVE
    pub unrouted: u64,
}

pub struct MarketDataRouter {
    engine: Arc<StrategyExecutionEngine>,
}

impl MarketDataRouter {
    pub fn new(engine: Arc<StrategyExecutionEngine>) -> Self {
        Self { engine }
    }

    pub async fn route(&self, event: &MarketEvent, stats: &mut RouterStats) {
        stats.events += 1;
        match event {
            MarketEvent::Candle(candle) => {
                stats.signals_forwarded += self.engine.on_candle(candle).await as u64;
            }
            MarketEvent::Indicators {
                strategy_id: Some(id),
                set,
            } => {
                let state = self.engine.get_strategy_info(id).map(|info| info.state);
                if !state.is_some_and(|s| s.is_active()) {
                    debug!(strategy_id = %id, ?state, "Dropping indicator event for inactive strategy");
                    stats.unrouted += 1;
                    return;
                }
                let outcomes = self
                    .engine
                    .processor()
                    .process_indicator_signals(id, &set.symbol, set)
                    .await;
                stats.rule_orders += outcomes.iter().filter(|o| o.order().is_some()).count() as u64;
            }
            MarketEvent::Indicators {
                strategy_id: None,
                set,
            } => {
                stats.signals_forwarded += self.engine.on_indicators(set).await as u64;
            }
        }
    }

    /// Consume events until the channel closes or `shutdown` fires
    pub async fn run(
        self,
        mut events: mpsc::Receiver<MarketEvent>,
        shutdown: CancellationToken,
    ) -> RouterStats {
        let mut stats = RouterStats::default();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = events.recv() => match next {
                    Some(event) => self.route(&event, &mut stats).await,
                    None => {
                        debug!("Market event channel closed");
                        break;
                    }
                },
            }
        }
        info!(
            events = stats.events,
            signals = stats.signals_forwarded,
            rule_orders = stats.rule_orders,
            unrouted = stats.unrouted,
            "Market data router stopped"
        );
        stats
    }
}
