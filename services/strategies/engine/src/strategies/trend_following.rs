//! Fast/slow moving-average crossover

use super::{required_decimal, required_usize, validate_for, SymbolFilter};
use crate::indicators::{Cross, CrossDetector, MovingAverage, Relation};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use torq_strategy_shared::StrategyLogic;
use torq_types::{
    conditions, indicators, CandleData, IndicatorSet, Signal, SignalAction, StrategyConfiguration,
    StrategyType,
};

#[derive(Debug)]
struct SymbolState {
    fast: MovingAverage,
    slow: MovingAverage,
    crosses: CrossDetector,
}

#[derive(Debug)]
pub struct TrendFollowing {
    name: String,
    strategy_id: String,
    fast_period: usize,
    slow_period: usize,
    quantity: Decimal,
    symbols: SymbolFilter,
    state: HashMap<String, SymbolState>,
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            name: "trend_following".to_string(),
            strategy_id: String::new(),
            fast_period: 10,
            slow_period: 30,
            quantity: Decimal::ONE,
            symbols: SymbolFilter::default(),
            state: HashMap::new(),
        }
    }
}

impl TrendFollowing {
    fn state_for(&mut self, symbol: &str) -> &mut SymbolState {
        let (fast, slow) = (self.fast_period, self.slow_period);
        self.state
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState {
                fast: MovingAverage::new(fast),
                slow: MovingAverage::new(slow),
                crosses: CrossDetector::default(),
            })
    }

    fn signal_for(&self, symbol: &str, cross: Cross, timestamp_ns: u64) -> Signal {
        let (condition, action) = match cross {
            Cross::Bullish => (conditions::MA_BULLISH, SignalAction::Buy),
            Cross::Bearish => (conditions::MA_BEARISH, SignalAction::Sell),
        };
        Signal::market(self.strategy_id.clone(), symbol, action, self.quantity)
            .with_timestamp(timestamp_ns)
            .with_condition(condition)
    }
}

#[async_trait]
impl StrategyLogic for TrendFollowing {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &StrategyConfiguration) -> Result<(), String> {
        validate_for(StrategyType::TrendFollowing, config)
    }

    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()> {
        self.name = config.name.clone();
        self.strategy_id = config.strategy_id.clone();
        self.fast_period = required_usize(config, "fast_period")?;
        self.slow_period = required_usize(config, "slow_period")?;
        self.quantity = required_decimal(config, "quantity")?;
        self.symbols = SymbolFilter::from_configuration(config);
        self.state.clear();
        Ok(())
    }

    async fn on_candle(&mut self, candle: &CandleData) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&candle.symbol) {
            return Ok(Vec::new());
        }
        let state = self.state_for(&candle.symbol);
        let fast = state.fast.update(candle.close);
        let slow = state.slow.update(candle.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(Vec::new());
        };
        let cross = state.crosses.update(Relation::of(fast, slow));
        Ok(cross
            .map(|c| self.signal_for(&candle.symbol, c, candle.timestamp_ns))
            .into_iter()
            .collect())
    }

    /// Uses precomputed `SMA_FAST` / `SMA_SLOW` values
    async fn on_indicators(&mut self, set: &IndicatorSet) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&set.symbol) {
            return Ok(Vec::new());
        }
        let fast = set
            .get(indicators::SMA_FAST)
            .and_then(|v| Decimal::try_from(v).ok());
        let slow = set
            .get(indicators::SMA_SLOW)
            .and_then(|v| Decimal::try_from(v).ok());
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(Vec::new());
        };
        let cross = self
            .state_for(&set.symbol)
            .crosses
            .update(Relation::of(fast, slow));
        Ok(cross
            .map(|c| self.signal_for(&set.symbol, c, set.timestamp_ns))
            .into_iter()
            .collect())
    }
}
