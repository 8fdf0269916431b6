//! RSI oscillator strategy
//!
//! Buys when RSI drops below the oversold threshold and sells when it rises
//! above the overbought threshold. A condition fires once per excursion: it
//! is re-armed only after RSI returns to the neutral zone.

use super::{required_decimal, required_f64, required_usize, validate_for, SymbolFilter};
use crate::indicators::Rsi;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use torq_strategy_shared::StrategyLogic;
use torq_types::{
    conditions, indicators, CandleData, IndicatorSet, Signal, SignalAction, StrategyConfiguration,
    StrategyType,
};
use tracing::debug;

#[derive(Debug)]
struct SymbolState {
    rsi: Rsi,
    last_condition: Option<&'static str>,
}

#[derive(Debug)]
pub struct Momentum {
    name: String,
    strategy_id: String,
    rsi_period: usize,
    oversold: f64,
    overbought: f64,
    quantity: Decimal,
    symbols: SymbolFilter,
    state: HashMap<String, SymbolState>,
}

impl Default for Momentum {
    fn default() -> Self {
        Self {
            name: "momentum".to_string(),
            strategy_id: String::new(),
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            quantity: Decimal::ONE,
            symbols: SymbolFilter::default(),
            state: HashMap::new(),
        }
    }
}

impl Momentum {
    fn symbol_state(&mut self, symbol: &str) -> &mut SymbolState {
        let period = self.rsi_period;
        self.state
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState {
                rsi: Rsi::new(period),
                last_condition: None,
            })
    }

    fn evaluate(&mut self, symbol: &str, rsi: f64, timestamp_ns: u64) -> Option<Signal> {
        let (oversold, overbought) = (self.oversold, self.overbought);
        let (strategy_id, quantity) = (self.strategy_id.clone(), self.quantity);
        let state = self.symbol_state(symbol);

        let (condition, action) = if rsi < oversold {
            (conditions::OVERSOLD, SignalAction::Buy)
        } else if rsi > overbought {
            (conditions::OVERBOUGHT, SignalAction::Sell)
        } else {
            state.last_condition = None;
            return None;
        };

        if state.last_condition == Some(condition) {
            return None;
        }
        state.last_condition = Some(condition);

        debug!(%symbol, rsi, condition, "Momentum condition triggered");
        Some(
            Signal::market(strategy_id, symbol, action, quantity)
                .with_timestamp(timestamp_ns)
                .with_condition(condition)
                .with_metadata("rsi", format!("{:.2}", rsi)),
        )
    }
}

#[async_trait]
impl StrategyLogic for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &StrategyConfiguration) -> Result<(), String> {
        validate_for(StrategyType::Momentum, config)
    }

    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()> {
        self.name = config.name.clone();
        self.strategy_id = config.strategy_id.clone();
        self.rsi_period = required_usize(config, "rsi_period")?;
        self.oversold = required_f64(config, "oversold_threshold")?;
        self.overbought = required_f64(config, "overbought_threshold")?;
        self.quantity = required_decimal(config, "quantity")?;
        self.symbols = SymbolFilter::from_configuration(config);
        self.state.clear();
        Ok(())
    }

    async fn on_candle(&mut self, candle: &CandleData) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&candle.symbol) {
            return Ok(Vec::new());
        }
        let value = self.symbol_state(&candle.symbol).rsi.update(candle.close);
        let Some(rsi) = value.and_then(|v| v.to_f64()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .evaluate(&candle.symbol, rsi, candle.timestamp_ns)
            .into_iter()
            .collect())
    }

    async fn on_indicators(&mut self, set: &IndicatorSet) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&set.symbol) {
            return Ok(Vec::new());
        }
        let Some(rsi) = set.get(indicators::RSI) else {
            return Ok(Vec::new());
        };
        Ok(self
            .evaluate(&set.symbol, rsi, set.timestamp_ns)
            .into_iter()
            .collect())
    }
}
