//! Bollinger band mean reversion

use super::{required_decimal, required_f64, required_usize, validate_for, SymbolFilter};
use crate::indicators::BollingerBands;
use anyhow::{anyhow, Result};
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
    bands: BollingerBands,
    last_condition: Option<&'static str>,
}

#[derive(Debug)]
pub struct MeanReversion {
    name: String,
    strategy_id: String,
    lookback: usize,
    multiplier: Decimal,
    quantity: Decimal,
    symbols: SymbolFilter,
    state: HashMap<String, SymbolState>,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            name: "mean_reversion".to_string(),
            strategy_id: String::new(),
            lookback: 20,
            multiplier: Decimal::TWO,
            quantity: Decimal::ONE,
            symbols: SymbolFilter::default(),
            state: HashMap::new(),
        }
    }
}

impl MeanReversion {
    fn on_close(&mut self, symbol: &str, close: Decimal, timestamp_ns: u64) -> Option<Signal> {
        let (lookback, multiplier) = (self.lookback, self.multiplier);
        let (strategy_id, quantity) = (self.strategy_id.clone(), self.quantity);
        let state = self
            .state
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState {
                bands: BollingerBands::new(lookback, multiplier),
                last_condition: None,
            });

        let bands = state.bands.update(close)?;
        let (condition, action) = if close < bands.lower {
            (conditions::BELOW_LOWER_BAND, SignalAction::Buy)
        } else if close > bands.upper {
            (conditions::ABOVE_UPPER_BAND, SignalAction::Sell)
        } else {
            state.last_condition = None;
            return None;
        };

        if state.last_condition == Some(condition) {
            return None;
        }
        state.last_condition = Some(condition);

        Some(
            Signal::market(strategy_id, symbol, action, quantity)
                .with_timestamp(timestamp_ns)
                .with_condition(condition)
                .with_metadata("middle_band", bands.middle.to_string()),
        )
    }
}

#[async_trait]
impl StrategyLogic for MeanReversion {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &StrategyConfiguration) -> Result<(), String> {
        validate_for(StrategyType::MeanReversion, config)
    }

    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()> {
        self.name = config.name.clone();
        self.strategy_id = config.strategy_id.clone();
        self.lookback = required_usize(config, "lookback_period")?;
        let multiplier = required_f64(config, "std_dev_multiplier")?;
        self.multiplier = Decimal::try_from(multiplier)
            .map_err(|e| anyhow!("std_dev_multiplier {} is not representable: {}", multiplier, e))?;
        self.quantity = required_decimal(config, "quantity")?;
        self.symbols = SymbolFilter::from_configuration(config);
        self.state.clear();
        Ok(())
    }

    async fn on_candle(&mut self, candle: &CandleData) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&candle.symbol) {
            return Ok(Vec::new());
        }
        Ok(self
            .on_close(&candle.symbol, candle.close, candle.timestamp_ns)
            .into_iter()
            .collect())
    }

    async fn on_indicators(&mut self, set: &IndicatorSet) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&set.symbol) {
            return Ok(Vec::new());
        }
        let Some(close) = set
            .get(indicators::CLOSE)
            .and_then(|c| Decimal::try_from(c).ok())
        else {
            return Ok(Vec::new());
        };
        Ok(self
            .on_close(&set.symbol, close, set.timestamp_ns)
            .into_iter()
            .collect())
    }
}
