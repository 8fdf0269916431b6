//! Spot/futures spread arbitrage
//!
//! Reads `SPOT_PRICE` and `FUTURES_PRICE` from indicator sets. Candles carry a
//! single price series and are ignored.

use super::{required_decimal, required_f64, validate_for, SymbolFilter};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use torq_strategy_shared::StrategyLogic;
use torq_types::{
    conditions, indicators, CandleData, IndicatorSet, Signal, SignalAction, StrategyConfiguration,
    StrategyType,
};
use tracing::debug;

#[derive(Debug)]
pub struct Arbitrage {
    name: String,
    strategy_id: String,
    min_profit_margin: f64,
    max_position_size: Decimal,
    symbols: SymbolFilter,
    last_condition: HashMap<String, &'static str>,
}

impl Default for Arbitrage {
    fn default() -> Self {
        Self {
            name: "arbitrage".to_string(),
            strategy_id: String::new(),
            min_profit_margin: 0.001,
            max_position_size: Decimal::ONE,
            symbols: SymbolFilter::default(),
            last_condition: HashMap::new(),
        }
    }
}

#[async_trait]
impl StrategyLogic for Arbitrage {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, config: &StrategyConfiguration) -> Result<(), String> {
        validate_for(StrategyType::Arbitrage, config)
    }

    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()> {
        self.name = config.name.clone();
        self.strategy_id = config.strategy_id.clone();
        self.min_profit_margin = required_f64(config, "min_profit_margin")?;
        self.max_position_size = required_decimal(config, "max_position_size")?;
        self.symbols = SymbolFilter::from_configuration(config);
        self.last_condition.clear();
        Ok(())
    }

    async fn on_candle(&mut self, _candle: &CandleData) -> Result<Vec<Signal>> {
        Ok(Vec::new())
    }

    async fn on_indicators(&mut self, set: &IndicatorSet) -> Result<Vec<Signal>> {
        if !self.symbols.accepts(&set.symbol) {
            return Ok(Vec::new());
        }
        let (Some(spot), Some(futures)) = (
            set.get(indicators::SPOT_PRICE),
            set.get(indicators::FUTURES_PRICE),
        ) else {
            return Ok(Vec::new());
        };
        if spot <= 0.0 {
            return Ok(Vec::new());
        }

        let spread = futures - spot;
        let ratio = spread.abs() / spot;
        if ratio < self.min_profit_margin {
            self.last_condition.remove(&set.symbol);
            return Ok(Vec::new());
        }

        // Futures rich: buy the underlying; futures cheap: sell it
        let (condition, action) = if spread > 0.0 {
            (conditions::SPREAD_WIDE, SignalAction::Buy)
        } else {
            (conditions::SPREAD_INVERTED, SignalAction::Sell)
        };
        if self.last_condition.get(&set.symbol) == Some(&condition) {
            return Ok(Vec::new());
        }
        self.last_condition.insert(set.symbol.clone(), condition);

        debug!(symbol = %set.symbol, spread, ratio, condition, "Spread opportunity");
        let signal = Signal::market(
            self.strategy_id.clone(),
            set.symbol.clone(),
            action,
            self.max_position_size,
        )
        .with_timestamp(set.timestamp_ns)
        .with_condition(condition)
        .with_metadata("spread", format!("{:.4}", spread));

        Ok(vec![signal])
    }
}
