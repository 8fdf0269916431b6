//! Concrete strategy variants
//!
//! One variant per [`StrategyType`]. [`StrategyKind`] is the closed set the
//! engine supervises; `Custom` carries externally supplied logic behind the
//! shared [`StrategyLogic`] trait.

pub mod arbitrage;
pub mod mean_reversion;
pub mod momentum;
pub mod trend_following;

pub use arbitrage::Arbitrage;
pub use mean_reversion::MeanReversion;
pub use momentum::Momentum;
pub use trend_following::TrendFollowing;

use crate::configuration::type_rule_violations;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use torq_strategy_shared::StrategyLogic;
use torq_types::{CandleData, IndicatorSet, Signal, StrategyConfiguration, StrategyType};

/// Tagged strategy implementation owned by a managed strategy
pub enum StrategyKind {
    Momentum(Momentum),
    MeanReversion(MeanReversion),
    TrendFollowing(TrendFollowing),
    Arbitrage(Arbitrage),
    Custom(Box<dyn StrategyLogic>),
}

impl std::fmt::Debug for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StrategyKind").field(&self.name()).finish()
    }
}

macro_rules! dispatch {
    ($kind:expr, $s:ident => $body:expr) => {
        match $kind {
            StrategyKind::Momentum($s) => $body,
            StrategyKind::MeanReversion($s) => $body,
            StrategyKind::TrendFollowing($s) => $body,
            StrategyKind::Arbitrage($s) => $body,
            StrategyKind::Custom($s) => $body,
        }
    };
}

impl StrategyKind {
    /// Built-in variant for the configuration's declared type
    ///
    /// `CUSTOM` has no built-in logic; use [`StrategyKind::custom`].
    pub fn from_configuration(config: &StrategyConfiguration) -> Result<Self, String> {
        match config.strategy_type {
            StrategyType::Momentum => Ok(StrategyKind::Momentum(Momentum::default())),
            StrategyType::MeanReversion => {
                Ok(StrategyKind::MeanReversion(MeanReversion::default()))
            }
            StrategyType::TrendFollowing => {
                Ok(StrategyKind::TrendFollowing(TrendFollowing::default()))
            }
            StrategyType::Arbitrage => Ok(StrategyKind::Arbitrage(Arbitrage::default())),
            StrategyType::Custom => Err(format!(
                "strategy '{}' is CUSTOM and needs externally supplied logic",
                config.strategy_id
            )),
        }
    }

    pub fn custom(logic: Box<dyn StrategyLogic>) -> Self {
        StrategyKind::Custom(logic)
    }
}

#[async_trait]
impl StrategyLogic for StrategyKind {
    fn name(&self) -> &str {
        dispatch!(self, s => s.name())
    }

    fn validate(&self, config: &StrategyConfiguration) -> Result<(), String> {
        dispatch!(self, s => s.validate(config))
    }

    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()> {
        dispatch!(self, s => s.initialize(config).await)
    }

    async fn start(&mut self) -> Result<()> {
        dispatch!(self, s => s.start().await)
    }

    async fn stop(&mut self) -> Result<()> {
        dispatch!(self, s => s.stop().await)
    }

    async fn on_candle(&mut self, candle: &CandleData) -> Result<Vec<Signal>> {
        dispatch!(self, s => s.on_candle(candle).await)
    }

    async fn on_indicators(&mut self, indicators: &IndicatorSet) -> Result<Vec<Signal>> {
        dispatch!(self, s => s.on_indicators(indicators).await)
    }
}

/// Optional `symbols` allow-list; empty means every symbol
#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolFilter(Vec<String>);

impl SymbolFilter {
    pub(crate) fn from_configuration(config: &StrategyConfiguration) -> Self {
        Self(config.param_string_list("symbols"))
    }

    pub(crate) fn accepts(&self, symbol: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|s| s == symbol)
    }
}

/// Shared `validate` hook body: type match plus the range table
pub(crate) fn validate_for(
    expected: StrategyType,
    config: &StrategyConfiguration,
) -> Result<(), String> {
    if config.strategy_type != expected {
        return Err(format!(
            "configuration type {} does not match {} strategy",
            config.strategy_type, expected
        ));
    }
    let violations = type_rule_violations(config);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.join("; "))
    }
}

pub(crate) fn required_usize(config: &StrategyConfiguration, key: &str) -> Result<usize> {
    config
        .param_usize(key)
        .ok_or_else(|| anyhow!("parameter '{}' must be a non-negative integer", key))
}

pub(crate) fn required_f64(config: &StrategyConfiguration, key: &str) -> Result<f64> {
    config
        .param_f64(key)
        .ok_or_else(|| anyhow!("parameter '{}' must be numeric", key))
}

pub(crate) fn required_decimal(config: &StrategyConfiguration, key: &str) -> Result<Decimal> {
    config
        .param_decimal(key)
        .ok_or_else(|| anyhow!("parameter '{}' must be a decimal number", key))
}
