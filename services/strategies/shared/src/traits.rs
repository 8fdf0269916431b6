//! Strategy traits and interfaces

use anyhow::Result;
use async_trait::async_trait;
use torq_types::{CandleData, IndicatorSet, Signal, StrategyConfiguration};

/// Capability every concrete trading strategy implements
///
/// Implementations hold only their own trading logic. Lifecycle state,
/// counters, error capture and publishing belong to the wrapper that owns the
/// strategy; a hook returning `Err` (or panicking) moves that wrapper to
/// ERROR.
#[async_trait]
pub trait StrategyLogic: Send + Sync {
    /// Strategy name for identification
    fn name(&self) -> &str;

    /// Type-specific configuration check; `Err` carries a human-readable reason
    fn validate(&self, config: &StrategyConfiguration) -> std::result::Result<(), String> {
        let _ = config;
        Ok(())
    }

    /// Read parameters and allocate state
    async fn initialize(&mut self, config: &StrategyConfiguration) -> Result<()>;

    /// Start the strategy
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop the strategy and release resources
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// React to a completed candle
    async fn on_candle(&mut self, candle: &CandleData) -> Result<Vec<Signal>>;

    /// React to a fresh set of indicator values
    async fn on_indicators(&mut self, indicators: &IndicatorSet) -> Result<Vec<Signal>>;
}
