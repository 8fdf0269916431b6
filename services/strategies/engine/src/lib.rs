//! # Strategy Engine - Multi-Strategy Orchestration Service
//!
//! ## Purpose
//!
//! Runs many trading strategies side by side, supervises their lifecycle,
//! and turns the signals they emit into order requests. Failed strategies
//! are restarted automatically; idle ones are stopped.
//!
//! ## Integration Points
//!
//! - **Input Sources**: candles and indicator sets via [`MarketDataRouter`],
//!   externally produced signals via [`StrategyExecutionEngine::process_signal`]
//! - **Output Destinations**: `trading-signals`, `strategy-states` and
//!   `order-requests` topics through an injected `MessageSink`
//! - **Configuration**: `torq-config::EngineConfig` for engine settings,
//!   [`StrategyConfigurationService`] for per-strategy parameters
//!
//! ## Architecture Role
//!
//! ```text
//! market data ─► MarketDataRouter ─► StrategyExecutionEngine ─► ManagedStrategy (×N)
//!                                              │                      │ signals
//!                                              ▼                      ▼
//!                                   maintenance scheduler      SignalProcessor
//!                                   (cleanup / restart)        (timeout → filters → order)
//! ```
//!
//! ## Performance Profile
//!
//! - **Fan-out**: one market event reaches every strategy concurrently
//! - **Isolation**: per-strategy async mutex; no global lock on the hot path
//! - **Back-pressure**: bounded pipeline channel and an order-publish semaphore

pub mod configuration;
pub mod engine;
pub mod error;
pub mod filters;
pub mod indicator_rules;
pub mod indicators;
pub mod lifecycle;
pub mod logging;
pub mod maintenance;
pub mod router;
pub mod signal_processor;
pub mod strategies;

pub use configuration::StrategyConfigurationService;
pub use engine::{
    DispatchOutcome, EngineStatistics, RegistrationOutcome, RestartReport,
    StrategyExecutionEngine,
};
pub use error::{ConfigurationError, EngineError, Result};
pub use filters::{
    FilterDecision, FrequencyFilter, SignalFilter, TradingSessionFilter, VolatilityFilter,
};
pub use indicator_rules::IndicatorRules;
pub use lifecycle::{HandleOutcome, ManagedStrategy};
pub use router::{MarketDataRouter, MarketEvent, RouterStats};
pub use signal_processor::{PairThrottle, ProcessorStatistics, SignalOutcome, SignalProcessor};
pub use strategies::StrategyKind;
