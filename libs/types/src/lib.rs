//! # Torq Strategy Types
//!
//! Value types shared by every crate in the strategy orchestrator.
//!
//! ## Design Philosophy
//!
//! - **Decimal money**: prices, quantities and P&L are `rust_decimal::Decimal`
//! - **Nanosecond time**: every timestamp is `u64` nanoseconds since the Unix epoch
//! - **Wire-stable enums**: states, actions and order types serialize as
//!   `SCREAMING_SNAKE_CASE` so published JSON matches downstream consumers
//! - **Injectable time**: the [`Clock`] trait lets gates and trackers run
//!   against a [`ManualClock`] in tests
//!
//! ## Quick Start
//!
//! ```rust
//! use torq_types::{Signal, SignalAction, OrderRequest};
//! use rust_decimal::Decimal;
//!
//! let signal = Signal::market("momentum-1", "NIFTY", SignalAction::Buy, Decimal::ONE);
//! assert!(signal.validate().is_ok());
//!
//! let order = OrderRequest::from_signal(&signal, signal.timestamp_ns).unwrap();
//! assert_eq!(order.symbol, "NIFTY");
//! ```

pub mod market;
pub mod order;
pub mod signal;
pub mod strategy;
pub mod time;

pub use market::{indicators, CandleData, IndicatorSet};
pub use order::OrderRequest;
pub use signal::{
    conditions, OrderType, Signal, SignalAction, SignalKey, SignalValidationError, ATR_KEY,
    CONDITION_KEY, REFERENCE_PRICE_KEY,
};
pub use strategy::{
    StrategyConfiguration, StrategyInfo, StrategyPerformance, StrategyState, StrategyType,
};
pub use time::{current_timestamp_ns, Clock, ManualClock, SystemClock};
