//! Trading signal definitions and shape validation
//!
//! A [`Signal`] is a proposed trade action produced by a strategy (or derived
//! from indicator rules) that has not yet become an order. Signals are
//! immutable once built; the builder methods consume and return `self`.

use crate::time::current_timestamp_ns;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Metadata key carrying the rule/condition tag that produced a signal
pub const CONDITION_KEY: &str = "condition";

/// Metadata key carrying the volatility measure (ATR) seen at generation time
pub const ATR_KEY: &str = "atr";

/// Metadata key carrying the reference price for market orders
pub const REFERENCE_PRICE_KEY: &str = "reference_price";

/// Condition tags written into signal metadata by the built-in rules
pub mod conditions {
    pub const OVERSOLD: &str = "OVERSOLD";
    pub const OVERBOUGHT: &str = "OVERBOUGHT";
    pub const MACD_BULLISH: &str = "MACD_BULLISH";
    pub const MACD_BEARISH: &str = "MACD_BEARISH";
    pub const MA_BULLISH: &str = "MA_BULLISH";
    pub const MA_BEARISH: &str = "MA_BEARISH";
    pub const BELOW_LOWER_BAND: &str = "BELOW_LOWER_BAND";
    pub const ABOVE_UPPER_BAND: &str = "ABOVE_UPPER_BAND";
    pub const SPREAD_WIDE: &str = "SPREAD_WIDE";
    pub const SPREAD_INVERTED: &str = "SPREAD_INVERTED";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Close,
    Modify,
    Cancel,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Close => "CLOSE",
            SignalAction::Modify => "MODIFY",
            SignalAction::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Stop => "STOP",
            OrderType::StopLimit => "STOP_LIMIT",
        };
        f.write_str(s)
    }
}

/// Identity of a per-pair throttling slot: one strategy trading one symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalKey {
    pub strategy_id: String,
    pub symbol: String,
}

impl SignalKey {
    pub fn new(strategy_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.strategy_id, self.symbol)
    }
}

/// Reasons a signal fails basic shape validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalValidationError {
    #[error("signal symbol is empty")]
    EmptySymbol,

    #[error("signal action is not set")]
    MissingAction,

    #[error("signal order type is not set")]
    MissingOrderType,

    #[error("signal quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("signal price must be positive when present, got {0}")]
    NonPositivePrice(Decimal),
}

/// Proposed trade action, not yet an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Strategy that generated this signal
    pub strategy_id: String,

    pub symbol: String,

    /// `None` only for malformed input; rejected by [`Signal::validate`]
    pub action: Option<SignalAction>,

    pub order_type: Option<OrderType>,

    /// Limit/stop price; absent for market orders
    pub price: Option<Decimal>,

    pub quantity: Decimal,

    pub stop_loss: Option<Decimal>,

    pub take_profit: Option<Decimal>,

    /// Generation time, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Signal {
    /// Create a signal stamped with the current wall-clock time
    pub fn new(
        strategy_id: impl Into<String>,
        symbol: impl Into<String>,
        action: SignalAction,
        order_type: OrderType,
        quantity: Decimal,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            action: Some(action),
            order_type: Some(order_type),
            price: None,
            quantity,
            stop_loss: None,
            take_profit: None,
            timestamp_ns: current_timestamp_ns(),
            metadata: HashMap::new(),
        }
    }

    /// Market order convenience constructor
    pub fn market(
        strategy_id: impl Into<String>,
        symbol: impl Into<String>,
        action: SignalAction,
        quantity: Decimal,
    ) -> Self {
        Self::new(strategy_id, symbol, action, OrderType::Market, quantity)
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag the signal with the rule condition that produced it
    pub fn with_condition(self, condition: &str) -> Self {
        self.with_metadata(CONDITION_KEY, condition)
    }

    pub fn condition(&self) -> Option<&str> {
        self.metadata.get(CONDITION_KEY).map(String::as_str)
    }

    /// Numeric metadata lookup, `None` when absent or unparsable
    pub fn metadata_decimal(&self, key: &str) -> Option<Decimal> {
        self.metadata.get(key).and_then(|v| v.parse().ok())
    }

    pub fn key(&self) -> SignalKey {
        SignalKey::new(self.strategy_id.clone(), self.symbol.clone())
    }

    /// Basic shape validation applied before a signal may leave a strategy
    pub fn validate(&self) -> Result<(), SignalValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(SignalValidationError::EmptySymbol);
        }
        if self.action.is_none() {
            return Err(SignalValidationError::MissingAction);
        }
        if self.order_type.is_none() {
            return Err(SignalValidationError::MissingOrderType);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(SignalValidationError::NonPositiveQuantity(self.quantity));
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(SignalValidationError::NonPositivePrice(price));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
