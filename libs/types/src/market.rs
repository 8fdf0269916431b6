//! Market data summaries consumed by strategies
//!
//! Candles and indicator values are computed outside this system; these are
//! the shapes they arrive in.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known indicator names
pub mod indicators {
    pub const RSI: &str = "RSI";
    pub const MACD: &str = "MACD";
    pub const MACD_SIGNAL: &str = "MACD_SIGNAL";
    pub const SMA_FAST: &str = "SMA_FAST";
    pub const SMA_SLOW: &str = "SMA_SLOW";
    pub const ATR: &str = "ATR";
    pub const CLOSE: &str = "CLOSE";
    pub const SPOT_PRICE: &str = "SPOT_PRICE";
    pub const FUTURES_PRICE: &str = "FUTURES_PRICE";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleData {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp_ns: u64,
}

impl CandleData {
    pub fn close_f64(&self) -> Option<f64> {
        self.close.to_f64()
    }

    /// True range against the previous close
    pub fn true_range(&self, previous_close: Option<Decimal>) -> Decimal {
        let high_low = self.high - self.low;
        match previous_close {
            Some(prev) => high_low
                .max((self.high - prev).abs())
                .max((self.low - prev).abs()),
            None => high_low,
        }
    }
}

/// Indicator values for one symbol at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub values: HashMap<String, f64>,
    pub timestamp_ns: u64,
}

impl IndicatorSet {
    pub fn new(symbol: impl Into<String>, timestamp_ns: u64) -> Self {
        Self {
            symbol: symbol.into(),
            values: HashMap::new(),
            timestamp_ns,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Finite value for `name`; NaN and infinities count as missing
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_true_range_uses_previous_close_gap() {
        let candle = CandleData {
            symbol: "NIFTY".to_string(),
            open: dec!(100),
            high: dec!(105),
            low: dec!(99),
            close: dec!(104),
            volume: dec!(1000),
            timestamp_ns: 0,
        };
        assert_eq!(candle.true_range(None), dec!(6));
        assert_eq!(candle.true_range(Some(dec!(90))), dec!(15));
    }

    #[test]
    fn test_non_finite_indicator_is_missing() {
        let set = IndicatorSet::new("NIFTY", 0)
            .with(indicators::RSI, f64::NAN)
            .with(indicators::ATR, 12.5);
        assert_eq!(set.get(indicators::RSI), None);
        assert_eq!(set.get(indicators::ATR), Some(12.5));
        assert_eq!(set.get(indicators::MACD), None);
    }
}
