//! Signal filter chain
//!
//! Filters run in insertion order; the first rejection wins. Built-ins:
//! trading-session hours, volatility ceiling and per-pair frequency.

use anyhow::Result;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Weekday};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use std::fmt::Debug;
use std::time::Duration;
use torq_config::{FrequencyFilterSettings, SessionFilterSettings, VolatilityFilterSettings};
use torq_types::{Signal, SignalKey, ATR_KEY, REFERENCE_PRICE_KEY};

/// Names the built-in filters are registered under
pub mod names {
    pub const TRADING_SESSION: &str = "trading_session";
    pub const VOLATILITY: &str = "volatility";
    pub const FREQUENCY: &str = "frequency";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Reject(String),
}

impl FilterDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterDecision::Pass)
    }
}

/// A gate a signal must pass before it becomes an order
///
/// `evaluate` must not change state: a passed signal can still be dropped
/// further down the chain. Stateful filters record in `on_accepted`, which
/// runs only once the order request is published.
pub trait SignalFilter: Send + Sync + Debug {
    fn evaluate(&self, signal: &Signal, now_ns: u64) -> FilterDecision;

    fn on_accepted(&self, _signal: &Signal, _now_ns: u64) {}

    /// Drop any per-pair state held for `strategy_id`
    fn forget_strategy(&self, _strategy_id: &str) {}
}

/// Accepts signals only inside the exchange session, on trading days
#[derive(Debug, Clone)]
pub struct TradingSessionFilter {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
    days: Vec<Weekday>,
}

impl TradingSessionFilter {
    pub fn new(offset: FixedOffset, open: NaiveTime, close: NaiveTime, days: Vec<Weekday>) -> Self {
        Self {
            offset,
            open,
            close,
            days,
        }
    }

    pub fn from_settings(settings: &SessionFilterSettings) -> Result<Self> {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("UTC offset {} minutes out of range", settings.utc_offset_minutes)
        })?;
        Ok(Self::new(
            offset,
            settings.open_time()?,
            settings.close_time()?,
            settings.weekdays()?,
        ))
    }
}

impl SignalFilter for TradingSessionFilter {
    fn evaluate(&self, _signal: &Signal, now_ns: u64) -> FilterDecision {
        let local = DateTime::from_timestamp_nanos(now_ns as i64).with_timezone(&self.offset);
        if !self.days.contains(&local.weekday()) {
            return FilterDecision::Reject(format!("{} is not a trading day", local.weekday()));
        }
        let time = local.time();
        if time < self.open || time >= self.close {
            return FilterDecision::Reject(format!(
                "{} outside session {}-{}",
                time.format("%H:%M:%S"),
                self.open.format("%H:%M"),
                self.close.format("%H:%M")
            ));
        }
        FilterDecision::Pass
    }
}

/// Rejects signals generated while ATR is too large relative to price
///
/// Signals without ATR or a price pass; there is nothing to judge.
#[derive(Debug, Clone)]
pub struct VolatilityFilter {
    max_atr_percent: f64,
}

impl VolatilityFilter {
    pub fn new(max_atr_percent: f64) -> Self {
        Self { max_atr_percent }
    }

    pub fn from_settings(settings: &VolatilityFilterSettings) -> Self {
        Self::new(settings.max_atr_percent)
    }
}

impl SignalFilter for VolatilityFilter {
    fn evaluate(&self, signal: &Signal, _now_ns: u64) -> FilterDecision {
        let Some(atr) = signal.metadata_decimal(ATR_KEY).and_then(|a| a.to_f64()) else {
            return FilterDecision::Pass;
        };
        let price = signal
            .price
            .or_else(|| signal.metadata_decimal(REFERENCE_PRICE_KEY))
            .and_then(|p| p.to_f64());
        let Some(price) = price.filter(|p| *p > 0.0) else {
            return FilterDecision::Pass;
        };

        let atr_percent = atr / price * 100.0;
        if atr_percent > self.max_atr_percent {
            FilterDecision::Reject(format!(
                "ATR {:.2}% exceeds {:.2}%",
                atr_percent, self.max_atr_percent
            ))
        } else {
            FilterDecision::Pass
        }
    }
}

/// Minimum spacing between accepted signals for one strategy/symbol pair
///
/// Independent of the processor's own signal timeout.
#[derive(Debug)]
pub struct FrequencyFilter {
    min_interval_ns: u64,
    last_accepted: DashMap<SignalKey, u64>,
}

impl FrequencyFilter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_ns: min_interval.as_nanos() as u64,
            last_accepted: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &FrequencyFilterSettings) -> Self {
        Self::new(settings.min_interval())
    }

    pub fn tracked_pairs(&self) -> usize {
        self.last_accepted.len()
    }
}

impl SignalFilter for FrequencyFilter {
    fn evaluate(&self, signal: &Signal, now_ns: u64) -> FilterDecision {
        let key = signal.key();
        let Some(last) = self.last_accepted.get(&key).map(|v| *v) else {
            return FilterDecision::Pass;
        };
        let elapsed = now_ns.saturating_sub(last);
        if elapsed < self.min_interval_ns {
            return FilterDecision::Reject(format!(
                "{} signalled {}ms ago",
                key,
                elapsed / 1_000_000
            ));
        }
        FilterDecision::Pass
    }

    fn on_accepted(&self, signal: &Signal, now_ns: u64) {
        // Never move the stamp backwards if two accepts land out of order
        self.last_accepted
            .entry(signal.key())
            .and_modify(|last| *last = (*last).max(now_ns))
            .or_insert(now_ns);
    }

    fn forget_strategy(&self, strategy_id: &str) {
        self.last_accepted
            .retain(|k, _| k.strategy_id != strategy_id);
    }
}
