//! Built-in indicator rule library
//!
//! Turns one [`IndicatorSet`] into candidate signals for a strategy/symbol
//! pair. Crossover rules are edge-triggered against the condition tag of the
//! pair's previous signal, which the caller supplies.

use rust_decimal::Decimal;
use torq_config::RuleSettings;
use torq_types::{
    conditions, indicators, IndicatorSet, Signal, SignalAction, ATR_KEY, REFERENCE_PRICE_KEY,
};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct IndicatorRules {
    settings: RuleSettings,
}

impl IndicatorRules {
    pub fn new(settings: RuleSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// Evaluate every rule whose inputs are present
    ///
    /// A missing indicator skips only the rules that depend on it.
    pub fn evaluate(
        &self,
        strategy_id: &str,
        symbol: &str,
        set: &IndicatorSet,
        previous_condition: Option<&str>,
    ) -> Vec<Signal> {
        let mut candidates = Vec::new();

        if let Some(rsi) = set.get(indicators::RSI) {
            if rsi < self.settings.oversold_threshold
                && previous_condition != Some(conditions::OVERSOLD)
            {
                candidates.push((SignalAction::Buy, conditions::OVERSOLD));
            } else if rsi > self.settings.overbought_threshold
                && previous_condition != Some(conditions::OVERBOUGHT)
            {
                candidates.push((SignalAction::Sell, conditions::OVERBOUGHT));
            }
        }

        if let (Some(macd), Some(signal_line)) =
            (set.get(indicators::MACD), set.get(indicators::MACD_SIGNAL))
        {
            if let Some(c) = self.crossover(
                macd,
                signal_line,
                previous_condition,
                (conditions::MACD_BULLISH, conditions::MACD_BEARISH),
            ) {
                candidates.push(c);
            }
        }

        if let (Some(fast), Some(slow)) =
            (set.get(indicators::SMA_FAST), set.get(indicators::SMA_SLOW))
        {
            if let Some(c) = self.crossover(
                fast,
                slow,
                previous_condition,
                (conditions::MA_BULLISH, conditions::MA_BEARISH),
            ) {
                candidates.push(c);
            }
        }

        candidates
            .into_iter()
            .filter_map(|(action, condition)| self.build(strategy_id, symbol, set, action, condition))
            .collect()
    }

    /// Emit only when the previous tag was the opposite edge of this rule
    fn crossover(
        &self,
        fast: f64,
        slow: f64,
        previous_condition: Option<&str>,
        (bullish, bearish): (&'static str, &'static str),
    ) -> Option<(SignalAction, &'static str)> {
        let seeded = previous_condition.is_none() && self.settings.seed_crossovers_without_history;
        if fast > slow && (previous_condition == Some(bearish) || seeded) {
            Some((SignalAction::Buy, bullish))
        } else if fast < slow && (previous_condition == Some(bullish) || seeded) {
            Some((SignalAction::Sell, bearish))
        } else {
            trace!(fast, slow, ?previous_condition, bullish, "No crossover edge");
            None
        }
    }

    fn build(
        &self,
        strategy_id: &str,
        symbol: &str,
        set: &IndicatorSet,
        action: SignalAction,
        condition: &str,
    ) -> Option<Signal> {
        let quantity = Decimal::try_from(self.settings.default_quantity).ok()?;
        let mut signal = Signal::market(strategy_id, symbol, action, quantity)
            .with_timestamp(set.timestamp_ns)
            .with_condition(condition);

        let atr = set.get(indicators::ATR).and_then(|v| Decimal::try_from(v).ok());
        let close = set.get(indicators::CLOSE).and_then(|v| Decimal::try_from(v).ok());
        if let Some(close) = close {
            signal = signal.with_metadata(REFERENCE_PRICE_KEY, close.to_string());
        }
        if let Some(atr) = atr {
            signal = signal.with_metadata(ATR_KEY, atr.to_string());
        }

        if let (Some(atr), Some(close)) = (atr, close) {
            let sl = Decimal::try_from(self.settings.stop_loss_atr_multiplier).ok()?;
            let tp = Decimal::try_from(self.settings.take_profit_atr_multiplier).ok()?;
            let (stop_loss, take_profit) = match action {
                SignalAction::Sell => (close + atr * sl, close - atr * tp),
                _ => (close - atr * sl, close + atr * tp),
            };
            signal = signal.with_stop_loss(stop_loss).with_take_profit(take_profit);
        }

        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> IndicatorRules {
        IndicatorRules::new(RuleSettings::default())
    }

    #[test]
    fn test_oversold_with_atr_levels() {
        let set = IndicatorSet::new("NIFTY", 5)
            .with(indicators::RSI, 25.0)
            .with(indicators::ATR, 100.0)
            .with(indicators::CLOSE, 22000.0);
        let signals = rules().evaluate("s1", "NIFTY", &set, None);

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.action, Some(SignalAction::Buy));
        assert_eq!(s.condition(), Some(conditions::OVERSOLD));
        assert_eq!(s.stop_loss, Some(dec!(21800)));
        assert_eq!(s.take_profit, Some(dec!(22300)));
        assert_eq!(s.timestamp_ns, 5);
    }

    #[test]
    fn test_sell_levels_are_mirrored() {
        let set = IndicatorSet::new("NIFTY", 0)
            .with(indicators::RSI, 80.0)
            .with(indicators::ATR, 10.0)
            .with(indicators::CLOSE, 1000.0);
        let s = &rules().evaluate("s1", "NIFTY", &set, None)[0];
        assert_eq!(s.action, Some(SignalAction::Sell));
        assert_eq!(s.stop_loss, Some(dec!(1020)));
        assert_eq!(s.take_profit, Some(dec!(970)));
    }

    #[test]
    fn test_repeated_oscillator_condition_is_suppressed() {
        let set = IndicatorSet::new("NIFTY", 0).with(indicators::RSI, 20.0);
        assert!(rules()
            .evaluate("s1", "NIFTY", &set, Some(conditions::OVERSOLD))
            .is_empty());
    }

    #[test]
    fn test_missing_values_skip_dependent_rules() {
        let set = IndicatorSet::new("NIFTY", 0)
            .with(indicators::RSI, f64::NAN)
            .with(indicators::MACD, 1.0);
        assert!(rules().evaluate("s1", "NIFTY", &set, None).is_empty());

        let set = IndicatorSet::new("NIFTY", 0).with(indicators::RSI, 25.0);
        let s = &rules().evaluate("s1", "NIFTY", &set, None)[0];
        assert_eq!(s.stop_loss, None);
        assert_eq!(s.take_profit, None);
    }

    #[test]
    fn test_crossover_needs_opposite_previous_tag() {
        let bullish = IndicatorSet::new("NIFTY", 0)
            .with(indicators::MACD, 1.5)
            .with(indicators::MACD_SIGNAL, 1.0);

        assert!(rules().evaluate("s1", "NIFTY", &bullish, None).is_empty());
        assert!(rules()
            .evaluate("s1", "NIFTY", &bullish, Some(conditions::OVERSOLD))
            .is_empty());

        let fired = rules().evaluate("s1", "NIFTY", &bullish, Some(conditions::MACD_BEARISH));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].condition(), Some(conditions::MACD_BULLISH));
    }

    #[test]
    fn test_seeded_crossovers() {
        let settings = RuleSettings {
            seed_crossovers_without_history: true,
            ..RuleSettings::default()
        };
        let set = IndicatorSet::new("NIFTY", 0)
            .with(indicators::SMA_FAST, 99.0)
            .with(indicators::SMA_SLOW, 100.0);
        let fired = IndicatorRules::new(settings).evaluate("s1", "NIFTY", &set, None);
        assert_eq!(fired[0].condition(), Some(conditions::MA_BEARISH));
    }
}
