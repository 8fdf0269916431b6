//! # Strategy Configuration Service
//!
//! ## Purpose
//!
//! Validates and stores per-strategy parameter sets keyed by strategy id.
//! Validation is pure: required-parameter presence for the declared
//! [`StrategyType`], then type-specific numeric ranges. Every violation is
//! collected so an operator fixes a file in one pass.
//!
//! ## Integration Points
//!
//! - **Engine**: registration saves the strategy's configuration here,
//!   unregistration deletes it
//! - **Strategy variants**: each variant's `validate` hook reuses
//!   [`type_rule_violations`] for its own type
//!
//! All mutations are validated before commit; a failed update leaves the
//! stored configuration untouched.

use crate::error::ConfigurationError;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use torq_types::{StrategyConfiguration, StrategyType};
use tracing::{debug, info, warn};

/// Built-in required parameters per strategy type
pub fn default_required_parameters(strategy_type: StrategyType) -> &'static [&'static str] {
    match strategy_type {
        StrategyType::Momentum => &[
            "rsi_period",
            "oversold_threshold",
            "overbought_threshold",
            "quantity",
        ],
        StrategyType::MeanReversion => &["lookback_period", "std_dev_multiplier", "quantity"],
        StrategyType::TrendFollowing => &["fast_period", "slow_period", "quantity"],
        StrategyType::Arbitrage => &["min_profit_margin", "max_position_size"],
        StrategyType::Custom => &[],
    }
}

/// Parameters that must be numbers whenever they are present
const NUMERIC_PARAMETERS: &[&str] = &[
    "rsi_period",
    "oversold_threshold",
    "overbought_threshold",
    "quantity",
    "lookback_period",
    "std_dev_multiplier",
    "fast_period",
    "slow_period",
    "min_profit_margin",
    "max_position_size",
];

fn numeric(config: &StrategyConfiguration, key: &str, violations: &mut Vec<String>) -> Option<f64> {
    match config.parameters.get(key) {
        None => None,
        Some(_) => match config.param_f64(key) {
            Some(v) if v.is_finite() => Some(v),
            _ => {
                violations.push(format!("parameter '{}' must be numeric", key));
                None
            }
        },
    }
}

fn integer(config: &StrategyConfiguration, key: &str, violations: &mut Vec<String>) -> Option<f64> {
    let value = numeric(config, key, violations)?;
    if value.fract() != 0.0 {
        violations.push(format!("parameter '{}' must be an integer, got {}", key, value));
        return None;
    }
    Some(value)
}

/// Range and type checks for the declared strategy type
///
/// Presence of required parameters is not checked here; missing values are
/// skipped.
pub fn type_rule_violations(config: &StrategyConfiguration) -> Vec<String> {
    let mut v = Vec::new();

    // Numeric shape first, so a string where a number belongs is always reported
    for key in NUMERIC_PARAMETERS {
        if !matches!(*key, "rsi_period" | "lookback_period" | "fast_period" | "slow_period") {
            numeric(config, key, &mut v);
        }
    }

    if let Some(q) = config.param_f64("quantity") {
        if q <= 0.0 {
            v.push(format!("quantity must be positive, got {}", q));
        }
    }

    match config.strategy_type {
        StrategyType::Momentum => {
            if let Some(period) = integer(config, "rsi_period", &mut v) {
                if !(2.0..=100.0).contains(&period) {
                    v.push(format!("rsi_period must be within [2, 100], got {}", period));
                }
            }
            let oversold = config.param_f64("oversold_threshold");
            let overbought = config.param_f64("overbought_threshold");
            for (name, value) in [
                ("oversold_threshold", oversold),
                ("overbought_threshold", overbought),
            ] {
                if let Some(t) = value {
                    if !(t > 0.0 && t < 100.0) {
                        v.push(format!("{} must be within (0, 100), got {}", name, t));
                    }
                }
            }
            if let (Some(lo), Some(hi)) = (oversold, overbought) {
                if lo >= hi {
                    v.push(format!(
                        "oversold_threshold ({}) must be below overbought_threshold ({})",
                        lo, hi
                    ));
                }
            }
        }
        StrategyType::MeanReversion => {
            if let Some(lookback) = integer(config, "lookback_period", &mut v) {
                if !(5.0..=500.0).contains(&lookback) {
                    v.push(format!(
                        "lookback_period must be within [5, 500], got {}",
                        lookback
                    ));
                }
            }
            if let Some(k) = config.param_f64("std_dev_multiplier") {
                if !(0.5..=5.0).contains(&k) {
                    v.push(format!(
                        "std_dev_multiplier must be within [0.5, 5.0], got {}",
                        k
                    ));
                }
            }
        }
        StrategyType::TrendFollowing => {
            let fast = integer(config, "fast_period", &mut v);
            let slow = integer(config, "slow_period", &mut v);
            for (name, value) in [("fast_period", fast), ("slow_period", slow)] {
                if let Some(p) = value {
                    if p < 2.0 {
                        v.push(format!("{} must be at least 2, got {}", name, p));
                    }
                }
            }
            if let (Some(fast), Some(slow)) = (fast, slow) {
                if fast >= slow {
                    v.push(format!(
                        "fast_period ({}) must be below slow_period ({})",
                        fast, slow
                    ));
                }
            }
        }
        StrategyType::Arbitrage => {
            if let Some(margin) = config.param_f64("min_profit_margin") {
                if !(0.0001..=0.05).contains(&margin) {
                    v.push(format!(
                        "min_profit_margin must be within [0.0001, 0.05], got {}",
                        margin
                    ));
                }
            }
            if let Some(size) = config.param_f64("max_position_size") {
                if size <= 0.0 {
                    v.push(format!("max_position_size must be positive, got {}", size));
                }
            }
        }
        StrategyType::Custom => {}
    }

    v
}

/// Owner of every strategy configuration, one per id
#[derive(Debug)]
pub struct StrategyConfigurationService {
    configurations: DashMap<String, StrategyConfiguration>,
    required_parameters: DashMap<StrategyType, Vec<String>>,
}

impl Default for StrategyConfigurationService {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyConfigurationService {
    pub fn new() -> Self {
        let required_parameters = DashMap::new();
        for strategy_type in StrategyType::ALL {
            required_parameters.insert(
                strategy_type,
                default_required_parameters(strategy_type)
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            );
        }
        Self {
            configurations: DashMap::new(),
            required_parameters,
        }
    }

    /// Add required parameters for a type (e.g. a `CUSTOM` family)
    pub fn register_required_parameters<I, S>(&self, strategy_type: StrategyType, parameters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entry = self.required_parameters.entry(strategy_type).or_default();
        for p in parameters {
            let p = p.into();
            if !entry.contains(&p) {
                entry.push(p);
            }
        }
        debug!(%strategy_type, required = ?*entry, "Required parameters updated");
    }

    pub fn required_parameters(&self, strategy_type: StrategyType) -> Vec<String> {
        self.required_parameters
            .get(&strategy_type)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn get_configuration(&self, id: &str) -> Option<StrategyConfiguration> {
        self.configurations.get(id).map(|c| c.clone())
    }

    /// All configurations, ordered by id
    pub fn get_all_configurations(&self) -> Vec<StrategyConfiguration> {
        let mut all: Vec<_> = self
            .configurations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        all
    }

    /// Collect every violation for `config` stored under `id`
    pub fn validate_configuration(
        &self,
        id: &str,
        config: &StrategyConfiguration,
    ) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();

        if config.strategy_id.trim().is_empty() {
            violations.push("strategy_id must not be empty".to_string());
        }
        if config.name.trim().is_empty() {
            violations.push("name must not be empty".to_string());
        }
        if id != config.strategy_id {
            violations.push(format!(
                "key '{}' does not match strategy_id '{}'",
                id, config.strategy_id
            ));
        }

        for required in self.required_parameters(config.strategy_type) {
            if !config.parameters.contains_key(&required) {
                violations.push(format!("missing required parameter '{}'", required));
            }
        }

        violations.extend(type_rule_violations(config));

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(violations))
        }
    }

    /// Validate then insert (or replace) the configuration for `id`
    pub fn save_configuration(
        &self,
        id: &str,
        config: StrategyConfiguration,
    ) -> Result<(), ConfigurationError> {
        if let Err(err) = self.validate_configuration(id, &config) {
            warn!(strategy_id = %id, error = %err, "Configuration rejected");
            return Err(err);
        }
        self.configurations.insert(id.to_string(), config);
        info!(strategy_id = %id, "Configuration saved");
        Ok(())
    }

    /// Merge `partial` into the stored parameters; commits only if the merged result is valid
    pub fn update_configuration(
        &self,
        id: &str,
        partial: HashMap<String, Value>,
    ) -> Result<StrategyConfiguration, ConfigurationError> {
        let mut entry = self
            .configurations
            .get_mut(id)
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;

        let mut merged = entry.clone();
        merged.parameters.extend(partial);

        if let Err(err) = self.validate_configuration(id, &merged) {
            warn!(strategy_id = %id, error = %err, "Configuration update rejected");
            return Err(err);
        }

        *entry = merged.clone();
        info!(strategy_id = %id, "Configuration updated");
        Ok(merged)
    }

    pub fn delete_configuration(&self, id: &str) -> Result<StrategyConfiguration, ConfigurationError> {
        self.configurations
            .remove(id)
            .map(|(_, config)| config)
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))
    }

    pub fn set_strategy_enabled(&self, id: &str, enabled: bool) -> Result<(), ConfigurationError> {
        let mut entry = self
            .configurations
            .get_mut(id)
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;
        entry.enabled = enabled;
        info!(strategy_id = %id, enabled, "Strategy enablement changed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
