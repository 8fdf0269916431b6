//! Strategy identity, lifecycle state and read-only snapshots

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a managed strategy
///
/// ```text
///   INITIALIZED ──► ACTIVE ◄──► PAUSED
///        │           │  ▲
///        │           ▼  │
///        └──────► STOPPED
///   any failure ──► ERROR ──(recover)──► STOPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    Initialized,
    Active,
    Paused,
    Stopped,
    Error,
}

impl StrategyState {
    /// Whether the lifecycle allows moving from `self` to `next`
    ///
    /// ERROR never reaches ACTIVE directly; it must pass through STOPPED.
    pub fn can_transition_to(self, next: StrategyState) -> bool {
        use StrategyState::*;
        matches!(
            (self, next),
            (Initialized, Active)
                | (Initialized, Error)
                | (Active, Stopped)
                | (Active, Paused)
                | (Active, Error)
                | (Paused, Active)
                | (Paused, Stopped)
                | (Paused, Error)
                | (Stopped, Active)
                | (Stopped, Error)
                | (Error, Stopped)
        )
    }

    pub fn is_active(self) -> bool {
        self == StrategyState::Active
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyState::Initialized => "INITIALIZED",
            StrategyState::Active => "ACTIVE",
            StrategyState::Paused => "PAUSED",
            StrategyState::Stopped => "STOPPED",
            StrategyState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
    Momentum,
    MeanReversion,
    TrendFollowing,
    Arbitrage,
    Custom,
}

impl StrategyType {
    pub const ALL: [StrategyType; 5] = [
        StrategyType::Momentum,
        StrategyType::MeanReversion,
        StrategyType::TrendFollowing,
        StrategyType::Arbitrage,
        StrategyType::Custom,
    ];
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyType::Momentum => "MOMENTUM",
            StrategyType::MeanReversion => "MEAN_REVERSION",
            StrategyType::TrendFollowing => "TREND_FOLLOWING",
            StrategyType::Arbitrage => "ARBITRAGE",
            StrategyType::Custom => "CUSTOM",
        };
        f.write_str(s)
    }
}

fn default_enabled() -> bool {
    true
}

/// Per-strategy parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfiguration {
    pub strategy_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl StrategyConfiguration {
    pub fn new(
        strategy_id: impl Into<String>,
        name: impl Into<String>,
        strategy_type: StrategyType,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            name: name.into(),
            description: String::new(),
            strategy_type,
            parameters: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Numeric parameter; strings holding a number are accepted too
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integral parameter
    pub fn param_usize(&self, key: &str) -> Option<usize> {
        let v = self.param_f64(key)?;
        if v >= 0.0 && v.fract() == 0.0 {
            Some(v as usize)
        } else {
            None
        }
    }

    pub fn param_decimal(&self, key: &str) -> Option<Decimal> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.to_string().parse().ok(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String-list parameter (e.g. `symbols`); empty when absent
    pub fn param_string_list(&self, key: &str) -> Vec<String> {
        match self.parameters.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Performance snapshot of one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy_id: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_pnl: Decimal,
    pub peak_equity: Decimal,
    pub max_drawdown: Decimal,
    pub last_execution_ns: u64,
}

/// Read-only view of a running strategy, rebuilt on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub strategy_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    pub state: StrategyState,
    pub performance: StrategyPerformance,
    pub last_update_ns: u64,
    pub last_error: Option<String>,
}
