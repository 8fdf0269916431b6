//! Engine Configuration Module
//!
//! Provides configuration loading for the strategy execution engine.
//! Supports loading from TOML files with environment-specific overrides.

use crate::defaults;
use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Weekday};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default location of the base configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";

/// Prefix for environment variable overrides (`TORQ_ENGINE__SIGNAL_TIMEOUT_MS=...`)
pub const ENV_PREFIX: &str = "TORQ";

/// Main engine configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Execution engine settings
    pub engine: EngineSettings,

    /// Built-in signal filter settings
    pub filters: FilterSettings,

    /// Indicator rule library settings
    pub rules: RuleSettings,

    pub logging: LoggingSettings,
}

/// Execution engine settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub max_concurrent_orders: usize,
    pub signal_timeout_ms: u64,
    pub inactivity_timeout_secs: u64,
    pub restart_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub restart_pause_ms: u64,
    pub pipeline_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FilterSettings {
    pub session: SessionFilterSettings,
    pub volatility: VolatilityFilterSettings,
    pub frequency: FrequencyFilterSettings,
}

/// Trading-session gate
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionFilterSettings {
    pub enabled: bool,
    /// Exchange offset from UTC in minutes
    pub utc_offset_minutes: i32,
    /// Session open, `HH:MM` exchange-local
    pub open: String,
    /// Session close, `HH:MM` exchange-local
    pub close: String,
    /// Weekday names (`Mon`, `Tuesday`, ...)
    pub trading_days: Vec<String>,
}

/// Volatility gate
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct VolatilityFilterSettings {
    pub enabled: bool,
    pub max_atr_percent: f64,
}

/// Frequency gate, independent from the engine signal timeout
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FrequencyFilterSettings {
    pub enabled: bool,
    pub min_interval_ms: u64,
}

/// Indicator rule library settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuleSettings {
    pub oversold_threshold: f64,
    pub overbought_threshold: f64,
    pub stop_loss_atr_multiplier: f64,
    pub take_profit_atr_multiplier: f64,
    pub default_quantity: f64,
    /// Allow crossover rules to fire for a pair with no recorded signal
    pub seed_crossovers_without_history: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_orders: defaults::engine::MAX_CONCURRENT_ORDERS,
            signal_timeout_ms: defaults::engine::SIGNAL_TIMEOUT_MS,
            inactivity_timeout_secs: defaults::engine::INACTIVITY_TIMEOUT_SECS,
            restart_interval_secs: defaults::engine::RESTART_INTERVAL_SECS,
            cleanup_interval_secs: defaults::engine::CLEANUP_INTERVAL_SECS,
            restart_pause_ms: defaults::engine::RESTART_PAUSE_MS,
            pipeline_capacity: defaults::engine::PIPELINE_CAPACITY,
        }
    }
}

impl Default for SessionFilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: defaults::filters::SESSION_UTC_OFFSET_MINUTES,
            open: defaults::filters::SESSION_OPEN.to_string(),
            close: defaults::filters::SESSION_CLOSE.to_string(),
            trading_days: defaults::filters::TRADING_DAYS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl Default for VolatilityFilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_atr_percent: defaults::filters::MAX_ATR_PERCENT,
        }
    }
}

impl Default for FrequencyFilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: defaults::filters::MIN_SIGNAL_INTERVAL_MS,
        }
    }
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            oversold_threshold: defaults::rules::OVERSOLD_THRESHOLD,
            overbought_threshold: defaults::rules::OVERBOUGHT_THRESHOLD,
            stop_loss_atr_multiplier: defaults::rules::STOP_LOSS_ATR_MULTIPLIER,
            take_profit_atr_multiplier: defaults::rules::TAKE_PROFIT_ATR_MULTIPLIER,
            default_quantity: defaults::rules::DEFAULT_QUANTITY,
            seed_crossovers_without_history: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineSettings {
    pub fn signal_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_timeout_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn restart_interval(&self) -> Duration {
        Duration::from_secs(self.restart_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }
}

impl SessionFilterSettings {
    pub fn open_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.open).context("Invalid filters.session.open")
    }

    pub fn close_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.close).context("Invalid filters.session.close")
    }

    pub fn weekdays(&self) -> Result<Vec<Weekday>> {
        self.trading_days
            .iter()
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("Unknown trading day '{}'", d))
            })
            .collect()
    }
}

impl FrequencyFilterSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Expected HH:MM, got '{}'", value))
}

impl EngineConfig {
    /// Load configuration from files with environment overrides
    ///
    /// A missing base file is only an error when a path was given explicitly;
    /// otherwise defaults apply.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        Self::load_with_prefix(base_path, environment, ENV_PREFIX)
    }

    /// Same as [`EngineConfig::load`] with a custom environment-variable prefix
    pub fn load_with_prefix(
        base_path: Option<&Path>,
        environment: Option<&str>,
        env_prefix: &str,
    ) -> Result<Self> {
        let required = base_path.is_some();
        let base = base_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder().add_source(File::from(base).required(required));

        // Environment overlays live next to the base file
        if let Some(env) = environment {
            let env_file = environments_dir(base).join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (TORQ_ENGINE__SIGNAL_TIMEOUT_MS)
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let engine_config: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        debug!(?engine_config, "Engine configuration loaded");
        Ok(engine_config)
    }

    /// Parse a configuration from an in-memory TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse engine configuration TOML")
    }

    /// Reject settings the engine cannot run with; reports every problem found
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let e = &self.engine;
        if e.max_concurrent_orders == 0 {
            problems.push("engine.max_concurrent_orders must be > 0".to_string());
        }
        if e.inactivity_timeout_secs == 0 {
            problems.push("engine.inactivity_timeout_secs must be > 0".to_string());
        }
        if e.restart_interval_secs == 0 {
            problems.push("engine.restart_interval_secs must be > 0".to_string());
        }
        if e.cleanup_interval_secs == 0 {
            problems.push("engine.cleanup_interval_secs must be > 0".to_string());
        }
        if e.pipeline_capacity == 0 {
            problems.push("engine.pipeline_capacity must be > 0".to_string());
        }

        let session = &self.filters.session;
        match (session.open_time(), session.close_time()) {
            (Ok(open), Ok(close)) if open >= close => {
                problems.push(format!(
                    "filters.session.open ({}) must be before close ({})",
                    session.open, session.close
                ));
            }
            (Ok(_), Ok(_)) => {}
            (open, close) => {
                for err in [open.err(), close.err()].into_iter().flatten() {
                    problems.push(format!("{:#}", err));
                }
            }
        }
        if let Err(err) = session.weekdays() {
            problems.push(format!("filters.session.trading_days: {}", err));
        }
        if session.utc_offset_minutes.abs() >= 24 * 60 {
            problems.push("filters.session.utc_offset_minutes out of range".to_string());
        }

        if self.filters.volatility.max_atr_percent <= 0.0 {
            problems.push("filters.volatility.max_atr_percent must be > 0".to_string());
        }

        let rules = &self.rules;
        let thresholds_ordered = 0.0 < rules.oversold_threshold
            && rules.oversold_threshold < rules.overbought_threshold
            && rules.overbought_threshold < 100.0;
        if !thresholds_ordered {
            problems.push(
                "rules: expected 0 < oversold_threshold < overbought_threshold < 100".to_string(),
            );
        }
        if rules.stop_loss_atr_multiplier <= 0.0 || rules.take_profit_atr_multiplier <= 0.0 {
            problems.push("rules: ATR multipliers must be > 0".to_string());
        }
        if rules.default_quantity <= 0.0 {
            problems.push("rules.default_quantity must be > 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!("Invalid engine configuration: {}", problems.join("; "))
        }
    }
}

/// Convenience function to load and validate configuration
pub fn load_config(path: Option<&Path>, environment: Option<&str>) -> Result<EngineConfig> {
    let config = EngineConfig::load(path, environment)?;
    config.validate()?;
    Ok(config)
}

/// Resolve the directory holding environment overlays for a base file
pub fn environments_dir(base: &Path) -> PathBuf {
    base.parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join("environments")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        fs::write(&config_path, "").unwrap();

        let config = EngineConfig::load_with_prefix(Some(&config_path), None, "TORQTEST_EMPTY")
            .unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.inactivity_timeout(), Duration::from_secs(300));
        assert_eq!(config.engine.cleanup_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");

        let config_content = r#"
[engine]
max_concurrent_orders = 4
signal_timeout_ms = 250

[filters.session]
open = "10:00"
close = "14:00"
trading_days = ["Mon", "Wed"]

[filters.frequency]
enabled = false

[rules]
oversold_threshold = 25.0
seed_crossovers_without_history = true

[logging]
level = "debug"
json = true
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = EngineConfig::load_with_prefix(Some(&config_path), None, "TORQTEST_BASE")
            .unwrap();

        assert_eq!(config.engine.max_concurrent_orders, 4);
        assert_eq!(config.engine.signal_timeout(), Duration::from_millis(250));
        assert_eq!(config.engine.restart_interval_secs, 300);
        assert_eq!(
            config.filters.session.weekdays().unwrap(),
            vec![Weekday::Mon, Weekday::Wed]
        );
        assert!(!config.filters.frequency.enabled);
        assert!(config.filters.volatility.enabled);
        assert_eq!(config.rules.oversold_threshold, 25.0);
        assert_eq!(config.rules.overbought_threshold, 70.0);
        assert!(config.rules.seed_crossovers_without_history);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_environment_overlay() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        fs::write(&config_path, "[engine]\nsignal_timeout_ms = 1000\n").unwrap();

        let env_dir = environments_dir(&config_path);
        fs::create_dir_all(&env_dir).unwrap();
        fs::write(
            env_dir.join("staging.toml"),
            "[engine]\nsignal_timeout_ms = 2000\n",
        )
        .unwrap();

        let config = EngineConfig::load_with_prefix(
            Some(&config_path),
            Some("staging"),
            "TORQTEST_OVERLAY",
        )
        .unwrap();
        assert_eq!(config.engine.signal_timeout_ms, 2000);
    }

    #[test]
    fn test_environment_variable_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        fs::write(&config_path, "[engine]\nmax_concurrent_orders = 3\n").unwrap();

        std::env::set_var("TORQTEST_VARS_ENGINE__MAX_CONCURRENT_ORDERS", "7");
        let config =
            EngineConfig::load_with_prefix(Some(&config_path), None, "TORQTEST_VARS").unwrap();
        std::env::remove_var("TORQTEST_VARS_ENGINE__MAX_CONCURRENT_ORDERS");

        assert_eq!(config.engine.max_concurrent_orders, 7);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(EngineConfig::load_with_prefix(Some(&missing), None, "TORQTEST_MISSING").is_err());
    }

    #[test]
    fn test_validate_collects_problems() {
        let mut config = EngineConfig::default();
        config.engine.cleanup_interval_secs = 0;
        config.filters.session.open = "16:00".to_string();
        config.rules.oversold_threshold = 80.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cleanup_interval_secs"));
        assert!(err.contains("must be before close"));
        assert!(err.contains("oversold_threshold"));
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str("[filters.volatility]\nmax_atr_percent = 1.5\n")
            .unwrap();
        assert_eq!(config.filters.volatility.max_atr_percent, 1.5);
        assert_eq!(config.filters.session.open, "09:15");
    }
}
