//! Strategy configuration utilities

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use torq_types::StrategyConfiguration;
use tracing::info;

/// Load configuration from TOML file
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Strategy definitions file: a `[[strategies]]` array
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategiesFile {
    #[serde(default)]
    pub strategies: Vec<StrategyConfiguration>,
}

/// Load strategy definitions, rejecting duplicate ids
pub fn load_strategies(path: impl AsRef<Path>) -> Result<Vec<StrategyConfiguration>> {
    let file: StrategiesFile = load_config(path.as_ref())?;

    let mut seen = HashSet::new();
    for config in &file.strategies {
        if !seen.insert(config.strategy_id.as_str()) {
            anyhow::bail!("Duplicate strategy id '{}'", config.strategy_id);
        }
    }

    info!(
        count = file.strategies.len(),
        path = %path.as_ref().display(),
        "Loaded strategy definitions"
    );
    Ok(file.strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use torq_types::StrategyType;

    #[test]
    fn test_load_strategies_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strategies.toml");
        fs::write(
            &path,
            r#"
[[strategies]]
strategy_id = "momentum-nifty"
name = "NIFTY momentum"
type = "MOMENTUM"

[strategies.parameters]
rsi_period = 14
oversold_threshold = 30
overbought_threshold = 70
quantity = 50
symbols = ["NIFTY"]

[[strategies]]
strategy_id = "arb-1"
name = "Cash futures arb"
type = "ARBITRAGE"
enabled = false

[strategies.parameters]
min_profit_margin = 0.002
max_position_size = 25
"#,
        )
        .unwrap();

        let strategies = load_strategies(&path).unwrap();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].strategy_type, StrategyType::Momentum);
        assert_eq!(strategies[0].param_usize("rsi_period"), Some(14));
        assert_eq!(strategies[0].param_string_list("symbols"), vec!["NIFTY"]);
        assert!(strategies[0].enabled);
        assert!(!strategies[1].enabled);
        assert_eq!(strategies[1].param_f64("min_profit_margin"), Some(0.002));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strategies.toml");
        fs::write(
            &path,
            r#"
[[strategies]]
strategy_id = "a"
name = "one"
type = "CUSTOM"

[[strategies]]
strategy_id = "a"
name = "two"
type = "CUSTOM"
"#,
        )
        .unwrap();

        let err = load_strategies(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate strategy id"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_strategies("/definitely/not/here.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read"));
    }
}
