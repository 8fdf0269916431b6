//! # Torq Strategy Engine Configuration
//!
//! Centralized configuration for the strategy orchestrator: defaults for every
//! tunable plus a layered loader (base TOML, environment overlay, `TORQ_`
//! environment variables).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use torq_config::EngineConfig;
//! use std::path::Path;
//!
//! let config = EngineConfig::load(Some(Path::new("config/engine.toml")), Some("production"))?;
//! config.validate()?;
//! println!("signal timeout: {:?}", config.engine.signal_timeout());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod engine_config;

// Re-export commonly used types
pub use engine_config::{
    EngineConfig, EngineSettings, FilterSettings, FrequencyFilterSettings, LoggingSettings,
    RuleSettings, SessionFilterSettings, VolatilityFilterSettings, load_config,
};
