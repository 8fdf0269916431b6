//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use chrono::{FixedOffset, TimeZone};
use message_sink::test_utils::CollectorSink;
use std::sync::Arc;
use strategy_engine::StrategyExecutionEngine;
use torq_config::EngineConfig;
use torq_strategy_shared::{MockControl, MockStrategy};
use torq_types::{ManualClock, StrategyConfiguration, StrategyInfo, StrategyState, StrategyType};

/// Monday 2024-01-15 10:00 IST, inside the default trading session
pub fn session_time_ns() -> u64 {
    FixedOffset::east_opt(330 * 60)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
        .unwrap()
        .timestamp_nanos_opt()
        .unwrap() as u64
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.restart_pause_ms = 10;
    config
}

pub struct TestEngine {
    pub engine: Arc<StrategyExecutionEngine>,
    pub sink: Arc<CollectorSink>,
    pub clock: Arc<ManualClock>,
}

pub fn engine_with(config: EngineConfig) -> TestEngine {
    let sink = Arc::new(CollectorSink::connected());
    let clock = Arc::new(ManualClock::new(session_time_ns()));
    let engine = StrategyExecutionEngine::new(config, sink.clone(), clock.clone())
        .expect("engine builds");
    TestEngine {
        engine: Arc::new(engine),
        sink,
        clock,
    }
}

pub fn engine() -> TestEngine {
    engine_with(test_config())
}

pub fn custom_config(id: &str) -> StrategyConfiguration {
    StrategyConfiguration::new(id, format!("Mock {}", id), StrategyType::Custom)
}

pub fn mock(name: &str) -> (Box<MockStrategy>, Arc<MockControl>) {
    let strategy = MockStrategy::new(name);
    let control = strategy.control();
    (Box::new(strategy), control)
}

pub fn momentum_config(id: &str) -> StrategyConfiguration {
    StrategyConfiguration::new(id, "Momentum", StrategyType::Momentum)
        .with_param("rsi_period", 14)
        .with_param("oversold_threshold", 30)
        .with_param("overbought_threshold", 70)
        .with_param("quantity", 10)
}

/// States published for `id` on `strategy-states`, in order
pub fn published_states(sink: &CollectorSink, id: &str) -> Vec<StrategyState> {
    sink.decoded::<StrategyInfo>(message_sink::topics::STRATEGY_STATES)
        .into_iter()
        .filter(|info| info.strategy_id == id)
        .map(|info| info.state)
        .collect()
}
