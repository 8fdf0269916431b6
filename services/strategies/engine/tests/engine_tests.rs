//! Registration, dispatch and lifecycle delegation through the engine

mod common;

use async_trait::async_trait;
use common::*;
use message_sink::test_utils::CollectorSink;
use message_sink::{topics, Message, MessageSink, SinkError};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use strategy_engine::{DispatchOutcome, EngineError, RegistrationOutcome, StrategyExecutionEngine};
use tokio::sync::Barrier;
use torq_strategy_shared::StrategyLogic;
use torq_types::{
    indicators, IndicatorSet, ManualClock, OrderRequest, Signal, SignalAction,
    StrategyConfiguration, StrategyState, StrategyType,
};
use uuid::Uuid;

#[tokio::test]
async fn test_duplicate_registration_is_noop() {
    let t = engine();
    let (first, control) = mock("first");
    let (second, second_control) = mock("second");

    assert_eq!(
        t.engine.register_custom(custom_config("s1"), first).await,
        RegistrationOutcome::Registered
    );
    assert_eq!(
        t.engine.register_custom(custom_config("s1"), second).await,
        RegistrationOutcome::Duplicate
    );

    assert_eq!(t.engine.strategy_count(), 1);
    assert_eq!(control.calls(&control.initialize_calls), 1);
    assert_eq!(second_control.calls(&second_control.initialize_calls), 0);
    assert_eq!(
        t.engine.get_strategy_info("s1").unwrap().state,
        StrategyState::Active
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_registration() {
    let t = engine();
    let (a, a_control) = mock("a");
    let (b, b_control) = mock("b");

    let (ra, rb) = tokio::join!(
        t.engine.register_custom(custom_config("s1"), a),
        t.engine.register_custom(custom_config("s1"), b)
    );

    let outcomes = [ra, rb];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RegistrationOutcome::Registered)
            .count(),
        1
    );
    assert_eq!(t.engine.strategy_count(), 1);
    assert_eq!(
        a_control.calls(&a_control.initialize_calls) + b_control.calls(&b_control.initialize_calls),
        1
    );
}

#[tokio::test]
async fn test_failed_registration_is_never_added() {
    let t = engine();

    let (failing, control) = mock("failing");
    control.fail_initialize();
    assert!(matches!(
        t.engine.register_custom(custom_config("s1"), failing).await,
        RegistrationOutcome::Rejected(_)
    ));

    let (rejecting, control) = mock("rejecting");
    control.reject_configuration("unsupported venue");
    assert_eq!(
        t.engine.register_custom(custom_config("s2"), rejecting).await,
        RegistrationOutcome::Rejected("unsupported venue".to_string())
    );

    let (disabled, _) = mock("disabled");
    assert!(matches!(
        t.engine
            .register_custom(custom_config("s3").disabled(), disabled)
            .await,
        RegistrationOutcome::Rejected(_)
    ));

    let invalid = StrategyConfiguration::new("s4", "Momentum", StrategyType::Momentum)
        .with_param("rsi_period", 1);
    match t.engine.register_strategy(invalid).await {
        RegistrationOutcome::Rejected(reason) => {
            assert!(reason.contains("rsi_period must be within"));
            assert!(reason.contains("missing required parameter 'quantity'"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(t.engine.strategy_count(), 0);
    assert!(t.engine.configurations().is_empty());

    // The id is free again after a failed attempt
    let (ok, _) = mock("ok");
    assert_eq!(
        t.engine.register_custom(custom_config("s1"), ok).await,
        RegistrationOutcome::Registered
    );
}

#[tokio::test]
async fn test_builtin_registration_saves_configuration() {
    let t = engine();
    assert_eq!(
        t.engine.register_strategy(momentum_config("mom")).await,
        RegistrationOutcome::Registered
    );
    assert!(t.engine.configurations().get_configuration("mom").is_some());

    assert!(matches!(
        t.engine.register_strategy(custom_config("c")).await,
        RegistrationOutcome::Rejected(_)
    ));

    assert!(t.engine.unregister_strategy("mom").await);
    assert!(t.engine.configurations().get_configuration("mom").is_none());
    assert!(!t.engine.unregister_strategy("mom").await);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let t = engine();
    assert!(matches!(
        t.engine.start_strategy("ghost").await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        t.engine.stop_strategy("ghost").await,
        Err(EngineError::NotFound(_))
    ));
    assert!(t.engine.pause_strategy("ghost").await.is_err());
    assert!(t.engine.resume_strategy("ghost").await.is_err());
    assert!(t.engine.get_strategy_info("ghost").is_none());
}

#[tokio::test]
async fn test_error_strategy_cannot_start_directly() {
    let t = engine();
    let (strategy, control) = mock("m");
    t.engine.register_custom(custom_config("s1"), strategy).await;

    control.fail_callbacks(true);
    t.engine
        .on_indicators(&IndicatorSet::new("NIFTY", 0))
        .await;
    assert_eq!(
        t.engine.get_strategy_info("s1").unwrap().state,
        StrategyState::Error
    );

    let err = t.engine.start_strategy("s1").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert!(t.engine.resume_strategy("s1").await.is_err());
    assert_eq!(
        t.engine.get_strategy_info("s1").unwrap().state,
        StrategyState::Error
    );
    assert_eq!(control.calls(&control.start_calls), 0);
}

#[tokio::test]
async fn test_lifecycle_delegation_and_queries() {
    let t = engine();
    let (a, _) = mock("a");
    let (b, _) = mock("b");
    t.engine.register_custom(custom_config("a"), a).await;
    t.engine.register_custom(custom_config("b"), b).await;

    t.engine.pause_strategy("b").await.unwrap();
    let active: Vec<String> = t
        .engine
        .get_active_strategies()
        .into_iter()
        .map(|i| i.strategy_id)
        .collect();
    assert_eq!(active, vec!["a"]);

    t.engine.resume_strategy("b").await.unwrap();
    t.engine.stop_strategy("a").await.unwrap();
    t.engine.start_strategy("a").await.unwrap();

    assert_eq!(
        published_states(&t.sink, "a"),
        vec![
            StrategyState::Active,
            StrategyState::Stopped,
            StrategyState::Active
        ]
    );

    t.engine
        .update_performance("a", dec!(50), dec!(1050))
        .unwrap();
    let perf = t.engine.get_strategy_performance();
    assert_eq!(perf.len(), 2);
    assert_eq!(perf[0].strategy_id, "a");
    assert_eq!(perf[0].peak_equity, dec!(1050));

    let stats = t.engine.statistics();
    assert_eq!(stats.registered, 2);
    assert_eq!(stats.active, 2);
}

#[tokio::test]
async fn test_dispatch_gates() {
    let t = engine();
    let (strategy, _) = mock("m");
    t.engine.register_custom(custom_config("s1"), strategy).await;

    let buy = || Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(1));

    assert_eq!(
        t.engine
            .process_signal(Signal::market("ghost", "NIFTY", SignalAction::Buy, dec!(1)))
            .await,
        DispatchOutcome::UnknownStrategy
    );
    assert!(matches!(
        t.engine
            .process_signal(Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(0)))
            .await,
        DispatchOutcome::Invalid(_)
    ));

    assert_eq!(t.engine.process_signal(buy()).await, DispatchOutcome::Dispatched);
    assert_eq!(t.engine.process_signal(buy()).await, DispatchOutcome::Throttled);

    t.clock.advance(Duration::from_secs(5));
    t.engine.pause_strategy("s1").await.unwrap();
    assert_eq!(
        t.engine.process_signal(buy()).await,
        DispatchOutcome::NotActive(StrategyState::Paused)
    );

    t.engine.resume_strategy("s1").await.unwrap();
    assert_eq!(t.engine.process_signal(buy()).await, DispatchOutcome::Dispatched);

    let stats = t.engine.statistics();
    assert_eq!(stats.signals_received, 6);
    assert_eq!(stats.signals_dispatched, 2);
    assert_eq!(stats.signals_rejected, 4);
    assert_eq!(t.sink.messages_on(topics::TRADING_SIGNALS).len(), 2);

    let perf = &t.engine.get_strategy_performance()[0];
    assert_eq!(perf.execution_count, 2);
    assert_eq!(perf.success_count, 2);
}

#[tokio::test]
async fn test_pipeline_turns_strategy_signals_into_orders() {
    let t = engine();
    t.engine.start().unwrap();

    let (strategy, control) = mock("m");
    t.engine.register_custom(custom_config("s1"), strategy).await;
    control.queue_signals(vec![
        Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(3)),
        Signal::market("s1", "NIFTY", SignalAction::Buy, dec!(-3)),
    ]);

    let forwarded = t
        .engine
        .on_indicators(&IndicatorSet::new("NIFTY", 0).with(indicators::RSI, 50.0))
        .await;
    assert_eq!(forwarded, 1);

    // Shutdown drains whatever is still queued
    t.engine.shutdown().await;

    let orders = t.sink.decoded::<OrderRequest>(topics::ORDER_REQUESTS);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, dec!(3));
    assert_eq!(
        t.engine.get_strategy_info("s1").unwrap().state,
        StrategyState::Stopped
    );
    assert!(t.engine.start().is_err());
}

#[tokio::test]
async fn test_candle_fanout_reaches_every_strategy() {
    let t = engine();
    let mut controls = Vec::new();
    for id in ["a", "b", "c"] {
        let (strategy, control) = mock(id);
        t.engine.register_custom(custom_config(id), strategy).await;
        controls.push(control);
    }
    t.engine.pause_strategy("c").await.unwrap();

    let candle = torq_types::CandleData {
        symbol: "NIFTY".to_string(),
        open: dec!(1),
        high: dec!(1),
        low: dec!(1),
        close: dec!(1),
        volume: dec!(1),
        timestamp_ns: 0,
    };
    t.engine.on_candle(&candle).await;

    let calls: Vec<u32> = controls.iter().map(|c| c.calls(&c.candle_calls)).collect();
    assert_eq!(calls, vec![1, 1, 0]);
}

#[tokio::test]
async fn test_handle_order_result_counts_only() {
    let t = engine();
    t.engine.handle_order_result("s1", Uuid::new_v4(), true, "filled");
    t.engine.handle_order_result("s1", Uuid::new_v4(), false, "margin");
    t.engine.handle_order_result("s1", Uuid::new_v4(), true, "filled");

    let stats = t.engine.statistics();
    assert_eq!(stats.orders_placed, 2);
    assert_eq!(stats.orders_failed, 1);
    assert_eq!(stats.registered, 0);
}

#[tokio::test]
async fn test_mock_name_reaches_registry() {
    let (strategy, _) = mock("named");
    assert_eq!(strategy.name(), "named");
    let t = engine();
    t.engine
        .register_custom(custom_config("s1"), strategy)
        .await;
    assert_eq!(t.engine.get_strategy_info("s1").unwrap().name, "Mock s1");
}

#[tokio::test]
async fn test_reregistered_strategy_starts_with_fresh_windows() {
    let t = engine();
    let buy = || Signal::market("m1", "NIFTY", SignalAction::Buy, dec!(1));

    let (first, _) = mock("first");
    t.engine.register_custom(custom_config("m1"), first).await;
    assert!(t.engine.processor().process_signal(buy()).await.order().is_some());

    assert!(t.engine.unregister_strategy("m1").await);
    let (second, _) = mock("second");
    assert_eq!(
        t.engine.register_custom(custom_config("m1"), second).await,
        RegistrationOutcome::Registered
    );

    // Past the timeout window, well inside the frequency window
    t.clock.advance(Duration::from_secs(10));
    assert!(t.engine.processor().process_signal(buy()).await.order().is_some());
    assert_eq!(t.sink.decoded::<OrderRequest>(topics::ORDER_REQUESTS).len(), 2);
}

/// Holds every order publish until `parties` of them are in flight together
#[derive(Debug)]
struct RendezvousSink {
    inner: CollectorSink,
    orders: Barrier,
}

#[async_trait]
impl MessageSink for RendezvousSink {
    async fn send(&self, message: Message) -> Result<(), SinkError> {
        if message.topic() == Some(topics::ORDER_REQUESTS) {
            self.orders.wait().await;
        }
        self.inner.send(message).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn connect(&self) -> Result<(), SinkError> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.inner.disconnect().await
    }
}

#[tokio::test]
async fn test_pipeline_processes_strategies_concurrently() {
    let sink = Arc::new(RendezvousSink {
        inner: CollectorSink::connected(),
        orders: Barrier::new(2),
    });
    let clock = Arc::new(ManualClock::new(session_time_ns()));
    let mut config = test_config();
    config.engine.max_concurrent_orders = 2;
    let engine = Arc::new(
        StrategyExecutionEngine::new(config, sink.clone(), clock).expect("engine builds"),
    );
    engine.start().unwrap();

    for id in ["a", "b"] {
        let (strategy, control) = mock(id);
        engine.register_custom(custom_config(id), strategy).await;
        control.queue_signals(vec![Signal::market(id, "NIFTY", SignalAction::Buy, dec!(1))]);
    }
    assert_eq!(engine.on_indicators(&IndicatorSet::new("NIFTY", 0)).await, 2);

    // One order at a time would never reach the rendezvous
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.inner.messages_on(topics::ORDER_REQUESTS).len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both orders published together");

    engine.shutdown().await;
}
