//! Strategy engine service entry point

use anyhow::{Context, Result};
use clap::Parser;
use message_sink::{topics, BroadcastSink, MessageSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategy_engine::logging::init_logging;
use strategy_engine::{
    log_success, MarketDataRouter, MarketEvent, RegistrationOutcome, StrategyExecutionEngine,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use torq_types::OrderRequest;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (defaults to config/engine.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Strategy definitions file (`[[strategies]]` entries)
    #[arg(short, long)]
    strategies: Option<PathBuf>,

    /// Environment overlay, e.g. `production` → config/environments/production.toml
    #[arg(short, long)]
    environment: Option<String>,

    /// Log level; `RUST_LOG` takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// Replay market events from a JSON-lines file, then keep running
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Capacity of the in-process broadcast sink
    #[arg(long, default_value_t = 4096)]
    sink_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = torq_config::load_config(args.config.as_deref(), args.environment.as_deref())
        .context("Failed to load engine configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, args.json_logs || config.logging.json)?;

    info!("🚀 Starting Strategy Engine v{}", env!("CARGO_PKG_VERSION"));
    info!(
        signal_timeout_ms = config.engine.signal_timeout_ms,
        max_concurrent_orders = config.engine.max_concurrent_orders,
        "Engine configuration loaded"
    );

    let sink = Arc::new(BroadcastSink::with_name("strategy-engine", args.sink_capacity));
    let order_log = tokio::spawn(log_order_requests(sink.subscribe()));

    let engine = Arc::new(
        StrategyExecutionEngine::with_system_clock(config, sink.clone() as Arc<dyn MessageSink>)
            .context("Failed to build strategy engine")?,
    );
    engine.start()?;

    if let Some(path) = &args.strategies {
        register_strategies(&engine, path).await?;
    } else {
        warn!("No strategies file given; engine is idle until signals arrive");
    }

    let router_shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(1024);
    let router = tokio::spawn(
        MarketDataRouter::new(Arc::clone(&engine)).run(events_rx, router_shutdown.clone()),
    );

    if let Some(path) = args.replay.clone() {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = replay_events(&path, tx).await {
                error!(error = %format!("{:#}", e), "Replay failed");
            }
        });
    }

    log_success!("Strategy engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    router_shutdown.cancel();
    drop(events_tx);
    if let Ok(stats) = router.await {
        info!(events = stats.events, "Router finished");
    }

    engine.shutdown().await;
    let statistics = engine.statistics();
    info!(
        statistics = %serde_json::to_string(&statistics).unwrap_or_default(),
        "Final engine statistics"
    );

    sink.disconnect().await.ok();
    order_log.abort();
    Ok(())
}

async fn register_strategies(engine: &StrategyExecutionEngine, path: &Path) -> Result<()> {
    let definitions = torq_strategy_shared::load_strategies(path)?;
    for config in definitions {
        let id = config.strategy_id.clone();
        if !config.enabled {
            info!(strategy_id = %id, "Skipping disabled strategy");
            continue;
        }
        match engine.register_strategy(config).await {
            RegistrationOutcome::Registered => {}
            RegistrationOutcome::Duplicate => warn!(strategy_id = %id, "Duplicate strategy"),
            RegistrationOutcome::Rejected(reason) => {
                error!(strategy_id = %id, %reason, "Strategy not registered")
            }
        }
    }
    Ok(())
}

async fn replay_events(path: &Path, tx: mpsc::Sender<MarketEvent>) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut sent = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: MarketEvent = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid market event", path.display(), line_no + 1))?;
        if tx.send(event).await.is_err() {
            break;
        }
        sent += 1;
    }
    info!(events = sent, path = %path.display(), "Replay complete");
    Ok(())
}

async fn log_order_requests(mut rx: broadcast::Receiver<message_sink::Message>) {
    loop {
        match rx.recv().await {
            Ok(message) if message.topic() == Some(topics::ORDER_REQUESTS) => {
                match message.decode::<OrderRequest>() {
                    Ok(order) => info!(
                        order_id = %order.order_id,
                        strategy_id = %order.strategy_id,
                        symbol = %order.symbol,
                        action = %order.action,
                        quantity = %order.quantity,
                        "Order request published"
                    ),
                    Err(e) => warn!(error = %e, "Undecodable order request"),
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Order log lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
