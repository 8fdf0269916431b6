//! Strategy metrics collection

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe execution counters for one strategy
///
/// `execution_count >= success_count + failure_count` holds for every
/// [`ExecutionCounters::snapshot`], even while other tasks are recording:
/// executions are counted before their outcome, and snapshots read outcomes
/// before executions.
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    executions: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    last_execution_ns: AtomicU64,
}

/// Point-in-time copy of [`ExecutionCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_execution_ns: u64,
}

impl ExecutionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&self, timestamp_ns: u64) {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.last_execution_ns.store(timestamp_ns, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let success_count = self.successes.load(Ordering::SeqCst);
        let failure_count = self.failures.load(Ordering::SeqCst);
        let execution_count = self.executions.load(Ordering::SeqCst);
        CounterSnapshot {
            execution_count,
            success_count,
            failure_count,
            last_execution_ns: self.last_execution_ns.load(Ordering::Relaxed),
        }
    }
}

/// Cumulative P&L, peak equity and maximum drawdown
///
/// Drawdown is `(peak - equity) / peak` as a fraction, only defined once peak
/// equity is positive. Peak and maximum drawdown never decrease.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceTracker {
    total_pnl: Decimal,
    peak_equity: Decimal,
    max_drawdown: Decimal,
    current_equity: Decimal,
    updates: u64,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, pnl: Decimal, equity: Decimal) {
        self.total_pnl = self.total_pnl.saturating_add(pnl);
        self.current_equity = equity;
        self.updates += 1;

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }

        if self.peak_equity > Decimal::ZERO {
            let drawdown = self
                .peak_equity
                .saturating_sub(equity)
                .checked_div(self.peak_equity)
                .unwrap_or(Decimal::ZERO);
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    pub fn current_equity(&self) -> Decimal {
        self.current_equity
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}
