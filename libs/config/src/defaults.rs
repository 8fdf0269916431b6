//! Engine configuration defaults
//!
//! Default values used when a configuration file omits a field. Every field
//! of [`crate::EngineConfig`] falls back to one of these.

/// Execution engine defaults
pub mod engine {
    /// Maximum order requests being published at once
    pub const MAX_CONCURRENT_ORDERS: usize = 10;

    /// Minimum interval between accepted signals for one (strategy, symbol) pair (milliseconds)
    pub const SIGNAL_TIMEOUT_MS: u64 = 5_000;

    /// Active strategies with no update for this long are stopped (seconds)
    pub const INACTIVITY_TIMEOUT_SECS: u64 = 300;

    /// Interval between restart sweeps over failed strategies (seconds)
    pub const RESTART_INTERVAL_SECS: u64 = 300;

    /// Interval between inactivity scans (seconds)
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;

    /// Pause between recovering a failed strategy and starting it again (milliseconds)
    pub const RESTART_PAUSE_MS: u64 = 1_000;

    /// Capacity of the strategy-to-processor signal pipeline
    pub const PIPELINE_CAPACITY: usize = 1_024;
}

/// Built-in filter defaults
pub mod filters {
    /// Exchange session offset from UTC (+05:30)
    pub const SESSION_UTC_OFFSET_MINUTES: i32 = 330;

    pub const SESSION_OPEN: &str = "09:15";

    pub const SESSION_CLOSE: &str = "15:30";

    pub const TRADING_DAYS: [&str; 5] = ["Mon", "Tue", "Wed", "Thu", "Fri"];

    /// Signals with ATR above this percentage of price are rejected
    pub const MAX_ATR_PERCENT: f64 = 3.0;

    /// Minimum interval between signals for one pair in the frequency gate (milliseconds)
    pub const MIN_SIGNAL_INTERVAL_MS: u64 = 60_000;
}

/// Indicator rule defaults
pub mod rules {
    pub const OVERSOLD_THRESHOLD: f64 = 30.0;

    pub const OVERBOUGHT_THRESHOLD: f64 = 70.0;

    pub const STOP_LOSS_ATR_MULTIPLIER: f64 = 2.0;

    pub const TAKE_PROFIT_ATR_MULTIPLIER: f64 = 3.0;

    pub const DEFAULT_QUANTITY: f64 = 1.0;
}
