//! Testing utilities for strategies

use crate::StrategyLogic;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use torq_types::{CandleData, IndicatorSet, Signal, StrategyConfiguration};

/// Scripted behaviour and call counts shared between a [`MockStrategy`] and the test
#[derive(Debug, Default)]
pub struct MockControl {
    fail_initialize: AtomicBool,
    panic_on_start: AtomicBool,
    fail_stop: AtomicBool,
    fail_callbacks: AtomicBool,
    /// Remaining start calls that fail
    start_failures: AtomicU32,
    validation_error: Mutex<Option<String>>,
    queued_signals: Mutex<Vec<Signal>>,

    pub initialize_calls: AtomicU32,
    pub start_calls: AtomicU32,
    pub stop_calls: AtomicU32,
    pub candle_calls: AtomicU32,
    pub indicator_calls: AtomicU32,
}

impl MockControl {
    pub fn fail_initialize(&self) {
        self.fail_initialize.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_start(&self) {
        self.panic_on_start.store(true, Ordering::SeqCst);
    }

    /// Fail the next `count` start calls
    pub fn fail_starts(&self, count: u32) {
        self.start_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn fail_callbacks(&self, fail: bool) {
        self.fail_callbacks.store(fail, Ordering::SeqCst);
    }

    pub fn reject_configuration(&self, reason: impl Into<String>) {
        *self.validation_error.lock() = Some(reason.into());
    }

    /// Signals returned (once) by the next candle or indicator callback
    pub fn queue_signals(&self, signals: Vec<Signal>) {
        self.queued_signals.lock().extend(signals);
    }

    pub fn calls(&self, counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn take_signals(&self) -> Vec<Signal> {
        std::mem::take(&mut *self.queued_signals.lock())
    }
}

/// Mock strategy for testing
pub struct MockStrategy {
    pub name: String,
    pub started: bool,
    control: Arc<MockControl>,
}

impl MockStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: false,
            control: Arc::new(MockControl::default()),
        }
    }

    /// Handle for scripting behaviour after the strategy has been boxed
    pub fn control(&self) -> Arc<MockControl> {
        Arc::clone(&self.control)
    }
}

#[async_trait::async_trait]
impl StrategyLogic for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _config: &StrategyConfiguration) -> std::result::Result<(), String> {
        match self.control.validation_error.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    async fn initialize(&mut self, _config: &StrategyConfiguration) -> Result<()> {
        self.control.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_initialize.load(Ordering::SeqCst) {
            bail!("mock initialize failure");
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.control.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.panic_on_start.load(Ordering::SeqCst) {
            panic!("mock start panic");
        }
        let remaining = self.control.start_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.control
                .start_failures
                .store(remaining - 1, Ordering::SeqCst);
            bail!("mock start failure");
        }
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.control.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_stop.load(Ordering::SeqCst) {
            bail!("mock stop failure");
        }
        self.started = false;
        Ok(())
    }

    async fn on_candle(&mut self, _candle: &CandleData) -> Result<Vec<Signal>> {
        self.control.candle_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_callbacks.load(Ordering::SeqCst) {
            bail!("mock candle failure");
        }
        Ok(self.control.take_signals())
    }

    async fn on_indicators(&mut self, _indicators: &IndicatorSet) -> Result<Vec<Signal>> {
        self.control.indicator_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_callbacks.load(Ordering::SeqCst) {
            bail!("mock indicator failure");
        }
        Ok(self.control.take_signals())
    }
}
