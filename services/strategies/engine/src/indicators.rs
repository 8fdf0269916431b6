//! Technical indicators computed from candle closes

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Simple Moving Average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    period: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl MovingAverage {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        }
    }

    /// Add a new value and return current MA
    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }

        self.current()
    }

    /// Get current moving average without adding new value
    pub fn current(&self) -> Option<Decimal> {
        if self.is_ready() {
            Some(self.sum / Decimal::from(self.period))
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.values.len() == self.period
    }
}

/// Population standard deviation over a rolling window
#[derive(Debug, Clone)]
pub struct Volatility {
    period: usize,
    values: VecDeque<Decimal>,
}

impl Volatility {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            values: VecDeque::with_capacity(period),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.values.push_back(value);

        if self.values.len() > self.period {
            self.values.pop_front();
        }

        if self.values.len() == self.period {
            self.calculate_std_dev()
        } else {
            None
        }
    }

    fn calculate_std_dev(&self) -> Option<Decimal> {
        let n = Decimal::from(self.values.len());
        let mean = self.values.iter().sum::<Decimal>() / n;

        let variance = self
            .values
            .iter()
            .map(|&x| {
                let diff = x - mean;
                diff * diff
            })
            .sum::<Decimal>()
            / n;

        // Decimal has no sqrt; f64 precision is ample for band placement
        let std_dev = variance.to_f64()?.sqrt();
        Decimal::try_from(std_dev).ok()
    }
}

/// Wilder's Relative Strength Index
///
/// Seeds with the simple average of the first `period` changes, then applies
/// Wilder smoothing. Returns 100 when there have been no losses.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    previous: Option<Decimal>,
    seed_gains: Decimal,
    seed_losses: Decimal,
    seed_count: usize,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            previous: None,
            seed_gains: Decimal::ZERO,
            seed_losses: Decimal::ZERO,
            seed_count: 0,
            avg_gain: None,
            avg_loss: None,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        let previous = self.previous.replace(close)?;

        let change = close - previous;
        let gain = change.max(Decimal::ZERO);
        let loss = (-change).max(Decimal::ZERO);
        let n = Decimal::from(self.period);

        match (self.avg_gain, self.avg_loss) {
            (Some(avg_gain), Some(avg_loss)) => {
                let avg_gain = (avg_gain * (n - Decimal::ONE) + gain) / n;
                let avg_loss = (avg_loss * (n - Decimal::ONE) + loss) / n;
                self.avg_gain = Some(avg_gain);
                self.avg_loss = Some(avg_loss);
            }
            _ => {
                self.seed_gains += gain;
                self.seed_losses += loss;
                self.seed_count += 1;
                if self.seed_count < self.period {
                    return None;
                }
                self.avg_gain = Some(self.seed_gains / n);
                self.avg_loss = Some(self.seed_losses / n);
            }
        }

        self.current()
    }

    pub fn current(&self) -> Option<Decimal> {
        let (avg_gain, avg_loss) = (self.avg_gain?, self.avg_loss?);
        let hundred = Decimal::ONE_HUNDRED;
        if avg_loss.is_zero() {
            return Some(hundred);
        }
        let rs = avg_gain / avg_loss;
        Some(hundred - hundred / (Decimal::ONE + rs))
    }
}

/// Bollinger bands: moving average plus/minus a multiple of the standard deviation
#[derive(Debug, Clone)]
pub struct BollingerBands {
    average: MovingAverage,
    deviation: Volatility,
    multiplier: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: Decimal,
    pub middle: Decimal,
    pub upper: Decimal,
}

impl BollingerBands {
    pub fn new(period: usize, multiplier: Decimal) -> Self {
        Self {
            average: MovingAverage::new(period),
            deviation: Volatility::new(period),
            multiplier,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Bands> {
        let middle = self.average.update(close);
        let std_dev = self.deviation.update(close);
        let (middle, std_dev) = (middle?, std_dev?);
        let width = std_dev * self.multiplier;
        Some(Bands {
            lower: middle - width,
            middle,
            upper: middle + width,
        })
    }
}

/// Relative position of a fast series against a slow one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Above,
    Below,
    Equal,
}

/// Crossing edge observed between two consecutive relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Bullish,
    Bearish,
}

impl Relation {
    pub fn of(fast: Decimal, slow: Decimal) -> Self {
        if fast > slow {
            Relation::Above
        } else if fast < slow {
            Relation::Below
        } else {
            Relation::Equal
        }
    }
}

/// Remembers the last strict relation and reports edges only
///
/// `Equal` readings are ignored so a touch does not count as a cross.
#[derive(Debug, Clone, Default)]
pub struct CrossDetector {
    last: Option<Relation>,
}

impl CrossDetector {
    pub fn update(&mut self, relation: Relation) -> Option<Cross> {
        if relation == Relation::Equal {
            return None;
        }
        let previous = self.last.replace(relation);
        match (previous, relation) {
            (Some(Relation::Below), Relation::Above) => Some(Cross::Bullish),
            (Some(Relation::Above), Relation::Below) => Some(Cross::Bearish),
            _ => None,
        }
    }
}
