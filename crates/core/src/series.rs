//! Immutable day-ahead price series.
//!
//! A series is validated once on construction (strictly increasing
//! timestamps at a fixed step, finite prices) and never mutated after;
//! a refresh builds a new series and swaps it in wholesale.

use chrono::{DateTime, Duration, Utc};
use spotplug_types::{PriceSample, PriceSummary};

/// Step used when it cannot be inferred from the samples (15 minutes).
pub const DEFAULT_STEP_MINUTES: i64 = 15;

/// Reasons a set of samples cannot form a series.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("Timestamp {at} does not follow the previous sample")]
    NonIncreasingTimestamp { at: DateTime<Utc> },

    #[error("Irregular step at {at}: expected {expected_secs}s, got {actual_secs}s")]
    IrregularStep {
        at: DateTime<Utc>,
        expected_secs: i64,
        actual_secs: i64,
    },

    #[error("Price at {at} is not a finite number")]
    NonFinitePrice { at: DateTime<Utc> },

    #[error("Step must be positive")]
    NonPositiveStep,
}

/// Ordered price samples at a fixed step, with a cached summary.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    samples: Vec<PriceSample>,
    step: Duration,
    summary: Option<PriceSummary>,
}

impl PriceSeries {
    /// Build a series, inferring the step from the first two samples.
    pub fn new(samples: Vec<PriceSample>) -> Result<Self, SeriesError> {
        let step = match samples.as_slice() {
            [first, second, ..] => second.timestamp - first.timestamp,
            _ => Duration::minutes(DEFAULT_STEP_MINUTES),
        };
        Self::with_step(samples, step)
    }

    /// Build a series with an explicit step.
    pub fn with_step(samples: Vec<PriceSample>, step: Duration) -> Result<Self, SeriesError> {
        if step <= Duration::zero() {
            return Err(SeriesError::NonPositiveStep);
        }

        for sample in &samples {
            if !sample.price.is_finite() {
                return Err(SeriesError::NonFinitePrice {
                    at: sample.timestamp,
                });
            }
        }

        for pair in samples.windows(2) {
            let gap = pair[1].timestamp - pair[0].timestamp;
            if gap <= Duration::zero() {
                return Err(SeriesError::NonIncreasingTimestamp {
                    at: pair[1].timestamp,
                });
            }
            if gap != step {
                return Err(SeriesError::IrregularStep {
                    at: pair[1].timestamp,
                    expected_secs: step.num_seconds(),
                    actual_secs: gap.num_seconds(),
                });
            }
        }

        let prices: Vec<f64> = samples.iter().map(|s| s.price).collect();
        let summary = PriceSummary::from_prices(&prices);

        Ok(Self {
            samples,
            step,
            summary,
        })
    }

    /// A series with no samples. Schedules computed from it are empty.
    pub fn empty() -> Self {
        Self {
            samples: Vec::new(),
            step: Duration::minutes(DEFAULT_STEP_MINUTES),
            summary: None,
        }
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Median over all samples, `None` when empty.
    pub fn median(&self) -> Option<f64> {
        self.summary.map(|s| s.median)
    }

    pub fn summary(&self) -> Option<PriceSummary> {
        self.summary
    }

    /// First covered instant.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// First instant after the last sample's interval.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| self.interval_end(s))
    }

    /// End of the interval `sample` covers, saturating at the latest
    /// representable instant.
    pub fn interval_end(&self, sample: &PriceSample) -> DateTime<Utc> {
        sample
            .timestamp
            .checked_add_signed(self.step)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Price of the sample whose `[timestamp, timestamp + step)` contains `at`.
    pub fn price_at(&self, at: DateTime<Utc>) -> Option<f64> {
        let idx = self.samples.partition_point(|s| s.timestamp <= at);
        let sample = self.samples.get(idx.checked_sub(1)?)?;
        (at < self.interval_end(sample)).then_some(sample.price)
    }

    /// The tail of the series whose intervals end after `cutoff`.
    pub fn since(&self, cutoff: DateTime<Utc>) -> PriceSeries {
        let samples: Vec<PriceSample> = self
            .samples
            .iter()
            .filter(|s| self.interval_end(s) > cutoff)
            .copied()
            .collect();
        let prices: Vec<f64> = samples.iter().map(|s| s.price).collect();

        PriceSeries {
            summary: PriceSummary::from_prices(&prices),
            samples,
            step: self.step,
        }
    }
}

impl Default for PriceSeries {
    fn default() -> Self {
        Self::empty()
    }
}
