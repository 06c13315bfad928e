//! Price data types shared between the scheduler and its status consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single day-ahead price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Start of the interval this price applies to
    pub timestamp: DateTime<Utc>,

    /// Price in cents per kWh (may be negative)
    pub price: f64,
}

impl PriceSample {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Summary statistics over a set of price samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Number of samples summarised
    pub count: usize,

    pub min: f64,
    pub max: f64,
    pub mean: f64,

    /// Median price; the mean of the two middle values for an even count
    pub median: f64,
}

impl PriceSummary {
    /// Summarise a slice of prices. Returns `None` for an empty slice.
    pub fn from_prices(prices: &[f64]) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }

        let mut sorted = prices.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean: sorted.iter().sum::<f64>() / count as f64,
            median,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_even_count() {
        let summary = PriceSummary::from_prices(&[8.0, 2.0, 6.0, 4.0]).unwrap();

        assert_eq!(summary.count, 4);
        assert!((summary.min - 2.0).abs() < 1e-9);
        assert!((summary.max - 8.0).abs() < 1e-9);
        assert!((summary.mean - 5.0).abs() < 1e-9);
        assert!((summary.median - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_odd_count() {
        let summary = PriceSummary::from_prices(&[5.0, 1.0, 3.0]).unwrap();
        assert!((summary.median - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_empty() {
        assert!(PriceSummary::from_prices(&[]).is_none());
    }

    #[test]
    fn test_sample_json_shape() {
        let sample = PriceSample::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap(), 12.5);
        let json = serde_json::to_value(sample).unwrap();

        assert_eq!(json["price"], 12.5);
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
    }
}
