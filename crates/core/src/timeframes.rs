//! Cheap-price timeframe selection.
//!
//! Samples at or below a device's price ceiling are merged into contiguous
//! `[start, end)` timeframes. The computation is pure, so re-running it on
//! the same series and rule always yields the same schedule.

use chrono::Duration;
use tracing::debug;

use spotplug_types::{ThresholdRule, Timeframe};

use crate::series::PriceSeries;

/// The price ceiling `rule` yields on `series`. `None` for an empty series.
pub fn effective_ceiling(series: &PriceSeries, rule: &ThresholdRule) -> Option<f64> {
    series.median().map(|median| rule.ceiling(median))
}

/// Compute every timeframe where the price is at or below the rule's ceiling.
pub fn compute_timeframes(series: &PriceSeries, rule: &ThresholdRule) -> Vec<Timeframe> {
    compute_timeframes_with_min_duration(series, rule, Duration::zero())
}

/// Like [`compute_timeframes`], dropping timeframes shorter than `min_duration`.
pub fn compute_timeframes_with_min_duration(
    series: &PriceSeries,
    rule: &ThresholdRule,
    min_duration: Duration,
) -> Vec<Timeframe> {
    let Some(ceiling) = effective_ceiling(series, rule) else {
        return Vec::new();
    };

    let samples = series.samples();
    let mut timeframes = Vec::new();
    let mut i = 0;

    while i < samples.len() {
        if samples[i].price > ceiling {
            i += 1;
            continue;
        }

        let run_start = i;
        while i < samples.len() && samples[i].price <= ceiling {
            i += 1;
        }
        let run = &samples[run_start..i];

        let start = run[0].timestamp;
        let end = series.interval_end(&run[run.len() - 1]);
        let duration = end - start;

        if duration < min_duration {
            debug!(
                "Skipping timeframe {} - {} ({}min shorter than minimum)",
                start.format("%H:%M"),
                end.format("%H:%M"),
                duration.num_minutes()
            );
            continue;
        }

        timeframes.push(Timeframe {
            start,
            end,
            avg_price: run.iter().map(|s| s.price).sum::<f64>() / run.len() as f64,
            duration_minutes: duration.num_minutes(),
        });
    }

    debug!(
        "Found {} timeframes at ceiling {:.2} c/kWh ({})",
        timeframes.len(),
        ceiling,
        rule
    );

    timeframes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::tests::{make_series, t0};
    use chrono::{DateTime, Utc};
    use spotplug_types::PriceSample;

    #[test]
    fn test_merges_adjacent_and_splits_on_gap() {
        let series = make_series(&[10.0, 10.0, 50.0, 10.0, 10.0]);
        let rule = ThresholdRule::fixed(20.0).unwrap();

        let frames = compute_timeframes(&series, &rule);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].start, t0());
        assert_eq!(frames[0].end, t0() + Duration::minutes(30));
        assert_eq!(frames[1].start, t0() + Duration::minutes(45));
        assert_eq!(frames[1].end, t0() + Duration::minutes(75));
        assert_eq!(frames[1].duration_minutes, 30);
    }

    #[test]
    fn test_all_qualify_gives_single_span() {
        let series = make_series(&[3.0, 9.0, 1.0, 7.0]);
        let rule = ThresholdRule::fixed(9.0).unwrap();

        let frames = compute_timeframes(&series, &rule);

        assert_eq!(frames.len(), 1);
        assert_eq!(Some(frames[0].start), series.start());
        assert_eq!(Some(frames[0].end), series.end());
        assert!((frames[0].avg_price - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_none_qualify() {
        let series = make_series(&[30.0, 40.0, 35.0]);
        let rule = ThresholdRule::fixed(29.99).unwrap();

        assert!(compute_timeframes(&series, &rule).is_empty());
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let series = make_series(&[20.0, 21.0]);
        let rule = ThresholdRule::fixed(20.0).unwrap();

        let frames = compute_timeframes(&series, &rule);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].end, t0() + Duration::minutes(15));
    }

    #[test]
    fn test_empty_series_gives_empty_schedule() {
        let rule = ThresholdRule::default();
        assert!(compute_timeframes(&PriceSeries::empty(), &rule).is_empty());
    }

    #[test]
    fn test_multiplier_matches_equivalent_fixed() {
        // median of [20, 40, 40, 70, 90] is 40
        let series = make_series(&[20.0, 70.0, 40.0, 90.0, 40.0]);
        assert!((series.median().unwrap() - 40.0).abs() < 1e-9);

        let relative = compute_timeframes(&series, &ThresholdRule::multiplier(1.5).unwrap());
        let fixed = compute_timeframes(&series, &ThresholdRule::fixed(60.0).unwrap());

        assert_eq!(relative, fixed);
        assert_eq!(relative.len(), 3);
    }

    #[test]
    fn test_is_deterministic() {
        let series = make_series(&[5.0, 12.0, 4.0, 4.0, 30.0, 2.0]);
        let rule = ThresholdRule::multiplier(1.0).unwrap();

        assert_eq!(
            compute_timeframes(&series, &rule),
            compute_timeframes(&series, &rule)
        );
    }

    #[test]
    fn test_min_duration_filters_short_runs() {
        let series = make_series(&[1.0, 50.0, 1.0, 1.0, 50.0]);
        let rule = ThresholdRule::fixed(10.0).unwrap();

        let frames =
            compute_timeframes_with_min_duration(&series, &rule, Duration::minutes(30));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].start, t0() + Duration::minutes(30));
    }

    #[test]
    fn test_negative_prices_qualify() {
        let series = make_series(&[-5.0, -1.0, 8.0]);
        let rule = ThresholdRule::fixed(0.5).unwrap();

        let frames = compute_timeframes(&series, &rule);

        assert_eq!(frames.len(), 1);
        assert!((frames[0].avg_price + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_at_end_of_time() {
        let last = DateTime::<Utc>::MAX_UTC - Duration::minutes(10);
        let series = PriceSeries::new(vec![
            PriceSample::new(last - Duration::minutes(15), 10.0),
            PriceSample::new(last, 10.0),
        ])
        .unwrap();

        let frames = compute_timeframes(&series, &ThresholdRule::fixed(20.0).unwrap());

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].end, DateTime::<Utc>::MAX_UTC);
    }
}
