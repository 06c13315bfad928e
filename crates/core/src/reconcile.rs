//! Per-device schedule state and the override/timeframe reconciliation.

use chrono::{DateTime, Utc};

use spotplug_types::{OverrideMode, ThresholdRule, Timeframe};

use crate::series::PriceSeries;
use crate::timeframes::compute_timeframes;

/// Scheduling state of one device.
///
/// The threshold rule and the timeframes derived from it are private and
/// only change together, so a reader never sees timeframes computed under
/// a rule other than the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceScheduleState {
    device_id: String,
    rule: ThresholdRule,
    timeframes: Vec<Timeframe>,

    pub override_mode: OverrideMode,

    /// Result of the latest liveness probe. Informational only.
    pub reachable: bool,

    desired_on: bool,
}

impl DeviceScheduleState {
    /// New state in `Auto` mode with timeframes computed from `series`.
    pub fn new(device_id: impl Into<String>, rule: ThresholdRule, series: &PriceSeries) -> Self {
        Self {
            device_id: device_id.into(),
            timeframes: compute_timeframes(series, &rule),
            rule,
            override_mode: OverrideMode::Auto,
            reachable: false,
            desired_on: false,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn rule(&self) -> ThresholdRule {
        self.rule
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Desired power state as of the last [`reconcile_at`](Self::reconcile_at).
    pub fn desired_on(&self) -> bool {
        self.desired_on
    }

    /// Replace the rule and recompute the timeframes in one step.
    pub fn set_rule(&mut self, rule: ThresholdRule, series: &PriceSeries) {
        self.timeframes = compute_timeframes(series, &rule);
        self.rule = rule;
    }

    /// Recompute the timeframes after the price series was replaced.
    pub fn refresh(&mut self, series: &PriceSeries) {
        self.timeframes = compute_timeframes(series, &self.rule);
    }

    /// Re-derive and store the desired state for `now`.
    pub fn reconcile_at(&mut self, now: DateTime<Utc>) -> bool {
        self.desired_on = reconcile(now, self);
        self.desired_on
    }
}

/// Whether `now` lies in any of the half-open timeframes.
pub fn in_timeframes(now: DateTime<Utc>, timeframes: &[Timeframe]) -> bool {
    timeframes.iter().any(|frame| frame.contains(now))
}

/// Fold the override mode into the timeframe decision.
///
/// Reachability never influences the result.
pub fn reconcile(now: DateTime<Utc>, state: &DeviceScheduleState) -> bool {
    match state.override_mode {
        OverrideMode::ForcedOn => true,
        OverrideMode::ForcedOff => false,
        OverrideMode::Auto => in_timeframes(now, &state.timeframes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::tests::{make_series, t0};
    use chrono::Duration;

    fn make_state() -> DeviceScheduleState {
        // One timeframe: [t0, t0+30m)
        let series = make_series(&[10.0, 10.0, 50.0, 50.0]);
        DeviceScheduleState::new("heater", ThresholdRule::fixed(20.0).unwrap(), &series)
    }

    #[test]
    fn test_auto_follows_half_open_timeframe() {
        let state = make_state();

        assert!(reconcile(t0(), &state));
        assert!(reconcile(t0() + Duration::seconds(1799), &state));
        assert!(!reconcile(t0() + Duration::minutes(30), &state));
        assert!(!reconcile(t0() - Duration::milliseconds(1), &state));
    }

    #[test]
    fn test_auto_uses_sub_sample_precision() {
        let state = make_state();
        let just_before_end = t0() + Duration::minutes(30) - Duration::nanoseconds(1);

        assert!(reconcile(just_before_end, &state));
    }

    #[test]
    fn test_forced_on_ignores_timeframes() {
        let mut state = make_state();
        state.override_mode = OverrideMode::ForcedOn;

        assert!(reconcile(t0() + Duration::hours(5), &state));
    }

    #[test]
    fn test_forced_off_ignores_timeframes() {
        let mut state = make_state();
        state.override_mode = OverrideMode::ForcedOff;

        assert!(!reconcile(t0(), &state));
    }

    #[test]
    fn test_reachability_does_not_change_decision() {
        let mut state = make_state();
        let times = [t0(), t0() + Duration::minutes(40)];

        for mode in [OverrideMode::Auto, OverrideMode::ForcedOn, OverrideMode::ForcedOff] {
            state.override_mode = mode;
            for now in times {
                state.reachable = true;
                let reachable = reconcile(now, &state);
                state.reachable = false;
                assert_eq!(reconcile(now, &state), reachable, "{mode} at {now}");
            }
        }
    }

    #[test]
    fn test_set_rule_recomputes_timeframes() {
        let series = make_series(&[10.0, 10.0, 50.0, 50.0]);
        let mut state = make_state();
        let late = t0() + Duration::minutes(40);
        assert!(!reconcile(late, &state));

        state.set_rule(ThresholdRule::fixed(60.0).unwrap(), &series);

        assert_eq!(state.timeframes().len(), 1);
        assert_eq!(state.timeframes()[0].end, t0() + Duration::minutes(60));
        assert!(reconcile(late, &state));
    }

    #[test]
    fn test_refresh_with_empty_series_fails_closed() {
        let mut state = make_state();
        state.refresh(&PriceSeries::empty());

        assert!(state.timeframes().is_empty());
        assert!(!state.reconcile_at(t0()));
    }

    #[test]
    fn test_reconcile_at_stores_result() {
        let mut state = make_state();
        assert!(!state.desired_on());

        assert!(state.reconcile_at(t0()));
        assert!(state.desired_on());
    }
}
