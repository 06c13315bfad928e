//! Price-threshold scheduling engine for smart plugs.
//!
//! Turns a day-ahead spot-price series into per-device on/off decisions:
//!
//! - [`PriceSeries`] holds validated samples and their median
//! - [`compute_timeframes`] selects the cheap windows under a [`ThresholdRule`]
//! - [`reconcile`] folds the manual [`OverrideMode`] into the decision
//! - [`ScheduleStore`] keeps the device registry and per-device state
//! - [`Scheduler`] drives price refreshes and reconciliation ticks
//!
//! [`ThresholdRule`]: spotplug_types::ThresholdRule
//! [`OverrideMode`]: spotplug_types::OverrideMode

pub mod device;
pub mod elering;
pub mod reconcile;
pub mod scheduler;
pub mod series;
pub mod store;
pub mod timeframes;

pub use device::{ActuationPolicy, DeviceClient, DeviceError, DryRunClient};
pub use elering::{EleringClient, PriceSource, PriceSourceError, DEFAULT_AREA, ELERING_URL};
pub use reconcile::{in_timeframes, reconcile, DeviceScheduleState};
pub use scheduler::{Scheduler, SchedulerConfig, DEFAULT_STALE_AFTER_SECS};
pub use series::{PriceSeries, SeriesError, DEFAULT_STEP_MINUTES};
pub use store::{
    DeviceEntry, Observation, RegistryError, ScheduleStore, TickOutcome, RECENT_PRICE_HOURS,
};
pub use timeframes::{compute_timeframes, compute_timeframes_with_min_duration, effective_ceiling};
