//! Wire-format types for the spotplug scheduler.
//!
//! These records are shared by the scheduling engine, the service binary
//! and any dashboard consuming the status feed. They carry no behaviour
//! beyond validated construction and small helpers.

pub mod event;
pub mod price;
pub mod schedule;
pub mod status;

pub use event::{ClientCommand, SchedulerEvent};
pub use price::{PriceSample, PriceSummary};
pub use schedule::{
    OverrideMode, RuleError, ThresholdKind, ThresholdRule, Timeframe, DEFAULT_THRESHOLD_MULTIPLIER,
};
pub use status::{DeviceRecord, DeviceStatus, PriceView, StatusSnapshot};
