//! Read-only status records exposed to dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::price::{PriceSample, PriceSummary};
use crate::schedule::{OverrideMode, ThresholdRule, Timeframe};

/// The user-controlled part of a device: what the registry persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique device name
    pub name: String,

    /// Network address of the plug
    pub address: String,

    pub rule: ThresholdRule,

    #[serde(default)]
    pub override_mode: OverrideMode,
}

/// Per-device scheduling status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    pub address: String,
    pub rule: ThresholdRule,
    pub override_mode: OverrideMode,

    /// Cheap-price windows computed under `rule`
    pub timeframes: Vec<Timeframe>,

    /// Whether the device should be powered right now
    pub desired_on: bool,

    /// Result of the latest liveness probe
    pub reachable: bool,

    /// Power state observed by the latest probe, if it succeeded
    pub powered: Option<bool>,
}

/// A window of price samples with their summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceView {
    pub samples: Vec<PriceSample>,
    pub summary: Option<PriceSummary>,
}

/// Consistent point-in-time view of the whole scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// When this snapshot was taken
    pub generated_at: DateTime<Utc>,

    pub devices: Vec<DeviceStatus>,

    /// Summary over the full price series used for scheduling
    pub series_summary: Option<PriceSummary>,

    /// Recent and upcoming prices (from three hours ago onward)
    pub recent_prices: PriceView,

    /// Price of the sample covering `generated_at`, if any
    pub current_price: Option<f64>,

    /// Time of the last successful price refresh
    pub last_refresh: Option<DateTime<Utc>>,

    /// Whether the price series is older than the staleness limit
    pub prices_stale: bool,
}
