//! Scheduling policy types: threshold rules, override modes and timeframes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Multiplier applied to the median price when a device has no rule of its own.
pub const DEFAULT_THRESHOLD_MULTIPLIER: f64 = 1.5;

/// How a threshold value is turned into a price ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    /// The value is an absolute ceiling in cents per kWh
    Fixed,

    /// The ceiling is the value times the median price of the series
    Multiplier,
}

impl std::fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdKind::Fixed => write!(f, "fixed"),
            ThresholdKind::Multiplier => write!(f, "multiplier"),
        }
    }
}

/// Rejected threshold rule values.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Threshold must be positive, got {0}")]
    NonPositiveValue(f64),

    #[error("Threshold must be a finite number")]
    NonFiniteValue,
}

/// Per-device price ceiling policy.
///
/// Construction is validated: the value is always finite and strictly
/// positive, so a rule that reaches the timeframe calculator never needs
/// re-checking. Deserialization goes through the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholdRule")]
pub struct ThresholdRule {
    #[serde(rename = "type")]
    kind: ThresholdKind,
    value: f64,
}

#[derive(Deserialize)]
struct RawThresholdRule {
    #[serde(rename = "type")]
    kind: ThresholdKind,
    value: f64,
}

impl TryFrom<RawThresholdRule> for ThresholdRule {
    type Error = RuleError;

    fn try_from(raw: RawThresholdRule) -> Result<Self, Self::Error> {
        ThresholdRule::new(raw.kind, raw.value)
    }
}

impl ThresholdRule {
    pub fn new(kind: ThresholdKind, value: f64) -> Result<Self, RuleError> {
        if !value.is_finite() {
            return Err(RuleError::NonFiniteValue);
        }
        if value <= 0.0 {
            return Err(RuleError::NonPositiveValue(value));
        }
        Ok(Self { kind, value })
    }

    pub fn fixed(value: f64) -> Result<Self, RuleError> {
        Self::new(ThresholdKind::Fixed, value)
    }

    pub fn multiplier(value: f64) -> Result<Self, RuleError> {
        Self::new(ThresholdKind::Multiplier, value)
    }

    pub fn kind(&self) -> ThresholdKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// The price ceiling this rule yields for a series with the given median.
    pub fn ceiling(&self, median: f64) -> f64 {
        match self.kind {
            ThresholdKind::Fixed => self.value,
            ThresholdKind::Multiplier => self.value * median,
        }
    }
}

impl Default for ThresholdRule {
    fn default() -> Self {
        Self {
            kind: ThresholdKind::Multiplier,
            value: DEFAULT_THRESHOLD_MULTIPLIER,
        }
    }
}

impl std::fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ThresholdKind::Fixed => write!(f, "fixed {:.2} c/kWh", self.value),
            ThresholdKind::Multiplier => write!(f, "{:.2}x median", self.value),
        }
    }
}

/// Manual override of the automatic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OverrideMode {
    /// Follow the price timeframes
    #[default]
    #[serde(rename = "auto")]
    Auto,

    /// Keep the device on regardless of price
    #[serde(rename = "on")]
    ForcedOn,

    /// Keep the device off regardless of price
    #[serde(rename = "off")]
    ForcedOff,
}

impl std::fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideMode::Auto => write!(f, "auto"),
            OverrideMode::ForcedOn => write!(f, "on"),
            OverrideMode::ForcedOff => write!(f, "off"),
        }
    }
}

/// A half-open `[start, end)` interval during which a device should run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    /// First instant inside the timeframe
    pub start: DateTime<Utc>,

    /// First instant after the timeframe
    pub end: DateTime<Utc>,

    /// Mean price of the samples merged into this timeframe
    pub avg_price: f64,

    /// Length of the timeframe in minutes
    pub duration_minutes: i64,
}

impl Timeframe {
    /// Whether `now` lies inside `[start, end)`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}
