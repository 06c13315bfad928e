//! Device registry and per-device scheduling state.
//!
//! All state lives behind one `RwLock` that is never held across an
//! `.await` on I/O. Writers replace rule and timeframes together, and
//! readers get cloned snapshots, so no caller observes a half-applied
//! update. The price series is shared as an `Arc` and swapped wholesale.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use spotplug_types::{
    DeviceRecord, DeviceStatus, OverrideMode, PriceView, RuleError, StatusSnapshot, ThresholdKind,
    ThresholdRule,
};

use crate::reconcile::{reconcile, DeviceScheduleState};
use crate::series::PriceSeries;

/// How far back the status view of prices reaches.
pub const RECENT_PRICE_HOURS: i64 = 3;

/// Rejected registry mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Device not found: {0}")]
    UnknownDevice(String),

    #[error("Device with this name already exists: {0}")]
    DuplicateDevice(String),

    #[error("Device name is required")]
    EmptyName,

    #[error("Device address is required")]
    EmptyAddress,

    #[error("Invalid threshold: {0}")]
    InvalidRule(#[from] RuleError),
}

/// Registry entry for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub address: String,
    pub schedule: DeviceScheduleState,

    /// Power state seen by the latest successful probe
    pub powered: Option<bool>,

    /// Whether any probe result has been recorded yet
    pub probed: bool,
}

/// Result of probing one device during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub device: String,
    pub reachable: bool,
    pub powered: Option<bool>,
}

/// Per-device outcome of a committed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub device: String,
    pub desired_on: bool,
    pub reachable: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    series: Arc<PriceSeries>,
    devices: BTreeMap<String, DeviceEntry>,
    last_refresh: Option<DateTime<Utc>>,
    refresh_failures: u32,
    last_tick: Option<DateTime<Utc>>,
}

/// Shared scheduler state.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    state: RwLock<StoreState>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted registry records.
    pub fn from_records(records: Vec<DeviceRecord>) -> Result<Self, RegistryError> {
        let mut state = StoreState::default();
        for record in records {
            insert_device(&mut state, record)?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Registry records in name order, suitable for persisting.
    pub async fn records(&self) -> Vec<DeviceRecord> {
        let state = self.state.read().await;
        state
            .devices
            .iter()
            .map(|(name, entry)| DeviceRecord {
                name: name.clone(),
                address: entry.address.clone(),
                rule: entry.schedule.rule(),
                override_mode: entry.schedule.override_mode,
            })
            .collect()
    }

    /// The current price series snapshot.
    pub async fn series(&self) -> Arc<PriceSeries> {
        self.state.read().await.series.clone()
    }

    /// Swap in a new series and recompute every device's timeframes.
    ///
    /// Returns the number of timeframes per device.
    pub async fn replace_series(
        &self,
        series: PriceSeries,
        now: DateTime<Utc>,
    ) -> Vec<(String, usize)> {
        let mut state = self.state.write().await;
        let counts = install_series(&mut state, series);
        state.last_refresh = Some(now);
        state.refresh_failures = 0;
        counts
    }

    /// Drop the current series so every device's timeframes are empty.
    ///
    /// The last refresh time is left alone; a cleared series is not a
    /// successful refresh.
    pub async fn clear_series(&self) -> Vec<(String, usize)> {
        let mut state = self.state.write().await;
        install_series(&mut state, PriceSeries::empty())
    }

    /// Note a failed refresh; returns the consecutive failure count.
    pub async fn record_refresh_failure(&self) -> u32 {
        let mut state = self.state.write().await;
        state.refresh_failures += 1;
        state.refresh_failures
    }

    /// Last successful refresh and the failures since.
    pub async fn refresh_health(&self) -> (Option<DateTime<Utc>>, u32) {
        let state = self.state.read().await;
        (state.last_refresh, state.refresh_failures)
    }

    /// Whether the series is older than `max_age` (or was never loaded).
    pub async fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let state = self.state.read().await;
        is_stale(state.last_refresh, now, max_age)
    }

    pub async fn add_device(&self, record: DeviceRecord) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        insert_device(&mut state, record)
    }

    /// Update a device's address and/or threshold.
    ///
    /// A threshold change recomputes the timeframes under the same write
    /// lock. Returns `true` if the rule changed.
    pub async fn update_device(
        &self,
        name: &str,
        address: Option<String>,
        kind: Option<ThresholdKind>,
        value: Option<f64>,
    ) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let series = state.series.clone();
        let entry = state
            .devices
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))?;

        let current = entry.schedule.rule();
        let rule = ThresholdRule::new(
            kind.unwrap_or(current.kind()),
            value.unwrap_or(current.value()),
        )?;

        if let Some(address) = address.map(|a| a.trim().to_string()) {
            if !address.is_empty() {
                debug!("Updating address for {}: {}", name, address);
                entry.address = address;
            }
        }

        let changed = rule != current;
        if changed {
            entry.schedule.set_rule(rule, &series);
            info!(
                "Threshold for {} changed to {}: {} periods",
                name,
                rule,
                entry.schedule.timeframes().len()
            );
        }
        Ok(changed)
    }

    pub async fn remove_device(&self, name: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        state
            .devices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
    }

    pub async fn set_override(&self, name: &str, mode: OverrideMode) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let entry = state
            .devices
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))?;
        entry.schedule.override_mode = mode;
        Ok(())
    }

    /// Record a reachability probe outside of a tick. Returns `true` on a flip.
    pub async fn set_reachability(
        &self,
        name: &str,
        reachable: bool,
        powered: Option<bool>,
    ) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let entry = state
            .devices
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))?;
        Ok(apply_observation(name, entry, reachable, powered))
    }

    /// Snapshot of every device for a tick to work from.
    pub async fn devices(&self) -> Vec<(String, DeviceEntry)> {
        let state = self.state.read().await;
        state
            .devices
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Time of the last committed tick.
    pub async fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_tick
    }

    /// Commit the observations of a tick started at `now`.
    ///
    /// A tick older than the last committed one is discarded and `None`
    /// is returned. Desired states are derived from the state current at
    /// commit time, not from the snapshot the tick started with, so a rule
    /// or override changed mid-tick is never overwritten by stale output.
    pub async fn commit_tick(
        &self,
        now: DateTime<Utc>,
        observations: Vec<Observation>,
    ) -> Option<Vec<TickOutcome>> {
        let mut state = self.state.write().await;
        if state.last_tick.is_some_and(|last| last > now) {
            warn!("Discarding tick from {} superseded by a newer tick", now);
            return None;
        }
        state.last_tick = Some(now);

        for obs in observations {
            // Devices removed mid-tick are skipped.
            if let Some(entry) = state.devices.get_mut(&obs.device) {
                apply_observation(&obs.device, entry, obs.reachable, obs.powered);
            }
        }

        let outcomes = state
            .devices
            .iter_mut()
            .map(|(name, entry)| TickOutcome {
                device: name.clone(),
                desired_on: entry.schedule.reconcile_at(now),
                reachable: entry.schedule.reachable,
            })
            .collect();
        Some(outcomes)
    }

    /// Status of a single device.
    pub async fn device_status(&self, name: &str, now: DateTime<Utc>) -> Option<DeviceStatus> {
        let state = self.state.read().await;
        state
            .devices
            .get(name)
            .map(|entry| device_status(name, entry, now))
    }

    /// Consistent snapshot of all devices and prices.
    pub async fn status(&self, now: DateTime<Utc>, stale_after: Duration) -> StatusSnapshot {
        let state = self.state.read().await;
        let recent = state.series.since(now - Duration::hours(RECENT_PRICE_HOURS));

        StatusSnapshot {
            generated_at: now,
            devices: state
                .devices
                .iter()
                .map(|(name, entry)| device_status(name, entry, now))
                .collect(),
            series_summary: state.series.summary(),
            recent_prices: PriceView {
                summary: recent.summary(),
                samples: recent.samples().to_vec(),
            },
            current_price: state.series.price_at(now),
            last_refresh: state.last_refresh,
            prices_stale: is_stale(state.last_refresh, now, stale_after),
        }
    }
}

fn install_series(state: &mut StoreState, series: PriceSeries) -> Vec<(String, usize)> {
    let series = Arc::new(series);

    let counts = state
        .devices
        .iter_mut()
        .map(|(name, entry)| {
            entry.schedule.refresh(&series);
            let rule = entry.schedule.rule();
            info!(
                "Device {} ({}): {} periods found",
                name,
                rule,
                entry.schedule.timeframes().len()
            );
            for frame in entry.schedule.timeframes() {
                debug!(
                    "  {} - {} ({}min, avg {:.2} c/kWh)",
                    frame.start.format("%Y-%m-%d %H:%M"),
                    frame.end.format("%H:%M"),
                    frame.duration_minutes,
                    frame.avg_price
                );
            }
            (name.clone(), entry.schedule.timeframes().len())
        })
        .collect();

    state.series = series;
    counts
}

fn insert_device(state: &mut StoreState, record: DeviceRecord) -> Result<(), RegistryError> {
    let name = record.name.trim().to_string();
    let address = record.address.trim().to_string();

    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if address.is_empty() {
        return Err(RegistryError::EmptyAddress);
    }
    if state.devices.contains_key(&name) {
        return Err(RegistryError::DuplicateDevice(name));
    }

    let mut schedule = DeviceScheduleState::new(name.clone(), record.rule, &state.series);
    schedule.override_mode = record.override_mode;

    state.devices.insert(
        name,
        DeviceEntry {
            address,
            schedule,
            powered: None,
            probed: false,
        },
    );
    Ok(())
}

fn apply_observation(
    name: &str,
    entry: &mut DeviceEntry,
    reachable: bool,
    powered: Option<bool>,
) -> bool {
    let flipped = entry.schedule.reachable != reachable;
    if flipped || !entry.probed {
        match (reachable, entry.probed) {
            (true, true) => info!("Device {} is reachable again", name),
            (true, false) => info!("Device {} is reachable", name),
            (false, _) => warn!("Device {} is unreachable", name),
        }
    }
    entry.probed = true;
    entry.schedule.reachable = reachable;
    entry.powered = if reachable { powered } else { None };
    flipped
}

fn device_status(name: &str, entry: &DeviceEntry, now: DateTime<Utc>) -> DeviceStatus {
    DeviceStatus {
        name: name.to_string(),
        address: entry.address.clone(),
        rule: entry.schedule.rule(),
        override_mode: entry.schedule.override_mode,
        timeframes: entry.schedule.timeframes().to_vec(),
        desired_on: reconcile(now, &entry.schedule),
        reachable: entry.schedule.reachable,
        powered: entry.powered,
    }
}

fn is_stale(last_refresh: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    last_refresh.map_or(true, |at| now - at > max_age)
}
