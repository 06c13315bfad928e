//! Price refresh and reconciliation ticks.
//!
//! The scheduler owns no state of its own beyond configuration: prices and
//! devices live in the [`ScheduleStore`], the outside world is reached
//! through a [`PriceSource`] and a [`DeviceClient`]. Ticks are serialized,
//! and a tick that started earlier than the last committed one is dropped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use spotplug_types::SchedulerEvent;

use crate::device::{ActuationPolicy, DeviceClient};
use crate::elering::{PriceSource, PriceSourceError};
use crate::reconcile::reconcile;
use crate::store::{DeviceEntry, Observation, ScheduleStore, TickOutcome};

/// Default age after which the price series is reported stale (12 hours).
pub const DEFAULT_STALE_AFTER_SECS: i64 = 12 * 60 * 60;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub policy: ActuationPolicy,
    pub stale_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: ActuationPolicy::default(),
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

/// Drives price refreshes and device reconciliation.
pub struct Scheduler {
    store: Arc<ScheduleStore>,
    client: Arc<dyn DeviceClient>,
    source: Arc<dyn PriceSource>,
    config: SchedulerConfig,
    events: broadcast::Sender<SchedulerEvent>,
    tick_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<ScheduleStore>,
        client: Arc<dyn DeviceClient>,
        source: Arc<dyn PriceSource>,
        config: SchedulerConfig,
        events: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            store,
            client,
            source,
            config,
            events,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Fetch a new price series and recompute every device's timeframes.
    ///
    /// If the source could not be reached the previous series stays in
    /// use. A malformed series clears every device's timeframes instead, so
    /// automatic schedules stay off until the next valid refresh. Returns
    /// whether the refresh succeeded.
    pub async fn refresh_prices(&self, now: DateTime<Utc>) -> bool {
        info!("Fetching electricity prices...");

        let series = match self.source.fetch(now).await {
            Ok(series) => series,
            Err(e) => {
                error!("Failed to fetch electricity prices: {}", e);
                if matches!(e, PriceSourceError::InvalidSeries(_)) {
                    warn!("Price source returned a malformed series; automatic schedules are off");
                    for (device, count) in self.store.clear_series().await {
                        self.emit(SchedulerEvent::TimeframesUpdated { device, count });
                    }
                }
                self.report_refresh_failure(now).await;
                self.emit(SchedulerEvent::Error {
                    message: e.to_string(),
                });
                return false;
            }
        };

        let sample_count = series.len();
        let median = series.median();
        info!("Received {} price entries", sample_count);
        if let Some(median) = median {
            info!("Median price: {:.2} c/kWh", median);
        } else {
            warn!("Price source returned an empty series; automatic schedules are off");
        }

        let counts = self.store.replace_series(series, now).await;

        self.emit(SchedulerEvent::PricesUpdated {
            sample_count,
            median,
            refreshed_at: now,
        });
        for (device, count) in counts {
            self.emit(SchedulerEvent::TimeframesUpdated { device, count });
        }
        true
    }

    async fn report_refresh_failure(&self, now: DateTime<Utc>) {
        let failures = self.store.record_refresh_failure().await;
        let (last_refresh, _) = self.store.refresh_health().await;

        if self.store.is_stale(now, self.config.stale_after).await {
            warn!(
                "Price data is stale (last refresh: {}, {} consecutive failures); keeping last good series",
                last_refresh.map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
                failures
            );
            self.emit(SchedulerEvent::PricesStale {
                last_refresh,
                consecutive_failures: failures,
            });
        }
    }

    /// Run one reconciliation pass over every device.
    ///
    /// Returns `None` without touching any device if a newer tick already
    /// committed.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<Vec<TickOutcome>> {
        let _guard = self.tick_lock.lock().await;

        if let Some(last) = self.store.last_tick().await {
            if last > now {
                debug!("Skipping tick at {}; already reconciled at {}", now, last);
                return None;
            }
        }

        let devices = self.store.devices().await;
        debug!("Reconciling {} devices at {}", devices.len(), now);

        let observations = join_all(
            devices
                .into_iter()
                .map(|(name, entry)| self.drive_device(now, name, entry)),
        )
        .await;

        let outcomes = self.store.commit_tick(now, observations).await?;
        for outcome in &outcomes {
            self.emit(SchedulerEvent::DesiredState {
                device: outcome.device.clone(),
                desired_on: outcome.desired_on,
                reachable: outcome.reachable,
            });
        }
        Some(outcomes)
    }

    /// Probe one device and, if needed, switch it. Never retries.
    async fn drive_device(&self, now: DateTime<Utc>, name: String, entry: DeviceEntry) -> Observation {
        let desired = reconcile(now, &entry.schedule);

        let (mut reachable, mut powered) = match self.client.power_state(&entry.address).await {
            Ok(on) => {
                debug!("Got state for {}: {}", name, if on { "ON" } else { "OFF" });
                (true, Some(on))
            }
            Err(e) => {
                debug!("Probe failed for {}: {}", name, e);
                (false, None)
            }
        };

        let should_switch = match powered {
            Some(on) => on != desired,
            None => self.config.policy == ActuationPolicy::Always,
        };

        if should_switch {
            let action = if desired { "ON" } else { "OFF" };
            match self.client.set_power(&entry.address, desired).await {
                Ok(()) => {
                    info!("Turned {} {}", action, name);
                    reachable = true;
                    powered = Some(desired);
                    self.emit(SchedulerEvent::Actuated {
                        device: name.clone(),
                        on: desired,
                        success: true,
                    });
                }
                Err(e) => {
                    // The next tick re-evaluates and tries again.
                    warn!("Failed to turn {} {}: {}", action, name, e);
                    reachable = false;
                    powered = None;
                    self.emit(SchedulerEvent::Actuated {
                        device: name.clone(),
                        on: desired,
                        success: false,
                    });
                }
            }
        }

        Observation {
            device: name,
            reachable,
            powered,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
