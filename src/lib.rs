//! Spotplug Scheduler Service
//!
//! Switches smart plugs on during cheap day-ahead electricity price windows.
//!
//! # Features
//!
//! - **Per-device price ceilings**, fixed or relative to the median price
//! - **Manual override** per device (auto / forced on / forced off)
//! - **Periodic reconciliation** with reachability reporting
//! - **WebSocket status feed** accepting registry commands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use spotplug::{DryRunClient, EleringClient, ScheduleStore, Scheduler, SchedulerConfig};
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = broadcast::channel(256);
//!     let scheduler = Scheduler::new(
//!         Arc::new(ScheduleStore::new()),
//!         Arc::new(DryRunClient::new()),
//!         Arc::new(EleringClient::new()),
//!         SchedulerConfig::default(),
//!         tx,
//!     );
//!
//!     let now = chrono::Utc::now();
//!     scheduler.refresh_prices(now).await;
//!     scheduler.tick(now).await;
//!
//!     while let Ok(event) = rx.try_recv() {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

pub mod commands;
pub mod config;
pub mod registry;
pub mod server;

pub use commands::CommandHandler;
pub use config::Config;
pub use server::run_server;
pub use spotplug_core::{
    compute_timeframes, reconcile, ActuationPolicy, DeviceClient, DeviceError,
    DeviceScheduleState, DryRunClient, EleringClient, PriceSeries, PriceSource, RegistryError,
    ScheduleStore, Scheduler, SchedulerConfig,
};
pub use spotplug_types::{
    ClientCommand, DeviceRecord, DeviceStatus, OverrideMode, PriceSample, PriceSummary,
    SchedulerEvent, StatusSnapshot, ThresholdKind, ThresholdRule, Timeframe,
};
