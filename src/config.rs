//! Service configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use spotplug_core::{ActuationPolicy, DEFAULT_AREA, DEFAULT_STALE_AFTER_SECS, ELERING_URL};

/// Default WebSocket server address (0.0.0.0 for Docker/production).
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default registry file.
pub const DEFAULT_REGISTRY_PATH: &str = "config.json";

/// Price refresh period in seconds (4 hours).
pub const DEFAULT_REFRESH_SECS: u64 = 4 * 60 * 60;

/// Reconciliation tick period in seconds.
pub const DEFAULT_TICK_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub registry_path: PathBuf,
    pub price_url: String,
    pub price_area: String,
    pub refresh_interval: Duration,
    pub tick_interval: Duration,
    pub stale_after: chrono::Duration,
    pub policy: ActuationPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let refresh_secs = parse_or(&lookup, "SPOTPLUG_REFRESH_SECS", DEFAULT_REFRESH_SECS);
        let tick_secs = parse_or(&lookup, "SPOTPLUG_TICK_SECS", DEFAULT_TICK_SECS);
        let stale_secs = parse_or(&lookup, "SPOTPLUG_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS);

        Self {
            bind_addr: lookup("SPOTPLUG_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            registry_path: lookup("SPOTPLUG_REGISTRY")
                .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string())
                .into(),
            price_url: lookup("SPOTPLUG_PRICE_URL").unwrap_or_else(|| ELERING_URL.to_string()),
            price_area: lookup("SPOTPLUG_PRICE_AREA").unwrap_or_else(|| DEFAULT_AREA.to_string()),
            refresh_interval: Duration::from_secs(refresh_secs.max(1)),
            tick_interval: Duration::from_secs(tick_secs.max(1)),
            stale_after: stale_after(stale_secs),
            policy: parse_or(&lookup, "SPOTPLUG_ACTUATION", ActuationPolicy::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn stale_after(secs: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs)
        .filter(|limit| *limit > chrono::Duration::zero())
        .unwrap_or_else(|| {
            warn!(
                "Invalid SPOTPLUG_STALE_AFTER_SECS={} (out of range), using default {}",
                secs, DEFAULT_STALE_AFTER_SECS
            );
            chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS)
        })
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {}='{}' ({}), using default {:?}", key, raw, e, default);
            default
        }),
        None => default,
    }
}
