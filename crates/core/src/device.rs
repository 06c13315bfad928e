//! Device actuation and liveness seam.
//!
//! Vendor clients implement [`DeviceClient`]; the scheduler only ever asks
//! for the current power state (which doubles as the reachability probe)
//! and requests a new one.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Failures reported by a device client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Device at {0} is unreachable")]
    Unreachable(String),

    #[error("Device error: {0}")]
    Vendor(String),
}

/// Power control for a smart plug.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Query whether the plug is currently on. An error marks it unreachable.
    async fn power_state(&self, address: &str) -> Result<bool, DeviceError>;

    /// Switch the plug on or off.
    async fn set_power(&self, address: &str, on: bool) -> Result<(), DeviceError>;
}

/// What to do with a device whose latest probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuationPolicy {
    /// Send the desired state anyway; failures are expected and logged
    #[default]
    Always,

    /// Leave unreachable devices alone until a probe succeeds
    SkipUnreachable,
}

impl FromStr for ActuationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(ActuationPolicy::Always),
            "skip-unreachable" => Ok(ActuationPolicy::SkipUnreachable),
            other => Err(format!(
                "unknown actuation policy '{}', expected 'always' or 'skip-unreachable'",
                other
            )),
        }
    }
}

/// In-memory plug simulator that logs every command.
///
/// Lets the scheduler run end to end without hardware. Plugs start off;
/// addresses can be marked unreachable to exercise failure paths.
#[derive(Debug, Default)]
pub struct DryRunClient {
    plugs: Mutex<HashMap<String, bool>>,
    unreachable: Mutex<HashSet<String>>,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_reachable(&self, address: &str, reachable: bool) {
        let mut unreachable = self.unreachable.lock().await;
        if reachable {
            unreachable.remove(address);
        } else {
            unreachable.insert(address.to_string());
        }
    }

    /// Simulated power state, if the plug was ever switched.
    pub async fn state(&self, address: &str) -> Option<bool> {
        self.plugs.lock().await.get(address).copied()
    }

    async fn check_reachable(&self, address: &str) -> Result<(), DeviceError> {
        if self.unreachable.lock().await.contains(address) {
            return Err(DeviceError::Unreachable(address.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceClient for DryRunClient {
    async fn power_state(&self, address: &str) -> Result<bool, DeviceError> {
        self.check_reachable(address).await?;
        Ok(self.state(address).await.unwrap_or(false))
    }

    async fn set_power(&self, address: &str, on: bool) -> Result<(), DeviceError> {
        self.check_reachable(address).await?;
        info!("[dry-run] {} -> {}", address, if on { "ON" } else { "OFF" });
        self.plugs.lock().await.insert(address.to_string(), on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!(
            "always".parse::<ActuationPolicy>(),
            Ok(ActuationPolicy::Always)
        );
        assert_eq!(
            "skip-unreachable".parse::<ActuationPolicy>(),
            Ok(ActuationPolicy::SkipUnreachable)
        );
        assert!("sometimes".parse::<ActuationPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_dry_run_tracks_state() {
        let client = DryRunClient::new();

        assert_eq!(client.power_state("10.0.0.5").await, Ok(false));
        client.set_power("10.0.0.5", true).await.unwrap();
        assert_eq!(client.power_state("10.0.0.5").await, Ok(true));
    }

    #[tokio::test]
    async fn test_dry_run_unreachable() {
        let client = DryRunClient::new();
        client.set_reachable("10.0.0.5", false).await;

        assert!(matches!(
            client.set_power("10.0.0.5", true).await,
            Err(DeviceError::Unreachable(_))
        ));
        assert!(client.power_state("10.0.0.5").await.is_err());

        client.set_reachable("10.0.0.5", true).await;
        assert!(client.power_state("10.0.0.5").await.is_ok());
    }
}
