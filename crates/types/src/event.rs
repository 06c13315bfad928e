//! Events broadcast by the scheduler and commands accepted from clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{OverrideMode, ThresholdKind, ThresholdRule};
use crate::status::StatusSnapshot;

/// Events emitted by the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A new price series replaced the previous one
    PricesUpdated {
        sample_count: usize,
        median: Option<f64>,
        refreshed_at: DateTime<Utc>,
    },

    /// Price refresh keeps failing and the last good series is aging
    PricesStale {
        last_refresh: Option<DateTime<Utc>>,
        consecutive_failures: u32,
    },

    /// A device's timeframes were recomputed
    TimeframesUpdated { device: String, count: usize },

    /// Reconciliation result for one device
    DesiredState {
        device: String,
        desired_on: bool,
        reachable: bool,
    },

    /// An actuation attempt finished
    Actuated {
        device: String,
        on: bool,
        success: bool,
    },

    /// Full status snapshot
    Status(StatusSnapshot),

    /// Reply to a client command
    CommandResult { success: bool, message: String },

    /// An error occurred
    Error { message: String },
}

/// Commands a client may send to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Request a status snapshot
    Status,

    AddDevice {
        name: String,
        address: String,
        /// Defaults to the median multiplier rule when omitted
        #[serde(default)]
        rule: Option<ThresholdRule>,
    },

    /// Change a device's address and/or threshold; absent fields are kept
    UpdateDevice {
        name: String,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        threshold_type: Option<ThresholdKind>,
        #[serde(default)]
        threshold_value: Option<f64>,
    },

    RemoveDevice { name: String },

    SetOverride { name: String, mode: OverrideMode },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = SchedulerEvent::Actuated {
            device: "boiler".to_string(),
            on: true,
            success: false,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "actuated");
        assert_eq!(json["device"], "boiler");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn test_parse_set_override() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"command":"set_override","name":"boiler","mode":"on"}"#)
                .unwrap();

        assert_eq!(
            cmd,
            ClientCommand::SetOverride {
                name: "boiler".to_string(),
                mode: OverrideMode::ForcedOn,
            }
        );
    }

    #[test]
    fn test_parse_partial_update() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"command":"update_device","name":"boiler","threshold_value":2.0}"#)
                .unwrap();

        match cmd {
            ClientCommand::UpdateDevice {
                address,
                threshold_type,
                threshold_value,
                ..
            } => {
                assert!(address.is_none());
                assert!(threshold_type.is_none());
                assert_eq!(threshold_value, Some(2.0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_add_device_rejects_invalid_rule() {
        let result = serde_json::from_str::<ClientCommand>(
            r#"{"command":"add_device","name":"a","address":"10.0.0.2","rule":{"type":"fixed","value":-3}}"#,
        );
        assert!(result.is_err());
    }
}
