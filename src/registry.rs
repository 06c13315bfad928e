//! Device registry file.
//!
//! Layout (kept compatible with existing `config.json` files):
//!
//! ```json
//! {
//!   "devices": { "boiler": "192.168.1.20" },
//!   "device_thresholds": { "boiler": { "type": "multiplier", "value": 1.5 } },
//!   "forced_states": { "boiler": null }
//! }
//! ```
//!
//! `forced_states` uses `null` for auto, `true` for forced on and `false`
//! for forced off.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use spotplug_types::{DeviceRecord, OverrideMode, ThresholdRule, DEFAULT_THRESHOLD_MULTIPLIER};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    devices: BTreeMap<String, String>,

    #[serde(default)]
    device_thresholds: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    forced_states: BTreeMap<String, Option<bool>>,
}

fn mode_from_forced(forced: Option<bool>) -> OverrideMode {
    match forced {
        None => OverrideMode::Auto,
        Some(true) => OverrideMode::ForcedOn,
        Some(false) => OverrideMode::ForcedOff,
    }
}

fn forced_from_mode(mode: OverrideMode) -> Option<bool> {
    match mode {
        OverrideMode::Auto => None,
        OverrideMode::ForcedOn => Some(true),
        OverrideMode::ForcedOff => Some(false),
    }
}

/// Load device records, creating an empty registry if the file is missing.
pub fn load(path: &Path) -> anyhow::Result<Vec<DeviceRecord>> {
    if !path.exists() {
        info!(
            "No registry found at {}, creating default configuration",
            path.display()
        );
        save(path, &[])?;
        return Ok(Vec::new());
    }

    info!("Loading configuration from {}", path.display());
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry {}", path.display()))?;
    let file: RegistryFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse registry {}", path.display()))?;

    let records: Vec<DeviceRecord> = file
        .devices
        .iter()
        .map(|(name, address)| {
            let rule = match file.device_thresholds.get(name) {
                Some(value) => serde_json::from_value::<ThresholdRule>(value.clone())
                    .unwrap_or_else(|e| {
                        warn!(
                            "Device {} has invalid threshold ({}), using default (multiplier: {})",
                            name, e, DEFAULT_THRESHOLD_MULTIPLIER
                        );
                        ThresholdRule::default()
                    }),
                None => {
                    warn!(
                        "Device {} missing threshold configuration, using default (multiplier: {})",
                        name, DEFAULT_THRESHOLD_MULTIPLIER
                    );
                    ThresholdRule::default()
                }
            };

            DeviceRecord {
                name: name.clone(),
                address: address.clone(),
                rule,
                override_mode: mode_from_forced(
                    file.forced_states.get(name).copied().flatten(),
                ),
            }
        })
        .collect();

    info!("Loaded {} devices from configuration", records.len());
    Ok(records)
}

/// Write the registry atomically (temp file + rename).
pub fn save(path: &Path, records: &[DeviceRecord]) -> anyhow::Result<()> {
    let mut file = RegistryFile::default();
    for record in records {
        file.devices
            .insert(record.name.clone(), record.address.clone());
        file.device_thresholds.insert(
            record.name.clone(),
            serde_json::to_value(record.rule).context("Failed to encode threshold")?,
        );
        file.forced_states
            .insert(record.name.clone(), forced_from_mode(record.override_mode));
    }

    let json = serde_json::to_string_pretty(&file).context("Failed to encode registry")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace registry {}", path.display()))?;

    debug!("Configuration saved to {}", path.display());
    Ok(())
}

/// [`save`] on the blocking pool, for use from async tasks.
pub async fn save_async(path: PathBuf, records: Vec<DeviceRecord>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || save(&path, &records))
        .await
        .context("Registry save task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let records = load(&path).unwrap();

        assert!(records.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let records = vec![
            DeviceRecord {
                name: "boiler".to_string(),
                address: "192.168.1.20".to_string(),
                rule: ThresholdRule::fixed(8.5).unwrap(),
                override_mode: OverrideMode::ForcedOn,
            },
            DeviceRecord {
                name: "pump".to_string(),
                address: "192.168.1.21".to_string(),
                rule: ThresholdRule::default(),
                override_mode: OverrideMode::Auto,
            },
        ];

        save(&path, &records).unwrap();

        assert_eq!(load(&path).unwrap(), records);
    }

    #[test]
    fn test_legacy_file_with_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "devices": {"boiler": "10.0.0.2", "fridge": "10.0.0.3", "pump": "10.0.0.4"},
                "device_thresholds": {"boiler": 2.0, "pump": {"type": "fixed", "value": 12}},
                "forced_states": {"pump": false}
            }"#,
        )
        .unwrap();

        let records = load(&path).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].rule, ThresholdRule::default());
        assert_eq!(records[1].rule, ThresholdRule::default());
        assert_eq!(records[1].override_mode, OverrideMode::Auto);
        assert_eq!(records[2].rule, ThresholdRule::fixed(12.0).unwrap());
        assert_eq!(records[2].override_mode, OverrideMode::ForcedOff);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load(&path).is_err());
    }
}
