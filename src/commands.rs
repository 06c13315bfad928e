//! Client command handling.
//!
//! Every registry mutation is persisted and followed by an immediate
//! reconciliation pass so the plugs reflect the change without waiting
//! for the next tick. Mutations are applied one at a time so the file
//! always holds the latest registry.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use spotplug_core::Scheduler;
use spotplug_types::{ClientCommand, DeviceRecord, SchedulerEvent};

use crate::registry;

/// Applies client commands to the scheduler's registry.
#[derive(Debug)]
pub struct CommandHandler {
    scheduler: Arc<Scheduler>,
    registry_path: PathBuf,

    /// Held from mutation until the registry file is written
    registry_lock: Mutex<()>,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<Scheduler>, registry_path: PathBuf) -> Self {
        Self {
            scheduler,
            registry_path,
            registry_lock: Mutex::new(()),
        }
    }

    pub async fn handle(&self, command: ClientCommand) -> SchedulerEvent {
        self.handle_at(command, Utc::now()).await
    }

    /// Handle a command as of `now`. Failures become an unsuccessful
    /// [`SchedulerEvent::CommandResult`].
    pub async fn handle_at(&self, command: ClientCommand, now: DateTime<Utc>) -> SchedulerEvent {
        match self.apply(command, now).await {
            Ok(event) => event,
            Err(e) => {
                warn!("Command failed: {:#}", e);
                SchedulerEvent::CommandResult {
                    success: false,
                    message: format!("{:#}", e),
                }
            }
        }
    }

    async fn apply(&self, command: ClientCommand, now: DateTime<Utc>) -> anyhow::Result<SchedulerEvent> {
        let store = self.scheduler.store();

        let registry_guard = self.registry_lock.lock().await;
        let message = match command {
            ClientCommand::Status => {
                let stale_after = self.scheduler.config().stale_after;
                return Ok(SchedulerEvent::Status(store.status(now, stale_after).await));
            }
            ClientCommand::AddDevice {
                name,
                address,
                rule,
            } => {
                info!("Adding device: {} ({})", name, address);
                store
                    .add_device(DeviceRecord {
                        name: name.clone(),
                        address,
                        rule: rule.unwrap_or_default(),
                        override_mode: Default::default(),
                    })
                    .await?;
                format!("Device {} added", name)
            }
            ClientCommand::UpdateDevice {
                name,
                address,
                threshold_type,
                threshold_value,
            } => {
                info!("Updating device: {}", name);
                let changed = store
                    .update_device(&name, address, threshold_type, threshold_value)
                    .await?;
                if changed {
                    info!("Threshold changed for {}", name);
                }
                format!("Device {} updated", name)
            }
            ClientCommand::RemoveDevice { name } => {
                info!("Deleting device: {}", name);
                store.remove_device(&name).await?;
                format!("Device {} deleted", name)
            }
            ClientCommand::SetOverride { name, mode } => {
                info!("Setting device {} to {} mode", name, mode);
                store.set_override(&name, mode).await?;
                format!("Device {} set to {}", name, mode)
            }
        };

        registry::save_async(self.registry_path.clone(), store.records().await).await?;
        drop(registry_guard);

        self.scheduler.tick(now).await;

        Ok(SchedulerEvent::CommandResult {
            success: true,
            message,
        })
    }
}
