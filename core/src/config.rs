use crate::AutomountError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the leaser treats media whose last lease was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaserConfig {
    /// Unmount media once it has had no leases for `idle_grace_secs`.
    /// When false, mounts stay until the process exits.
    #[serde(default)]
    pub unmount_idle: bool,
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_grace_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    5
}

impl Default for LeaserConfig {
    fn default() -> Self {
        Self {
            unmount_idle: false,
            idle_grace_secs: default_idle_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LeaserConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), AutomountError> {
        if self.sweep_interval_secs == 0 {
            return Err(AutomountError::Configuration(
                "leaser.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
