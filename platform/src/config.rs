use automount_core::AutomountError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdisksConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Passed to `udisksctl mount -o`, joined with commas.
    #[serde(default)]
    pub mount_options: Vec<String>,
    /// Consecutive failed scans before monitoring gives up.
    #[serde(default = "default_max_refresh_failures")]
    pub max_refresh_failures: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_max_refresh_failures() -> u32 {
    5
}

impl Default for UdisksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_secs: default_poll_interval_secs(),
            mount_options: Vec::new(),
            max_refresh_failures: default_max_refresh_failures(),
        }
    }
}

impl UdisksConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), AutomountError> {
        if self.poll_interval_secs == 0 {
            return Err(AutomountError::Configuration(
                "udisks.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_refresh_failures == 0 {
            return Err(AutomountError::Configuration(
                "udisks.max_refresh_failures must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
