// Removable block devices, mounted through udisks2
// Enumeration comes from lsblk; mounting is delegated to udisksctl

use super::lsblk::{parse_lsblk, BlockDevice, LSBLK_COLUMNS};
use crate::UdisksConfig;
use automount_core::{AutomountError, Media, MediaProvider, MountSession};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const PROVIDER_NAME: &str = "udisks";

#[derive(Debug)]
pub struct UdisksSession {
    device: String,
    mount_path: PathBuf,
    borrowed: bool,
}

impl UdisksSession {
    pub fn device(&self) -> &str {
        &self.device
    }

    /// True when the device was already mounted by someone else and this
    /// session only shares that mount.
    pub fn is_borrowed(&self) -> bool {
        self.borrowed
    }
}

impl MountSession for UdisksSession {
    fn mount_path(&self) -> &Path {
        &self.mount_path
    }
}

pub struct UdisksProvider {
    config: UdisksConfig,
    devices: RwLock<Vec<BlockDevice>>,
    /// Devices mounted through udisksctl by this provider. Only these are
    /// ever unmounted.
    mounted_here: RwLock<HashSet<String>>,
}

impl UdisksProvider {
    pub fn new(config: UdisksConfig) -> Self {
        Self {
            config,
            devices: RwLock::new(Vec::new()),
            mounted_here: RwLock::new(HashSet::new()),
        }
    }

    fn snapshot(&self) -> Vec<BlockDevice> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, id: &str) -> Option<BlockDevice> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|device| device.path == id)
            .cloned()
    }

    fn is_mounted_here(&self, id: &str) -> bool {
        self.mounted_here
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn existing_session(&self, id: &str, mount_path: PathBuf) -> UdisksSession {
        UdisksSession {
            device: id.to_string(),
            mount_path,
            borrowed: !self.is_mounted_here(id),
        }
    }

    fn set_mount_point(&self, id: &str, mount_point: Option<PathBuf>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(device) = devices.iter_mut().find(|device| device.path == id) {
            device.mount_point = mount_point;
        }
    }

    async fn scan(&self) -> Result<Vec<BlockDevice>, AutomountError> {
        let output = Command::new("lsblk")
            .args(["-b", "-P", "-o", LSBLK_COLUMNS])
            .output()
            .await
            .map_err(|e| AutomountError::External(format!("Failed to run lsblk: {}", e)))?;

        if !output.status.success() {
            return Err(AutomountError::External(format!(
                "lsblk command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_lsblk(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Rescan block devices and replace the cached media list.
    pub async fn refresh(&self) -> Result<(), AutomountError> {
        let found = self.scan().await?;
        let previous = self.snapshot();

        for device in &found {
            if !previous.iter().any(|p| p.path == device.path) {
                log::info!("Media appeared: {} ({})", device.path, device.display_name());
            }
        }
        for device in &previous {
            if !found.iter().any(|f| f.path == device.path) {
                log::info!("Media removed: {}", device.path);
            }
        }

        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = found;
        Ok(())
    }

    /// Run udisksctl, returning stdout on success and stderr on failure.
    async fn udisksctl(&self, args: &[&str]) -> Result<String, String> {
        log::debug!("Running udisksctl {}", args.join(" "));
        let output = Command::new("udisksctl")
            .args(args)
            .output()
            .await
            .map_err(|e| format!("Failed to run udisksctl: {}", e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

/// Extract the mount point from `Mounted /dev/sdb1 at /media/user/STICK.`
pub fn parse_mounted_path(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().find(|line| line.starts_with("Mounted "))?;
    let (_, path) = line.split_once(" at ")?;
    let path = path.trim().trim_end_matches('.');
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

#[async_trait::async_trait]
impl MediaProvider for UdisksProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn initialize(&self) -> Result<(), AutomountError> {
        self.config.validate()?;

        for tool in ["lsblk", "udisksctl"] {
            which::which(tool).map_err(|_| AutomountError::InitializationFailed {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("{} not found on PATH", tool),
            })?;
        }

        self.refresh()
            .await
            .map_err(|e| AutomountError::InitializationFailed {
                provider: PROVIDER_NAME.to_string(),
                reason: e.to_string(),
            })?;

        log::info!("udisks provider ready with {} media", self.snapshot().len());
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), AutomountError> {
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("udisks monitor stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }

            match self.refresh().await {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "Block device scan failed ({}/{}): {}",
                        failures,
                        self.config.max_refresh_failures,
                        e
                    );
                    if failures >= self.config.max_refresh_failures {
                        return Err(AutomountError::MonitoringFailed {
                            provider: PROVIDER_NAME.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn list_media(&self) -> Vec<Media> {
        self.snapshot().iter().map(BlockDevice::to_media).collect()
    }

    async fn mount(&self, id: &str) -> Result<Arc<dyn MountSession>, AutomountError> {
        let device = self
            .find(id)
            .ok_or_else(|| AutomountError::NotFound(id.to_string()))?;

        // Mounted outside of us (desktop automounter, fstab); share it.
        if let Some(mount_path) = device.mount_point {
            log::debug!("{} is already mounted at {}", id, mount_path.display());
            return Ok(Arc::new(self.existing_session(id, mount_path)));
        }

        let options = self.config.mount_options.join(",");
        let mut args = vec!["mount", "--no-user-interaction", "-b", id];
        if !options.is_empty() {
            args.extend(["-o", options.as_str()]);
        }

        let stdout = self
            .udisksctl(&args)
            .await
            .map_err(|reason| AutomountError::MountFailed {
                media_id: id.to_string(),
                reason,
            })?;

        let mount_path = match parse_mounted_path(&stdout) {
            Some(path) => path,
            None => {
                // Unfamiliar udisksctl output; ask the block layer instead.
                if let Err(e) = self.refresh().await {
                    log::warn!("Rescan after mounting {} failed: {}", id, e);
                }
                self.find(id)
                    .and_then(|device| device.mount_point)
                    .ok_or_else(|| AutomountError::MountFailed {
                        media_id: id.to_string(),
                        reason: format!("could not determine mount point from {:?}", stdout.trim()),
                    })?
            }
        };

        self.set_mount_point(id, Some(mount_path.clone()));
        self.mounted_here
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        log::info!("Mounted {} at {}", id, mount_path.display());
        Ok(Arc::new(UdisksSession {
            device: id.to_string(),
            mount_path,
            borrowed: false,
        }))
    }

    async fn unmount(&self, id: &str) -> Result<(), AutomountError> {
        if self.find(id).is_none() {
            return Err(AutomountError::NotFound(id.to_string()));
        }
        if !self.is_mounted_here(id) {
            log::info!("Leaving {} mounted, it was not mounted by us", id);
            return Ok(());
        }

        self.udisksctl(&["unmount", "--no-user-interaction", "-b", id])
            .await
            .map_err(|reason| AutomountError::UnmountFailed {
                media_id: id.to_string(),
                reason,
            })?;

        self.set_mount_point(id, None);
        self.mounted_here
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        log::info!("Unmounted {}", id);
        Ok(())
    }
}
