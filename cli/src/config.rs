use anyhow::{Context, Result};
use automount_core::LeaserConfig;
use automount_platform::UdisksConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_DEFAULT: &str = "/etc/automounter/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub leaser: LeaserConfig,
    #[serde(default)]
    pub udisks: UdisksConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }

    /// Load `explicit` if given, which must exist. Otherwise load the default
    /// file, falling back to built-in defaults when it is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()));
        }

        match Self::from_file(CONFIG_FILE_DEFAULT) {
            Ok(config) => Ok(config),
            Err(e) => {
                let is_not_found = e
                    .root_cause()
                    .downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false);

                if is_not_found {
                    tracing::debug!("No config at {}, using defaults", CONFIG_FILE_DEFAULT);
                    Ok(Config::default())
                } else {
                    Err(e).context(format!(
                        "Failed to load default config from {}",
                        CONFIG_FILE_DEFAULT
                    ))
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.leaser.validate()?;
        self.udisks.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}
