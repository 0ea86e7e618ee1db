pub mod config;

#[cfg(target_os = "linux")]
pub mod linux;

pub use config::UdisksConfig;

#[cfg(target_os = "linux")]
pub use linux::UdisksProvider;

use automount_core::MediaProvider;
use std::sync::Arc;

/// Build the backends enabled in `config`, in dispatch order.
pub fn platform_providers(config: &UdisksConfig) -> Vec<Arc<dyn MediaProvider>> {
    let mut providers: Vec<Arc<dyn MediaProvider>> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if config.enabled {
            providers.push(Arc::new(UdisksProvider::new(config.clone())));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        if config.enabled {
            log::warn!("udisks backend requested but not available on this platform");
        }
    }

    for provider in &providers {
        log::info!("Registered media provider: {}", provider.name());
    }
    providers
}
