use crate::{AutomountError, Media, MediaProvider, MountSession, TaskGroup};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Presents an ordered list of providers as a single provider.
///
/// Mount and unmount requests go to each provider in registration order until
/// one of them claims the identifier. Enumeration is concatenated in the same
/// order, without deduplication.
pub struct Muxer {
    providers: Vec<Arc<dyn MediaProvider>>,
}

impl Muxer {
    pub fn new(providers: Vec<Arc<dyn MediaProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn MediaProvider>] {
        &self.providers
    }
}

#[async_trait::async_trait]
impl MediaProvider for Muxer {
    fn name(&self) -> &str {
        "muxer"
    }

    /// Stops at the first failure. Providers initialized before it are left
    /// as they are.
    async fn initialize(&self) -> Result<(), AutomountError> {
        for provider in &self.providers {
            tracing::info!(provider = provider.name(), "Initializing provider");
            provider.initialize().await?;
        }
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), AutomountError> {
        let mut group = TaskGroup::new(cancel.child_token());
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let token = group.token();
            group.spawn(provider.name().to_string(), async move {
                provider.run(token).await
            });
        }
        group.wait().await
    }

    fn list_media(&self) -> Vec<Media> {
        self.providers
            .iter()
            .flat_map(|provider| provider.list_media())
            .collect()
    }

    async fn mount(&self, id: &str) -> Result<Arc<dyn MountSession>, AutomountError> {
        for provider in &self.providers {
            match provider.mount(id).await {
                Err(e) if e.is_not_found() => continue,
                Ok(session) => {
                    tracing::info!(provider = provider.name(), media_id = id, "Mounted media");
                    return Ok(session);
                }
                Err(e) => return Err(e),
            }
        }
        Err(AutomountError::NotFound(id.to_string()))
    }

    async fn unmount(&self, id: &str) -> Result<(), AutomountError> {
        for provider in &self.providers {
            match provider.unmount(id).await {
                Err(e) if e.is_not_found() => continue,
                result => return result,
            }
        }
        Err(AutomountError::NotFound(id.to_string()))
    }
}
