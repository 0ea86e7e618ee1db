use crate::{AutomountError, Media, MountSession};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A backend that discovers, mounts and unmounts the media it owns.
///
/// `mount` and `unmount` must return [`AutomountError::NotFound`] for an
/// identifier the provider does not own, so a [`crate::Muxer`] can move on to
/// the next provider. Any other error is final.
#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<(), AutomountError>;

    /// Monitor for media changes until `cancel` fires or monitoring fails.
    async fn run(&self, cancel: CancellationToken) -> Result<(), AutomountError>;

    /// Media currently visible to this provider.
    fn list_media(&self) -> Vec<Media>;

    async fn mount(&self, id: &str) -> Result<Arc<dyn MountSession>, AutomountError>;

    async fn unmount(&self, id: &str) -> Result<(), AutomountError>;
}
