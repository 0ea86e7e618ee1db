use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A media item a provider can see and mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub display_name: String,
}

impl Media {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A live mount created by a provider.
///
/// Owned by the provider that created it. The leaser stores sessions and hands
/// them back out with leases but never looks inside.
pub trait MountSession: Send + Sync + fmt::Debug {
    /// Where the media is reachable on the local filesystem.
    fn mount_path(&self) -> &Path;
}
