use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomountError {
    /// The identifier does not belong to the provider that was asked.
    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Failed to mount {media_id}: {reason}")]
    MountFailed { media_id: String, reason: String },

    #[error("Failed to unmount {media_id}: {reason}")]
    UnmountFailed { media_id: String, reason: String },

    #[error("No lease with the given id: {0}")]
    NoSuchLease(String),

    #[error("Provider {provider} failed to initialize: {reason}")]
    InitializationFailed { provider: String, reason: String },

    #[error("Provider {provider} stopped monitoring: {reason}")]
    MonitoringFailed { provider: String, reason: String },

    #[error("Leaser is shutting down")]
    ShuttingDown,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External command failed: {0}")]
    External(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AutomountError {
    /// True for the "not mine" signal providers use to pass an identifier on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AutomountError::NotFound(_))
    }
}
