pub mod config;
pub mod error;
pub mod lease;
pub mod leaser;
pub mod media;
pub mod muxer;
pub mod provider;
pub mod tasks;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::LeaserConfig;
pub use error::AutomountError;
pub use lease::{Lease, LeaseId, LeaseIdGenerator};
pub use leaser::Leaser;
pub use media::{Media, MountSession};
pub use muxer::Muxer;
pub use provider::MediaProvider;
pub use tasks::TaskGroup;
