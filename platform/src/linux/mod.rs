pub mod lsblk;
pub mod udisks;

pub use lsblk::BlockDevice;
pub use udisks::{UdisksProvider, UdisksSession};
