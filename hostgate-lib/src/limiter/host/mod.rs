mod key;
mod registry;
mod stats;

pub use key::{HostKey, HostKeyPolicy};
pub(crate) use registry::HostRegistry;
pub use registry::HostLoad;
pub use stats::{HostStats, HostStatsMap};
