/// Platform access: the host environment probes run against, and
/// privilege checks.
pub mod host;
pub mod permissions;

pub use host::{
    CommandRunner, HostEnv, InterfaceInfo, MediaKind, MemoryTotals, OsFamily, PartitionInfo,
    SysinfoSource, SystemCommandRunner, SystemSource,
};
pub use permissions::is_elevated;
