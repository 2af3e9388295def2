/// The machine being diagnosed, as seen by probes.
///
/// Every probe reaches the host through a [`HostEnv`]: virtual files are
/// read relative to a configurable root, external tools go through a
/// [`CommandRunner`], and library-level queries go through a
/// [`SystemSource`]. Production code wires in [`SystemCommandRunner`] and
/// [`SysinfoSource`]; tests substitute scripted fakes.
use crate::config::EngineConfig;
use crate::error::ProbeError;

use std::io::Read;
use std::net::{IpAddr, UdpSocket};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a running child is polled for exit.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Public address used only to select the outbound route.
const ROUTE_PROBE_TARGET: (&str, u16) = ("8.8.8.8", 80);

/// Operating-system family, used to pick which probes are worth trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Windows,
    MacOs,
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }
}

/// Runs an external program and returns its standard output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError>;
}

/// Storage media kind as reported by the OS, when it knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Ssd,
    Hdd,
    Unknown,
}

/// One mounted partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInfo {
    /// Device node, e.g. `/dev/nvme0n1p2`.
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub media: MediaKind,
}

impl PartitionInfo {
    pub fn usage_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        (used as f64 / self.total_bytes as f64 * 100.0) as f32
    }
}

/// One network adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: String,
    pub addresses: Vec<IpAddr>,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

/// Physical memory totals in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTotals {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Library-level system queries, the portable "management interface".
pub trait SystemSource: Send + Sync {
    fn partitions(&self) -> Vec<PartitionInfo>;
    /// Global CPU load, 0-100.
    fn cpu_usage(&self) -> Option<f32>;
    fn memory(&self) -> Option<MemoryTotals>;
    /// Boot time as seconds since the Unix epoch.
    fn boot_time(&self) -> Option<u64>;
    fn hostname(&self) -> Option<String>;
    fn kernel_release(&self) -> Option<String>;
    fn os_name(&self) -> Option<String>;
    fn cpu_brand(&self) -> Option<String>;
    fn interfaces(&self) -> Vec<InterfaceInfo>;
    /// Local address the OS would use for outbound traffic.
    fn outbound_ip(&self) -> Option<IpAddr>;
}

/// Everything a probe may touch.
#[derive(Clone)]
pub struct HostEnv {
    pub sys_root: PathBuf,
    pub os: OsFamily,
    pub commands: Arc<dyn CommandRunner>,
    pub system: Arc<dyn SystemSource>,
}

impl std::fmt::Debug for HostEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnv")
            .field("sys_root", &self.sys_root)
            .field("os", &self.os)
            .finish_non_exhaustive()
    }
}

impl HostEnv {
    pub fn new(
        sys_root: impl Into<PathBuf>,
        os: OsFamily,
        commands: Arc<dyn CommandRunner>,
        system: Arc<dyn SystemSource>,
    ) -> Self {
        Self {
            sys_root: sys_root.into(),
            os,
            commands,
            system,
        }
    }

    /// The real machine, with command timeout and root taken from `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.sys_root.clone(),
            OsFamily::current(),
            Arc::new(SystemCommandRunner::new(config.command_timeout)),
            Arc::new(SysinfoSource),
        )
    }

    /// Map an absolute host path such as `/sys/block` under `sys_root`.
    pub fn path(&self, absolute: &str) -> PathBuf {
        self.sys_root.join(absolute.trim_start_matches('/'))
    }

    pub fn read_virtual(&self, absolute: &str) -> Result<String, ProbeError> {
        std::fs::read_to_string(self.path(absolute)).map_err(|e| ProbeError::from_io(absolute, e))
    }

    pub fn exists(&self, absolute: &str) -> bool {
        self.path(absolute).exists()
    }

    /// Entry names of a directory, sorted so probes are deterministic.
    pub fn list_dir(&self, absolute: &str) -> Result<Vec<String>, ProbeError> {
        let entries =
            std::fs::read_dir(self.path(absolute)).map_err(|e| ProbeError::from_io(absolute, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        self.commands.run(program, args)
    }
}

/// Spawns real processes with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProbeError::from_io(program, e))?;

        // Drain both pipes on their own threads so a chatty tool cannot
        // fill the pipe buffer and stall before we see it exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!("{program} killed after {:?}", self.timeout);
                    return Err(ProbeError::TimedOut {
                        program: program.to_string(),
                    });
                }
                None => thread::sleep(COMMAND_POLL_INTERVAL),
            }
        };

        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();

        if status.success() {
            Ok(String::from_utf8_lossy(&out).into_owned())
        } else {
            Err(ProbeError::CommandFailed {
                program: program.to_string(),
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&err).trim().to_string(),
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// [`SystemSource`] backed by the `sysinfo` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSource;

impl SystemSource for SysinfoSource {
    fn partitions(&self) -> Vec<PartitionInfo> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .map(|disk| PartitionInfo {
                device: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_path_buf(),
                fs_type: disk.file_system().to_string_lossy().into_owned(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
                media: match disk.kind() {
                    sysinfo::DiskKind::SSD => MediaKind::Ssd,
                    sysinfo::DiskKind::HDD => MediaKind::Hdd,
                    _ => MediaKind::Unknown,
                },
            })
            .collect()
    }

    fn cpu_usage(&self) -> Option<f32> {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu_usage();
        // Usage is a delta between two samples.
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        let usage = sys.global_cpu_usage();
        usage.is_finite().then_some(usage)
    }

    fn memory(&self) -> Option<MemoryTotals> {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_bytes = sys.total_memory();
        (total_bytes > 0).then(|| MemoryTotals {
            total_bytes,
            used_bytes: sys.used_memory(),
        })
    }

    fn boot_time(&self) -> Option<u64> {
        let t = sysinfo::System::boot_time();
        (t > 0).then_some(t)
    }

    fn hostname(&self) -> Option<String> {
        sysinfo::System::host_name()
    }

    fn kernel_release(&self) -> Option<String> {
        sysinfo::System::kernel_version()
    }

    fn os_name(&self) -> Option<String> {
        sysinfo::System::long_os_version()
    }

    fn cpu_brand(&self) -> Option<String> {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu_all();
        sys.cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        let networks = sysinfo::Networks::new_with_refreshed_list();
        let mut out: Vec<InterfaceInfo> = networks
            .iter()
            .map(|(name, data)| InterfaceInfo {
                name: name.clone(),
                mac: data.mac_address().to_string(),
                addresses: data.ip_networks().iter().map(|n| n.addr).collect(),
                received_bytes: data.total_received(),
                transmitted_bytes: data.total_transmitted(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn outbound_ip(&self) -> Option<IpAddr> {
        // Connecting a UDP socket sends nothing; it only selects a route.
        let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
        socket.connect(ROUTE_PROBE_TARGET).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct NoCommands;
    impl CommandRunner for NoCommands {
        fn run(&self, program: &str, _args: &[&str]) -> Result<String, ProbeError> {
            Err(ProbeError::Unavailable(program.to_string()))
        }
    }

    fn host(root: &Path) -> HostEnv {
        HostEnv::new(root, OsFamily::Linux, Arc::new(NoCommands), Arc::new(SysinfoSource))
    }

    #[test]
    fn virtual_reads_are_rooted() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sys/class/dmi/id")).unwrap();
        std::fs::write(tmp.path().join("sys/class/dmi/id/sys_vendor"), "LENOVO\n").unwrap();

        let host = host(tmp.path());
        assert_eq!(host.read_virtual("/sys/class/dmi/id/sys_vendor").unwrap(), "LENOVO\n");
        assert!(host.exists("/sys/class/dmi/id"));
        assert!(matches!(
            host.read_virtual("/sys/class/dmi/id/board_name"),
            Err(ProbeError::Unavailable(_))
        ));
    }

    #[test]
    fn list_dir_is_sorted() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["sdb", "nvme0n1", "sda"] {
            std::fs::create_dir_all(tmp.path().join("sys/block").join(name)).unwrap();
        }
        let names = host(tmp.path()).list_dir("/sys/block").unwrap();
        assert_eq!(names, vec!["nvme0n1", "sda", "sdb"]);
    }

    #[test]
    fn usage_percent_handles_empty_partition() {
        let p = PartitionInfo {
            device: "/dev/sda1".into(),
            mount_point: PathBuf::from("/"),
            fs_type: "ext4".into(),
            total_bytes: 0,
            available_bytes: 0,
            media: MediaKind::Unknown,
        };
        assert_eq!(p.usage_percent(), 0.0);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        let err = runner
            .run("rigsleuth-definitely-not-a-real-binary", &[])
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let runner = SystemCommandRunner::new(Duration::from_millis(200));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, ProbeError::TimedOut { .. }));
    }
}
