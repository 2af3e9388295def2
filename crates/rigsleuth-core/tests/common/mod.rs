//! Shared fixtures for the end-to-end tests: a fake machine made of a
//! temporary `/sys` + `/proc` tree, scripted command output, and seeded
//! library-level answers.
#![allow(dead_code)]

use rigsleuth_core::error::ProbeError;
use rigsleuth_core::platform::{
    CommandRunner, HostEnv, InterfaceInfo, MediaKind, MemoryTotals, OsFamily, PartitionInfo,
    SystemSource,
};
use rigsleuth_core::snapshot::SnapshotStore;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Scripted commands ────────────────────────────────────────────────────────

/// How a scripted command answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Denied,
    Fails(String),
}

/// Answers `program args...` from a table; anything unscripted is
/// "not installed".
#[derive(Debug, Default, Clone)]
pub struct ScriptedRunner {
    replies: HashMap<String, Reply>,
}

impl ScriptedRunner {
    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    pub fn output(self, command: &str, text: &str) -> Self {
        self.reply(command, Reply::Output(text.to_string()))
    }

    /// Every `dmidecode` invocation fails as it does without root.
    pub fn dmidecode_denied(self) -> Self {
        [
            "dmidecode -t 17",
            "dmidecode --type 16",
            "dmidecode --type 17",
            "dmidecode -t bios",
            "dmidecode -s system-manufacturer",
            "dmidecode -s system-product-name",
            "dmidecode -s system-serial-number",
            "dmidecode -s baseboard-manufacturer",
            "dmidecode -s baseboard-product-name",
            "dmidecode -s bios-vendor",
            "dmidecode -s bios-version",
            "dmidecode -s bios-release-date",
        ]
        .into_iter()
        .fold(self, |runner, cmd| runner.reply(cmd, Reply::Denied))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        let mut key = program.to_string();
        for arg in args {
            key.push(' ');
            key.push_str(arg);
        }
        match self.replies.get(&key) {
            Some(Reply::Output(text)) => Ok(text.clone()),
            Some(Reply::Denied) => Err(ProbeError::PermissionDenied(program.to_string())),
            Some(Reply::Fails(stderr)) => Err(ProbeError::CommandFailed {
                program: program.to_string(),
                status: "exit status: 1".into(),
                stderr: stderr.clone(),
            }),
            None => Err(ProbeError::Unavailable(program.to_string())),
        }
    }
}

// ── Seeded system source ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SeededSystem {
    pub partitions: Vec<PartitionInfo>,
    pub cpu_usage: Option<f32>,
    pub memory: Option<MemoryTotals>,
    pub boot_time: Option<u64>,
    pub hostname: Option<String>,
    pub kernel: Option<String>,
    pub os_name: Option<String>,
    pub cpu_brand: Option<String>,
    pub interfaces: Vec<InterfaceInfo>,
    pub outbound_ip: Option<IpAddr>,
}

impl SeededSystem {
    /// Enough for every category to complete: a hostname and route, a
    /// CPU load reading, and nothing else.
    pub fn minimal() -> Self {
        Self {
            hostname: Some("bench-07".into()),
            outbound_ip: Some(IpAddr::from([192, 168, 1, 50])),
            cpu_usage: Some(12.0),
            ..Self::default()
        }
    }
}

impl SystemSource for SeededSystem {
    fn partitions(&self) -> Vec<PartitionInfo> {
        self.partitions.clone()
    }
    fn cpu_usage(&self) -> Option<f32> {
        self.cpu_usage
    }
    fn memory(&self) -> Option<MemoryTotals> {
        self.memory
    }
    fn boot_time(&self) -> Option<u64> {
        self.boot_time
    }
    fn hostname(&self) -> Option<String> {
        self.hostname.clone()
    }
    fn kernel_release(&self) -> Option<String> {
        self.kernel.clone()
    }
    fn os_name(&self) -> Option<String> {
        self.os_name.clone()
    }
    fn cpu_brand(&self) -> Option<String> {
        self.cpu_brand.clone()
    }
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.interfaces.clone()
    }
    fn outbound_ip(&self) -> Option<IpAddr> {
        self.outbound_ip
    }
}

// ── Fake machine ─────────────────────────────────────────────────────────────

/// A temporary filesystem root standing in for `/`.
pub struct FakeMachine {
    pub root: TempDir,
}

impl FakeMachine {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write `contents` at host path `absolute` under the fake root.
    pub fn write(&self, absolute: &str, contents: &str) -> &Self {
        let path: PathBuf = self.root.path().join(absolute.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }

    pub fn host(&self, runner: ScriptedRunner, system: SeededSystem) -> HostEnv {
        HostEnv::new(self.path(), OsFamily::Linux, Arc::new(runner), Arc::new(system))
    }
}

pub fn partition(device: &str, mount: &str, total_gb: u64, used_gb: u64) -> PartitionInfo {
    const GB: u64 = 1024 * 1024 * 1024;
    PartitionInfo {
        device: device.to_string(),
        mount_point: PathBuf::from(mount),
        fs_type: "ext4".to_string(),
        total_bytes: total_gb * GB,
        available_bytes: (total_gb - used_gb) * GB,
        media: MediaKind::Unknown,
    }
}

/// Wait for every category to finish, panicking after a generous timeout.
///
/// Waits up to 30 seconds: far more than a fake machine needs, short
/// enough that a stuck worker does not hang the suite.
pub fn wait_complete(store: &SnapshotStore) {
    assert!(
        store.wait_until_complete(Duration::from_secs(30)),
        "gather did not complete within 30 seconds: {:?}",
        store.snapshot()
    );
}
