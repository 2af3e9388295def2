/// Storage enumeration and classification.
///
/// Three tiers, each tried only when the previous produced no real device:
/// - **Tier 1 (partitions):** mounted partitions from the system source,
///   normalised to their physical device and de-duplicated.
/// - **Tier 2 (block registry):** a direct scan of `/sys/block`, then
///   `lsblk` output.
/// - **Tier 3 (placeholder):** a single synthetic record, so consumers
///   always receive a non-empty list.
pub mod sysfs;

use crate::platform::{HostEnv, MediaKind, OsFamily, PartitionInfo};
use crate::probe::parse;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Device path of the synthetic "no drives" record.
pub const PLACEHOLDER_DEVICE: &str = "/dev/placeholder";
pub const PLACEHOLDER_MODEL: &str = "No drives detected";

/// Device nodes that are physical storage on Linux.
pub const REAL_DEVICE_PREFIXES: &[&str] = &[
    "/dev/sd",
    "/dev/hd",
    "/dev/nvme",
    "/dev/vd",
    "/dev/xvd",
    "/dev/mmcblk",
];

/// Devices and filesystem types that never back a physical disk.
const VIRTUAL_DENYLIST: &[&str] = &[
    "/dev/loop", "/dev/ram", "/dev/zram", "/dev/dm-", "/dev/mapper", "/dev/sr", "/dev/md",
    "tmpfs", "devtmpfs", "overlay", "squashfs", "proc", "sysfs", "cgroup", "efivarfs",
];

/// SSD vendor/series strings seen in drive model names.
const SSD_MODEL_HINTS: &[&str] = &[
    "SAMSUNG", "CRUCIAL", "INTEL", "WD_BLACK", "SN750", "SN850", "860 EVO", "970 EVO", "970 PRO",
    "980 PRO", "MX500", "BX500",
];

/// Model strings that imply an NVMe device.
const NVME_MODEL_HINTS: &[&str] = &["PCIE", "M.2", "NVME", "PM9A1", "PM981", "980", "970", "960", "950"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveType {
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "HDD")]
    Hdd,
    Unknown,
}

impl DriveType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ssd => "SSD",
            Self::Nvme => "NVMe",
            Self::Hdd => "HDD",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One physical storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveRecord {
    /// Base device path with any partition suffix removed.
    pub device: String,
    pub model: String,
    pub capacity_gb: f64,
    #[serde(rename = "type")]
    pub drive_type: DriveType,
    /// Highest usage among the device's mounted partitions, if any.
    pub usage_percent: Option<f32>,
    pub health: String,
    /// Stand-in produced when nothing could be enumerated.
    pub synthetic: bool,
}

impl DriveRecord {
    pub fn placeholder() -> Self {
        Self {
            device: PLACEHOLDER_DEVICE.to_string(),
            model: PLACEHOLDER_MODEL.to_string(),
            capacity_gb: 0.0,
            drive_type: DriveType::Unknown,
            usage_percent: None,
            health: crate::probe::UNKNOWN.to_string(),
            synthetic: true,
        }
    }
}

/// Bytes to GB (binary), rounded to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Strip a partition suffix: `/dev/sda2` → `/dev/sda`,
/// `/dev/nvme0n1p3` → `/dev/nvme0n1`, `/dev/mmcblk0p1` → `/dev/mmcblk0`.
///
/// NVMe and MMC names end in a namespace/device digit, so only a trailing
/// `p<digits>` is a partition there; a bare `/dev/nvme0n1` is unchanged.
pub fn normalize_base_device(device: &str) -> String {
    let uses_p_suffix = device.contains("nvme") || device.contains("mmcblk");
    let without_digits = device.trim_end_matches(|c: char| c.is_ascii_digit());

    if uses_p_suffix {
        match without_digits.strip_suffix('p') {
            Some(base) if without_digits.len() < device.len() && !base.is_empty() => {
                base.to_string()
            }
            _ => device.to_string(),
        }
    } else if without_digits.is_empty() {
        device.to_string()
    } else {
        without_digits.to_string()
    }
}

/// `true` if `device` or `fs_type` names a virtual or pseudo filesystem.
pub fn is_virtual(device: &str, fs_type: &str) -> bool {
    VIRTUAL_DENYLIST
        .iter()
        .any(|deny| device.starts_with(deny) || fs_type.starts_with(deny))
}

pub fn is_real_device(device: &str) -> bool {
    REAL_DEVICE_PREFIXES.iter().any(|p| device.starts_with(p))
}

/// Drive type from a model string alone; `HDD` when nothing matches.
pub fn classify_model(model: &str) -> DriveType {
    let upper = model.to_ascii_uppercase();
    if upper.contains("SSD") {
        return DriveType::Ssd;
    }
    if upper.contains("NVME") {
        return DriveType::Nvme;
    }
    if upper.contains("HDD") {
        return DriveType::Hdd;
    }
    if SSD_MODEL_HINTS.iter().any(|h| upper.contains(h)) {
        return DriveType::Ssd;
    }
    if NVME_MODEL_HINTS.iter().any(|h| upper.contains(h)) {
        return DriveType::Nvme;
    }
    DriveType::Hdd
}

/// Resolve the type of a physical device: rotational flag, then the OS
/// media hint, then the model keywords.
fn classify_device(host: &HostEnv, device: &str, model: &str, media: MediaKind) -> DriveType {
    let is_nvme = device.contains("nvme");
    let solid_state = if is_nvme { DriveType::Nvme } else { DriveType::Ssd };

    match sysfs::rotational(host, device) {
        Some(false) => return solid_state,
        Some(true) => return DriveType::Hdd,
        None => {}
    }
    match media {
        MediaKind::Ssd => return solid_state,
        MediaKind::Hdd => return DriveType::Hdd,
        MediaKind::Unknown => {}
    }
    if is_nvme {
        return DriveType::Nvme;
    }
    classify_model(model)
}

/// Tier 1: fold partitions into one record per physical device.
pub fn from_partitions(host: &HostEnv, partitions: &[PartitionInfo]) -> Vec<DriveRecord> {
    if host.os == OsFamily::Windows {
        return windows_volumes(host, partitions);
    }

    let mut drives: Vec<DriveRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for part in partitions {
        if is_virtual(&part.device, &part.fs_type) {
            debug!("Skipping virtual filesystem {} ({})", part.device, part.fs_type);
            continue;
        }
        if !is_real_device(&part.device) {
            debug!("Skipping non-storage device {}", part.device);
            continue;
        }

        let base = normalize_base_device(&part.device);
        let usage = part.usage_percent();

        if let Some(&i) = index.get(&base) {
            let existing = &mut drives[i];
            existing.usage_percent = Some(existing.usage_percent.map_or(usage, |u| u.max(usage)));
            continue;
        }

        let model = sysfs::model(host, &base).unwrap_or_else(|| device_name(&base).to_string());
        let capacity_bytes = sysfs::size_bytes(host, &base).unwrap_or(part.total_bytes);
        let drive_type = classify_device(host, &base, &model, part.media);

        index.insert(base.clone(), drives.len());
        drives.push(DriveRecord {
            device: base,
            model,
            capacity_gb: bytes_to_gb(capacity_bytes),
            drive_type,
            usage_percent: Some(usage),
            health: crate::probe::UNKNOWN.to_string(),
            synthetic: false,
        });
    }
    drives
}

/// One line per lettered partition: `letter|disk number|disk bytes|disk model`.
pub const WINDOWS_DISK_QUERY: &str = "Get-Partition | Where-Object DriveLetter | ForEach-Object { \
$d = Get-Disk -Number $_.DiskNumber; \
\"$($_.DriveLetter)|$($_.DiskNumber)|$($d.Size)|$($d.FriendlyName)\" }";

/// Physical disk behind a drive letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowsDisk {
    pub number: u32,
    pub size_bytes: Option<u64>,
    pub model: Option<String>,
}

/// Parse [`WINDOWS_DISK_QUERY`] output into a drive-letter map.
pub fn parse_windows_disks(text: &str) -> HashMap<char, WindowsDisk> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.trim().splitn(4, '|');
            let letter = fields.next()?.trim().chars().next()?.to_ascii_uppercase();
            let number = fields.next()?.trim().parse().ok()?;
            let size_bytes = fields.next().and_then(|s| s.trim().parse().ok());
            let model = fields.next().and_then(parse::clean_value);
            Some((letter, WindowsDisk { number, size_bytes, model }))
        })
        .collect()
}

/// `C:\` → `C`.
fn drive_letter(part: &PartitionInfo) -> Option<char> {
    let mount = part.mount_point.to_string_lossy();
    let mut chars = mount.chars();
    let letter = chars.next()?;
    (letter.is_ascii_alphabetic() && chars.next() == Some(':')).then(|| letter.to_ascii_uppercase())
}

/// Windows volumes folded by physical disk number. A volume whose disk
/// cannot be resolved is reported on its own under its mount point.
fn windows_volumes(host: &HostEnv, partitions: &[PartitionInfo]) -> Vec<DriveRecord> {
    let disks = match host.run(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", WINDOWS_DISK_QUERY],
    ) {
        Ok(out) => parse_windows_disks(&out),
        Err(e) => {
            debug!("Disk number lookup failed, reporting volumes separately: {e}");
            HashMap::new()
        }
    };

    let mut drives: Vec<DriveRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for part in partitions.iter().filter(|p| p.total_bytes > 0) {
        let usage = part.usage_percent();
        let disk = drive_letter(part).and_then(|l| disks.get(&l));
        let device = match disk {
            Some(d) => format!(r"\\.\PhysicalDrive{}", d.number),
            None => part.mount_point.to_string_lossy().into_owned(),
        };

        if let Some(&i) = index.get(&device) {
            let existing = &mut drives[i];
            existing.usage_percent = Some(existing.usage_percent.map_or(usage, |u| u.max(usage)));
            continue;
        }

        let model = disk
            .and_then(|d| d.model.clone())
            .or_else(|| parse::clean_value(&part.device))
            .unwrap_or_else(|| "Local Disk".to_string());
        let capacity_bytes = disk.and_then(|d| d.size_bytes).unwrap_or(part.total_bytes);
        let drive_type = match part.media {
            MediaKind::Ssd => DriveType::Ssd,
            MediaKind::Hdd => DriveType::Hdd,
            MediaKind::Unknown => classify_model(&model),
        };

        index.insert(device.clone(), drives.len());
        drives.push(DriveRecord {
            device,
            model,
            capacity_gb: bytes_to_gb(capacity_bytes),
            drive_type,
            usage_percent: Some(usage),
            health: crate::probe::UNKNOWN.to_string(),
            synthetic: false,
        });
    }
    drives
}

/// `/dev/nvme0n1` → `nvme0n1`.
pub fn device_name(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}

/// Enumerate physical drives, falling back tier by tier. Never empty.
pub fn enumerate_drives(host: &HostEnv) -> Vec<DriveRecord> {
    let partitions = host.system.partitions();
    let mut drives = from_partitions(host, &partitions);
    if !drives.is_empty() {
        info!("Found {} drive(s) from {} partition(s)", drives.len(), partitions.len());
        return drives;
    }

    info!("No drives from mounted partitions, scanning block device registry");
    drives = sysfs::scan_block_devices(host);
    if drives.is_empty() {
        drives = sysfs::from_lsblk(host);
    }
    if drives.is_empty() {
        warn!("No drives detected by any strategy, emitting placeholder");
        drives.push(DriveRecord::placeholder());
    }
    drives
}

/// Fill in SMART health for every real drive.
pub fn annotate_health(host: &HostEnv, drives: &mut [DriveRecord]) {
    for drive in drives.iter_mut().filter(|d| !d.synthetic) {
        match host.run("smartctl", &["-H", &drive.device]) {
            Ok(out) => {
                if let Some(status) = parse::smartctl_health(&out) {
                    drive.health = status.to_string();
                }
            }
            Err(e) => debug!("smartctl -H {} failed: {e}", drive.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sata_partitions() {
        assert_eq!(normalize_base_device("/dev/sda1"), "/dev/sda");
        assert_eq!(normalize_base_device("/dev/sdb12"), "/dev/sdb");
        assert_eq!(normalize_base_device("/dev/sdc"), "/dev/sdc");
        assert_eq!(normalize_base_device("/dev/xvda1"), "/dev/xvda");
    }

    #[test]
    fn normalize_nvme_keeps_namespace_digit() {
        assert_eq!(normalize_base_device("/dev/nvme0n1p1"), "/dev/nvme0n1");
        assert_eq!(normalize_base_device("/dev/nvme0n1p2"), "/dev/nvme0n1");
        assert_eq!(normalize_base_device("/dev/nvme0n1"), "/dev/nvme0n1");
        assert_eq!(normalize_base_device("/dev/nvme1n2p15"), "/dev/nvme1n2");
    }

    #[test]
    fn windows_disk_lines() {
        let disks = parse_windows_disks(
            "C|0|512110190592|Samsung SSD 970 EVO Plus 500GB\r\nD|0|512110190592|Samsung SSD 970 EVO Plus 500GB\r\ne|1||\r\n\r\n",
        );
        assert_eq!(disks.len(), 3);
        assert_eq!(disks[&'C'].number, 0);
        assert_eq!(disks[&'D'].size_bytes, Some(512_110_190_592));
        assert_eq!(disks[&'E'], WindowsDisk { number: 1, size_bytes: None, model: None });
    }

    #[test]
    fn normalize_mmc_uses_p_rule() {
        assert_eq!(normalize_base_device("/dev/mmcblk0p1"), "/dev/mmcblk0");
        assert_eq!(normalize_base_device("/dev/mmcblk0"), "/dev/mmcblk0");
    }

    #[test]
    fn virtual_filesystems_are_denied() {
        assert!(is_virtual("/dev/loop3", "squashfs"));
        assert!(is_virtual("tmpfs", "tmpfs"));
        assert!(is_virtual("/dev/mapper/vg-root", "ext4"));
        assert!(!is_virtual("/dev/sda1", "ext4"));
    }

    #[test]
    fn model_keywords() {
        assert_eq!(classify_model("Samsung SSD 860 EVO 500GB"), DriveType::Ssd);
        assert_eq!(classify_model("WDC WDS500G3X0C-00SJG0 NVMe"), DriveType::Nvme);
        assert_eq!(classify_model("CT1000MX500SSD1"), DriveType::Ssd);
        assert_eq!(classify_model("ST1000LM035-1RK172"), DriveType::Hdd);
        assert_eq!(classify_model("SAMSUNG MZVLB512HBJQ-000L7 PM981"), DriveType::Ssd);
    }

    #[test]
    fn placeholder_is_synthetic() {
        let p = DriveRecord::placeholder();
        assert!(p.synthetic);
        assert_eq!(p.device, PLACEHOLDER_DEVICE);
        assert_eq!(p.drive_type, DriveType::Unknown);
    }

    #[test]
    fn gb_rounding() {
        assert_eq!(bytes_to_gb(512_110_190_592), 476.94);
        assert_eq!(bytes_to_gb(0), 0.0);
    }
}
