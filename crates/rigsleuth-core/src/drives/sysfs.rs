/// Block-device registry reads (`/sys/block/<dev>/...`) and the
/// registry-level fallbacks used when no mounted partition maps to a disk.
use super::{bytes_to_gb, classify_model, device_name, DriveRecord, DriveType};
use crate::platform::{HostEnv, MediaKind};
use crate::probe::{parse, UNKNOWN};

use tracing::debug;

/// Kernel block devices that are never physical disks.
const VIRTUAL_BLOCK_PREFIXES: &[&str] = &["loop", "ram", "zram", "sr", "dm-", "md"];

/// `/sys/block` sizes are always in 512-byte sectors.
const SECTOR_BYTES: u64 = 512;

fn block_attr(host: &HostEnv, device: &str, attr: &str) -> Option<String> {
    let path = format!("/sys/block/{}/{attr}", device_name(device));
    host.read_virtual(&path).ok()
}

pub fn model(host: &HostEnv, device: &str) -> Option<String> {
    block_attr(host, device, "device/model").and_then(|m| parse::clean_value(&m))
}

pub fn size_bytes(host: &HostEnv, device: &str) -> Option<u64> {
    block_attr(host, device, "size")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|sectors| sectors * SECTOR_BYTES)
        .filter(|bytes| *bytes > 0)
}

/// `Some(true)` for spinning media.
pub fn rotational(host: &HostEnv, device: &str) -> Option<bool> {
    match block_attr(host, device, "queue/rotational")?.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// Tier 2a: every non-virtual entry of `/sys/block` with a size.
pub fn scan_block_devices(host: &HostEnv) -> Vec<DriveRecord> {
    let names = match host.list_dir("/sys/block") {
        Ok(names) => names,
        Err(e) => {
            debug!("Cannot list /sys/block: {e}");
            return Vec::new();
        }
    };

    names
        .into_iter()
        .filter(|n| !VIRTUAL_BLOCK_PREFIXES.iter().any(|p| n.starts_with(p)))
        .filter_map(|name| {
            let device = format!("/dev/{name}");
            let bytes = size_bytes(host, &device)?;
            let model = model(host, &device).unwrap_or_else(|| name.clone());
            let drive_type = super::classify_device(host, &device, &model, MediaKind::Unknown);
            Some(DriveRecord {
                device,
                model,
                capacity_gb: bytes_to_gb(bytes),
                drive_type,
                usage_percent: None,
                health: UNKNOWN.to_string(),
                synthetic: false,
            })
        })
        .collect()
}

/// Tier 2b: `lsblk` disk rows.
pub fn from_lsblk(host: &HostEnv) -> Vec<DriveRecord> {
    let out = match host.run("lsblk", &["-d", "-b", "-n", "-o", "NAME,SIZE,ROTA,TYPE,MODEL"]) {
        Ok(out) => out,
        Err(e) => {
            debug!("lsblk unavailable: {e}");
            return Vec::new();
        }
    };

    parse::lsblk_rows(&out)
        .into_iter()
        .filter(|row| row.kind == "disk" && row.size_bytes > 0)
        .filter(|row| !VIRTUAL_BLOCK_PREFIXES.iter().any(|p| row.name.starts_with(p)))
        .map(|row| {
            let model = row.model.clone().unwrap_or_else(|| format!("Disk {}", row.name));
            let drive_type = match row.rotational {
                Some(true) => DriveType::Hdd,
                Some(false) if row.name.starts_with("nvme") => DriveType::Nvme,
                Some(false) => DriveType::Ssd,
                None => classify_model(&model),
            };
            DriveRecord {
                device: format!("/dev/{}", row.name),
                model,
                capacity_gb: bytes_to_gb(row.size_bytes),
                drive_type,
                usage_percent: None,
                health: UNKNOWN.to_string(),
                synthetic: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::platform::{CommandRunner, OsFamily, SysinfoSource};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    struct Lsblk(&'static str);
    impl CommandRunner for Lsblk {
        fn run(&self, program: &str, _args: &[&str]) -> Result<String, ProbeError> {
            match program {
                "lsblk" => Ok(self.0.to_string()),
                _ => Err(ProbeError::Unavailable(program.into())),
            }
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn host(root: &Path, lsblk: &'static str) -> HostEnv {
        HostEnv::new(root, OsFamily::Linux, Arc::new(Lsblk(lsblk)), Arc::new(SysinfoSource))
    }

    #[test]
    fn block_scan_skips_virtual_devices() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "sys/block/nvme0n1/size", "1000215216\n");
        write(tmp.path(), "sys/block/nvme0n1/queue/rotational", "0\n");
        write(tmp.path(), "sys/block/nvme0n1/device/model", "Samsung SSD 970 EVO Plus 500GB\n");
        write(tmp.path(), "sys/block/loop0/size", "131072\n");
        write(tmp.path(), "sys/block/sda/size", "0\n");

        let drives = scan_block_devices(&host(tmp.path(), ""));
        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].device, "/dev/nvme0n1");
        assert_eq!(drives[0].drive_type, DriveType::Nvme);
        assert_eq!(drives[0].capacity_gb, 476.94);
        assert!(!drives[0].synthetic);
    }

    #[test]
    fn rotational_flag_values() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "sys/block/sda/queue/rotational", "1\n");
        write(tmp.path(), "sys/block/sdb/queue/rotational", "junk\n");
        let host = host(tmp.path(), "");
        assert_eq!(rotational(&host, "/dev/sda"), Some(true));
        assert_eq!(rotational(&host, "/dev/sdb"), None);
        assert_eq!(rotational(&host, "/dev/sdc"), None);
    }

    #[test]
    fn lsblk_keeps_only_disks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = "sda 500107862016 1 disk ST500LM012 HN-M500MBB\n\
                   sr0 1073741312 1 rom DVD-RW\n\
                   nvme0n1 256060514304 0 disk\n";
        let drives = from_lsblk(&host(tmp.path(), out));
        assert_eq!(drives.len(), 2);
        assert_eq!(drives[0].drive_type, DriveType::Hdd);
        assert_eq!(drives[1].drive_type, DriveType::Nvme);
        assert_eq!(drives[1].model, "Disk nvme0n1");
    }
}
