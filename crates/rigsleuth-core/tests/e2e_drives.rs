/// End-to-end drive classification tests against a fake `/sys/block` tree
/// and seeded partition lists.
mod common;

use common::{partition, wait_complete, FakeMachine, ScriptedRunner, SeededSystem};
use rigsleuth_core::drives::{enumerate_drives, DriveType, PLACEHOLDER_DEVICE, WINDOWS_DISK_QUERY};
use rigsleuth_core::platform::{HostEnv, MediaKind, OsFamily, PartitionInfo};
use rigsleuth_core::snapshot::InfoKey;
use rigsleuth_core::{Engine, EngineConfig};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Register a disk under `/sys/block/<name>`.
fn block_device(machine: &FakeMachine, name: &str, sectors: u64, model: &str, rotational: &str) {
    machine.write(&format!("/sys/block/{name}/size"), &format!("{sectors}\n"));
    machine.write(&format!("/sys/block/{name}/device/model"), &format!("{model}\n"));
    machine.write(&format!("/sys/block/{name}/queue/rotational"), &format!("{rotational}\n"));
}

/// A lettered Windows volume on an SSD.
fn volume(letter: char, total_gb: u64, used_gb: u64) -> PartitionInfo {
    PartitionInfo {
        device: "Local Disk".into(),
        fs_type: "NTFS".into(),
        media: MediaKind::Ssd,
        ..partition("", &format!("{letter}:\\"), total_gb, used_gb)
    }
}

fn with_partitions(partitions: Vec<PartitionInfo>) -> SeededSystem {
    SeededSystem {
        partitions,
        ..SeededSystem::minimal()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// Two NVMe partitions fold into one device; capacity comes from the
/// block registry, usage is the highest partition's.
#[test]
fn nvme_partitions_fold_into_one_drive() {
    let machine = FakeMachine::new();
    block_device(&machine, "nvme0n1", 1_000_215_216, "Samsung SSD 970 EVO Plus 500GB", "0");
    let host = machine.host(
        ScriptedRunner::default(),
        with_partitions(vec![
            partition("/dev/nvme0n1p1", "/boot/efi", 1, 0),
            partition("/dev/nvme0n1p2", "/", 400, 300),
        ]),
    );

    let drives = enumerate_drives(&host);
    assert_eq!(drives.len(), 1, "{drives:?}");
    let d = &drives[0];
    assert_eq!(d.device, "/dev/nvme0n1");
    assert_eq!(d.model, "Samsung SSD 970 EVO Plus 500GB");
    assert_eq!(d.drive_type, DriveType::Nvme);
    assert_eq!(d.capacity_gb, 476.94);
    assert_eq!(d.usage_percent, Some(75.0));
    assert!(!d.synthetic);
}

/// Distinct SATA devices stay distinct and are typed by the rotational flag.
#[test]
fn separate_disks_stay_separate() {
    let machine = FakeMachine::new();
    block_device(&machine, "sda", 500_118_192, "CT250MX500SSD1", "0");
    block_device(&machine, "sdb", 3_907_029_168, "ST2000DM008-2FR102", "1");
    let host = machine.host(
        ScriptedRunner::default(),
        with_partitions(vec![
            partition("/dev/sda1", "/", 200, 50),
            partition("/dev/sdb1", "/srv/media", 1800, 1700),
        ]),
    );

    let drives = enumerate_drives(&host);
    let summary: Vec<(&str, DriveType)> = drives
        .iter()
        .map(|d| (d.device.as_str(), d.drive_type))
        .collect();
    assert_eq!(
        summary,
        [("/dev/sda", DriveType::Ssd), ("/dev/sdb", DriveType::Hdd)]
    );
}

/// Pseudo filesystems and loop mounts never become drives.
#[test]
fn virtual_filesystems_are_skipped() {
    let machine = FakeMachine::new();
    let mut tmpfs = partition("tmpfs", "/run", 2, 1);
    tmpfs.fs_type = "tmpfs".into();
    let mut snap = partition("/dev/loop3", "/snap/core22/1380", 1, 1);
    snap.fs_type = "squashfs".into();
    let host = machine.host(
        ScriptedRunner::default(),
        with_partitions(vec![tmpfs, snap, partition("/dev/vda1", "/", 40, 10)]),
    );

    let drives = enumerate_drives(&host);
    assert_eq!(drives.len(), 1);
    assert_eq!(drives[0].device, "/dev/vda");
}

/// With nothing mounted, the block registry is scanned.
#[test]
fn block_registry_fallback() {
    let machine = FakeMachine::new();
    block_device(&machine, "sda", 976_773_168, "WDC WD5000AAKX-00ERMA0", "1");
    machine.write("/sys/block/loop0/size", "129024\n");
    machine.write("/sys/block/sr0/size", "2097151\n");
    let host = machine.host(ScriptedRunner::default(), SeededSystem::minimal());

    let drives = enumerate_drives(&host);
    assert_eq!(drives.len(), 1, "{drives:?}");
    assert_eq!(drives[0].device, "/dev/sda");
    assert_eq!(drives[0].drive_type, DriveType::Hdd);
    assert_eq!(drives[0].usage_percent, None);
}

/// `lsblk` is the last real source.
#[test]
fn lsblk_fallback() {
    let machine = FakeMachine::new();
    let runner = ScriptedRunner::default().output(
        "lsblk -d -b -n -o NAME,SIZE,ROTA,TYPE,MODEL",
        "loop0     56872960 0 loop \nsr0     1073741312 1 rom  DVD-RAM\nmmcblk0 31914983424 0 disk \n",
    );
    let host = machine.host(runner, SeededSystem::minimal());

    let drives = enumerate_drives(&host);
    assert_eq!(drives.len(), 1, "{drives:?}");
    assert_eq!(drives[0].device, "/dev/mmcblk0");
    assert_eq!(drives[0].capacity_gb, 29.72);
}

/// When every strategy comes up empty there is exactly one placeholder.
#[test]
fn nothing_found_yields_single_placeholder() {
    let machine = FakeMachine::new();
    let host = machine.host(ScriptedRunner::default(), SeededSystem::minimal());

    let drives = enumerate_drives(&host);
    assert_eq!(drives.len(), 1);
    assert!(drives[0].synthetic);
    assert_eq!(drives[0].device, PLACEHOLDER_DEVICE);
    assert_eq!(drives[0].drive_type, DriveType::Unknown);
}

/// Through the engine: the drives worker adds SMART health and the
/// snapshot exports the list.
#[test]
fn drives_worker_reports_smart_health() {
    let machine = FakeMachine::new();
    block_device(&machine, "sda", 500_118_192, "Samsung SSD 860 EVO 250GB", "0");
    let runner = ScriptedRunner::default().output(
        "smartctl -H /dev/sda",
        "=== START OF READ SMART DATA SECTION ===\nSMART overall-health self-assessment test result: PASSED\n",
    );
    let config = EngineConfig {
        sys_root: machine.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::with_host(
        config,
        machine.host(runner, with_partitions(vec![partition("/dev/sda2", "/", 200, 20)])),
    );

    let handle = engine.gather(false);
    wait_complete(&handle.store);
    let snap = handle.snapshot();

    let drives = snap.drives.as_deref().unwrap();
    assert_eq!(drives.len(), 1);
    assert_eq!(drives[0].health, "Healthy");
    assert!(!snap.has_no_real_drives());

    let map = snap.to_flat_map();
    assert_eq!(map[InfoKey::Drives.as_str()][0]["device"], "/dev/sda");
    assert_eq!(map[InfoKey::Drives.as_str()][0]["type"], "SSD");
}

/// Windows volumes on the same physical disk fold into one drive; a
/// volume whose disk is unknown stays on its own.
#[test]
fn windows_volumes_fold_by_disk_number() {
    let machine = FakeMachine::new();
    let runner = ScriptedRunner::default().output(
        &format!("powershell -NoProfile -NonInteractive -Command {WINDOWS_DISK_QUERY}"),
        "C|0|512110190592|Samsung SSD 970 EVO Plus 500GB\r\n\
         D|0|512110190592|Samsung SSD 970 EVO Plus 500GB\r\n\
         E|1|32017047552|SanDisk Ultra\r\n",
    );
    let system = with_partitions(vec![
        volume('C', 400, 100),
        volume('D', 70, 63),
        volume('E', 29, 3),
        volume('F', 10, 1),
    ]);
    let host = HostEnv::new(machine.path(), OsFamily::Windows, Arc::new(runner), Arc::new(system));

    let drives = enumerate_drives(&host);
    let devices: Vec<&str> = drives.iter().map(|d| d.device.as_str()).collect();
    assert_eq!(devices, [r"\\.\PhysicalDrive0", r"\\.\PhysicalDrive1", "F:\\"]);

    let system_disk = &drives[0];
    assert_eq!(system_disk.model, "Samsung SSD 970 EVO Plus 500GB");
    assert_eq!(system_disk.capacity_gb, 476.94);
    assert_eq!(system_disk.drive_type, DriveType::Ssd);
    let usage = system_disk.usage_percent.unwrap();
    assert!((usage - 90.0).abs() < 0.01, "usage {usage}");

    assert_eq!(drives[1].model, "SanDisk Ultra");
    assert_eq!(drives[2].model, "Local Disk");
}
