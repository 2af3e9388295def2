/// The gathered result and its shared, concurrently-written store.
///
/// Category workers write field by field through [`SnapshotStore::apply`];
/// readers clone a consistent [`Snapshot`] at any time. The external
/// representation is [`Snapshot::to_flat_map`]: stable string keys
/// ([`InfoKey::as_str`]) mapped to scalars, plus the `drives` list and the
/// `health` map.
pub mod model;

pub use model::{
    AdapterInfo, BatteryInfo, BootAnalysis, HealthMetrics, HealthStatus, Metric, NetworkInfo,
};

use crate::drives::DriveRecord;
use crate::probe::{is_meaningful, UNKNOWN};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Stable identifier of one snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InfoKey {
    // Basic identity
    Os,
    Kernel,
    BootTime,
    BootAnalysis,
    BatteryInfo,
    AvailableUpdates,
    BasicInfoLoaded,
    BasicInfoError,
    // Hardware
    Manufacturer,
    ProductModel,
    SerialNumber,
    BaseboardManufacturer,
    BaseboardProduct,
    BiosVendor,
    BiosVersion,
    BiosReleaseDate,
    BiosMode,
    Cpu,
    CpuCores,
    Memory,
    Graphics,
    RamType,
    RamSpeed,
    RamFormFactor,
    RamUpgradable,
    RamDetails,
    HardwareInfoLoaded,
    HardwareInfoError,
    // Storage
    Drives,
    DrivesScanComplete,
    DrivesError,
    // Network
    Network,
    NetworkInfoLoaded,
    NetworkInfoError,
    // Live health
    Health,
    HealthMetricsLoaded,
    HealthMetricsError,
}

impl InfoKey {
    /// Plain string fields, in report order.
    pub const TEXT_KEYS: [InfoKey; 21] = [
        InfoKey::Os,
        InfoKey::Kernel,
        InfoKey::BootTime,
        InfoKey::Manufacturer,
        InfoKey::ProductModel,
        InfoKey::SerialNumber,
        InfoKey::BaseboardManufacturer,
        InfoKey::BaseboardProduct,
        InfoKey::BiosVendor,
        InfoKey::BiosVersion,
        InfoKey::BiosReleaseDate,
        InfoKey::BiosMode,
        InfoKey::Cpu,
        InfoKey::CpuCores,
        InfoKey::Memory,
        InfoKey::Graphics,
        InfoKey::RamType,
        InfoKey::RamSpeed,
        InfoKey::RamFormFactor,
        InfoKey::RamUpgradable,
        InfoKey::RamDetails,
    ];

    /// Completion flags; a snapshot is complete when all are set.
    pub const COMPLETION_FLAGS: [InfoKey; 5] = [
        InfoKey::BasicInfoLoaded,
        InfoKey::HardwareInfoLoaded,
        InfoKey::DrivesScanComplete,
        InfoKey::NetworkInfoLoaded,
        InfoKey::HealthMetricsLoaded,
    ];

    pub const ERROR_KEYS: [InfoKey; 5] = [
        InfoKey::BasicInfoError,
        InfoKey::HardwareInfoError,
        InfoKey::DrivesError,
        InfoKey::NetworkInfoError,
        InfoKey::HealthMetricsError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::Kernel => "kernel",
            Self::BootTime => "boot_time",
            Self::BootAnalysis => "boot_analysis",
            Self::BatteryInfo => "battery_info",
            Self::AvailableUpdates => "available_updates",
            Self::BasicInfoLoaded => "basic_info_loaded",
            Self::BasicInfoError => "basic_info_error",
            Self::Manufacturer => "manufacturer",
            Self::ProductModel => "product_model",
            Self::SerialNumber => "serial_number",
            Self::BaseboardManufacturer => "baseboard_manufacturer",
            Self::BaseboardProduct => "baseboard_product",
            Self::BiosVendor => "bios_vendor",
            Self::BiosVersion => "bios_version",
            Self::BiosReleaseDate => "bios_release_date",
            Self::BiosMode => "bios_mode",
            Self::Cpu => "cpu",
            Self::CpuCores => "cpu_cores",
            Self::Memory => "memory",
            Self::Graphics => "graphics",
            Self::RamType => "ram_type",
            Self::RamSpeed => "ram_speed",
            Self::RamFormFactor => "ram_form_factor",
            Self::RamUpgradable => "ram_upgradable",
            Self::RamDetails => "ram_details",
            Self::HardwareInfoLoaded => "hardware_info_loaded",
            Self::HardwareInfoError => "hardware_info_error",
            Self::Drives => "drives",
            Self::DrivesScanComplete => "drives_scan_complete",
            Self::DrivesError => "drives_error",
            Self::Network => "network",
            Self::NetworkInfoLoaded => "network_info_loaded",
            Self::NetworkInfoError => "network_info_error",
            Self::Health => "health",
            Self::HealthMetricsLoaded => "health_metrics_loaded",
            Self::HealthMetricsError => "health_metrics_error",
        }
    }

    pub fn is_completion_flag(self) -> bool {
        Self::COMPLETION_FLAGS.contains(&self)
    }
}

/// A value written to one [`InfoKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoValue {
    Text(String),
    Count(u32),
    Flag(bool),
    Drives(Vec<DriveRecord>),
    Health(HealthMetrics),
    Network(NetworkInfo),
    Battery(BatteryInfo),
    Boot(BootAnalysis),
}

/// One published field change.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoUpdate {
    /// Gather cycle that produced the value.
    pub generation: u64,
    pub key: InfoKey,
    pub value: InfoValue,
}

/// Everything known about the machine so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,

    pub os: Option<String>,
    pub kernel: Option<String>,
    pub boot_time: Option<String>,
    pub boot_analysis: Option<BootAnalysis>,
    pub battery_info: Option<BatteryInfo>,
    pub available_updates: Option<u32>,

    pub manufacturer: Option<String>,
    pub product_model: Option<String>,
    pub serial_number: Option<String>,
    pub baseboard_manufacturer: Option<String>,
    pub baseboard_product: Option<String>,
    pub bios_vendor: Option<String>,
    pub bios_version: Option<String>,
    pub bios_release_date: Option<String>,
    pub bios_mode: Option<String>,
    pub cpu: Option<String>,
    pub cpu_cores: Option<String>,
    pub memory: Option<String>,
    pub graphics: Option<String>,
    pub ram_type: Option<String>,
    pub ram_speed: Option<String>,
    pub ram_form_factor: Option<String>,
    pub ram_upgradable: Option<String>,
    pub ram_details: Option<String>,

    pub drives: Option<Vec<DriveRecord>>,
    pub network: Option<NetworkInfo>,
    pub health: Option<HealthMetrics>,

    pub basic_info_loaded: bool,
    pub hardware_info_loaded: bool,
    pub drives_scan_complete: bool,
    pub network_info_loaded: bool,
    pub health_metrics_loaded: bool,

    pub basic_info_error: Option<String>,
    pub hardware_info_error: Option<String>,
    pub drives_error: Option<String>,
    pub network_info_error: Option<String>,
    pub health_metrics_error: Option<String>,
}

impl Snapshot {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    fn text_slot(&self, key: InfoKey) -> Option<&Option<String>> {
        Some(match key {
            InfoKey::Os => &self.os,
            InfoKey::Kernel => &self.kernel,
            InfoKey::BootTime => &self.boot_time,
            InfoKey::Manufacturer => &self.manufacturer,
            InfoKey::ProductModel => &self.product_model,
            InfoKey::SerialNumber => &self.serial_number,
            InfoKey::BaseboardManufacturer => &self.baseboard_manufacturer,
            InfoKey::BaseboardProduct => &self.baseboard_product,
            InfoKey::BiosVendor => &self.bios_vendor,
            InfoKey::BiosVersion => &self.bios_version,
            InfoKey::BiosReleaseDate => &self.bios_release_date,
            InfoKey::BiosMode => &self.bios_mode,
            InfoKey::Cpu => &self.cpu,
            InfoKey::CpuCores => &self.cpu_cores,
            InfoKey::Memory => &self.memory,
            InfoKey::Graphics => &self.graphics,
            InfoKey::RamType => &self.ram_type,
            InfoKey::RamSpeed => &self.ram_speed,
            InfoKey::RamFormFactor => &self.ram_form_factor,
            InfoKey::RamUpgradable => &self.ram_upgradable,
            InfoKey::RamDetails => &self.ram_details,
            InfoKey::BasicInfoError => &self.basic_info_error,
            InfoKey::HardwareInfoError => &self.hardware_info_error,
            InfoKey::DrivesError => &self.drives_error,
            InfoKey::NetworkInfoError => &self.network_info_error,
            InfoKey::HealthMetricsError => &self.health_metrics_error,
            _ => return None,
        })
    }

    fn text_slot_mut(&mut self, key: InfoKey) -> Option<&mut Option<String>> {
        Some(match key {
            InfoKey::Os => &mut self.os,
            InfoKey::Kernel => &mut self.kernel,
            InfoKey::BootTime => &mut self.boot_time,
            InfoKey::Manufacturer => &mut self.manufacturer,
            InfoKey::ProductModel => &mut self.product_model,
            InfoKey::SerialNumber => &mut self.serial_number,
            InfoKey::BaseboardManufacturer => &mut self.baseboard_manufacturer,
            InfoKey::BaseboardProduct => &mut self.baseboard_product,
            InfoKey::BiosVendor => &mut self.bios_vendor,
            InfoKey::BiosVersion => &mut self.bios_version,
            InfoKey::BiosReleaseDate => &mut self.bios_release_date,
            InfoKey::BiosMode => &mut self.bios_mode,
            InfoKey::Cpu => &mut self.cpu,
            InfoKey::CpuCores => &mut self.cpu_cores,
            InfoKey::Memory => &mut self.memory,
            InfoKey::Graphics => &mut self.graphics,
            InfoKey::RamType => &mut self.ram_type,
            InfoKey::RamSpeed => &mut self.ram_speed,
            InfoKey::RamFormFactor => &mut self.ram_form_factor,
            InfoKey::RamUpgradable => &mut self.ram_upgradable,
            InfoKey::RamDetails => &mut self.ram_details,
            InfoKey::BasicInfoError => &mut self.basic_info_error,
            InfoKey::HardwareInfoError => &mut self.hardware_info_error,
            InfoKey::DrivesError => &mut self.drives_error,
            InfoKey::NetworkInfoError => &mut self.network_info_error,
            InfoKey::HealthMetricsError => &mut self.health_metrics_error,
            _ => return None,
        })
    }

    fn flag_mut(&mut self, key: InfoKey) -> Option<&mut bool> {
        Some(match key {
            InfoKey::BasicInfoLoaded => &mut self.basic_info_loaded,
            InfoKey::HardwareInfoLoaded => &mut self.hardware_info_loaded,
            InfoKey::DrivesScanComplete => &mut self.drives_scan_complete,
            InfoKey::NetworkInfoLoaded => &mut self.network_info_loaded,
            InfoKey::HealthMetricsLoaded => &mut self.health_metrics_loaded,
            _ => return None,
        })
    }

    /// Current value of a string field.
    pub fn text(&self, key: InfoKey) -> Option<&str> {
        self.text_slot(key).and_then(|v| v.as_deref())
    }

    /// A string field, with [`UNKNOWN`] for anything unresolved.
    pub fn text_or_unknown(&self, key: InfoKey) -> &str {
        self.text(key).unwrap_or(UNKNOWN)
    }

    pub fn flag(&self, key: InfoKey) -> bool {
        match key {
            InfoKey::BasicInfoLoaded => self.basic_info_loaded,
            InfoKey::HardwareInfoLoaded => self.hardware_info_loaded,
            InfoKey::DrivesScanComplete => self.drives_scan_complete,
            InfoKey::NetworkInfoLoaded => self.network_info_loaded,
            InfoKey::HealthMetricsLoaded => self.health_metrics_loaded,
            _ => false,
        }
    }

    /// Write one field. Returns `false` if `value` does not fit `key`.
    ///
    /// Fields are never cleared: an "Unknown" text value does not replace
    /// an already-resolved one.
    pub fn apply(&mut self, key: InfoKey, value: InfoValue) -> bool {
        match value {
            InfoValue::Text(text) => match self.text_slot_mut(key) {
                Some(slot) => {
                    let downgrade =
                        !is_meaningful(&text) && slot.as_deref().is_some_and(is_meaningful);
                    if !downgrade {
                        *slot = Some(text);
                    }
                    true
                }
                None => false,
            },
            InfoValue::Flag(set) => match self.flag_mut(key) {
                Some(flag) => {
                    *flag |= set;
                    true
                }
                None => false,
            },
            InfoValue::Count(n) if key == InfoKey::AvailableUpdates => {
                self.available_updates = Some(n);
                true
            }
            InfoValue::Drives(drives) if key == InfoKey::Drives => {
                self.drives = Some(drives);
                true
            }
            InfoValue::Health(health) if key == InfoKey::Health => {
                self.health = Some(health);
                true
            }
            InfoValue::Network(network) if key == InfoKey::Network => {
                self.network = Some(network);
                true
            }
            InfoValue::Battery(battery) if key == InfoKey::BatteryInfo => {
                self.battery_info = Some(battery);
                true
            }
            InfoValue::Boot(boot) if key == InfoKey::BootAnalysis => {
                self.boot_analysis = Some(boot);
                true
            }
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        InfoKey::COMPLETION_FLAGS.iter().all(|k| self.flag(*k))
    }

    /// `true` if the only drive present is the synthetic placeholder.
    pub fn has_no_real_drives(&self) -> bool {
        self.drives
            .as_ref()
            .map_or(true, |d| d.iter().all(|r| r.synthetic))
    }

    /// External key→value representation.
    pub fn to_flat_map(&self) -> Map<String, Value> {
        let mut map = Map::new();

        for key in InfoKey::TEXT_KEYS {
            map.insert(key.as_str().into(), Value::from(self.text_or_unknown(key)));
        }
        for key in InfoKey::COMPLETION_FLAGS {
            map.insert(key.as_str().into(), Value::Bool(self.flag(key)));
        }
        for key in InfoKey::ERROR_KEYS {
            if let Some(err) = self.text(key) {
                map.insert(key.as_str().into(), Value::from(err));
            }
        }

        if let Some(n) = self.available_updates {
            map.insert(InfoKey::AvailableUpdates.as_str().into(), Value::from(n));
        }
        if let Some(boot) = &self.boot_analysis {
            map.insert(InfoKey::BootAnalysis.as_str().into(), to_value(boot));
        }
        if let Some(battery) = &self.battery_info {
            map.insert(InfoKey::BatteryInfo.as_str().into(), to_value(battery));
        }
        if let Some(network) = &self.network {
            if let Some(ip) = &network.ip_address {
                map.insert("ip_address".into(), Value::from(ip.as_str()));
            }
            map.insert(InfoKey::Network.as_str().into(), to_value(network));
        }

        let drives = self.drives.as_deref().unwrap_or_default();
        map.insert(
            InfoKey::Drives.as_str().into(),
            Value::Array(drives.iter().map(to_value).collect()),
        );

        if let Some(health) = &self.health {
            let mut metrics = Map::new();
            for (name, metric) in health.entries() {
                let mut entry = Map::new();
                entry.insert(
                    "value".into(),
                    metric.value.map_or(Value::from(UNKNOWN), |v| Value::from(round1(v))),
                );
                entry.insert("status".into(), Value::from(metric.status.label()));
                metrics.insert(name.into(), Value::Object(entry));
            }
            map.insert(InfoKey::Health.as_str().into(), Value::Object(metrics));
        }

        map
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn round1(v: f32) -> f64 {
    (f64::from(v) * 10.0).round() / 10.0
}

struct Shared {
    snapshot: RwLock<Snapshot>,
    /// Bumped on every write; paired with `changed` for waiters.
    version: Mutex<u64>,
    changed: Condvar,
}

/// Shared, concurrently-written [`Snapshot`].
///
/// Writers take the write lock for a single field at a time, so a reader
/// never sees a half-written compound value.
#[derive(Clone)]
pub struct SnapshotStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    pub fn new(generation: u64) -> Self {
        Self::from_snapshot(Snapshot::new(generation))
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            shared: Arc::new(Shared {
                snapshot: RwLock::new(snapshot),
                version: Mutex::new(0),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.shared.snapshot.read().generation
    }

    /// Apply one update. Updates from another generation are still applied
    /// when they target this store; generation filtering is the observer's job.
    pub fn apply(&self, key: InfoKey, value: InfoValue) -> bool {
        let applied = self.shared.snapshot.write().apply(key, value);
        if !applied {
            warn!("Ignoring value of the wrong shape for {}", key.as_str());
            return false;
        }
        let mut version = self.shared.version.lock();
        *version += 1;
        self.shared.changed.notify_all();
        true
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.read().clone()
    }

    /// Run `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.shared.snapshot.read())
    }

    /// A new store holding a copy of the current state. Later writes to
    /// either store are not seen by the other.
    pub fn detached(&self) -> Self {
        Self::from_snapshot(self.snapshot())
    }

    pub fn is_complete(&self) -> bool {
        self.read(Snapshot::is_complete)
    }

    /// Block until every completion flag is set or `timeout` elapses.
    /// Returns whether the snapshot completed.
    pub fn wait_until_complete(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut version = self.shared.version.lock();
        loop {
            if self.is_complete() {
                return true;
            }
            if self.shared.changed.wait_until(&mut version, deadline).timed_out() {
                return self.is_complete();
            }
        }
    }
}
