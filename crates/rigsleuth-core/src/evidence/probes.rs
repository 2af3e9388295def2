/// The evidence probes fed to [`super::EvidenceScorer`].
use super::{EvidenceProbe, KnownFacts, Signal};
use crate::error::ProbeError;
use crate::platform::{HostEnv, OsFamily};
use crate::probe::{parse, CommandProbe, Probe};

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const CHASSIS_FILES: &[&str] = &[
    "/sys/class/dmi/id/chassis_type",
    "/sys/devices/virtual/dmi/id/chassis_type",
];

const DESKTOP_NAME_HINTS: &[&str] = &[
    "desktop",
    "tower",
    "workstation",
    "optiplex",
    "precision",
    "prodesk",
    "elitedesk",
];

const ULTRABOOK_NAME_HINTS: &[&str] = &[
    "ultrabook",
    "ultra slim",
    "ultrathin",
    "ultra thin",
    "carbon",
    "air",
    "xps",
    "spectre",
    "surface",
    "yoga slim",
    "swift",
    "360",
    "2-in-1",
    "2 in 1",
];

const SLOT_TERMS: &[&str] = &["sodimm", "so-dimm", "dimm"];
const SOLDERED_TERMS: &[&str] = &[
    "soldered",
    "onboard",
    "non-removable",
    "bga",
    "lpddr",
    "row of chips",
];

/// Memory sizes in MB that move the score.
const SMALL_MEMORY_MB: u64 = 4096;
const LARGE_MEMORY_MB: u64 = 16384;

/// Every probe, in the order they run.
pub fn standard() -> Vec<Box<dyn EvidenceProbe>> {
    vec![
        Box::new(ChassisProbe),
        Box::new(BatteryProbe),
        Box::new(CpuClassProbe),
        Box::new(ProductNameProbe),
        Box::new(MemorySizeProbe),
        Box::new(MemoryArrayProbe),
        Box::new(MemoryModuleProbe),
        Box::new(PciProbe),
    ]
}

/// Chassis from the SMBIOS enclosure type code.
pub struct ChassisProbe;

/// Signal for an SMBIOS chassis type code.
pub fn chassis_code_signal(code: u32) -> Option<Signal> {
    match code {
        3..=8 | 13 => Some(Signal::DesktopChassis),
        9 | 10 => Some(Signal::LaptopChassis),
        11 | 14 => Some(Signal::HandheldChassis),
        _ => None,
    }
}

/// Signal for a `hostnamectl` chassis word.
fn chassis_word_signal(word: &str) -> Option<Signal> {
    match word {
        "desktop" => Some(Signal::DesktopChassis),
        "laptop" | "convertible" => Some(Signal::LaptopChassis),
        "tablet" | "handset" => Some(Signal::HandheldChassis),
        _ => None,
    }
}

impl ChassisProbe {
    fn chassis_code(host: &HostEnv) -> Option<u32> {
        let from_files = CHASSIS_FILES
            .iter()
            .find_map(|path| host.read_virtual(path).ok());
        let raw = match from_files {
            Some(raw) => raw,
            None if host.os == OsFamily::Windows => {
                CommandProbe::cim("Win32_SystemEnclosure", "ChassisTypes")
                    .attempt(host)
                    .ok()?
                    .value
            }
            None => return None,
        };
        raw.trim().parse().ok()
    }
}

impl EvidenceProbe for ChassisProbe {
    fn name(&self) -> &str {
        "chassis type"
    }

    fn collect(&self, host: &HostEnv, _facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        if let Some(code) = Self::chassis_code(host) {
            return Ok(chassis_code_signal(code).into_iter().collect());
        }
        let out = host.run("hostnamectl", &[])?;
        let word = parse::hostnamectl_chassis(&out)
            .ok_or_else(|| ProbeError::malformed("hostnamectl", "no Chassis line"))?;
        Ok(chassis_word_signal(&word).into_iter().collect())
    }
}

/// A battery means a portable machine.
pub struct BatteryProbe;

impl EvidenceProbe for BatteryProbe {
    fn name(&self) -> &str {
        "battery"
    }

    fn collect(&self, host: &HostEnv, _facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        let present = match host.os {
            OsFamily::Windows => CommandProbe::cim("Win32_Battery", "Name").attempt(host).is_ok(),
            _ => host
                .list_dir("/sys/class/power_supply")?
                .iter()
                .any(|name| is_battery_supply(host, name)),
        };
        Ok(if present {
            vec![Signal::BatteryPresent]
        } else {
            Vec::new()
        })
    }
}

fn is_battery_supply(host: &HostEnv, name: &str) -> bool {
    if name.starts_with("BAT") || name.eq_ignore_ascii_case("battery") {
        return true;
    }
    host.read_virtual(&format!("/sys/class/power_supply/{name}/type"))
        .is_ok_and(|kind| kind.trim() == "Battery")
}

/// U- and Y-series CPUs ship in thin machines.
pub struct CpuClassProbe;

/// `true` for low-power mobile SKUs such as `i7-8565U` or `m3-8Y30`.
pub fn is_low_power_cpu(cpu: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\b\d{3,5}[a-z]?[uy]\b|\b\d[uy]\d{2}\b|-[uy]\b)").ok()
    })
    .as_ref()
    .is_some_and(|re| re.is_match(cpu))
}

impl EvidenceProbe for CpuClassProbe {
    fn name(&self) -> &str {
        "cpu class"
    }

    fn collect(&self, _host: &HostEnv, facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        let cpu = facts
            .cpu
            .as_deref()
            .ok_or_else(|| ProbeError::Unavailable("cpu model".into()))?;
        Ok(if is_low_power_cpu(cpu) {
            vec![Signal::LowPowerCpu]
        } else {
            Vec::new()
        })
    }
}

/// Marketing names that give the form factor away.
pub struct ProductNameProbe;

impl EvidenceProbe for ProductNameProbe {
    fn name(&self) -> &str {
        "product name"
    }

    fn collect(&self, _host: &HostEnv, facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        let product = facts
            .product
            .as_deref()
            .ok_or_else(|| ProbeError::Unavailable("product name".into()))?
            .to_lowercase();
        let mut signals = Vec::new();
        if ULTRABOOK_NAME_HINTS.iter().any(|h| product.contains(h)) {
            signals.push(Signal::UltrabookProductName);
        }
        if DESKTOP_NAME_HINTS.iter().any(|h| product.contains(h)) {
            signals.push(Signal::DesktopProductName);
        }
        Ok(signals)
    }
}

/// Installed memory size.
pub struct MemorySizeProbe;

pub fn memory_size_signals(total_bytes: u64) -> Vec<Signal> {
    let mb = total_bytes / (1024 * 1024);
    let mut signals = Vec::new();
    if mb == 0 {
        return signals;
    }
    if mb < SMALL_MEMORY_MB {
        signals.push(Signal::SmallMemory);
    } else if mb > LARGE_MEMORY_MB {
        signals.push(Signal::LargeMemory);
    }
    if mb.is_power_of_two() {
        signals.push(Signal::PowerOfTwoMemory);
    }
    signals
}

impl EvidenceProbe for MemorySizeProbe {
    fn name(&self) -> &str {
        "memory size"
    }

    fn collect(&self, _host: &HostEnv, facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        facts
            .memory_bytes
            .map(memory_size_signals)
            .ok_or_else(|| ProbeError::Unavailable("memory size".into()))
    }
}

/// A readable physical memory array (SMBIOS type 16). Usually needs root.
pub struct MemoryArrayProbe;

impl EvidenceProbe for MemoryArrayProbe {
    fn name(&self) -> &str {
        "dmidecode --type 16"
    }

    fn collect(&self, host: &HostEnv, _facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        let out = host.run("dmidecode", &["--type", "16"])?;
        Ok(if out.contains("Maximum Capacity") {
            vec![Signal::MemoryArrayReadable]
        } else {
            Vec::new()
        })
    }
}

/// Module form factors from `dmidecode --type 17`, else `lshw -C memory`.
pub struct MemoryModuleProbe;

impl MemoryModuleProbe {
    /// Form factor and type lines only; locator names like
    /// "ChannelA-DIMM0" appear on soldered boards too.
    fn module_descriptions(host: &HostEnv) -> Result<Vec<String>, ProbeError> {
        match host.run("dmidecode", &["--type", "17"]) {
            Ok(out) => {
                let described: Vec<String> = parse::memory_devices(&out)
                    .into_iter()
                    .filter(|d| d.is_populated())
                    .flat_map(|d| [d.form_factor, d.kind])
                    .flatten()
                    .collect();
                if !described.is_empty() {
                    return Ok(described);
                }
            }
            Err(e) => debug!("dmidecode --type 17 failed: {e}"),
        }
        let out = host.run("lshw", &["-C", "memory"])?;
        Ok(parse::lshw_bank_descriptions(&out))
    }
}

/// Signals from memory module descriptions.
pub fn module_signals(descriptions: &[String]) -> Vec<Signal> {
    let text = descriptions.join("\n").to_lowercase();
    let mut signals = Vec::new();
    if SLOT_TERMS.iter().any(|t| text.contains(t)) {
        signals.push(Signal::SlotString);
    }
    if SOLDERED_TERMS.iter().any(|t| text.contains(t)) {
        signals.push(Signal::SolderedString);
    }
    signals
}

impl EvidenceProbe for MemoryModuleProbe {
    fn name(&self) -> &str {
        "memory modules"
    }

    fn collect(&self, host: &HostEnv, _facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        Ok(module_signals(&Self::module_descriptions(host)?))
    }
}

/// Memory controller and LPDDR mentions on the PCI bus.
pub struct PciProbe;

impl EvidenceProbe for PciProbe {
    fn name(&self) -> &str {
        "lspci"
    }

    fn collect(&self, host: &HostEnv, _facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError> {
        let out = host.run("lspci", &[])?.to_lowercase();
        let mut signals = Vec::new();
        if out.contains("memory controller") {
            signals.push(Signal::MemoryControllerListed);
        }
        if out.contains("lpddr") {
            signals.push(Signal::SolderedString);
        }
        Ok(signals)
    }
}
