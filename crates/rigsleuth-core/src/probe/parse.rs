/// Parsers for virtual files and tool output.
///
/// Each parser takes the raw text and returns `None` when the text does
/// not contain what it looks for; the caller decides whether that is
/// "malformed" or simply "absent".
use crate::snapshot::{BatteryInfo, BootAnalysis};

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

/// Strings firmware vendors leave in unset DMI fields.
const PLACEHOLDERS: &[&str] = &[
    "to be filled by o.e.m.",
    "to be filled by oem",
    "not specified",
    "not applicable",
    "default string",
    "system product name",
    "system manufacturer",
    "system serial number",
    "o.e.m.",
    "none",
    "n/a",
    "0",
    "unknown",
];

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// `true` for blank values and well-known vendor placeholders.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.is_empty() || PLACEHOLDERS.contains(&v.as_str())
}

/// Trimmed value, or `None` if it is a placeholder.
pub fn clean_value(raw: &str) -> Option<String> {
    let v = raw.trim();
    (!is_placeholder(v)).then(|| v.to_string())
}

/// First line that is neither blank nor a `#` comment, cleaned.
pub fn first_value_line(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .and_then(clean_value)
}

/// Value of the first `key: value` line (any amount of whitespace around
/// the colon, key matched case-insensitively).
pub fn field(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        if k.trim().eq_ignore_ascii_case(key) {
            clean_value(v)
        } else {
            None
        }
    })
}

/// Bytes as "X.XX GB" using binary units.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

/// `MemTotal` from `/proc/meminfo`, in kB.
pub fn meminfo_total_kb(text: &str) -> Option<u64> {
    text.lines()
        .find_map(|l| l.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

/// Total memory in MB from `free -m`.
pub fn free_total_mb(text: &str) -> Option<u64> {
    text.lines()
        .find(|l| l.starts_with("Mem:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|n| n.parse().ok())
}

pub fn meminfo_as_gb(text: &str) -> Option<String> {
    meminfo_total_kb(text).map(|kb| format_gb(kb * 1024))
}

pub fn free_as_gb(text: &str) -> Option<String> {
    free_total_mb(text).map(|mb| format_gb(mb * 1024 * 1024))
}

/// `PRETTY_NAME` from `/etc/os-release`.
pub fn os_release_pretty(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').trim_matches('\''))
        .and_then(clean_value)
}

pub fn cpuinfo_model(text: &str) -> Option<String> {
    field(text, "model name")
}

pub fn lscpu_model(text: &str) -> Option<String> {
    field(text, "Model name")
}

pub fn hostnamectl_vendor(text: &str) -> Option<String> {
    field(text, "Hardware Vendor")
}

pub fn hostnamectl_model(text: &str) -> Option<String> {
    field(text, "Hardware Model")
}

/// Chassis word from `hostnamectl` ("laptop", "desktop", ...).
pub fn hostnamectl_chassis(text: &str) -> Option<String> {
    field(text, "Chassis").map(|c| {
        c.split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    })
}

/// `UEFI` when `dmidecode -t bios` lists UEFI support.
pub fn dmidecode_bios_mode(text: &str) -> Option<String> {
    text.contains("UEFI is supported").then(|| "UEFI".to_string())
}

/// `UEFI` when the kernel command line references an EFI loader path.
pub fn cmdline_bios_mode(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    (lower.contains("\\efi\\") || lower.contains("/efi/") || lower.contains("efi="))
        .then(|| "UEFI".to_string())
}

/// SMBIOS memory type code as exposed in `dram_type`.
pub fn dram_type_code(text: &str) -> Option<String> {
    let name = match text.trim() {
        "2" => "DRAM",
        "3" => "SDRAM",
        "4" => "DDR",
        "5" => "DDR2",
        "6" => "DDR3",
        "7" => "DDR4",
        "8" => "DDR5",
        "0" | "1" | "" => return None,
        other => return clean_value(other),
    };
    Some(name.to_string())
}

/// One `Memory Device` block from `dmidecode -t 17`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDevice {
    pub size: Option<String>,
    pub kind: Option<String>,
    pub speed: Option<String>,
    pub configured_speed: Option<String>,
    pub form_factor: Option<String>,
}

impl MemoryDevice {
    pub fn is_populated(&self) -> bool {
        match &self.size {
            Some(size) => {
                !size.contains("No Module Installed") && size.split_whitespace().next() != Some("0")
            }
            None => false,
        }
    }
}

pub fn memory_devices(text: &str) -> Vec<MemoryDevice> {
    let mut devices = Vec::new();
    let mut current: Option<MemoryDevice> = None;

    for line in text.lines() {
        if line.trim() == "Memory Device" {
            if let Some(done) = current.take() {
                devices.push(done);
            }
            current = Some(MemoryDevice::default());
            continue;
        }
        if line.starts_with("Handle ") {
            devices.extend(current.take());
            continue;
        }
        let Some(dev) = current.as_mut() else {
            continue;
        };
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let value = clean_value(v);
        match k.trim() {
            "Size" => dev.size = Some(v.trim().to_string()),
            "Type" => dev.kind = value,
            "Speed" => dev.speed = value,
            "Configured Memory Speed" | "Configured Clock Speed" => dev.configured_speed = value,
            "Form Factor" => dev.form_factor = value,
            _ => {}
        }
    }
    devices.extend(current);
    devices
}

fn first_populated<F>(text: &str, pick: F) -> Option<String>
where
    F: Fn(&MemoryDevice) -> Option<String>,
{
    memory_devices(text)
        .iter()
        .filter(|d| d.is_populated())
        .find_map(pick)
}

pub fn dmidecode_ram_type(text: &str) -> Option<String> {
    first_populated(text, |d| d.kind.clone())
}

/// Configured speed when reported, else rated speed.
pub fn dmidecode_ram_speed(text: &str) -> Option<String> {
    first_populated(text, |d| d.configured_speed.clone().or_else(|| d.speed.clone()))
}

pub fn dmidecode_form_factor(text: &str) -> Option<String> {
    first_populated(text, |d| d.form_factor.clone())
}

/// Populated `*-bank` sections of `lshw -C memory`.
fn lshw_banks(text: &str) -> Vec<&str> {
    text.split("*-bank")
        .skip(1)
        .map(|s| s.split("*-").next().unwrap_or(s))
        .filter(|s| !s.to_ascii_lowercase().contains("empty"))
        .collect()
}

/// `description:` of every populated bank, e.g. "SODIMM DDR4 Synchronous 2667 MHz".
pub fn lshw_bank_descriptions(text: &str) -> Vec<String> {
    lshw_banks(text)
        .into_iter()
        .filter_map(|bank| field(bank, "description"))
        .collect()
}

pub fn lshw_ram_type(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(&RE, r"\b(LP)?DDR\d?X?\b")?;
    lshw_banks(text).into_iter().find_map(|bank| {
        let desc = field(bank, "description")?;
        re.find(&desc).map(|m| m.as_str().to_string())
    })
}

pub fn lshw_ram_speed(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(&RE, r"clock:\s*(\d+)\s*MHz")?;
    lshw_banks(text)
        .into_iter()
        .find_map(|bank| re.captures(bank))
        .map(|c| format!("{} MHz", &c[1]))
}

/// Typical memory generation for a CPU model string.
pub fn ram_type_from_cpu(cpu: &str) -> Option<&'static str> {
    static INTEL: OnceLock<Option<Regex>> = OnceLock::new();
    static RYZEN: OnceLock<Option<Regex>> = OnceLock::new();
    let lower = cpu.to_ascii_lowercase();

    if let Some(c) = cached(&INTEL, r"\bi[3579]-(\d{4,5})")?.captures(&lower) {
        let digits = &c[1];
        // 10th gen onwards uses a two-digit generation prefix.
        let generation: u32 = if digits.starts_with('1') {
            digits[..2].parse().ok()?
        } else {
            digits[..1].parse().ok()?
        };
        return match generation {
            2..=5 => Some("DDR3"),
            6..=11 => Some("DDR4"),
            12.. => Some("DDR4/DDR5"),
            _ => None,
        };
    }
    if let Some(c) = cached(&RYZEN, r"ryzen\s+\d\s+(?:pro\s+)?(\d)\d{3}")?.captures(&lower) {
        return match c[1].parse::<u32>().ok()? {
            1..=5 => Some("DDR4"),
            6..=9 => Some("DDR5"),
            _ => None,
        };
    }
    None
}

/// Memory facts for models whose configuration is well known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownModel {
    pub ram_type: &'static str,
    pub ram_speed: &'static str,
}

pub fn known_model(product: &str) -> Option<KnownModel> {
    let p = product.to_ascii_lowercase();
    if !p.contains("latitude") {
        return None;
    }
    if p.contains("5300") {
        Some(KnownModel {
            ram_type: "DDR4",
            ram_speed: "2666 MHz",
        })
    } else if p.contains("3300") {
        Some(KnownModel {
            ram_type: "DDR4",
            ram_speed: "2400 MHz",
        })
    } else if p.contains("7390") || p.contains("7400") {
        Some(KnownModel {
            ram_type: "LPDDR3",
            ram_speed: "2133 MHz",
        })
    } else {
        None
    }
}

/// Graphics adapters from `lspci`, simplified to marketing names and
/// joined with ", ".
pub fn lspci_graphics(text: &str) -> Option<String> {
    const CLASSES: &[&str] = &["VGA compatible controller:", "3D controller:", "Display controller:"];
    static BRACKET: OnceLock<Option<Regex>> = OnceLock::new();
    static PARENS: OnceLock<Option<Regex>> = OnceLock::new();
    let bracket = cached(&BRACKET, r"\[([^\]]+)\]")?;
    let parens = cached(&PARENS, r"\([^)]*\)")?;

    let names: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let class = CLASSES.iter().find(|c| line.contains(*c))?;
            let (_, model) = line.split_once(class)?;
            let model = model.trim();
            if model.is_empty() || model == "Device" {
                return None;
            }
            Some(simplify_gpu(model, bracket, parens))
        })
        .collect();

    (!names.is_empty()).then(|| names.join(", "))
}

fn simplify_gpu(model: &str, bracket: &Regex, parens: &Regex) -> String {
    if let Some(c) = bracket.captures(model) {
        let name = c[1].trim().to_string();
        for vendor in ["Intel", "NVIDIA", "AMD"] {
            if model.contains(vendor) && !name.contains(vendor) && !name.contains("ATI") {
                return format!("{vendor} {name}");
            }
        }
        return name;
    }
    let cleaned = parens.replace_all(model, "");
    cleaned
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn glxinfo_device(text: &str) -> Option<String> {
    field(text, "Device")
}

/// `systemd-analyze` summary.
pub fn systemd_analyze(text: &str) -> Option<BootAnalysis> {
    static STAGE: OnceLock<Option<Regex>> = OnceLock::new();
    static TOTAL: OnceLock<Option<Regex>> = OnceLock::new();
    static GRAPHICAL: OnceLock<Option<Regex>> = OnceLock::new();
    let stage = cached(&STAGE, r"([\d.]+)(ms|s) \((firmware|loader|kernel|initrd|userspace)\)")?;
    let total = cached(&TOTAL, r"= (?:(\d+)min )?([\d.]+)(ms|s)")?;
    let graphical = cached(&GRAPHICAL, r"graphical\.target reached after (?:(\d+)min )?([\d.]+)(ms|s)")?;

    if !text.contains("Startup finished") {
        return None;
    }

    let secs = |num: &str, unit: &str, minutes: Option<&str>| -> Option<String> {
        let mut v: f64 = num.parse().ok()?;
        if unit == "ms" {
            v /= 1000.0;
        }
        if let Some(m) = minutes.and_then(|m| m.parse::<f64>().ok()) {
            v += m * 60.0;
        }
        Some(format!("{v:.2}s"))
    };

    let mut analysis = BootAnalysis::default();
    for c in stage.captures_iter(text) {
        let value = secs(&c[1], &c[2], None);
        match &c[3] {
            "firmware" => analysis.firmware = value,
            "loader" => analysis.loader = value,
            "kernel" => analysis.kernel = value,
            "initrd" => analysis.initrd = value,
            "userspace" => analysis.userspace = value,
            _ => {}
        }
    }
    if let Some(c) = total.captures(text) {
        analysis.total = secs(&c[2], &c[3], c.get(1).map(|m| m.as_str()));
    }
    if let Some(c) = graphical.captures(text) {
        analysis.graphical_target = secs(&c[2], &c[3], c.get(1).map(|m| m.as_str()));
    }
    Some(analysis)
}

/// First battery object path from `upower -e`.
pub fn upower_battery_path(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| l.contains("battery"))
        .map(str::to_string)
}

/// Battery health below this capacity calls for a replacement.
pub const BATTERY_REPLACE_BELOW_PERCENT: f32 = 60.0;

/// Details from `upower -i <battery>`.
pub fn upower_battery(text: &str) -> Option<BatteryInfo> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    let percent = cached(&PERCENT, r"(\d+(?:[.,]\d+)?)%")?;
    let pct = |key: &str| -> Option<f32> {
        let v = field(text, key)?;
        percent.captures(&v)?[1].replace(',', ".").parse().ok()
    };

    let model = field(text, "model");
    let capacity = pct("capacity");
    if model.is_none() && capacity.is_none() {
        return None;
    }

    let warned = text.to_ascii_lowercase().contains("replace")
        || field(text, "warning-level").map_or(false, |w| {
            w.eq_ignore_ascii_case("critical") || w.eq_ignore_ascii_case("action")
        });
    Some(BatteryInfo {
        model: model.unwrap_or_else(|| crate::probe::UNKNOWN.to_string()),
        health: capacity
            .map(|c| format!("{c:.1}%"))
            .or_else(|| pct("percentage").map(|p| format!("{p:.0}% charge"))),
        replacement_recommended: warned
            || capacity.map_or(false, |c| c < BATTERY_REPLACE_BELOW_PERCENT),
    })
}

/// Package count from `apt list --upgradable`.
pub fn apt_upgradable_count(text: &str) -> u32 {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("Listing") && !l.starts_with("WARNING"))
        .count() as u32
}

/// Hottest CPU-ish reading from `sensors`, in °C.
pub fn sensors_max_temp(text: &str) -> Option<f32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(&RE, r"^\s*(Core \d+|Package id \d+|Tctl|Tdie|CPU|temp\d+):\s+\+(\d+(?:\.\d+)?)")?;
    text.lines()
        .filter_map(|l| re.captures(l))
        .filter_map(|c| c[2].parse::<f32>().ok())
        .reduce(f32::max)
}

/// First non-loopback IPv4 address from `ip -4 addr`.
pub fn ip_addr_primary(text: &str) -> Option<Ipv4Addr> {
    text.lines()
        .filter_map(|l| l.trim().strip_prefix("inet "))
        .filter_map(|rest| rest.split(|c| c == '/' || c == ' ').next())
        .filter_map(|ip| ip.parse::<Ipv4Addr>().ok())
        .find(|ip| !ip.is_loopback())
}

/// One row of `lsblk -d -b -n -o NAME,SIZE,ROTA,TYPE,MODEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsblkRow {
    pub name: String,
    pub size_bytes: u64,
    pub rotational: Option<bool>,
    pub kind: String,
    pub model: Option<String>,
}

pub fn lsblk_rows(text: &str) -> Vec<LsblkRow> {
    text.lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?.to_string();
            let size_bytes = cols.next()?.parse().ok()?;
            let rotational = match cols.next()? {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            };
            let kind = cols.next()?.to_string();
            let model = clean_value(&cols.collect::<Vec<_>>().join(" "));
            Some(LsblkRow {
                name,
                size_bytes,
                rotational,
                kind,
                model,
            })
        })
        .collect()
}

/// Overall verdict line of `smartctl -H`.
pub fn smartctl_health(text: &str) -> Option<&'static str> {
    let line = text
        .lines()
        .find(|l| l.contains("overall-health") || l.contains("SMART Health Status"))?;
    if line.contains("PASSED") || line.trim_end().ends_with("OK") {
        Some("Healthy")
    } else if line.contains("FAILED") {
        Some("Failing")
    } else {
        None
    }
}
