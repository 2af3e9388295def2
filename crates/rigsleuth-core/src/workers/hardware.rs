/// Hardware identity and memory characteristics.
///
/// Discrete attributes go through a [`ProbeChain`] each and are published
/// as soon as they resolve. RAM upgradability is fused from every evidence
/// probe by the [`EvidenceScorer`] once the CPU, product name and memory
/// size it interprets are known.
use super::Publisher;
use crate::error::{ProbeError, WorkerError};
use crate::evidence::{EvidenceScorer, KnownFacts, Verdict};
use crate::platform::{HostEnv, OsFamily};
use crate::probe::{
    is_meaningful, parse, CommandProbe, Confidence, FnProbe, ProbeAnswer, ProbeChain,
    ProbeMethod, VirtualFileProbe, UNKNOWN,
};
use crate::snapshot::InfoKey;

/// DMI attributes: `(key, dmidecode keyword, CIM class, CIM property, sysfs file)`.
const DMI_ATTRIBUTES: &[(InfoKey, &str, &str, &str, &str)] = &[
    (InfoKey::Manufacturer, "system-manufacturer", "Win32_ComputerSystem", "Manufacturer", "sys_vendor"),
    (InfoKey::ProductModel, "system-product-name", "Win32_ComputerSystem", "Model", "product_name"),
    (InfoKey::SerialNumber, "system-serial-number", "Win32_BIOS", "SerialNumber", "product_serial"),
    (InfoKey::BaseboardManufacturer, "baseboard-manufacturer", "Win32_BaseBoard", "Manufacturer", "board_vendor"),
    (InfoKey::BaseboardProduct, "baseboard-product-name", "Win32_BaseBoard", "Product", "board_name"),
    (InfoKey::BiosVendor, "bios-vendor", "Win32_BIOS", "Manufacturer", "bios_vendor"),
    (InfoKey::BiosVersion, "bios-version", "Win32_BIOS", "SMBIOSBIOSVersion", "bios_version"),
    (InfoKey::BiosReleaseDate, "bios-release-date", "Win32_BIOS", "ReleaseDate", "bios_date"),
];

pub fn run(host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    let mut facts = KnownFacts::default();

    for &(key, keyword, class, property, file) in DMI_ATTRIBUTES {
        let resolved = dmi_chain(key, keyword, class, property, file).resolve(host);
        if key == InfoKey::ProductModel && resolved.is_known() {
            facts.product = Some(resolved.value.clone());
        }
        out.text(key, resolved.value);
    }

    out.text(InfoKey::BiosMode, bios_mode_chain().resolve(host).value);

    let cpu = cpu_chain().resolve(host);
    if cpu.is_known() {
        facts.cpu = Some(cpu.value.clone());
    }
    out.text(InfoKey::Cpu, cpu.value);
    out.text(InfoKey::CpuCores, cpu_cores());

    out.text(InfoKey::Memory, memory_chain().resolve(host).value);
    facts.memory_bytes = memory_bytes(host);

    out.text(InfoKey::Graphics, graphics_chain().resolve(host).value);

    let ram_type = ram_type_chain(&facts).resolve(host).value;
    out.text(InfoKey::RamType, ram_type.clone());
    let ram_speed = ram_speed_chain(&facts).resolve(host).value;
    out.text(InfoKey::RamSpeed, ram_speed.clone());

    let (_, verdict) = EvidenceScorer::default().assess(host, &facts);
    let reported_form = form_factor_chain().resolve(host);
    let reported_form = reported_form.is_known().then_some(reported_form.value);
    let (form_factor, upgradable) = ram_form(verdict, reported_form);
    out.text(InfoKey::RamFormFactor, form_factor.clone());
    out.text(InfoKey::RamUpgradable, upgradable);
    out.text(
        InfoKey::RamDetails,
        ram_details(&ram_type, &ram_speed, &form_factor, upgradable),
    );
    Ok(())
}

/// Form factor and upgradability label. A firmware-reported form factor
/// wins over the inferred one; without a verdict upgradability stays
/// unknown.
pub fn ram_form(verdict: Option<Verdict>, reported: Option<String>) -> (String, &'static str) {
    match verdict {
        Some(v) => (
            reported.unwrap_or_else(|| v.form_factor.to_string()),
            v.label(),
        ),
        None => (reported.unwrap_or_else(|| UNKNOWN.to_string()), UNKNOWN),
    }
}

/// "type | speed | form factor | upgradable", skipping unknown parts.
pub fn ram_details(ram_type: &str, speed: &str, form_factor: &str, upgradable: &str) -> String {
    let parts: Vec<&str> = [ram_type, speed, form_factor, upgradable]
        .into_iter()
        .filter(|p| is_meaningful(p))
        .collect();
    if parts.is_empty() {
        UNKNOWN.to_string()
    } else {
        parts.join(" | ")
    }
}

fn dmi_chain(key: InfoKey, keyword: &str, class: &str, property: &str, file: &str) -> ProbeChain {
    let chain = ProbeChain::new(key.as_str())
        .then(CommandProbe::management("dmidecode", &["-s", keyword], parse::first_value_line))
        .then(CommandProbe::cim(class, property))
        .then(VirtualFileProbe::new(format!("/sys/class/dmi/id/{file}")));
    match key {
        InfoKey::Manufacturer => {
            chain.then(CommandProbe::tool("hostnamectl", &[], parse::hostnamectl_vendor))
        }
        InfoKey::ProductModel => {
            chain.then(CommandProbe::tool("hostnamectl", &[], parse::hostnamectl_model))
        }
        _ => chain,
    }
}

fn system_probe(
    name: &'static str,
    confidence: Confidence,
    query: impl Fn(&HostEnv) -> Option<String> + Send + Sync + 'static,
) -> FnProbe {
    FnProbe::new(name, ProbeMethod::ManagementInterface, move |host| {
        query(host)
            .map(|v| ProbeAnswer::new(v, confidence))
            .ok_or_else(|| ProbeError::Unavailable(name.to_string()))
    })
}

pub fn bios_mode_chain() -> ProbeChain {
    ProbeChain::new("bios_mode")
        .then(CommandProbe::management("dmidecode", &["-t", "bios"], parse::dmidecode_bios_mode))
        .then(
            CommandProbe::management(
                "powershell",
                &["-NoProfile", "-NonInteractive", "-Command", "$env:firmware_type"],
                parse::first_value_line,
            )
            .only_on(OsFamily::Windows),
        )
        .then(FnProbe::new("/sys/firmware/efi", ProbeMethod::VirtualFile, |host| {
            if host.exists("/sys/firmware/efi") {
                Ok(ProbeAnswer::new("UEFI", Confidence::Reported))
            } else {
                Err(ProbeError::Unavailable("/sys/firmware/efi".into()))
            }
        }))
        .then(VirtualFileProbe::with_parser("/proc/cmdline", parse::cmdline_bios_mode))
        .then(FnProbe::heuristic("firmware without efi", |host| {
            host.exists("/sys/firmware").then(|| "Legacy BIOS".to_string())
        }))
}

pub fn cpu_chain() -> ProbeChain {
    ProbeChain::new("cpu")
        .then(CommandProbe::cim("Win32_Processor", "Name"))
        .then(system_probe("sysinfo cpu brand", Confidence::Reported, |h| h.system.cpu_brand()))
        .then(VirtualFileProbe::with_parser("/proc/cpuinfo", parse::cpuinfo_model))
        .then(CommandProbe::tool("lscpu", &[], parse::lscpu_model))
}

pub fn cpu_cores() -> String {
    format!("{} cores / {} threads", num_cpus::get_physical(), num_cpus::get())
}

pub fn memory_chain() -> ProbeChain {
    ProbeChain::new("memory")
        .then(VirtualFileProbe::with_parser("/proc/meminfo", parse::meminfo_as_gb))
        .then(CommandProbe::tool("free", &["-m"], parse::free_as_gb))
        .then(system_probe("sysinfo memory", Confidence::Reported, |h| {
            h.system.memory().map(|m| parse::format_gb(m.total_bytes))
        }))
}

fn memory_bytes(host: &HostEnv) -> Option<u64> {
    host.read_virtual("/proc/meminfo")
        .ok()
        .and_then(|t| parse::meminfo_total_kb(&t))
        .map(|kb| kb * 1024)
        .or_else(|| host.system.memory().map(|m| m.total_bytes))
}

pub fn graphics_chain() -> ProbeChain {
    ProbeChain::new("graphics")
        .then(CommandProbe::cim("Win32_VideoController", "Name"))
        .then(CommandProbe::tool("lspci", &[], parse::lspci_graphics))
        .then(CommandProbe::tool("glxinfo", &["-B"], parse::glxinfo_device))
        .then(FnProbe::heuristic("drm driver", drm_graphics))
}

/// Vendor guess from the DRM card drivers.
fn drm_graphics(host: &HostEnv) -> Option<String> {
    let cards = host.list_dir("/sys/class/drm").ok()?;
    let driver = cards
        .iter()
        .filter(|c| c.starts_with("card") && !c.contains('-'))
        .find_map(|card| {
            let uevent = host
                .read_virtual(&format!("/sys/class/drm/{card}/device/uevent"))
                .ok()?;
            uevent
                .lines()
                .find_map(|l| l.strip_prefix("DRIVER="))
                .map(str::to_string)
        });
    match driver.as_deref() {
        Some("amdgpu" | "radeon") => Some("AMD GPU".into()),
        Some("nvidia" | "nouveau") => Some("NVIDIA GPU".into()),
        Some("i915" | "xe") => Some("Intel Graphics".into()),
        Some(other) => Some(other.to_string()),
        None if host.exists("/proc/driver/nvidia/version") => Some("NVIDIA GPU".into()),
        None => None,
    }
}

/// SMBIOS memory type code reported by `Win32_PhysicalMemory`.
fn smbios_memory_type(out: &str) -> Option<String> {
    let name = match parse::first_value_line(out)?.as_str() {
        "20" => "DDR",
        "21" => "DDR2",
        "24" => "DDR3",
        "26" => "DDR4",
        "29" => "LPDDR3",
        "30" => "LPDDR4",
        "34" => "DDR5",
        "35" => "LPDDR5",
        _ => return None,
    };
    Some(name.to_string())
}

/// Stops early only on reported values, so the curated model table can
/// beat a CPU-generation guess.
pub fn ram_type_chain(facts: &KnownFacts) -> ProbeChain {
    let cpu = facts.cpu.clone();
    let product = facts.product.clone();
    ProbeChain::new("ram_type")
        .require(Confidence::Reported)
        .then(CommandProbe::management("dmidecode", &["-t", "17"], parse::dmidecode_ram_type))
        .then(
            CommandProbe::management(
                "powershell",
                &[
                    "-NoProfile",
                    "-NonInteractive",
                    "-Command",
                    "(Get-CimInstance -ClassName Win32_PhysicalMemory).SMBIOSMemoryType",
                ],
                smbios_memory_type,
            )
            .only_on(OsFamily::Windows),
        )
        .then(CommandProbe::tool("lshw", &["-C", "memory"], parse::lshw_ram_type))
        .then(VirtualFileProbe::with_parser("/sys/class/dmi/id/dram_type", parse::dram_type_code))
        .then(FnProbe::heuristic("cpu generation", move |_| {
            cpu.as_deref()
                .and_then(parse::ram_type_from_cpu)
                .map(str::to_string)
        }))
        .then(known_model_probe("known model ram type", product, |m| m.ram_type))
}

pub fn ram_speed_chain(facts: &KnownFacts) -> ProbeChain {
    ProbeChain::new("ram_speed")
        .then(CommandProbe::management("dmidecode", &["-t", "17"], parse::dmidecode_ram_speed))
        .then(
            CommandProbe::cim("Win32_PhysicalMemory", "ConfiguredClockSpeed")
                .with_parser(|out| parse::first_value_line(out).map(|v| format!("{v} MHz"))),
        )
        .then(CommandProbe::tool("lshw", &["-C", "memory"], parse::lshw_ram_speed))
        .then(known_model_probe(
            "known model ram speed",
            facts.product.clone(),
            |m| m.ram_speed,
        ))
}

fn known_model_probe(
    name: &'static str,
    product: Option<String>,
    pick: fn(parse::KnownModel) -> &'static str,
) -> FnProbe {
    FnProbe::new(name, ProbeMethod::Heuristic, move |_| {
        product
            .as_deref()
            .and_then(parse::known_model)
            .map(|m| ProbeAnswer::new(pick(m), Confidence::Reported))
            .ok_or_else(|| ProbeError::Unavailable(name.to_string()))
    })
}

/// Module form factor as reported by firmware tables.
pub fn form_factor_chain() -> ProbeChain {
    ProbeChain::new("ram_form_factor")
        .then(CommandProbe::management("dmidecode", &["-t", "17"], parse::dmidecode_form_factor))
        .then(
            CommandProbe::cim("Win32_PhysicalMemory", "FormFactor").with_parser(|out| {
                match parse::first_value_line(out)?.as_str() {
                    "8" => Some("DIMM".to_string()),
                    "12" => Some("SODIMM".to_string()),
                    _ => None,
                }
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_skip_unknown_parts() {
        assert_eq!(
            ram_details("DDR4", "2666 MHz", "SODIMM", "Yes (Removable)"),
            "DDR4 | 2666 MHz | SODIMM | Yes (Removable)"
        );
        assert_eq!(
            ram_details("Unknown", "Unknown", "BGA (Onboard)", "No (Soldered)"),
            "BGA (Onboard) | No (Soldered)"
        );
        assert_eq!(ram_details("", "Unknown", "", ""), UNKNOWN);
    }

    #[test]
    fn undecided_evidence_leaves_upgradability_unknown() {
        assert_eq!(ram_form(None, None), (UNKNOWN.to_string(), UNKNOWN));
        assert_eq!(
            ram_form(None, Some("SODIMM".into())),
            ("SODIMM".to_string(), UNKNOWN)
        );
        let guess = Verdict {
            upgradable: true,
            form_factor: crate::evidence::FORM_FACTOR_SODIMM,
            decisive: false,
        };
        assert_eq!(
            ram_form(Some(guess), None),
            ("SODIMM".to_string(), crate::evidence::LABEL_UPGRADABLE)
        );
    }

    #[test]
    fn windows_memory_type_codes() {
        assert_eq!(smbios_memory_type("26\r\n26\r\n").as_deref(), Some("DDR4"));
        assert_eq!(smbios_memory_type("0\r\n"), None);
    }
}
