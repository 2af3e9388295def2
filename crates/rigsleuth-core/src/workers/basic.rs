/// Basic identity: OS, kernel, boot time and analysis, battery, pending
/// package updates.
use super::Publisher;
use crate::error::{ProbeError, WorkerError};
use crate::platform::{HostEnv, OsFamily};
use crate::probe::{
    parse, CommandProbe, Confidence, FnProbe, ProbeAnswer, ProbeChain, ProbeMethod,
    VirtualFileProbe,
};
use crate::snapshot::{BatteryInfo, InfoKey, InfoValue};

use chrono::{DateTime, Local};
use tracing::debug;

pub const BOOT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn run(host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    for (key, chain) in [(InfoKey::Os, os_chain()), (InfoKey::Kernel, kernel_chain())] {
        out.text(key, chain.resolve(host).value);
    }
    out.text(InfoKey::BootTime, boot_time_chain().resolve(host).value);

    if host.os == OsFamily::Linux {
        if let Some(analysis) = host
            .run("systemd-analyze", &[])
            .ok()
            .and_then(|o| parse::systemd_analyze(&o))
        {
            out.publish(InfoKey::BootAnalysis, InfoValue::Boot(analysis));
        }
    }

    if let Some(battery) = battery_info(host) {
        out.publish(InfoKey::BatteryInfo, InfoValue::Battery(battery));
    }

    match host.run("apt", &["list", "--upgradable"]) {
        Ok(list) => out.publish(
            InfoKey::AvailableUpdates,
            InfoValue::Count(parse::apt_upgradable_count(&list)),
        ),
        Err(e) => debug!("apt list --upgradable: {e}"),
    }
    Ok(())
}

fn unquoted_line(out: &str) -> Option<String> {
    parse::first_value_line(out).and_then(|v| parse::clean_value(v.trim_matches('"')))
}

pub fn os_chain() -> ProbeChain {
    ProbeChain::new("os")
        .then(CommandProbe::cim("Win32_OperatingSystem", "Caption"))
        .then(VirtualFileProbe::with_parser("/etc/os-release", parse::os_release_pretty))
        .then(CommandProbe::tool("lsb_release", &["-ds"], unquoted_line))
        .then(FnProbe::new("sysinfo os", ProbeMethod::ManagementInterface, |h| {
            h.system
                .os_name()
                .map(|v| ProbeAnswer::new(v, Confidence::Reported))
                .ok_or_else(|| ProbeError::Unavailable("os name".into()))
        }))
}

pub fn kernel_chain() -> ProbeChain {
    ProbeChain::new("kernel")
        .then(CommandProbe::cim("Win32_OperatingSystem", "Version"))
        .then(VirtualFileProbe::new("/proc/sys/kernel/osrelease"))
        .then(CommandProbe::tool("uname", &["-r"], parse::first_value_line))
        .then(FnProbe::new("sysinfo kernel", ProbeMethod::ManagementInterface, |h| {
            h.system
                .kernel_release()
                .map(|v| ProbeAnswer::new(v, Confidence::Reported))
                .ok_or_else(|| ProbeError::Unavailable("kernel release".into()))
        }))
}

pub fn boot_time_chain() -> ProbeChain {
    ProbeChain::new("boot_time")
        .then(FnProbe::new("sysinfo boot time", ProbeMethod::ManagementInterface, |h| {
            h.system
                .boot_time()
                .and_then(format_boot_time)
                .map(|v| ProbeAnswer::new(v, Confidence::Authoritative))
                .ok_or_else(|| ProbeError::Unavailable("boot time".into()))
        }))
        .then(VirtualFileProbe::with_parser("/proc/stat", proc_stat_boot_time))
}

/// Epoch seconds as local time.
pub fn format_boot_time(epoch_secs: u64) -> Option<String> {
    let utc = DateTime::from_timestamp(i64::try_from(epoch_secs).ok()?, 0)?;
    Some(utc.with_timezone(&Local).format(BOOT_TIME_FORMAT).to_string())
}

fn proc_stat_boot_time(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| l.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
        .and_then(format_boot_time)
}

/// upower first, then the kernel's power-supply counters.
pub fn battery_info(host: &HostEnv) -> Option<BatteryInfo> {
    if host.os != OsFamily::Linux {
        return None;
    }
    let from_upower = host
        .run("upower", &["-e"])
        .ok()
        .and_then(|list| parse::upower_battery_path(&list))
        .and_then(|path| host.run("upower", &["-i", &path]).ok())
        .and_then(|details| parse::upower_battery(&details));
    if from_upower.is_some() {
        return from_upower;
    }

    let supplies = host.list_dir("/sys/class/power_supply").ok()?;
    let name = supplies.iter().find(|n| n.starts_with("BAT"))?;
    let read = |attr: &str| {
        host.read_virtual(&format!("/sys/class/power_supply/{name}/{attr}"))
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    let full = read("energy_full").or_else(|| read("charge_full"));
    let design = read("energy_full_design").or_else(|| read("charge_full_design"));
    let health = match (full, design) {
        (Some(full), Some(design)) if design > 0.0 => Some((full / design * 100.0) as f32),
        _ => None,
    };
    let model = host
        .read_virtual(&format!("/sys/class/power_supply/{name}/model_name"))
        .ok()
        .and_then(|m| parse::clean_value(&m))
        .unwrap_or_else(|| name.clone());

    Some(BatteryInfo {
        model,
        health: health.map(|h| format!("{h:.1}%")),
        replacement_recommended: health
            .is_some_and(|h| h < parse::BATTERY_REPLACE_BELOW_PERCENT),
    })
}
