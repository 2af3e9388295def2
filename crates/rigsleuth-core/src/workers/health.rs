/// Live health readings: CPU load, memory and system-disk usage, CPU
/// temperature.
use super::{Category, Publisher};
use crate::drives::is_virtual;
use crate::error::WorkerError;
use crate::platform::{HostEnv, OsFamily, PartitionInfo};
use crate::probe::parse;
use crate::snapshot::{HealthMetrics, InfoKey, InfoValue, Metric};

use std::path::Path;
use tracing::debug;

/// hwmon / thermal-zone sensor names that track the CPU package.
const CPU_SENSORS: &[&str] = &[
    "coretemp",
    "k10temp",
    "zenpower",
    "acpitz",
    "it8992",
    "x86_pkg_temp",
];

pub fn run(host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    let metrics = HealthMetrics {
        cpu_health: Metric::usage(host.system.cpu_usage()),
        memory_health: Metric::usage(memory_usage(host)),
        disk_health: Metric::usage(system_disk_usage(host)),
        temp_health: Metric::temperature(cpu_temperature(host)),
    };

    if metrics.entries().iter().all(|(_, m)| m.value.is_none()) {
        return Err(Category::Health.failure("no live metric could be read"));
    }
    out.publish(InfoKey::Health, InfoValue::Health(metrics));
    Ok(())
}

fn memory_usage(host: &HostEnv) -> Option<f32> {
    if let Some(m) = host.system.memory() {
        if m.total_bytes > 0 {
            return Some((m.used_bytes as f64 / m.total_bytes as f64 * 100.0) as f32);
        }
    }
    let meminfo = host.read_virtual("/proc/meminfo").ok()?;
    meminfo_usage(&meminfo)
}

/// Used share of memory from `MemTotal` and `MemAvailable`.
pub fn meminfo_usage(text: &str) -> Option<f32> {
    let kb = |key: &str| -> Option<f64> {
        text.lines()
            .find_map(|l| l.strip_prefix(key))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|v| v.parse().ok())
    };
    let total = kb("MemTotal")?;
    let available = kb("MemAvailable")?;
    (total > 0.0).then(|| ((total - available) / total * 100.0) as f32)
}

/// Usage of the partition holding the OS.
pub fn system_disk_usage(host: &HostEnv) -> Option<f32> {
    let partitions = host.system.partitions();
    let root = match host.os {
        OsFamily::Windows => Path::new("C:\\"),
        _ => Path::new("/"),
    };
    let pick = |p: &&PartitionInfo| p.total_bytes > 0 && !is_virtual(&p.device, &p.fs_type);
    partitions
        .iter()
        .filter(pick)
        .find(|p| p.mount_point == root)
        .or_else(|| partitions.iter().find(pick))
        .map(PartitionInfo::usage_percent)
}

/// Hottest CPU sensor: hwmon, then thermal zones, then `sensors`.
pub fn cpu_temperature(host: &HostEnv) -> Option<f32> {
    hwmon_temperature(host)
        .or_else(|| thermal_zone_temperature(host))
        .or_else(|| match host.run("sensors", &[]) {
            Ok(out) => parse::sensors_max_temp(&out),
            Err(e) => {
                debug!("sensors: {e}");
                None
            }
        })
}

/// Millidegrees Celsius from a sysfs temperature file.
fn read_millidegrees(host: &HostEnv, path: &str) -> Option<f32> {
    let raw: f32 = host.read_virtual(path).ok()?.trim().parse().ok()?;
    let celsius = raw / 1000.0;
    (celsius > 0.0).then_some(celsius)
}

fn hwmon_temperature(host: &HostEnv) -> Option<f32> {
    let mut hottest: Option<f32> = None;
    for dir in host.list_dir("/sys/class/hwmon").ok()? {
        let base = format!("/sys/class/hwmon/{dir}");
        let Ok(name) = host.read_virtual(&format!("{base}/name")) else {
            continue;
        };
        if !CPU_SENSORS.contains(&name.trim()) {
            continue;
        }
        let inputs = host.list_dir(&base).unwrap_or_default();
        for input in inputs
            .iter()
            .filter(|f| f.starts_with("temp") && f.ends_with("_input"))
        {
            if let Some(t) = read_millidegrees(host, &format!("{base}/{input}")) {
                hottest = Some(hottest.map_or(t, |h| h.max(t)));
            }
        }
    }
    hottest
}

fn thermal_zone_temperature(host: &HostEnv) -> Option<f32> {
    host.list_dir("/sys/class/thermal")
        .ok()?
        .iter()
        .filter(|z| z.starts_with("thermal_zone"))
        .filter(|z| {
            host.read_virtual(&format!("/sys/class/thermal/{z}/type"))
                .is_ok_and(|t| CPU_SENSORS.contains(&t.trim()))
        })
        .filter_map(|z| read_millidegrees(host, &format!("/sys/class/thermal/{z}/temp")))
        .reduce(f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meminfo_used_share() {
        let text = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        assert_eq!(meminfo_usage(text), Some(75.0));
        assert_eq!(meminfo_usage("MemTotal: 100 kB\n"), None);
    }
}
