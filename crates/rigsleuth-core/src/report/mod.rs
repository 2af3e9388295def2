/// Technician report: a plain-text rendering of a [`Snapshot`] and the
/// on-disk bundle (text, flat JSON, drive CSV) saved for a repair ticket.
use crate::drives::DriveRecord;
use crate::error::ReportError;
use crate::probe::UNKNOWN;
use crate::snapshot::{HealthStatus, InfoKey, Metric, Snapshot};

use chrono::{DateTime, Local};
use serde_json::Value;
use std::fmt::{self, Write as _};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Leading component of every saved file name.
pub const FILE_PREFIX: &str = "snapshot";

const RULE: &str = "--------------------------------------------";

/// Who ran the diagnostic and for which job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub technician: String,
    pub ticket_id: Option<String>,
    pub customer: Option<String>,
}

impl ReportContext {
    pub fn new(technician: impl Into<String>) -> Self {
        Self {
            technician: technician.into(),
            ..Self::default()
        }
    }

    pub fn ticket(mut self, id: impl Into<String>) -> Self {
        self.ticket_id = Some(id.into());
        self
    }

    pub fn customer(mut self, name: impl Into<String>) -> Self {
        self.customer = Some(name.into());
        self
    }
}

/// Status marker shown in front of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Ok,
    Warn,
    Crit,
    Unknown,
}

impl Marker {
    fn tag(self) -> &'static str {
        match self {
            Self::Ok => "[ OK ]",
            Self::Warn => "[WARN]",
            Self::Crit => "[CRIT]",
            Self::Unknown => "[ ?? ]",
        }
    }

    fn for_status(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Good => Self::Ok,
            HealthStatus::Moderate => Self::Warn,
            HealthStatus::Critical => Self::Crit,
            HealthStatus::Unknown => Self::Unknown,
        }
    }

    fn for_drive(drive: &DriveRecord) -> Self {
        if drive.synthetic {
            return Self::Unknown;
        }
        if drive.health == "Failing" {
            return Self::Crit;
        }
        drive
            .usage_percent
            .map_or(Self::Ok, |u| Self::for_status(HealthStatus::for_usage(u)))
    }
}

pub fn format_report(snapshot: &Snapshot, ctx: &ReportContext) -> String {
    format_report_at(snapshot, ctx, Local::now())
}

/// [`format_report`] with an explicit timestamp.
pub fn format_report_at(snapshot: &Snapshot, ctx: &ReportContext, now: DateTime<Local>) -> String {
    let mut out = String::new();
    if let Err(e) = write_report(&mut out, snapshot, ctx, now) {
        warn!("Report formatting stopped early: {e}");
    }
    out
}

fn write_report(
    out: &mut String,
    snapshot: &Snapshot,
    ctx: &ReportContext,
    now: DateTime<Local>,
) -> fmt::Result {
    let text = |key| snapshot.text_or_unknown(key);

    writeln!(out, "===== RigSleuth System Diagnostic Report =====")?;
    writeln!(out, "Technician: {}", or_unknown(&ctx.technician))?;
    writeln!(out, "Date: {}", now.format("%Y-%m-%d %H:%M:%S"))?;
    if let Some(customer) = &ctx.customer {
        writeln!(out, "Customer: {customer}")?;
    }
    if let Some(ticket) = &ctx.ticket_id {
        writeln!(out, "Ticket: {ticket}")?;
    }
    writeln!(out)?;

    let network = snapshot.network.as_ref();
    writeln!(out, "--- SYSTEM ---")?;
    writeln!(out, "Operating System: {}", text(InfoKey::Os))?;
    writeln!(out, "Kernel Version: {}", text(InfoKey::Kernel))?;
    writeln!(out, "Manufacturer: {}", text(InfoKey::Manufacturer))?;
    writeln!(out, "System Model: {}", text(InfoKey::ProductModel))?;
    writeln!(out, "Serial Number: {}", text(InfoKey::SerialNumber))?;
    writeln!(
        out,
        "Baseboard: {} {}",
        text(InfoKey::BaseboardManufacturer),
        text(InfoKey::BaseboardProduct)
    )?;
    writeln!(out, "BIOS Vendor: {}", text(InfoKey::BiosVendor))?;
    writeln!(out, "BIOS Version: {}", text(InfoKey::BiosVersion))?;
    writeln!(out, "BIOS Release Date: {}", text(InfoKey::BiosReleaseDate))?;
    writeln!(out, "BIOS Mode: {}", text(InfoKey::BiosMode))?;
    writeln!(
        out,
        "Hostname: {}",
        network.and_then(|n| n.hostname.as_deref()).unwrap_or(UNKNOWN)
    )?;
    writeln!(
        out,
        "IP Address: {}",
        network.and_then(|n| n.ip_address.as_deref()).unwrap_or(UNKNOWN)
    )?;
    if let Some(mac) = network.and_then(|n| n.mac_address.as_deref()) {
        writeln!(out, "MAC Address: {mac}")?;
    }
    let boot_total = snapshot
        .boot_analysis
        .as_ref()
        .and_then(|b| b.total.as_deref())
        .unwrap_or(UNKNOWN);
    writeln!(out, "Boot Time: {} | Total: {boot_total}", text(InfoKey::BootTime))?;
    match snapshot.available_updates {
        Some(0) => {
            writeln!(out, "{} Available Updates: System up to date", Marker::Ok.tag())?;
        }
        Some(n) => {
            writeln!(out, "{} Available Updates: {n} updates pending", Marker::Warn.tag())?;
        }
        None => {
            writeln!(out, "{} Available Updates: {UNKNOWN}", Marker::Unknown.tag())?;
        }
    }
    writeln!(out)?;

    writeln!(out, "--- HARDWARE ---")?;
    writeln!(out, "Processor: {} ({})", text(InfoKey::Cpu), text(InfoKey::CpuCores))?;
    writeln!(out, "Memory: {} | {}", text(InfoKey::Memory), text(InfoKey::RamDetails))?;
    writeln!(out, "RAM Upgradable: {}", text(InfoKey::RamUpgradable))?;
    writeln!(out, "Graphics: {}", text(InfoKey::Graphics))?;
    if let Some(battery) = &snapshot.battery_info {
        let marker = if battery.replacement_recommended {
            Marker::Warn
        } else {
            Marker::Ok
        };
        writeln!(
            out,
            "{} Battery: {} - Health: {}{}",
            marker.tag(),
            battery.model,
            battery.health.as_deref().unwrap_or(UNKNOWN),
            if battery.replacement_recommended {
                " (Replacement Recommended)"
            } else {
                ""
            }
        )?;
    }
    writeln!(out)?;

    writeln!(out, "--- STORAGE ---")?;
    match snapshot.drives.as_deref() {
        Some(drives) if !drives.is_empty() => {
            for drive in drives {
                writeln!(out, "{}", drive_line(drive))?;
            }
        }
        _ => {
            writeln!(out, "{} Drive scan did not finish", Marker::Unknown.tag())?;
        }
    }
    writeln!(out)?;

    if let Some(health) = &snapshot.health {
        writeln!(out, "--- SYSTEM HEALTH ---")?;
        for (name, metric) in health.entries() {
            let unit = if name == "temp_health" { "°C" } else { "%" };
            writeln!(
                out,
                "{} {}: {} ({})",
                Marker::for_status(metric.status).tag(),
                title_case(name),
                metric_value(metric, unit),
                metric.status
            )?;
        }
        writeln!(out)?;
    }

    let issues = issues(snapshot);
    if !issues.is_empty() {
        writeln!(out, "--- ISSUES DETECTED ---")?;
        for issue in issues {
            writeln!(out, "! {issue}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{RULE}")?;
    writeln!(out, "Generated by RigSleuth {}", env!("CARGO_PKG_VERSION"))
}

fn or_unknown(s: &str) -> &str {
    if s.trim().is_empty() {
        UNKNOWN
    } else {
        s
    }
}

fn drive_line(drive: &DriveRecord) -> String {
    if drive.synthetic {
        return format!("{} {}", Marker::Unknown.tag(), drive.model);
    }
    let usage = drive
        .usage_percent
        .map_or_else(|| "usage unknown".to_string(), |u| format!("{u:.1}% used"));
    format!(
        "{} {} - {} {:.2} GB ({}, {usage}, health: {})",
        Marker::for_drive(drive).tag(),
        drive.device,
        drive.model,
        drive.capacity_gb,
        drive.drive_type,
        drive.health
    )
}

fn metric_value(metric: Metric, unit: &str) -> String {
    metric
        .value
        .map_or_else(|| UNKNOWN.to_string(), |v| format!("{v:.1}{unit}"))
}

/// "cpu_health" -> "Cpu Health".
fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Category errors and unfinished categories.
fn issues(snapshot: &Snapshot) -> Vec<String> {
    let mut found = Vec::new();
    for (flag, error) in InfoKey::COMPLETION_FLAGS.iter().zip(InfoKey::ERROR_KEYS) {
        if let Some(err) = snapshot.text(error) {
            found.push(err.to_string());
        } else if !snapshot.flag(*flag) {
            found.push(format!("{} not finished", flag.as_str()));
        }
    }
    if snapshot.drives.is_some() && snapshot.has_no_real_drives() {
        found.push("No physical drives detected".to_string());
    }
    found
}

/// Keep file names portable: letters, digits and `-`; anything else
/// becomes `_`.
fn file_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `snapshot[_<customer>][_<ticket>]_<YYYYmmdd_HHMMSS>`
pub fn report_stem(ctx: &ReportContext, now: DateTime<Local>) -> String {
    let mut stem = FILE_PREFIX.to_string();
    for part in [ctx.customer.as_deref(), ctx.ticket_id.as_deref()]
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
    {
        stem.push('_');
        stem.push_str(&file_component(part));
    }
    stem.push('_');
    stem.push_str(&now.format("%Y%m%d_%H%M%S").to_string());
    stem
}

pub fn save_report(
    dir: &Path,
    snapshot: &Snapshot,
    ctx: &ReportContext,
) -> Result<Vec<PathBuf>, ReportError> {
    save_report_at(dir, snapshot, ctx, Local::now())
}

/// Write `<stem>.txt`, `<stem>.json` and `<stem>_drives.csv` into `dir`,
/// creating it if needed. Returns the written paths in that order.
pub fn save_report_at(
    dir: &Path,
    snapshot: &Snapshot,
    ctx: &ReportContext,
    now: DateTime<Local>,
) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir)?;
    let stem = report_stem(ctx, now);

    let text_path = dir.join(format!("{stem}.txt"));
    fs::write(&text_path, format_report_at(snapshot, ctx, now))?;

    let json_path = dir.join(format!("{stem}.json"));
    let mut json = BufWriter::new(File::create(&json_path)?);
    serde_json::to_writer_pretty(&mut json, &Value::Object(snapshot.to_flat_map()))?;
    json.flush()?;

    let csv_path = dir.join(format!("{stem}_drives.csv"));
    let mut csv = csv::Writer::from_path(&csv_path)?;
    for drive in snapshot.drives.as_deref().unwrap_or_default() {
        csv.serialize(drive)?;
    }
    csv.flush()?;

    info!("Saved report {stem} to {}", dir.display());
    Ok(vec![text_path, json_path, csv_path])
}
