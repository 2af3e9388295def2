/// Nested records carried inside a [`super::Snapshot`].
use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU, memory and disk usage at or above this percentage is "Moderate".
pub const USAGE_MODERATE_AT: f32 = 70.0;
/// ... and at or above this, "Critical".
pub const USAGE_CRITICAL_AT: f32 = 90.0;
/// CPU temperature (°C) at or above this is "Moderate".
pub const TEMP_MODERATE_AT: f32 = 60.0;
pub const TEMP_CRITICAL_AT: f32 = 80.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Good,
    Moderate,
    Critical,
    #[default]
    Unknown,
}

impl HealthStatus {
    fn banded(value: f32, moderate: f32, critical: f32) -> Self {
        if !value.is_finite() {
            Self::Unknown
        } else if value < moderate {
            Self::Good
        } else if value < critical {
            Self::Moderate
        } else {
            Self::Critical
        }
    }

    pub fn for_usage(percent: f32) -> Self {
        Self::banded(percent, USAGE_MODERATE_AT, USAGE_CRITICAL_AT)
    }

    pub fn for_temperature(celsius: f32) -> Self {
        Self::banded(celsius, TEMP_MODERATE_AT, TEMP_CRITICAL_AT)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Critical => "Critical",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One live reading and its status band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub value: Option<f32>,
    pub status: HealthStatus,
}

impl Metric {
    pub fn usage(percent: Option<f32>) -> Self {
        Self {
            value: percent,
            status: percent.map_or(HealthStatus::Unknown, HealthStatus::for_usage),
        }
    }

    pub fn temperature(celsius: Option<f32>) -> Self {
        Self {
            value: celsius,
            status: celsius.map_or(HealthStatus::Unknown, HealthStatus::for_temperature),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub cpu_health: Metric,
    pub memory_health: Metric,
    pub disk_health: Metric,
    pub temp_health: Metric,
}

impl HealthMetrics {
    /// `(key, metric)` pairs in display order.
    pub fn entries(&self) -> [(&'static str, Metric); 4] {
        [
            ("cpu_health", self.cpu_health),
            ("memory_health", self.memory_health),
            ("disk_health", self.disk_health),
            ("temp_health", self.temp_health),
        ]
    }
}

/// `systemd-analyze` stage timings, each formatted like "2.51s".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootAnalysis {
    pub firmware: Option<String>,
    pub loader: Option<String>,
    pub kernel: Option<String>,
    pub initrd: Option<String>,
    pub userspace: Option<String>,
    pub total: Option<String>,
    pub graphical_target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub model: String,
    /// Full-charge capacity relative to design, e.g. "54.2%".
    pub health: Option<String>,
    pub replacement_recommended: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub name: String,
    pub mac: String,
    pub addresses: Vec<String>,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    /// MAC of the adapter holding `ip_address`.
    pub mac_address: Option<String>,
    pub adapters: Vec<AdapterInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_bands_are_half_open() {
        assert_eq!(HealthStatus::for_usage(69.9), HealthStatus::Good);
        assert_eq!(HealthStatus::for_usage(70.0), HealthStatus::Moderate);
        assert_eq!(HealthStatus::for_usage(89.9), HealthStatus::Moderate);
        assert_eq!(HealthStatus::for_usage(90.0), HealthStatus::Critical);
    }

    #[test]
    fn temperature_bands() {
        assert_eq!(HealthStatus::for_temperature(45.0), HealthStatus::Good);
        assert_eq!(HealthStatus::for_temperature(60.0), HealthStatus::Moderate);
        assert_eq!(HealthStatus::for_temperature(80.0), HealthStatus::Critical);
        assert_eq!(HealthStatus::for_temperature(f32::NAN), HealthStatus::Unknown);
    }

    #[test]
    fn missing_reading_is_unknown() {
        assert_eq!(Metric::usage(None).status, HealthStatus::Unknown);
    }
}
