/// RAM upgradability from fused evidence.
///
/// No single signal is trustworthy without root: chassis codes lie on
/// white-box machines, `dmidecode` is usually denied, and tool output
/// varies by distribution. The scorer therefore runs *every*
/// [`EvidenceProbe`], folds the resulting [`Signal`]s into one
/// [`EvidenceRecord`], and [`classify`] maps that record to a verdict with
/// ordered threshold rules. `classify` is a pure function of the record,
/// so the same signals always yield the same verdict.
pub mod probes;

use crate::error::ProbeError;
use crate::platform::HostEnv;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Score at or above which memory is judged upgradable.
pub const UPGRADABLE_AT: i32 = 10;
/// Score at or below which memory is judged soldered.
pub const SOLDERED_AT: i32 = -10;

pub const FORM_FACTOR_DIMM: &str = "DIMM";
pub const FORM_FACTOR_SODIMM: &str = "SODIMM";
pub const FORM_FACTOR_ONBOARD: &str = "BGA (Onboard)";

pub const LABEL_UPGRADABLE: &str = "Yes (Removable)";
pub const LABEL_SOLDERED: &str = "No (Soldered)";

/// One observation about the machine and what it implies for RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// SMBIOS chassis code 3-8 or 13.
    DesktopChassis,
    /// Product name such as "OptiPlex" or "ProDesk".
    DesktopProductName,
    /// Chassis code 9 or 10.
    LaptopChassis,
    /// Chassis code 11 or 14 (handheld, sub-notebook).
    HandheldChassis,
    BatteryPresent,
    /// U/Y-series CPU.
    LowPowerCpu,
    /// Product name such as "XPS" or "Spectre".
    UltrabookProductName,
    /// Under 4 GB installed.
    SmallMemory,
    /// Over 16 GB installed.
    LargeMemory,
    PowerOfTwoMemory,
    /// Physical memory array readable from firmware tables.
    MemoryArrayReadable,
    MemoryControllerListed,
    /// SODIMM/DIMM named in memory tool output.
    SlotString,
    /// LPDDR, BGA, "soldered" or "onboard" in tool output.
    SolderedString,
}

impl Signal {
    pub fn weight(self) -> i32 {
        match self {
            Self::DesktopChassis | Self::DesktopProductName => 20,
            Self::LaptopChassis => 0,
            Self::HandheldChassis | Self::LowPowerCpu | Self::SolderedString => -15,
            Self::BatteryPresent | Self::UltrabookProductName => -10,
            Self::SmallMemory => -5,
            Self::LargeMemory | Self::PowerOfTwoMemory | Self::MemoryControllerListed => 5,
            Self::MemoryArrayReadable => 10,
            Self::SlotString => 20,
        }
    }
}

/// Running score and categorical flags for one scoring run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub score: i32,
    pub is_desktop: bool,
    pub is_laptop: bool,
    pub is_thin_device: bool,
    pub has_memory_slots: bool,
    pub has_soldered_indicators: bool,
    /// Signals in the order they were recorded.
    pub signals: Vec<Signal>,
}

impl EvidenceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, signal: Signal) {
        self.score += signal.weight();
        match signal {
            Signal::DesktopChassis | Signal::DesktopProductName => self.is_desktop = true,
            Signal::LaptopChassis | Signal::BatteryPresent => self.is_laptop = true,
            Signal::HandheldChassis => {
                self.is_laptop = true;
                self.is_thin_device = true;
            }
            Signal::LowPowerCpu | Signal::UltrabookProductName => self.is_thin_device = true,
            Signal::MemoryArrayReadable | Signal::SlotString => self.has_memory_slots = true,
            Signal::SolderedString => self.has_soldered_indicators = true,
            Signal::SmallMemory
            | Signal::LargeMemory
            | Signal::PowerOfTwoMemory
            | Signal::MemoryControllerListed => {}
        }
        self.signals.push(signal);
    }

    pub fn with_signals(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut record = Self::new();
        for s in signals {
            record.record(s);
        }
        record
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub upgradable: bool,
    pub form_factor: &'static str,
    /// `false` when no rule fired and the verdict is the fallback guess.
    pub decisive: bool,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        if self.upgradable {
            LABEL_UPGRADABLE
        } else {
            LABEL_SOLDERED
        }
    }

    fn upgradable(record: &EvidenceRecord, decisive: bool) -> Self {
        Self {
            upgradable: true,
            form_factor: if record.is_laptop {
                FORM_FACTOR_SODIMM
            } else {
                FORM_FACTOR_DIMM
            },
            decisive,
        }
    }

    fn soldered(decisive: bool) -> Self {
        Self {
            upgradable: false,
            form_factor: FORM_FACTOR_ONBOARD,
            decisive,
        }
    }
}

/// Map a record to a verdict. Rules are evaluated in order:
///
/// 1. desktop chassis or product name: upgradable DIMM, regardless of any
///    soldered indicator;
/// 2. score ≥ [`UPGRADABLE_AT`] or memory-slot evidence: upgradable;
/// 3. score ≤ [`SOLDERED_AT`], a soldered indicator, or a thin laptop:
///    soldered;
/// 4. a laptop with nothing decisive gets a guess: soldered if the thin
///    flag is set, else upgradable SODIMM.
///
/// Anything else is undecided and returns `None`.
pub fn classify(record: &EvidenceRecord) -> Option<Verdict> {
    if record.is_desktop {
        return Some(Verdict {
            upgradable: true,
            form_factor: FORM_FACTOR_DIMM,
            decisive: true,
        });
    }
    if record.score >= UPGRADABLE_AT || record.has_memory_slots {
        return Some(Verdict::upgradable(record, true));
    }
    if record.score <= SOLDERED_AT
        || record.has_soldered_indicators
        || (record.is_thin_device && record.is_laptop)
    {
        return Some(Verdict::soldered(true));
    }
    if !record.is_laptop {
        return None;
    }
    if record.is_thin_device {
        Some(Verdict::soldered(false))
    } else {
        Some(Verdict::upgradable(record, false))
    }
}

/// Attributes already resolved by the hardware worker that some evidence
/// probes interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFacts {
    pub cpu: Option<String>,
    pub product: Option<String>,
    pub memory_bytes: Option<u64>,
}

/// Contributes zero or more signals. Unlike a [`crate::probe::Probe`],
/// every evidence probe runs; an error only means "no signals".
pub trait EvidenceProbe: Send + Sync {
    fn name(&self) -> &str;
    fn collect(&self, host: &HostEnv, facts: &KnownFacts) -> Result<Vec<Signal>, ProbeError>;
}

/// The full set of evidence probes.
pub struct EvidenceScorer {
    probes: Vec<Box<dyn EvidenceProbe>>,
}

impl Default for EvidenceScorer {
    fn default() -> Self {
        Self::new(probes::standard())
    }
}

impl EvidenceScorer {
    pub fn new(probes: Vec<Box<dyn EvidenceProbe>>) -> Self {
        Self { probes }
    }

    /// Run every probe, sequentially, and fold the signals.
    pub fn score(&self, host: &HostEnv, facts: &KnownFacts) -> EvidenceRecord {
        let mut record = EvidenceRecord::new();
        for probe in &self.probes {
            match probe.collect(host, facts) {
                Ok(signals) => {
                    for signal in signals {
                        debug!("evidence: {} -> {signal:?} ({:+})", probe.name(), signal.weight());
                        record.record(signal);
                    }
                }
                Err(e) => debug!("evidence: {} failed: {e}", probe.name()),
            }
        }
        record
    }

    pub fn assess(&self, host: &HostEnv, facts: &KnownFacts) -> (EvidenceRecord, Option<Verdict>) {
        let record = self.score(host, facts);
        let verdict = classify(&record);
        let outcome = match &verdict {
            Some(v) if v.decisive => v.label().to_string(),
            Some(v) => format!("{} (guess)", v.label()),
            None => "undecided".to_string(),
        };
        info!(
            "RAM evidence score {} (desktop={}, laptop={}, thin={}, slots={}, soldered={}) -> {outcome}",
            record.score,
            record.is_desktop,
            record.is_laptop,
            record.is_thin_device,
            record.has_memory_slots,
            record.has_soldered_indicators,
        );
        (record, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(signals: &[Signal]) -> EvidenceRecord {
        EvidenceRecord::with_signals(signals.iter().copied())
    }

    fn verdict(signals: &[Signal]) -> Verdict {
        classify(&record(signals)).expect("rules should decide")
    }

    #[test]
    fn desktop_overrides_soldered_indicators() {
        let v = verdict(&[Signal::DesktopChassis, Signal::SolderedString, Signal::SolderedString]);
        assert!(v.upgradable);
        assert_eq!(v.form_factor, FORM_FACTOR_DIMM);
        assert_eq!(v.label(), LABEL_UPGRADABLE);
    }

    #[test]
    fn score_of_exactly_ten_is_upgradable() {
        let r = record(&[Signal::LargeMemory, Signal::PowerOfTwoMemory]);
        assert_eq!(r.score, 10);
        assert!(classify(&r).is_some_and(|v| v.upgradable));
    }

    #[test]
    fn score_of_exactly_minus_ten_is_soldered() {
        let signals = [Signal::SmallMemory, Signal::SmallMemory];
        assert_eq!(record(&signals).score, -10);
        let v = verdict(&signals);
        assert!(!v.upgradable);
        assert_eq!(v.form_factor, FORM_FACTOR_ONBOARD);
        assert!(v.decisive);
    }

    #[test]
    fn slot_evidence_beats_negative_score() {
        let signals = [
            Signal::BatteryPresent,
            Signal::LowPowerCpu,
            Signal::MemoryArrayReadable,
        ];
        assert_eq!(record(&signals).score, -15);
        let v = verdict(&signals);
        assert!(v.upgradable);
        assert_eq!(v.form_factor, FORM_FACTOR_SODIMM);
    }

    #[test]
    fn thin_laptop_is_soldered() {
        let signals = [Signal::LaptopChassis, Signal::UltrabookProductName, Signal::LargeMemory];
        assert_eq!(record(&signals).score, -5);
        let v = verdict(&signals);
        assert!(!v.upgradable);
        assert!(v.decisive);
    }

    #[test]
    fn plain_laptop_defaults_to_sodimm_guess() {
        let v = verdict(&[Signal::LaptopChassis]);
        assert!(v.upgradable);
        assert!(!v.decisive);
        assert_eq!(v.form_factor, FORM_FACTOR_SODIMM);
    }

    /// Only laptops get a default guess; anything else is left to the
    /// firmware and tool chains.
    #[test]
    fn non_laptop_with_neutral_score_is_undecided() {
        assert_eq!(classify(&record(&[])), None);
        assert_eq!(classify(&record(&[Signal::LargeMemory, Signal::SmallMemory])), None);
        assert_eq!(classify(&record(&[Signal::UltrabookProductName, Signal::LargeMemory])), None);
    }

    #[test]
    fn classification_is_order_independent() {
        let a = record(&[Signal::BatteryPresent, Signal::SlotString, Signal::SolderedString]);
        let b = record(&[Signal::SolderedString, Signal::SlotString, Signal::BatteryPresent]);
        assert_eq!(classify(&a), classify(&b));
    }
}
