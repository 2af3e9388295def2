/// Probes and probe chains.
///
/// A [`Probe`] is one attempt to learn one attribute by one method. A
/// [`ProbeChain`] runs probes for the same attribute in priority order and
/// keeps the first meaningful answer. Probe failures never escape the
/// chain: a missing tool, a permission error, and unparseable output are
/// all just "no answer", and a chain with no answer resolves to
/// [`UNKNOWN`].
pub mod parse;
pub mod sources;

pub use sources::{CommandProbe, FnProbe, VirtualFileProbe};

use crate::error::ProbeError;
use crate::platform::HostEnv;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The value every unresolved attribute carries.
pub const UNKNOWN: &str = "Unknown";

/// How much a single answer can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Guessed from other attributes.
    Inferred,
    /// Read from an OS-exposed file or a general-purpose tool.
    Reported,
    /// Straight from firmware tables or a management API.
    Authoritative,
}

/// The detection strategy a probe uses. Chains are built in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeMethod {
    ManagementInterface,
    VirtualFile,
    CliTool,
    Heuristic,
}

impl ProbeMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::ManagementInterface => "management interface",
            Self::VirtualFile => "virtual file",
            Self::CliTool => "cli tool",
            Self::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAnswer {
    pub value: String,
    pub confidence: Confidence,
}

impl ProbeAnswer {
    pub fn new(value: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

/// One detection attempt for one attribute.
pub trait Probe: Send + Sync {
    /// Short identifier used in logs, e.g. `dmidecode -s bios-version`.
    fn name(&self) -> &str;
    fn method(&self) -> ProbeMethod;
    fn attempt(&self, host: &HostEnv) -> Result<ProbeAnswer, ProbeError>;
}

/// Outcome of running a chain. Never empty: unresolved chains carry
/// [`UNKNOWN`] with no confidence and no source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: String,
    pub confidence: Option<Confidence>,
    /// Name of the probe that answered.
    pub source: Option<String>,
}

impl Resolution {
    pub fn unknown() -> Self {
        Self {
            value: UNKNOWN.to_string(),
            confidence: None,
            source: None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.confidence.is_some()
    }
}

/// `true` if `value` carries information: not blank and not the sentinel.
pub fn is_meaningful(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN)
}

/// An ordered list of probes for one attribute.
pub struct ProbeChain {
    attribute: &'static str,
    probes: Vec<Box<dyn Probe>>,
    min_confidence: Option<Confidence>,
}

impl ProbeChain {
    pub fn new(attribute: &'static str) -> Self {
        Self {
            attribute,
            probes: Vec::new(),
            min_confidence: None,
        }
    }

    /// Append a probe; probes run in the order they were added.
    pub fn then(mut self, probe: impl Probe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Only stop early on answers at or above `level`. Weaker answers are
    /// held as tentative and used if nothing better turns up.
    pub fn require(mut self, level: Confidence) -> Self {
        self.min_confidence = Some(level);
        self
    }

    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn resolve(&self, host: &HostEnv) -> Resolution {
        let mut tentative: Option<(ProbeAnswer, &str)> = None;

        for probe in &self.probes {
            match probe.attempt(host) {
                Ok(answer) if is_meaningful(&answer.value) => {
                    let good_enough = self
                        .min_confidence
                        .map_or(true, |min| answer.confidence >= min);
                    if good_enough {
                        debug!(
                            "{}: answered by {} ({})",
                            self.attribute,
                            probe.name(),
                            probe.method().label()
                        );
                        return Resolution {
                            value: answer.value.trim().to_string(),
                            confidence: Some(answer.confidence),
                            source: Some(probe.name().to_string()),
                        };
                    }
                    let better = tentative
                        .as_ref()
                        .map_or(true, |(held, _)| answer.confidence > held.confidence);
                    if better {
                        tentative = Some((answer, probe.name()));
                    }
                }
                Ok(_) => debug!("{}: {} had no answer", self.attribute, probe.name()),
                Err(e) => debug!("{}: {} failed: {e}", self.attribute, probe.name()),
            }
        }

        match tentative {
            Some((answer, name)) => {
                debug!("{}: keeping tentative answer from {name}", self.attribute);
                Resolution {
                    value: answer.value.trim().to_string(),
                    confidence: Some(answer.confidence),
                    source: Some(name.to_string()),
                }
            }
            None => {
                debug!("{}: unresolved", self.attribute);
                Resolution::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CommandRunner, OsFamily, SysinfoSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoCommands;
    impl CommandRunner for NoCommands {
        fn run(&self, program: &str, _args: &[&str]) -> Result<String, ProbeError> {
            Err(ProbeError::Unavailable(program.into()))
        }
    }

    fn host() -> HostEnv {
        HostEnv::new("/nonexistent", OsFamily::Linux, Arc::new(NoCommands), Arc::new(SysinfoSource))
    }

    fn fixed(value: &'static str, confidence: Confidence) -> FnProbe {
        FnProbe::new(value, ProbeMethod::Heuristic, move |_| {
            Ok(ProbeAnswer::new(value, confidence))
        })
    }

    fn failing() -> FnProbe {
        FnProbe::new("failing", ProbeMethod::CliTool, |_| {
            Err(ProbeError::PermissionDenied("dmidecode".into()))
        })
    }

    #[test]
    fn first_meaningful_answer_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let chain = ProbeChain::new("bios_version")
            .then(failing())
            .then(fixed("  ", Confidence::Authoritative))
            .then(fixed("unknown", Confidence::Authoritative))
            .then(fixed("F.42", Confidence::Reported))
            .then(FnProbe::new("never", ProbeMethod::Heuristic, move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(ProbeAnswer::new("late", Confidence::Inferred))
            }));

        let res = chain.resolve(&host());
        assert_eq!(res.value, "F.42");
        assert_eq!(res.source.as_deref(), Some("F.42"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "later probes must be skipped");
    }

    #[test]
    fn all_failures_resolve_to_unknown() {
        let chain = ProbeChain::new("serial_number").then(failing()).then(failing());
        let res = chain.resolve(&host());
        assert_eq!(res.value, UNKNOWN);
        assert!(!res.is_known());
    }

    #[test]
    fn empty_chain_is_unknown() {
        assert_eq!(ProbeChain::new("x").resolve(&host()).value, UNKNOWN);
    }

    #[test]
    fn minimum_confidence_keeps_best_tentative() {
        let chain = ProbeChain::new("ram_type")
            .require(Confidence::Authoritative)
            .then(fixed("DDR4", Confidence::Inferred))
            .then(fixed("LPDDR4", Confidence::Reported))
            .then(failing());
        let res = chain.resolve(&host());
        assert_eq!(res.value, "LPDDR4");
        assert_eq!(res.confidence, Some(Confidence::Reported));
    }

    #[test]
    fn minimum_confidence_met_short_circuits() {
        let chain = ProbeChain::new("ram_type")
            .require(Confidence::Reported)
            .then(fixed("DDR3", Confidence::Inferred))
            .then(fixed("DDR5", Confidence::Authoritative))
            .then(fixed("DDR4", Confidence::Authoritative));
        assert_eq!(chain.resolve(&host()).value, "DDR5");
    }

    #[test]
    fn answers_are_trimmed() {
        let chain = ProbeChain::new("kernel").then(fixed(" 6.8.0-45-generic\n", Confidence::Reported));
        assert_eq!(chain.resolve(&host()).value, "6.8.0-45-generic");
    }
}
