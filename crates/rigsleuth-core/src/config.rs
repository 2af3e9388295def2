/// Engine configuration.
///
/// Defaults are tuned for an interactive bench tool: a five minute cache so
/// flipping between views does not re-probe the machine, and a five second
/// ceiling on any single external tool.
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default time-to-live of a cached gather.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default ceiling for one external command invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_CACHE_TTL: &str = "RIGSLEUTH_CACHE_TTL_SECS";
pub const ENV_COMMAND_TIMEOUT: &str = "RIGSLEUTH_COMMAND_TIMEOUT_SECS";
pub const ENV_SYS_ROOT: &str = "RIGSLEUTH_SYS_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// A cached gather younger than this is returned without probing.
    pub cache_ttl: Duration,
    /// External tools are killed after this long.
    pub command_timeout: Duration,
    /// Prefix applied to every `/sys`, `/proc` and `/etc` read.
    pub sys_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            sys_root: PathBuf::from("/"),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `RIGSLEUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Malformed numbers are
    /// logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_CACHE_TTL) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.cache_ttl = Duration::from_secs(secs),
                Err(_) => warn!("Ignoring {ENV_CACHE_TTL}={raw:?}: not a whole number of seconds"),
            }
        }
        if let Some(raw) = lookup(ENV_COMMAND_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.command_timeout = Duration::from_secs(secs),
                _ => warn!("Ignoring {ENV_COMMAND_TIMEOUT}={raw:?}: expected seconds > 0"),
            }
        }
        if let Some(raw) = lookup(ENV_SYS_ROOT) {
            if !raw.trim().is_empty() {
                self.sys_root = PathBuf::from(raw.trim());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.command_timeout, Duration::from_secs(5));
        assert_eq!(cfg.sys_root, PathBuf::from("/"));
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let cfg = EngineConfig::default().with_overrides(|name| match name {
            ENV_CACHE_TTL => Some("30".into()),
            ENV_COMMAND_TIMEOUT => Some("soon".into()),
            ENV_SYS_ROOT => Some("/tmp/capture".into()),
            _ => None,
        });
        assert_eq!(cfg.cache_ttl, Duration::from_secs(30));
        assert_eq!(cfg.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(cfg.sys_root, PathBuf::from("/tmp/capture"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = EngineConfig::default().with_overrides(|name| {
            (name == ENV_COMMAND_TIMEOUT).then(|| "0".to_string())
        });
        assert_eq!(cfg.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }
}
