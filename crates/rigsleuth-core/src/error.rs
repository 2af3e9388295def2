/// Error types for probes, category workers, and report output.
///
/// None of these ever reach the caller of [`crate::engine::Engine::gather`]:
/// probe errors are swallowed by the chain runner, worker errors are
/// recorded in the snapshot, and report errors only surface from the
/// explicit save functions.
use std::io;
use thiserror::Error;

/// Why a single probe produced no answer.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The file, binary, or interface does not exist on this machine.
    #[error("{0} is not available")]
    Unavailable(String),

    /// The source exists but the current user may not read it.
    #[error("permission denied reading {0}")]
    PermissionDenied(String),

    /// The tool ran and exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The tool did not finish within the configured command timeout.
    #[error("{program} timed out")]
    TimedOut { program: String },

    /// The source answered, but not in a shape the parser understands.
    #[error("{probe}: unexpected output ({detail})")]
    Malformed { probe: String, detail: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ProbeError {
    /// Map an `io::Error` raised while touching `what` to the matching variant.
    pub fn from_io(what: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::Unavailable(what.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(what.to_string()),
            _ => Self::Io(err),
        }
    }

    /// Shorthand for a parser that found nothing it recognised.
    pub fn malformed(probe: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            probe: probe.to_string(),
            detail: detail.into(),
        }
    }
}

/// An unexpected failure that aborts a whole information category.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{category} worker failed: {message}")]
    Failed {
        category: &'static str,
        message: String,
    },
}

/// Failures while writing a report to disk.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_unavailable() {
        let err = ProbeError::from_io("/sys/x", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProbeError::Unavailable(p) if p == "/sys/x"));
    }

    #[test]
    fn permission_maps_to_denied() {
        let err = ProbeError::from_io("dmidecode", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ProbeError::PermissionDenied(_)));
    }
}
