//! Process configuration: backend selection and supported gate set.

use std::fmt;
use std::str::FromStr;

use crate::backend::{Backend, CcBackend, QcBackend, SimpleBackend};
use crate::error::{QpuError, QpuResult};

/// Gate names accepted on the wire.
pub const BASIS_GATES: &[&str] = &[
    "id", "x", "y", "z", "h", "s", "sdg", "t", "tdg", "sx", "sxdg", "p", "rx", "ry", "rz", "r",
    "u", "cu", "cx", "cy", "cz", "ch", "swap", "ccx", "measure", "reset", "measure_and_send",
    "remote_c_if",
];

/// Which execution strategy a QPU process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local kernel, no peer communication.
    Simple,
    /// Local kernel with classical communication to peers.
    Cc,
    /// Delegation to a group executor.
    Qc,
}

impl FromStr for BackendKind {
    type Err = QpuError;

    fn from_str(value: &str) -> QpuResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "simple" => Ok(BackendKind::Simple),
            "cc" => Ok(BackendKind::Cc),
            "qc" => Ok(BackendKind::Qc),
            other => Err(QpuError::Config(format!(
                "unrecognised backend kind {other:?}, expected simple, cc or qc"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Simple => write!(f, "simple"),
            BackendKind::Cc => write!(f, "cc"),
            BackendKind::Qc => write!(f, "qc"),
        }
    }
}

/// Construct the backend for this process.
///
/// `group` is the family or group suffix used when the backend publishes
/// its channel. Failures here are configuration errors: the process aborts
/// before serving anything.
pub fn build_backend(kind: BackendKind, group: &str) -> QpuResult<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::Simple => Box::new(SimpleBackend::new()),
        BackendKind::Cc => Box::new(CcBackend::new(group)?),
        BackendKind::Qc => Box::new(QcBackend::new(group)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("simple".parse::<BackendKind>().unwrap(), BackendKind::Simple);
        assert_eq!("CC".parse::<BackendKind>().unwrap(), BackendKind::Cc);
        assert_eq!("qc".parse::<BackendKind>().unwrap(), BackendKind::Qc);
        assert!(matches!(
            "aer".parse::<BackendKind>(),
            Err(QpuError::Config(_))
        ));
    }

    #[test]
    fn test_backend_kind_round_trips_through_display() {
        for kind in [BackendKind::Simple, BackendKind::Cc, BackendKind::Qc] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
