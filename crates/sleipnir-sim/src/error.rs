//! Kernel error types.

use thiserror::Error;

/// Result type for kernel operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while executing a circuit.
#[derive(Debug, Error)]
pub enum SimError {
    /// The circuit names a gate the kernel does not implement.
    #[error("unsupported gate: {0}")]
    UnsupportedGate(String),

    /// An instruction addresses a qubit outside the register.
    #[error("qubit {qubit} out of range for a {num_qubits}-qubit register")]
    QubitOutOfRange { qubit: usize, num_qubits: usize },

    /// The register would not fit in memory.
    #[error("circuit needs {requested} qubits, kernel supports at most {max}")]
    TooManyQubits { requested: usize, max: usize },

    /// A parametric gate arrived without enough parameter values.
    #[error("gate {gate} expects {expected} parameters")]
    MissingParams { gate: &'static str, expected: usize },

    /// An instruction arrived with fewer qubit operands than its gate needs.
    #[error("gate {gate} expects {expected} qubit operands, got {got}")]
    MissingOperands {
        gate: String,
        expected: usize,
        got: usize,
    },

    /// A measurement targets a classical bit outside the register.
    #[error("classical bit {0} out of range for the 128-bit register")]
    ClbitOutOfRange(usize),

    /// A peer operation has no `qpus` routing entry.
    #[error("instruction {0} carries no peer routing")]
    MissingRouting(String),

    /// A `remote_c_if` has no gate to apply.
    #[error("remote_c_if carries no conditional gate")]
    MissingConditionalGate,

    /// A peer operation ran without a classical channel.
    #[error("instruction {0} requires a classical channel")]
    ChannelRequired(String),

    /// A joint simulation reached a state where every member circuit is
    /// blocked waiting for a bit nobody will produce.
    #[error("aggregate simulation stalled: circular or unmatched peer messaging")]
    AggregateStalled,

    /// Classical channel failure during dynamic execution.
    #[error(transparent)]
    Net(#[from] sleipnir_net::NetError),
}
