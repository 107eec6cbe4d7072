//! Circuit instructions as they travel on the wire.

use serde::{Deserialize, Serialize};

/// One gate, measurement or peer operation.
///
/// Submitters may name classical bits either `clbits` or `memory`; the
/// kernel-side name is `memory` and that is what gets re-serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Gate or operation name (`"h"`, `"cx"`, `"measure"`,
    /// `"measure_and_send"`, `"remote_c_if"`, ...).
    pub name: String,

    /// Qubit operands.
    #[serde(default)]
    pub qubits: Vec<usize>,

    /// Rotation angles for parametric gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<f64>>,

    /// Classical bits written by measurements.
    #[serde(default, alias = "clbits", skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<usize>>,

    /// Peer routing for classical-communication operations. Logical QPU
    /// ids on submission, concrete endpoints after ingress rewrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qpus: Option<Vec<String>>,

    /// Gate applied by `remote_c_if` when the received bit is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_gate: Option<String>,
}

impl Instruction {
    /// Number of parameter values this instruction consumes from a
    /// positional rebinding vector.
    pub fn param_arity(&self) -> usize {
        match self.name.as_str() {
            "rx" | "ry" | "rz" => 1,
            "r" => 2,
            "u" | "cu" => 3,
            _ => 0,
        }
    }
}
