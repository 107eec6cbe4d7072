//! The unit of submission: a quantum circuit plus its execution config.
//!
//! A [`QuantumTask`] arrives as one JSON document on the QPU's client
//! socket. Two message shapes are accepted:
//!
//! - a full task (`id`, `config`, `instructions`, ...) which replaces the
//!   current circuit, and
//! - a parameter update (`{"params": [...]}`) which rebinds the rotation
//!   angles of the previously received circuit in place.
//!
//! When a task declares `has_cc`, its instructions refer to peers by
//! logical QPU id. Those ids are rewritten to concrete `tcp://` endpoints
//! exactly once, on ingress, by resolving them against the communications
//! registry; the backend only ever sees endpoints.

pub mod error;
pub mod instruction;
pub mod task;

pub use error::{TaskError, TaskResult};
pub use instruction::Instruction;
pub use task::QuantumTask;
