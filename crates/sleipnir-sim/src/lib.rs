//! Statevector simulation kernel.
//!
//! This crate is the numerical engine behind every backend: it executes a
//! [`sleipnir_task::QuantumTask`] and produces the result document the rest
//! of the platform treats as opaque. Three entry points cover the three
//! execution shapes:
//!
//! - [`run`] for self-contained circuits,
//! - [`run_dynamic`] for circuits that exchange mid-circuit measurements
//!   with peer QPUs over a classical channel,
//! - [`run_aggregate`] for an executor jointly simulating a whole group of
//!   circuits in one state.
//!
//! Count keys in the emitted document are hex-encoded (`"0x3"`); the
//! backend adapters convert them to fixed-width bitstrings.

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod statevector;

pub use aggregate::{aggregate_clbits, run_aggregate};
pub use engine::{run, run_dynamic};
pub use error::{SimError, SimResult};
pub use statevector::Statevector;
