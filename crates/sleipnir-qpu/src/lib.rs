//! The QPU server process and its backend strategies.
//!
//! A [`Qpu`] ties together a client-facing request/reply socket, a FIFO
//! message queue and a [`Backend`]. Starting it registers the QPU in the
//! discovery file and runs two worker threads for the rest of the process
//! lifetime: a listen thread feeding the queue and a compute thread
//! draining it, one task at a time, replying in arrival order.
//!
//! Three backend strategies cover the execution paths:
//!
//! | Backend | Path |
//! |---------|------|
//! | [`SimpleBackend`] | hand the task to the local kernel |
//! | [`CcBackend`] | same, but wired to peer QPUs for mid-circuit measurement exchange |
//! | [`QcBackend`] | delegate whole circuits to a group [`Executor`] for joint simulation |
//!
//! The [`Executor`] is its own process shape: it fans in one circuit per
//! member QPU, simulates the group jointly and fans the result back out.

pub mod backend;
pub mod config;
pub mod counts;
pub mod error;
pub mod executor;
pub mod qpu;

pub use backend::{Backend, BackendConfig, CcBackend, QcBackend, SimpleBackend};
pub use config::{build_backend, BackendKind};
pub use error::{QpuError, QpuResult};
pub use executor::Executor;
pub use qpu::Qpu;
