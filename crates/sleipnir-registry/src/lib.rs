//! File-locked JSON registries for process rendezvous.
//!
//! Sleipnir processes are launched independently by the batch scheduler and
//! have no common parent to wire them together. Instead they meet through two
//! JSON files in a well-known state directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `qpus.json` | One entry per running QPU: backend description, network endpoint, name, family |
//! | `communications.json` | One entry per published classical channel, plus the executor endpoint when one is in use |
//!
//! Both files are plain JSON objects keyed by `"<job>_<pid>[_<suffix>]"`,
//! where the job and pid components come from the `SLURM_JOB_ID` and
//! `SLURM_TASK_PID` environment variables (`"UNKNOWN"` outside a SLURM
//! allocation, so local development keeps working).
//!
//! Every mutation runs under an exclusive whole-file advisory lock and
//! rewrites the file in full, so concurrent writers always observe a
//! consistent snapshot and the final contents equal some serial composition
//! of the updates.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sleipnir_registry as registry;
//!
//! let entry = json!({"communications_endpoint": "tcp://10.0.0.1:40001"});
//! registry::write_on_file(&entry, &registry::communications_path(), "")?;
//! # Ok::<(), registry::RegistryError>(())
//! ```

pub mod error;
pub mod file;
pub mod keys;

pub use error::{RegistryError, RegistryResult};
pub use file::{merge_into_entry, read_snapshot, remove_from_file, write_on_file};
pub use keys::{communications_path, nodename, process_key, qpus_path, state_dir};
