//! Registry keys and well-known paths.

use std::env;
use std::path::PathBuf;

/// Name of the state directory under `$STORE`.
const STATE_DIR: &str = ".cunqa";

/// Fallback for missing SLURM identifiers.
const UNKNOWN: &str = "UNKNOWN";

/// Root of the shared state directory.
///
/// `$STORE` points at a filesystem visible from every node of the
/// allocation. Outside the cluster it falls back to `$HOME`, then to the
/// current directory.
pub fn state_dir() -> PathBuf {
    let root = env::var("STORE")
        .or_else(|_| env::var("HOME"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(root).join(STATE_DIR)
}

/// Path of the QPU discovery file.
pub fn qpus_path() -> PathBuf {
    state_dir().join("qpus.json")
}

/// Path of the classical-channel discovery file.
pub fn communications_path() -> PathBuf {
    state_dir().join("communications.json")
}

/// Registry key identifying the calling process.
///
/// The key is `"<job>_<pid>"`, extended with `"_<suffix>"` when a family or
/// group suffix is given. Missing environment variables become `"UNKNOWN"`.
pub fn process_key(suffix: &str) -> String {
    let job = env::var("SLURM_JOB_ID").unwrap_or_else(|_| UNKNOWN.to_string());
    let pid = env::var("SLURM_TASK_PID").unwrap_or_else(|_| UNKNOWN.to_string());
    if suffix.is_empty() {
        format!("{job}_{pid}")
    } else {
        format!("{job}_{pid}_{suffix}")
    }
}

/// Node name reported in `qpus.json` entries.
pub fn nodename() -> String {
    env::var("SLURMD_NODENAME").unwrap_or_else(|_| "login".to_string())
}
