//! QPU process error types.

use thiserror::Error;

/// Result type for QPU operations.
pub type QpuResult<T> = Result<T, QpuError>;

/// Errors raised by the QPU server, the backends and the executor.
#[derive(Debug, Error)]
pub enum QpuError {
    /// Bad task or parameter update from a submitter. Answered with an
    /// error document, never fatal.
    #[error(transparent)]
    Task(#[from] sleipnir_task::TaskError),

    /// Kernel failure while executing a circuit. Answered with an error
    /// document, never fatal.
    #[error(transparent)]
    Sim(#[from] sleipnir_sim::SimError),

    /// Socket or channel failure.
    #[error(transparent)]
    Net(#[from] sleipnir_net::NetError),

    /// Registry failure. Fatal for the current operation.
    #[error(transparent)]
    Registry(#[from] sleipnir_registry::RegistryError),

    /// A result document from a kernel or executor did not have the
    /// expected shape.
    #[error("malformed result document: {0}")]
    MalformedResult(String),

    /// Invalid process configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialisation failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
