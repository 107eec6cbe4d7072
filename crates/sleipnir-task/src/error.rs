//! Task ingress error types.

use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors raised while parsing, rebinding or rewriting a task.
///
/// All of these are protocol errors from the submitter's point of view: the
/// QPU answers them with an `{"ERROR": ...}` document and keeps serving.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The message is neither a task nor a parameter update.
    #[error("message is neither a circuit nor a parameter update")]
    MalformedMessage,

    /// A parameter update arrived before any circuit.
    #[error("circuit not sent before updating parameters")]
    CircuitMissing,

    /// The parameter vector does not match the circuit's parametric gates.
    #[error("parameter arity mismatch: circuit consumes {expected} values, got {got}")]
    ParamArity { expected: usize, got: usize },

    /// A parametric gate in the stored circuit is missing its params field.
    #[error("gate {0} has no params to rebind")]
    MissingParams(String),

    /// A logical QPU id was not found in the communications registry.
    #[error("unknown peer id {0} in communications registry")]
    UnknownPeer(String),

    /// A registry entry exists but lacks a usable endpoint field.
    #[error("registry entry for {0} has no communications endpoint")]
    MissingEndpoint(String),

    /// JSON (de)serialisation failure.
    #[error("invalid task JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The communications registry could not be read.
    #[error(transparent)]
    Registry(#[from] sleipnir_registry::RegistryError),
}
