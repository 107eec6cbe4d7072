//! Registry error type.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A failed registry operation.
///
/// Open, lock, read, parse, truncate and write failures all surface as this
/// one kind: callers cannot repair a broken registry file, they can only
/// abort the operation. The originating system message is preserved.
#[derive(Debug, Error)]
#[error("registry operation failed on {path}: {message}")]
pub struct RegistryError {
    /// The registry file involved.
    pub path: PathBuf,
    /// The underlying system or parse message.
    pub message: String,
}

impl RegistryError {
    pub(crate) fn new(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::new("/tmp/qpus.json", "permission denied");
        assert_eq!(
            err.to_string(),
            "registry operation failed on /tmp/qpus.json: permission denied"
        );
    }
}
