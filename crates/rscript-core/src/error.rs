//! Error types for rscript-core.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for rscript-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rscript-core.
///
/// Script-level failures (combine, compile, runtime, busy, timeout) are not
/// errors here; they travel to the client as an `ExecutionResult`.
#[derive(Debug, Error)]
pub enum Error {
    /// Framing or connection failure on a local endpoint.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed to load dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// Request or response payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Toolchain error.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Execution error.
    #[error("execution error: {0}")]
    Execution(String),
}
