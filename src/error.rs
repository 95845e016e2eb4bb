use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// type alias for all operations in this crate that could fail with a [`DfsError`]
pub type Result<T> = std::result::Result<T, DfsError>;

/// Error variants used by the filesystem services and the RMI fabric.
///
/// Failures raised by a remote implementation travel back to the caller
/// inside a reply frame, so every variant is serializable. Lower level causes
/// that have no serializable form (`io::Error`, `serde_json::Error`) are
/// carried as their display strings.
#[derive(Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum DfsError {
    /// a local precondition was violated: malformed path, bad component,
    /// an interface that is not remote
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// a named path or target is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// a lifecycle rule was violated: restart after stop, double
    /// registration, stub creation from an unstarted skeleton
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// a read or write fell outside the bounds of a file
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// no address could be resolved for a host name
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// an invocation named a method the receiving interface does not declare
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// the wire layer failed: connect, serialize, read or write
    #[error("remote invocation failed: {0}")]
    Rmi(String),

    /// variant for errors caused by std::io outside the wire layer
    #[error("I/O error: {0}")]
    Io(String),

    /// variant for errors caused during type serialization/deserialization
    /// outside the wire layer
    #[error("serialization/deserialization error: {0}")]
    Serialization(String),

    /// an application-defined failure raised by a remote implementation
    #[error("{name}: {message}")]
    Application {
        /// the failure's type name, stable across the wire
        name: String,
        /// human-readable detail
        message: String,
    },
}

impl From<io::Error> for DfsError {
    fn from(e: io::Error) -> Self {
        DfsError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DfsError {
    fn from(e: serde_json::Error) -> Self {
        DfsError::Serialization(e.to_string())
    }
}

/// a custom Debug implementation that will write the entire error chain
impl std::fmt::Debug for DfsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// writes the entire error chain of the given error `e`, to the formatter.
fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by: {}", cause)?;
        current = cause.source();
    }
    Ok(())
}
