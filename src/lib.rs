#![deny(missing_docs)]
//! # dfs
//! A distributed filesystem built on a custom remote-method-invocation
//! fabric.
//!
//! The system is made of three cooperating pieces. A single
//! [`NamingServer`] maintains the global directory tree and maps each file
//! path to the storage server hosting its content. A fleet of
//! [`StorageServer`]s holds file content under local directories and
//! registers it with the naming server on startup. The [`rmi`] fabric lets
//! these services, and external clients, invoke one another over TCP as if
//! the calls were local: a skeleton serves one remote interface, and a
//! serializable stub forwards each call to it over a fresh connection,
//! re-raising remote failures at the call site.
//!
//! All of the filesystem interfaces are keyed by the immutable [`Path`]
//! value type.
//!
//! [`NamingServer`]: naming/struct.NamingServer.html
//! [`StorageServer`]: storage/struct.StorageServer.html
//! [`Path`]: struct.Path.html
//! [`rmi`]: rmi/index.html

/// Error and result types shared across the crate.
pub mod error;
/// The naming server: directory tree and storage-server registration.
pub mod naming;
/// The immutable [`Path`] value type used throughout the filesystem.
pub mod path;
/// The remote-method-invocation fabric connecting services and clients.
pub mod rmi;
/// Storage servers holding file content under local directories.
pub mod storage;

pub use crate::error::{DfsError, Result};
pub use crate::path::Path;
