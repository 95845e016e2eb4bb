//! The filesystem interface the naming server exposes to clients.

use crate::error::{DfsError, Result};
use crate::path::Path;
use crate::rmi::method::{InterfaceDescriptor, MethodDescriptor, RMI_EXCEPTION};
use crate::rmi::skeleton::{Dispatch, Skeleton};
use crate::rmi::stub::{expect_interface, StubHandle};
use crate::rmi::wire::{argument, decode, encode};
use crate::storage::StorageStub;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// The operations clients perform against the global namespace.
///
/// Paths passed to these operations name entries in the directory tree the
/// naming server maintains; file content itself is read and written against
/// the storage server [`get_storage`] resolves.
///
/// [`get_storage`]: #tymethod.get_storage
pub trait Service {
    /// Determines whether `path` names a directory.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if `path` is in the namespace neither
    /// as a directory nor as a file
    fn is_directory(&self, path: &Path) -> Result<bool>;

    /// Lists the names of the immediate children of the directory `directory`.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if `directory` is not a directory
    fn list(&self, directory: &Path) -> Result<Vec<String>>;

    /// Creates the file `file` on a randomly chosen storage server and
    /// records it in the namespace. Returns `false` if `file` already
    /// exists.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if the parent of `file` is not a
    /// directory, [`DfsError::IllegalState`] if no storage server is
    /// registered, and any failure of the remote creation
    fn create_file(&self, file: &Path) -> Result<bool>;

    /// Creates the directory `directory`. Returns `false` if it already
    /// exists.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if the parent is not a directory
    fn create_directory(&self, directory: &Path) -> Result<bool>;

    /// Deletes `path` from the namespace and from every storage server
    /// hosting content beneath it. Returns `true` when everything was
    /// removed; the root cannot be deleted.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if `path` is not in the namespace, and
    /// any failure of the remote deletions
    fn delete(&self, path: &Path) -> Result<bool>;

    /// Returns a stub for the storage server hosting the file `file`.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] if `file` is not a registered file
    fn get_storage(&self, file: &Path) -> Result<StorageStub>;
}

/// the wire descriptor of the [`Service`] interface
pub(crate) fn descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::new(
        "Service",
        vec![
            is_directory_method(),
            list_method(),
            create_file_method(),
            create_directory_method(),
            delete_method(),
            get_storage_method(),
        ],
    )
}

fn is_directory_method() -> MethodDescriptor {
    MethodDescriptor::new("is_directory", "bool", &["Path"], &[RMI_EXCEPTION, "NotFound"])
}

fn list_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "list",
        "Vec<String>",
        &["Path"],
        &[RMI_EXCEPTION, "NotFound"],
    )
}

fn create_file_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "create_file",
        "bool",
        &["Path"],
        &[RMI_EXCEPTION, "NotFound", "IllegalState"],
    )
}

fn create_directory_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "create_directory",
        "bool",
        &["Path"],
        &[RMI_EXCEPTION, "NotFound"],
    )
}

fn delete_method() -> MethodDescriptor {
    MethodDescriptor::new("delete", "bool", &["Path"], &[RMI_EXCEPTION, "NotFound"])
}

fn get_storage_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "get_storage",
        "StorageStub",
        &["Path"],
        &[RMI_EXCEPTION, "NotFound"],
    )
}

/// Client-side façade for the naming server's [`Service`] interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceStub {
    handle: StubHandle,
}

impl ServiceStub {
    /// creates a stub for a service skeleton, snapshotting its address
    pub fn of_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<ServiceStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(ServiceStub {
            handle: StubHandle::of_skeleton(skeleton)?,
        })
    }

    /// creates a stub directly from a known naming server address
    pub fn connected_to(address: SocketAddr) -> Result<ServiceStub> {
        Ok(ServiceStub {
            handle: StubHandle::new(descriptor(), address)?,
        })
    }
}

impl Service for ServiceStub {
    fn is_directory(&self, path: &Path) -> Result<bool> {
        decode(self.handle.invoke(&is_directory_method(), vec![encode(path)?])?)
    }

    fn list(&self, directory: &Path) -> Result<Vec<String>> {
        decode(self.handle.invoke(&list_method(), vec![encode(directory)?])?)
    }

    fn create_file(&self, file: &Path) -> Result<bool> {
        decode(self.handle.invoke(&create_file_method(), vec![encode(file)?])?)
    }

    fn create_directory(&self, directory: &Path) -> Result<bool> {
        decode(
            self.handle
                .invoke(&create_directory_method(), vec![encode(directory)?])?,
        )
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        decode(self.handle.invoke(&delete_method(), vec![encode(path)?])?)
    }

    fn get_storage(&self, file: &Path) -> Result<StorageStub> {
        decode(self.handle.invoke(&get_storage_method(), vec![encode(file)?])?)
    }
}

/// Server-side dispatch table for [`Service`] implementations.
pub struct ServiceDispatch<S>(Arc<S>);

impl<S> ServiceDispatch<S> {
    /// wraps an implementation for serving through a skeleton
    pub fn new(target: Arc<S>) -> ServiceDispatch<S> {
        ServiceDispatch(target)
    }
}

impl<S: Service + Send + Sync + 'static> Dispatch for ServiceDispatch<S> {
    fn dispatch(&self, method: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
        let path: Path = argument(&mut args, 0)?;
        match method.name() {
            "is_directory" => encode(&self.0.is_directory(&path)?),
            "list" => encode(&self.0.list(&path)?),
            "create_file" => encode(&self.0.create_file(&path)?),
            "create_directory" => encode(&self.0.create_directory(&path)?),
            "delete" => encode(&self.0.delete(&path)?),
            "get_storage" => encode(&self.0.get_storage(&path)?),
            other => Err(DfsError::NoSuchMethod(format!(
                "Service has no method {}",
                other
            ))),
        }
    }
}
