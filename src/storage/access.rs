//! The read/write interface a storage server exposes to clients.

use crate::error::{DfsError, Result};
use crate::path::Path;
use crate::rmi::method::{InterfaceDescriptor, MethodDescriptor, RMI_EXCEPTION};
use crate::rmi::skeleton::{Dispatch, Skeleton};
use crate::rmi::stub::{expect_interface, StubHandle};
use crate::rmi::wire::{argument, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// Read and write access to the files one storage server hosts.
pub trait Storage {
    /// Returns the length of `file` in bytes.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] unless `file` names a regular file on
    /// this server
    fn size(&self, file: &Path) -> Result<u64>;

    /// Reads `length` bytes of `file` starting at `offset`.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] unless `file` names a regular file and
    /// [`DfsError::OutOfBounds`] if the requested range extends past the end
    /// of the file
    fn read(&self, file: &Path, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Writes `data` into `file` at `offset`, extending the file as needed.
    ///
    /// # Errors
    /// returns [`DfsError::NotFound`] unless `file` names a regular file
    fn write(&self, file: &Path, offset: u64, data: &[u8]) -> Result<()>;
}

/// the wire descriptor of the [`Storage`] interface
pub(crate) fn descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Storage", vec![size_method(), read_method(), write_method()])
}

fn size_method() -> MethodDescriptor {
    MethodDescriptor::new("size", "u64", &["Path"], &[RMI_EXCEPTION, "NotFound"])
}

fn read_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "read",
        "bytes",
        &["Path", "u64", "u64"],
        &[RMI_EXCEPTION, "NotFound", "OutOfBounds"],
    )
}

fn write_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "write",
        "unit",
        &["Path", "u64", "bytes"],
        &[RMI_EXCEPTION, "NotFound", "OutOfBounds"],
    )
}

/// Client-side façade for the [`Storage`] interface of one storage server.
///
/// A serializable value; two stubs are equal when they target the same
/// server. The naming server hands these out to clients through
/// `get_storage`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageStub {
    handle: StubHandle,
}

impl StorageStub {
    /// Creates a stub for a storage skeleton, snapshotting its address.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if the skeleton does not serve
    /// the [`Storage`] interface and [`DfsError::IllegalState`] if it has no
    /// address yet
    pub fn of_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<StorageStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(StorageStub {
            handle: StubHandle::of_skeleton(skeleton)?,
        })
    }

    /// creates a stub for a storage skeleton with the hostname overridden
    pub fn of_skeleton_with_host<D: Dispatch>(
        skeleton: &Skeleton<D>,
        hostname: &str,
    ) -> Result<StorageStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(StorageStub {
            handle: StubHandle::of_skeleton_with_host(skeleton, hostname)?,
        })
    }

    /// creates a stub directly from a known server address
    pub fn connected_to(address: SocketAddr) -> Result<StorageStub> {
        Ok(StorageStub {
            handle: StubHandle::new(descriptor(), address)?,
        })
    }

    /// the server address this stub targets
    pub fn address(&self) -> SocketAddr {
        self.handle.address()
    }
}

impl Storage for StorageStub {
    fn size(&self, file: &Path) -> Result<u64> {
        decode(self.handle.invoke(&size_method(), vec![encode(file)?])?)
    }

    fn read(&self, file: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        decode(self.handle.invoke(
            &read_method(),
            vec![encode(file)?, encode(&offset)?, encode(&length)?],
        )?)
    }

    fn write(&self, file: &Path, offset: u64, data: &[u8]) -> Result<()> {
        decode(self.handle.invoke(
            &write_method(),
            vec![encode(file)?, encode(&offset)?, encode(&data)?],
        )?)
    }
}

/// Server-side dispatch table for [`Storage`] implementations.
pub struct StorageDispatch<S>(Arc<S>);

impl<S> StorageDispatch<S> {
    /// wraps an implementation for serving through a skeleton
    pub fn new(target: Arc<S>) -> StorageDispatch<S> {
        StorageDispatch(target)
    }
}

impl<S: Storage + Send + Sync + 'static> Dispatch for StorageDispatch<S> {
    fn dispatch(&self, method: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
        match method.name() {
            "size" => {
                let file: Path = argument(&mut args, 0)?;
                encode(&self.0.size(&file)?)
            }
            "read" => {
                let file: Path = argument(&mut args, 0)?;
                let offset: u64 = argument(&mut args, 1)?;
                let length: u64 = argument(&mut args, 2)?;
                encode(&self.0.read(&file, offset, length)?)
            }
            "write" => {
                let file: Path = argument(&mut args, 0)?;
                let offset: u64 = argument(&mut args, 1)?;
                let data: Vec<u8> = argument(&mut args, 2)?;
                self.0.write(&file, offset, &data)?;
                Ok(Value::Null)
            }
            other => Err(DfsError::NoSuchMethod(format!(
                "Storage has no method {}",
                other
            ))),
        }
    }
}
