//! The interface storage servers use to join the filesystem.

use crate::error::{DfsError, Result};
use crate::path::Path;
use crate::rmi::method::{InterfaceDescriptor, MethodDescriptor, RMI_EXCEPTION};
use crate::rmi::skeleton::{Dispatch, Skeleton};
use crate::rmi::stub::{expect_interface, StubHandle};
use crate::rmi::wire::{argument, decode, encode};
use crate::storage::{CommandStub, StorageStub};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// Registration of storage servers with the naming server. Each storage
/// server registers exactly once, when it starts.
pub trait Registration {
    /// Registers a storage server identified by its two stubs, offering the
    /// given file paths to the namespace.
    ///
    /// Paths already claimed by another server, or already known as
    /// directories, are returned; the caller must delete its local copies of
    /// them. The root path is ignored if present.
    ///
    /// # Errors
    /// returns [`DfsError::IllegalState`] if an equal pair of stubs is
    /// already registered
    fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>>;
}

/// the wire descriptor of the [`Registration`] interface
pub(crate) fn descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Registration", vec![register_method()])
}

fn register_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "register",
        "Vec<Path>",
        &["StorageStub", "CommandStub", "Vec<Path>"],
        &[RMI_EXCEPTION, "IllegalState"],
    )
}

/// Client-side façade for the naming server's [`Registration`] interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationStub {
    handle: StubHandle,
}

impl RegistrationStub {
    /// creates a stub for a registration skeleton, snapshotting its address
    pub fn of_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<RegistrationStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(RegistrationStub {
            handle: StubHandle::of_skeleton(skeleton)?,
        })
    }

    /// creates a stub directly from a known naming server address
    pub fn connected_to(address: SocketAddr) -> Result<RegistrationStub> {
        Ok(RegistrationStub {
            handle: StubHandle::new(descriptor(), address)?,
        })
    }
}

impl Registration for RegistrationStub {
    fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>> {
        decode(self.handle.invoke(
            &register_method(),
            vec![encode(&storage)?, encode(&command)?, encode(&files)?],
        )?)
    }
}

/// Server-side dispatch table for [`Registration`] implementations.
pub struct RegistrationDispatch<R>(Arc<R>);

impl<R> RegistrationDispatch<R> {
    /// wraps an implementation for serving through a skeleton
    pub fn new(target: Arc<R>) -> RegistrationDispatch<R> {
        RegistrationDispatch(target)
    }
}

impl<R: Registration + Send + Sync + 'static> Dispatch for RegistrationDispatch<R> {
    fn dispatch(&self, method: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
        match method.name() {
            "register" => {
                let storage: StorageStub = argument(&mut args, 0)?;
                let command: CommandStub = argument(&mut args, 1)?;
                let files: Vec<Path> = argument(&mut args, 2)?;
                encode(&self.0.register(storage, command, files)?)
            }
            other => Err(DfsError::NoSuchMethod(format!(
                "Registration has no method {}",
                other
            ))),
        }
    }
}
