//! The mutation interface the naming server drives on a storage server.

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

/// File creation and deletion on one storage server. Issued by the naming
/// server, never by clients directly.
pub trait Command {
    /// Creates an empty file at `path`, creating parent directories as
    /// needed. Returns `false` if `path` is the root or already exists.
    fn create(&self, path: &Path) -> Result<bool>;

    /// Deletes the file or directory tree at `path`. Returns `false` if
    /// `path` is the root or does not exist.
    fn delete(&self, path: &Path) -> Result<bool>;
}

/// the wire descriptor of the [`Command`] interface
pub(crate) fn descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Command", vec![create_method(), delete_method()])
}

fn create_method() -> MethodDescriptor {
    MethodDescriptor::new("create", "bool", &["Path"], &[RMI_EXCEPTION])
}

fn delete_method() -> MethodDescriptor {
    MethodDescriptor::new("delete", "bool", &["Path"], &[RMI_EXCEPTION])
}

/// Client-side façade for the [`Command`] interface of one storage server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandStub {
    handle: StubHandle,
}

impl CommandStub {
    /// Creates a stub for a command skeleton, snapshotting its address.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if the skeleton does not serve
    /// the [`Command`] interface and [`DfsError::IllegalState`] if it has no
    /// address yet
    pub fn of_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<CommandStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(CommandStub {
            handle: StubHandle::of_skeleton(skeleton)?,
        })
    }

    /// creates a stub for a command skeleton with the hostname overridden
    pub fn of_skeleton_with_host<D: Dispatch>(
        skeleton: &Skeleton<D>,
        hostname: &str,
    ) -> Result<CommandStub> {
        expect_interface(skeleton, &descriptor())?;
        Ok(CommandStub {
            handle: StubHandle::of_skeleton_with_host(skeleton, hostname)?,
        })
    }

    /// creates a stub directly from a known server address
    pub fn connected_to(address: SocketAddr) -> Result<CommandStub> {
        Ok(CommandStub {
            handle: StubHandle::new(descriptor(), address)?,
        })
    }

    /// the server address this stub targets
    pub fn address(&self) -> SocketAddr {
        self.handle.address()
    }
}

impl Command for CommandStub {
    fn create(&self, path: &Path) -> Result<bool> {
        decode(self.handle.invoke(&create_method(), vec![encode(path)?])?)
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        decode(self.handle.invoke(&delete_method(), vec![encode(path)?])?)
    }
}

/// Server-side dispatch table for [`Command`] implementations.
pub struct CommandDispatch<C>(Arc<C>);

impl<C> CommandDispatch<C> {
    /// wraps an implementation for serving through a skeleton
    pub fn new(target: Arc<C>) -> CommandDispatch<C> {
        CommandDispatch(target)
    }
}

impl<C: Command + Send + Sync + 'static> Dispatch for CommandDispatch<C> {
    fn dispatch(&self, method: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
        match method.name() {
            "create" => {
                let path: Path = argument(&mut args, 0)?;
                encode(&self.0.create(&path)?)
            }
            "delete" => {
                let path: Path = argument(&mut args, 0)?;
                encode(&self.0.delete(&path)?)
            }
            other => Err(DfsError::NoSuchMethod(format!(
                "Command has no method {}",
                other
            ))),
        }
    }
}
