//! The client side of the RMI fabric.

use crate::error::{DfsError, Result};
use crate::rmi::method::{InterfaceDescriptor, MethodDescriptor};
use crate::rmi::skeleton::{Dispatch, Skeleton};
use crate::rmi::wire::{Call, Reply};
use serde::{Deserialize, Serialize};
use serde_json::{Deserializer, Value};
use std::fmt;
use std::io::{BufReader, BufWriter, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use tracing::debug;

/// The value half of a stub: the skeleton address it targets and the
/// interface it satisfies.
///
/// Handles are plain serializable values, transmissible across the wire,
/// and are equal if and only if they carry the same address and the same
/// interface - so two equal stubs always reach the same skeleton. The typed
/// façades (`ServiceStub`, `StorageStub`, ...) each wrap one handle and
/// route every interface method through [`invoke`].
///
/// [`invoke`]: #method.invoke
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubHandle {
    address: SocketAddr,
    interface: InterfaceDescriptor,
}

impl StubHandle {
    /// Creates a handle targeting a known remote address directly. Used to
    /// bootstrap, when no skeleton object is at hand.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if `interface` is not a remote
    /// interface
    pub fn new(interface: InterfaceDescriptor, address: SocketAddr) -> Result<StubHandle> {
        if !interface.is_remote() {
            return Err(DfsError::InvalidArgument(format!(
                "{} is not a remote interface",
                interface.name()
            )));
        }
        Ok(StubHandle { address, interface })
    }

    /// Creates a handle from a skeleton, snapshotting its current address.
    ///
    /// A wildcard bind address is substituted with the loopback address, the
    /// one place a wildcard-bound skeleton is always reachable.
    ///
    /// # Errors
    /// returns [`DfsError::IllegalState`] if the skeleton has no preassigned
    /// address and has never been started
    pub fn of_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<StubHandle> {
        let mut address = skeleton.address().ok_or_else(|| {
            DfsError::IllegalState(
                "skeleton has no address assigned and has not been started".to_string(),
            )
        })?;
        if address.ip().is_unspecified() {
            address.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        StubHandle::new(skeleton.interface().clone(), address)
    }

    /// Creates a handle from a skeleton with the hostname overridden; the
    /// port is inherited from the skeleton. Used when the skeleton's own
    /// address is not externally routable.
    ///
    /// # Errors
    /// returns [`DfsError::IllegalState`] if the skeleton has no address and
    /// [`DfsError::UnknownHost`] if `hostname` resolves to no address
    pub fn of_skeleton_with_host<D: Dispatch>(
        skeleton: &Skeleton<D>,
        hostname: &str,
    ) -> Result<StubHandle> {
        let port = skeleton
            .address()
            .ok_or_else(|| {
                DfsError::IllegalState(
                    "skeleton has no address assigned and has not been started".to_string(),
                )
            })?
            .port();
        let address = resolve(hostname, port)?;
        StubHandle::new(skeleton.interface().clone(), address)
    }

    /// the skeleton address this handle targets
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// the interface this handle satisfies
    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    /// Invokes a remote method: opens a fresh connection to the target,
    /// sends the invocation frame, and blocks for the reply.
    ///
    /// A raised reply is returned as the original failure, so remote
    /// failures surface at the call site exactly as local ones would.
    ///
    /// # Errors
    /// every connect, serialize or read failure of the wire itself is
    /// returned as [`DfsError::Rmi`] with a message naming the cause
    pub fn invoke(&self, method: &MethodDescriptor, args: Vec<Value>) -> Result<Value> {
        let tcp = TcpStream::connect(self.address)
            .map_err(|e| DfsError::Rmi(format!("failed to connect to {}: {}", self.address, e)))?;
        let mut writer = BufWriter::new(tcp.try_clone().map_err(|e| {
            DfsError::Rmi(format!("failed to clone the connection to {}: {}", self.address, e))
        })?);

        let call = Call {
            method: method.clone(),
            args,
        };
        serde_json::to_writer(&mut writer, &call).map_err(|e| {
            DfsError::Rmi(format!(
                "failed to send invocation of {} to {}: {}",
                method.name(),
                self.address,
                e
            ))
        })?;
        writer.flush().map_err(|e| {
            DfsError::Rmi(format!("failed to flush invocation to {}: {}", self.address, e))
        })?;
        debug!("sent invocation of {} to {}", method.name(), self.address);

        let mut reader = Deserializer::from_reader(BufReader::new(tcp));
        let reply = Reply::deserialize(&mut reader).map_err(|e| {
            DfsError::Rmi(format!("failed to read reply from {}: {}", self.address, e))
        })?;
        match reply {
            Reply::Return(value) => Ok(value),
            Reply::Raise(raised) => Err(raised),
        }
    }
}

impl fmt::Debug for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.interface.name(), self.address)
    }
}

/// Resolves a hostname and port to a socket address.
pub(crate) fn resolve(hostname: &str, port: u16) -> Result<SocketAddr> {
    (hostname, port)
        .to_socket_addrs()
        .map_err(|e| DfsError::UnknownHost(format!("{}: {}", hostname, e)))?
        .next()
        .ok_or_else(|| DfsError::UnknownHost(format!("no address found for {}", hostname)))
}

/// Checks that a skeleton serves the interface a typed façade expects.
///
/// Every typed stub factory calls this before snapshotting the skeleton's
/// address, so a stub can never carry an interface its target does not
/// serve.
pub(crate) fn expect_interface<D: Dispatch>(
    skeleton: &Skeleton<D>,
    expected: &InterfaceDescriptor,
) -> Result<()> {
    if skeleton.interface() != expected {
        return Err(DfsError::InvalidArgument(format!(
            "skeleton serves {}, not {}",
            skeleton.interface().name(),
            expected.name()
        )));
    }
    Ok(())
}
