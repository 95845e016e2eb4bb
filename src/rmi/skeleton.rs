//! The server side of the RMI fabric.

use crate::error::{DfsError, Result};
use crate::rmi::method::{InterfaceDescriptor, MethodDescriptor};
use crate::rmi::pool::CachedPool;
use crate::rmi::wire::{Call, Reply};
use serde::Deserialize;
use serde_json::{Deserializer, Value};
use std::io::{BufReader, BufWriter, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// The server side of a generated dispatch table.
///
/// One implementation of this trait exists per remote interface. It decodes
/// the positional argument array and invokes the matching method on the
/// wrapped implementation object. The [`Skeleton`] resolves the incoming
/// descriptor against its interface before calling [`dispatch`], so
/// implementations only ever see methods their interface declares.
///
/// [`dispatch`]: #tymethod.dispatch
pub trait Dispatch: Send + Sync + 'static {
    /// Invokes the described method with the decoded arguments.
    ///
    /// An `Err` return is the failure the method raised; it travels back to
    /// the caller in the reply frame and is re-raised there.
    fn dispatch(&self, method: &MethodDescriptor, args: Vec<Value>) -> Result<Value>;
}

/// lifecycle of a skeleton; `Stopped` is terminal
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

type ErrorHook = Box<dyn Fn(&DfsError) + Send>;

/// state shared between the skeleton handle, its acceptor and its workers
struct Shared {
    interface: InterfaceDescriptor,
    state: Mutex<Lifecycle>,
    stopped: AtomicBool,
    address: Mutex<Option<SocketAddr>>,
    listen_hook: Mutex<Option<ErrorHook>>,
    service_hook: Mutex<Option<ErrorHook>>,
}

impl Shared {
    /// A connection-level failure: malformed frame or I/O trouble before a
    /// reply could be written. Logged and reported; the skeleton keeps
    /// serving.
    fn service_error(&self, e: &DfsError) {
        error!("error on serving client: {}", e);
        if let Some(hook) = self.service_hook.lock().expect("hook lock poisoned").as_ref() {
            hook(e);
        }
    }

    /// the acceptor failed for a reason other than a normal stop
    fn listen_error(&self, e: &DfsError) {
        error!("listener failed: {}", e);
        if let Some(hook) = self.listen_hook.lock().expect("hook lock poisoned").as_ref() {
            hook(e);
        }
    }
}

/// A multi-threaded TCP endpoint serving one remote interface.
///
/// The skeleton listens on a single address. Each accepted connection is
/// handed to a cached worker pool; the worker reads one invocation frame,
/// dispatches it to the implementation object, and writes the result or the
/// raised failure back before closing the connection.
///
/// A skeleton starts at most once and cannot be restarted after [`stop`] or
/// after a listener failure. Its address remains readable after it stops.
///
/// # Example
/// Serve a dispatcher on an OS-assigned port:
/// ```rust,no_run
/// use dfs::rmi::{InterfaceDescriptor, Skeleton};
/// # use dfs::rmi::{Dispatch, MethodDescriptor};
/// # use dfs::Result;
/// # use serde_json::Value;
/// # struct Echo;
/// # impl Dispatch for Echo {
/// #     fn dispatch(&self, _: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
/// #         Ok(args.remove(0))
/// #     }
/// # }
/// # fn main() -> Result<()> {
/// let skeleton = Skeleton::new(InterfaceDescriptor::new("Echo", vec![]), Echo)?;
/// skeleton.start()?;
/// println!("serving on {}", skeleton.address().unwrap());
/// skeleton.stop();
/// # Ok(())
/// # }
/// ```
///
/// [`stop`]: #method.stop
pub struct Skeleton<D: Dispatch> {
    target: Arc<D>,
    shared: Arc<Shared>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Dispatch> Skeleton<D> {
    /// Creates a skeleton for `interface` dispatching to `target`. The
    /// operating system assigns a port when the skeleton is started.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if `interface` is not a remote
    /// interface
    pub fn new(interface: InterfaceDescriptor, target: D) -> Result<Skeleton<D>> {
        Skeleton::build(interface, target, None)
    }

    /// Creates a skeleton for `interface` dispatching to `target`, bound to
    /// the given address when started.
    ///
    /// # Errors
    /// returns [`DfsError::InvalidArgument`] if `interface` is not a remote
    /// interface
    pub fn bound(
        interface: InterfaceDescriptor,
        target: D,
        address: SocketAddr,
    ) -> Result<Skeleton<D>> {
        Skeleton::build(interface, target, Some(address))
    }

    fn build(
        interface: InterfaceDescriptor,
        target: D,
        address: Option<SocketAddr>,
    ) -> Result<Skeleton<D>> {
        if !interface.is_remote() {
            return Err(DfsError::InvalidArgument(format!(
                "{} is not a remote interface",
                interface.name()
            )));
        }

        Ok(Skeleton {
            target: Arc::new(target),
            shared: Arc::new(Shared {
                interface,
                state: Mutex::new(Lifecycle::Created),
                stopped: AtomicBool::new(false),
                address: Mutex::new(address),
                listen_hook: Mutex::new(None),
                service_hook: Mutex::new(None),
            }),
            acceptor: Mutex::new(None),
        })
    }

    /// the interface this skeleton serves
    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.shared.interface
    }

    /// The skeleton's address: the preassigned one before the first start,
    /// the concrete bound one afterwards, `None` if neither exists.
    pub fn address(&self) -> Option<SocketAddr> {
        *self.shared.address.lock().expect("address lock poisoned")
    }

    /// installs a hook observing listener failures; the skeleton still
    /// transitions to stopped when one occurs
    pub fn on_listen_error(&self, hook: impl Fn(&DfsError) + Send + 'static) {
        *self.shared.listen_hook.lock().expect("hook lock poisoned") = Some(Box::new(hook));
    }

    /// installs a hook observing connection-level failures; the skeleton
    /// keeps serving regardless
    pub fn on_service_error(&self, hook: impl Fn(&DfsError) + Send + 'static) {
        *self.shared.service_hook.lock().expect("hook lock poisoned") = Some(Box::new(hook));
    }

    /// Binds the listener and starts the acceptor thread.
    ///
    /// When no address was preassigned the listener binds the loopback
    /// address on an OS-assigned port, and the skeleton's address is updated
    /// to the concrete one.
    ///
    /// # Errors
    /// returns [`DfsError::IllegalState`] if the skeleton is already running
    /// or was ever stopped, and [`DfsError::Rmi`] if the listener could not
    /// be bound
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock().expect("state lock poisoned");
        match *state {
            Lifecycle::Running => {
                return Err(DfsError::IllegalState(
                    "skeleton is already started".to_string(),
                ))
            }
            Lifecycle::Stopped => {
                return Err(DfsError::IllegalState(
                    "a stopped skeleton cannot be restarted".to_string(),
                ))
            }
            Lifecycle::Created => {}
        }

        let requested = self
            .address()
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        let listener = TcpListener::bind(requested)
            .map_err(|e| DfsError::Rmi(format!("failed to bind {}: {}", requested, e)))?;
        let bound = listener
            .local_addr()
            .map_err(|e| DfsError::Rmi(format!("failed to read the bound address: {}", e)))?;
        *self.shared.address.lock().expect("address lock poisoned") = Some(bound);

        let shared = Arc::clone(&self.shared);
        let target = Arc::clone(&self.target);
        let handle = thread::Builder::new()
            .spawn(move || accept_loop(listener, shared, target))
            .map_err(|e| DfsError::Rmi(format!("failed to start the acceptor: {}", e)))?;
        *self.acceptor.lock().expect("acceptor lock poisoned") = Some(handle);

        *state = Lifecycle::Running;
        info!(
            "skeleton for {} listening on {}",
            self.shared.interface.name(),
            bound
        );
        Ok(())
    }

    /// Stops the skeleton and waits for the acceptor to exit.
    ///
    /// Workers already serving connections drain on their own; in-flight
    /// invocations may complete normally. Stopping a skeleton that is not
    /// running does nothing.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock().expect("state lock poisoned");
            match *state {
                Lifecycle::Running => {}
                _ => return,
            }
            *state = Lifecycle::Stopped;
            self.shared.stopped.store(true, Ordering::SeqCst);
        }

        // wake the acceptor out of its blocking accept
        if let Some(mut address) = self.address() {
            if address.ip().is_unspecified() {
                address.set_ip(Ipv4Addr::LOCALHOST.into());
            }
            let _ = TcpStream::connect(address);
        }

        if let Some(handle) = self.acceptor.lock().expect("acceptor lock poisoned").take() {
            if handle.join().is_err() {
                error!("skeleton acceptor thread panicked");
            }
        }

        info!("skeleton for {} stopped", self.shared.interface.name());
    }
}

/// Accepts connections until stopped, submitting each to the worker pool.
///
/// An accept failure before a stop fires the listen hook and is terminal;
/// afterwards it is the normal way the stop unblocks this loop.
fn accept_loop<D: Dispatch>(listener: TcpListener, shared: Arc<Shared>, target: Arc<D>) {
    let pool = CachedPool::new();

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                debug!("accepted a connection from {}", peer);
                let shared = Arc::clone(&shared);
                let target = Arc::clone(&target);
                pool.spawn(move || {
                    if let Err(e) = serve(&*target, &shared.interface, stream) {
                        shared.service_error(&e);
                    }
                });
            }
            Err(e) => {
                if shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                shared.stopped.store(true, Ordering::SeqCst);
                *shared.state.lock().expect("state lock poisoned") = Lifecycle::Stopped;
                shared.listen_error(&DfsError::Rmi(format!("listener failed: {}", e)));
                break;
            }
        }
    }
}

/// Serves one connection: reads the invocation frame, resolves and
/// dispatches the method, and writes the reply.
///
/// A failure the dispatched method raises is part of normal wire behavior
/// and is written back as a reply; only frame-level trouble makes this
/// function return `Err`. The streams and the socket close on every exit
/// path when they drop.
fn serve<D: Dispatch>(target: &D, interface: &InterfaceDescriptor, tcp: TcpStream) -> Result<()> {
    let peer = tcp
        .peer_addr()
        .map_err(|e| DfsError::Rmi(format!("peer address unavailable: {}", e)))?;
    let mut writer = BufWriter::new(
        tcp.try_clone()
            .map_err(|e| DfsError::Rmi(format!("failed to clone the connection: {}", e)))?,
    );
    let mut reader = Deserializer::from_reader(BufReader::new(tcp));

    let call = Call::deserialize(&mut reader)
        .map_err(|e| DfsError::Rmi(format!("malformed invocation frame from {}: {}", peer, e)))?;
    debug!("received invocation of {} from {}", call.method.name(), peer);

    let reply = match interface.find(&call.method) {
        None => Reply::Raise(DfsError::NoSuchMethod(format!(
            "{} has no method {}",
            interface.name(),
            call.method
        ))),
        Some(method) if call.args.len() != method.parameter_count() => {
            Reply::Raise(DfsError::InvalidArgument(format!(
                "{} expects {} arguments, received {}",
                method.name(),
                method.parameter_count(),
                call.args.len()
            )))
        }
        Some(_) => match target.dispatch(&call.method, call.args) {
            Ok(value) => Reply::Return(value),
            Err(raised) => Reply::Raise(raised),
        },
    };

    serde_json::to_writer(&mut writer, &reply)
        .map_err(|e| DfsError::Rmi(format!("failed to send reply to {}: {}", peer, e)))?;
    writer
        .flush()
        .map_err(|e| DfsError::Rmi(format!("failed to flush reply to {}: {}", peer, e)))?;
    Ok(())
}
