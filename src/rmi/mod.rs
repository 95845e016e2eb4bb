//! A transparent request/response invocation fabric over TCP.
//!
//! The fabric has two halves. A [`Skeleton`] is the server side: it accepts
//! connections for one remote interface and hands each to a pooled worker,
//! which decodes an invocation frame, dispatches it to a local
//! implementation, and writes the result (or the raised failure) back. A
//! stub is the client side: a serializable value carrying the skeleton's
//! address and interface, whose typed façade forwards every call over a
//! fresh connection and re-raises remote failures at the call site.
//!
//! Methods are identified on the wire by a [`MethodDescriptor`], never by a
//! language-level function reference, so independently built peers
//! interoperate as long as they agree on the descriptor tables.
//!
//! [`Skeleton`]: skeleton/struct.Skeleton.html
//! [`MethodDescriptor`]: method/struct.MethodDescriptor.html

pub mod method;
pub mod pool;
pub mod skeleton;
pub mod stub;
pub mod wire;

pub use self::method::{InterfaceDescriptor, MethodDescriptor, RMI_EXCEPTION};
pub use self::skeleton::{Dispatch, Skeleton};
pub use self::stub::StubHandle;
