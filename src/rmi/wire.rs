//! The frames exchanged over one RMI connection.
//!
//! Each connection carries exactly one [`Call`] from the stub and one
//! [`Reply`] from the skeleton, both encoded with the self-describing
//! serde_json serializer shared by the two peers.

use crate::error::{DfsError, Result};
use crate::rmi::method::MethodDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The request frame: the method being invoked plus its encoded arguments.
///
/// The argument array's length must match the descriptor's parameter count;
/// the skeleton rejects mismatches before dispatching.
#[derive(Debug, Serialize, Deserialize)]
pub struct Call {
    /// the wire identity of the method to invoke
    pub method: MethodDescriptor,
    /// the encoded arguments, in declaration order
    pub args: Vec<Value>,
}

/// The response frame: either the method's return value or the failure the
/// dispatched method raised, delivered intact so the stub can re-raise it.
#[derive(Debug, Serialize, Deserialize)]
pub enum Reply {
    /// the invocation completed and produced this value
    Return(Value),
    /// the invocation raised this failure
    Raise(DfsError),
}

/// Encodes a value for transmission. Used on both sides of the wire, so
/// failures surface as wire-layer failures.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| DfsError::Rmi(format!("failed to encode value: {}", e)))
}

/// decodes a returned value on the stub side; failures are wire-layer
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| DfsError::Rmi(format!("failed to decode result: {}", e)))
}

/// Decodes one positional argument on the dispatch side.
///
/// A missing or ill-typed argument is the caller's fault, so the failure is
/// an [`DfsError::InvalidArgument`] that travels back in the reply frame.
pub(crate) fn argument<T: DeserializeOwned>(args: &mut Vec<Value>, index: usize) -> Result<T> {
    let value = args
        .get_mut(index)
        .map(Value::take)
        .ok_or_else(|| DfsError::InvalidArgument(format!("missing argument {}", index)))?;
    serde_json::from_value(value).map_err(|e| {
        DfsError::InvalidArgument(format!("argument {} has the wrong type: {}", index, e))
    })
}
