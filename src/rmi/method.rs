//! Serializable descriptions of remote methods and interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The failure-type name every method of a remote interface must declare.
///
/// Declaring it means the method can surface wire-layer failures to its
/// caller in addition to its own failure modes.
pub const RMI_EXCEPTION: &str = "RMIException";

/// The wire identity of a remote method.
///
/// Two descriptors are equal if and only if their names, return types,
/// parameter type sequences and failure type sequences are all equal;
/// ordering matters for the sequences. Descriptors are what invocation
/// frames carry, so two independently generated dispatch tables interoperate
/// as long as they agree on these four fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    name: String,
    return_type: String,
    parameters: Vec<String>,
    exceptions: Vec<String>,
}

impl MethodDescriptor {
    /// describes a method by its name, return type name, parameter type
    /// names and failure type names
    pub fn new(name: &str, return_type: &str, parameters: &[&str], exceptions: &[&str]) -> Self {
        MethodDescriptor {
            name: name.to_string(),
            return_type: return_type.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            exceptions: exceptions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// the method's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// the number of parameters the method takes
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// whether the method declares the given failure type name
    pub fn declares(&self, exception: &str) -> bool {
        self.exceptions.iter().any(|e| e == exception)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}({}) throws [{}]",
            self.return_type,
            self.name,
            self.parameters.join(", "),
            self.exceptions.join(", ")
        )
    }
}

/// The set of methods one skeleton serves and one stub satisfies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    /// describes an interface by name and method table
    pub fn new(name: &str, methods: Vec<MethodDescriptor>) -> Self {
        InterfaceDescriptor {
            name: name.to_string(),
            methods,
        }
    }

    /// the interface's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// returns the first method of this interface equal to `method`, if any
    pub fn find(&self, method: &MethodDescriptor) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| *m == method)
    }

    /// Whether this interface is remote: every method declares
    /// [`RMI_EXCEPTION`] among its failure types.
    pub fn is_remote(&self) -> bool {
        self.methods.iter().all(|m| m.declares(RMI_EXCEPTION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divide() -> MethodDescriptor {
        MethodDescriptor::new("divide", "i64", &["i64", "i64"], &[RMI_EXCEPTION])
    }

    #[test]
    fn equality_is_field_wise_and_order_sensitive() {
        assert_eq!(divide(), divide());
        assert_ne!(
            divide(),
            MethodDescriptor::new("divide", "i64", &["i64"], &[RMI_EXCEPTION])
        );
        assert_ne!(
            MethodDescriptor::new("m", "unit", &["a", "b"], &[]),
            MethodDescriptor::new("m", "unit", &["b", "a"], &[])
        );
    }

    #[test]
    fn find_matches_the_full_descriptor() {
        let interface = InterfaceDescriptor::new("Calculator", vec![divide()]);
        assert_eq!(interface.find(&divide()), Some(&divide()));
        assert_eq!(
            interface.find(&MethodDescriptor::new("divide", "u64", &["i64", "i64"], &[RMI_EXCEPTION])),
            None
        );
    }

    #[test]
    fn remote_interfaces_declare_the_rmi_failure_everywhere() {
        let remote = InterfaceDescriptor::new("Calculator", vec![divide()]);
        assert!(remote.is_remote());

        let local = InterfaceDescriptor::new(
            "Mixed",
            vec![divide(), MethodDescriptor::new("pure", "i64", &[], &[])],
        );
        assert!(!local.is_remote());
    }

    #[test]
    fn descriptors_round_trip_through_serialization() {
        let encoded = serde_json::to_string(&divide()).unwrap();
        let decoded: MethodDescriptor = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, divide());
    }
}
