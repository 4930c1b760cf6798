//! Error types for netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, sending or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Message buffer capacity exhausted. Always a sizing bug, never a
    /// user error.
    #[error("message buffer full: need {needed} bytes, capacity {capacity}")]
    CapacityExceeded {
        /// Bytes the append would have required.
        needed: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// Nested attributes were closed out of LIFO order.
    #[error("nested attribute closed out of order: depth {depth}, token depth {token}")]
    NestOrder {
        /// Current nesting depth of the builder.
        depth: usize,
        /// Depth recorded in the token being closed.
        token: usize,
    },

    /// Sequence number mismatch.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Expected sequence number.
        expected: u32,
        /// Actual sequence number received.
        actual: u32,
    },

    /// A command-line value failed to parse or validate.
    #[error("invalid {what} \"{value}\"")]
    InvalidArg {
        /// What was being parsed (e.g. "vlan_id").
        what: &'static str,
        /// The offending token.
        value: String,
    },

    /// An option keyword was given without its value.
    #[error("option \"{0}\" requires an argument")]
    MissingValue(String),

    /// Mutually exclusive options were combined.
    #[error("{0}")]
    ConflictingOptions(&'static str),

    /// A field was supplied before the field it depends on.
    #[error("\"{field}\" requires {requires}")]
    FieldDependency {
        /// The dependent field.
        field: &'static str,
        /// Description of the missing prerequisite.
        requires: &'static str,
    },

    /// Interface name could not be resolved to an index.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// The interface name that was not found.
        name: String,
    },

    /// Parse error from a strongly-typed message parser.
    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Create an [`Error::InvalidArg`] from the offending token.
    pub fn invalid_arg(what: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidArg {
            what,
            value: value.into(),
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 2 | 19), // ENOENT=2, ENODEV=19
            Self::DeviceNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 1 | 13), // EPERM=1, EACCES=13
            _ => false,
        }
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => *errno == 17, // EEXIST=17
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-2).is_not_found()); // ENOENT
        assert!(Error::from_errno(-19).is_not_found()); // ENODEV
        assert!(
            Error::DeviceNotFound {
                name: "eth0".into()
            }
            .is_not_found()
        );
    }

    #[test]
    fn test_messages() {
        let err = Error::invalid_arg("vlan_id", "70000");
        assert_eq!(err.to_string(), "invalid vlan_id \"70000\"");

        let err = Error::FieldDependency {
            field: "dst_port",
            requires: "ip_proto tcp, udp or sctp",
        };
        assert_eq!(
            err.to_string(),
            "\"dst_port\" requires ip_proto tcp, udp or sctp"
        );
    }
}
