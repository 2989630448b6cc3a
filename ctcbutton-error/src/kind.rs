//! Error kinds for ctcbutton operations

use std::fmt;

/// The kind of error that occurred.
///
/// Users can match on ErrorKind to decide how to handle specific error cases.
/// Internal-consistency kinds (ledger, buffer) always abort a run; transport
/// kinds may be retried by a caller-supplied policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Ledger / buffer consistency errors
    // =========================================================================
    /// Rollback attempted past the initial round-0 state
    LedgerUnderflow,

    /// A ledger precondition was broken (round mismatch, unpaired entry)
    LedgerInvariant,

    /// Conversation tail was not `(user, agent)` at rollback time
    BufferShapeViolation,

    /// A single round was attempted more times than allowed
    RetryBudgetExceeded,

    // =========================================================================
    // Agent / provider errors
    // =========================================================================
    /// The agent could not produce a reply
    AgentInvocationFailed,

    /// The agent call exceeded the transport timeout
    AgentTimeout,

    /// Provider not available (5xx, bridge down)
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            ErrorKind::LedgerUnderflow => "LedgerUnderflow",
            ErrorKind::LedgerInvariant => "LedgerInvariant",
            ErrorKind::BufferShapeViolation => "BufferShapeViolation",
            ErrorKind::RetryBudgetExceeded => "RetryBudgetExceeded",

            ErrorKind::AgentInvocationFailed => "AgentInvocationFailed",
            ErrorKind::AgentTimeout => "AgentTimeout",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::NetworkFailed => "NetworkFailed",

            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::AgentTimeout
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::LedgerUnderflow.to_string(), "LedgerUnderflow");
        assert_eq!(ErrorKind::AgentTimeout.to_string(), "AgentTimeout");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::AgentTimeout.is_retryable());
        assert!(!ErrorKind::AgentInvocationFailed.is_retryable());
        assert!(!ErrorKind::LedgerUnderflow.is_retryable());
        assert!(!ErrorKind::RetryBudgetExceeded.is_retryable());
    }
}
