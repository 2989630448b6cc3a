//! Core error helpers
//!
//! Re-exports ctcbutton-error and adds constructors for the ledger and buffer.

pub use ctcbutton_error::{Error, ErrorKind, ErrorStatus, Result};

/// A round argument did not line up with the ledger's last state entry
pub fn round_mismatch(operation: &'static str, expected: u32, got: u32) -> Error {
    Error::ledger_invariant(format!("expected round {}, got {}", expected, got))
        .with_operation(operation)
        .with_context("expected", expected.to_string())
        .with_context("got", got.to_string())
}

/// The last state already has an action recorded against it
pub fn state_already_acted(operation: &'static str, round: u32) -> Error {
    Error::ledger_invariant(format!("state for round {} already acted on", round))
        .with_operation(operation)
        .with_context("round", round.to_string())
}

/// The last state has not been acted on yet, so no successor may follow it
pub fn state_not_acted(operation: &'static str, round: u32) -> Error {
    Error::ledger_invariant(format!("state for round {} has no action yet", round))
        .with_operation(operation)
        .with_context("round", round.to_string())
}

/// Tail of the conversation buffer is not `(user, agent)`
pub fn buffer_shape(expected: &str, found: &str, len: usize) -> Error {
    Error::buffer_shape_violation(format!("expected {} at tail, found {}", expected, found))
        .with_operation("conversation::rollback_exchange")
        .with_context("buffer_len", len.to_string())
}

pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::serialization_failed(message)
}

pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}
