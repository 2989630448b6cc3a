//! # ctcbutton-error
//!
//! Unified error handling for ctcbutton, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., LedgerUnderflow, AgentTimeout)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use ctcbutton_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::BufferShapeViolation, "expected (user, agent) at tail")
//!         .with_operation("conversation::rollback_exchange")
//!         .with_context("round", "3"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, ctcbutton_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage
//!
//! A rejected round is *not* an error. Constraint violations and unparseable
//! replies are ordinary outcomes of the experiment loop and never show up here.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using ctcbutton Error
pub type Result<T> = std::result::Result<T, Error>;
