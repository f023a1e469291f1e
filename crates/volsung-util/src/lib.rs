//! volsung-util - Shared foundation for the Volsung runtime.
//!
//! This crate holds the pieces every other phase crate needs: the error
//! taxonomy that threads through lexing, parsing, and graph execution, and
//! the diagnostic handler that carries human-readable messages out to the
//! host.

pub mod diagnostic;
pub mod error;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use error::{Error, Result};
