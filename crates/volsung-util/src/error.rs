//! Core error types for the Volsung runtime.
//!
//! Every fallible operation in the lexer, parser, and graph returns
//! [`Result`]. Errors are values, not panics: the parser reports the first
//! error to the diagnostic handler and unwinds by propagation.

use thiserror::Error;

/// All the ways a Volsung program can fail to build or evaluate.
///
/// Each variant carries a human-readable message; the parser prefixes the
/// source line number before the error reaches the diagnostic sink.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// An unrecognised character in the source text
    #[error("lexical error: {0}")]
    Lex(String),

    /// An unexpected token, missing token, or malformed construct
    #[error("parse error: {0}")]
    Parse(String),

    /// An undefined identifier, a redefined symbol, or object/group confusion
    #[error("name error: {0}")]
    Name(String),

    /// A port index out of range, mismatched group sizes, or a bad argument count
    #[error("arity error: {0}")]
    Arity(String),

    /// An operation applied to a value of the wrong type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A sequence index or range construction out of bounds
    #[error("range error: {0}")]
    Range(String),

    /// An unterminated subgraph body or a failed nested parse
    #[error("subgraph error: {0}")]
    Subgraph(String),
}

impl Error {
    /// The message carried by the error, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Lex(m)
            | Error::Parse(m)
            | Error::Name(m)
            | Error::Arity(m)
            | Error::TypeMismatch(m)
            | Error::Range(m)
            | Error::Subgraph(m) => m,
        }
    }

    /// Rebuild the error with the same kind but a new message.
    ///
    /// Used by the parser to prefix source locations onto errors raised by
    /// the value algebra and the graph, which do not know about lines.
    pub fn with_message(&self, message: String) -> Error {
        match self {
            Error::Lex(_) => Error::Lex(message),
            Error::Parse(_) => Error::Parse(message),
            Error::Name(_) => Error::Name(message),
            Error::Arity(_) => Error::Arity(message),
            Error::TypeMismatch(_) => Error::TypeMismatch(message),
            Error::Range(_) => Error::Range(message),
            Error::Subgraph(_) => Error::Subgraph(message),
        }
    }
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let error = Error::Name("undefined identifier: osc".into());
        assert_eq!(error.to_string(), "name error: undefined identifier: osc");
    }

    #[test]
    fn with_message_preserves_kind() {
        let error = Error::Range("index is 4".into());
        let located = error.with_message("Line 3: index is 4".into());
        assert!(matches!(located, Error::Range(_)));
        assert_eq!(located.message(), "Line 3: index is 4");
    }
}
