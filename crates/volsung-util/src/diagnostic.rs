//! Diagnostic reporting infrastructure.
//!
//! The runtime emits one human-readable message per user error, plus any
//! output produced by the `print` procedure. All of it flows through a
//! single [`Handler`] whose sink the host may replace; the default sink
//! forwards to the `log` crate.
//!
//! A `Handler` is shared between a program and the programs of its nested
//! subgraphs, so it uses interior mutability and is normally held behind an
//! `Rc`.

use std::cell::{Cell, RefCell};
use std::fmt;

/// Severity of a diagnostic message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// A user error; parsing will unwind after this is reported
    Error,
    /// Informational output, e.g. from the `print` procedure
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Note => write!(f, "note"),
        }
    }
}

/// A single diagnostic message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

/// Sink callback type installed by the host.
pub type DiagnosticCallback = Box<dyn FnMut(&Diagnostic)>;

/// Collects diagnostics and forwards them to the host.
///
/// Without a host callback, errors go to `log::error!` and notes to
/// `log::info!`.
pub struct Handler {
    callback: RefCell<Option<DiagnosticCallback>>,
    error_count: Cell<usize>,
}

impl Handler {
    pub fn new() -> Self {
        Self {
            callback: RefCell::new(None),
            error_count: Cell::new(0),
        }
    }

    /// Install the host sink, replacing any previous one.
    pub fn set_callback(&self, callback: DiagnosticCallback) {
        *self.callback.borrow_mut() = Some(callback);
    }

    /// Report a user error.
    pub fn error(&self, message: impl Into<String>) {
        self.error_count.set(self.error_count.get() + 1);
        self.emit(Diagnostic {
            level: Level::Error,
            message: message.into(),
        });
    }

    /// Report informational output.
    pub fn note(&self, message: impl Into<String>) {
        self.emit(Diagnostic {
            level: Level::Note,
            message: message.into(),
        });
    }

    /// Number of errors reported since construction.
    pub fn error_count(&self) -> usize {
        self.error_count.get()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count.get() > 0
    }

    fn emit(&self, diagnostic: Diagnostic) {
        let mut callback = self.callback.borrow_mut();
        match callback.as_mut() {
            Some(sink) => sink(&diagnostic),
            None => match diagnostic.level {
                Level::Error => log::error!("{}", diagnostic.message),
                Level::Note => log::info!("{}", diagnostic.message),
            },
        }
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("error_count", &self.error_count.get())
            .finish()
    }
}
