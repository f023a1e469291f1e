//! volsung-graph - The audio graph runtime.
//!
//! This crate owns the typed value algebra, the node catalog, and the
//! [`Program`] that holds and executes a graph one frame at a time. The
//! parser crate drives the `Program` API at build time; at run time the
//! host calls [`Program::run`] with one input frame and reads one output
//! frame back.
//!
//! The runtime is deliberately free of audio I/O, scheduling, and threads:
//! everything happens synchronously inside `run`, and a `Program` owns all
//! of its state (including its random generator), so independent programs
//! never interfere.

mod nodes;
mod procedures;
mod program;
mod value;

pub use nodes::{is_builtin_type, ArithmeticOp, Channel, Node, NodeKind, UserCallback, TAU};
pub use program::{
    group_member_name, ConnectionKind, DirectiveCallback, Frame, Program, SubgraphDefinition,
    DEFAULT_SAMPLE_RATE,
};
pub use value::{Number, Sequence, TypedValue};
