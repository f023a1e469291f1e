//! volsung - An embeddable sound-synthesis runtime.
//!
//! Volsung programs describe a directed graph of audio nodes in a small
//! declarative language. The host builds a [`Program`], feeds it source
//! text, and then exchanges one frame of samples per [`Program::run`]
//! call:
//!
//! ```
//! use volsung::{parse_program, Program};
//!
//! let mut program = Program::new();
//! program.configure_io(1, 1);
//! program.reset();
//!
//! assert!(parse_program("input -> *0.5 -> output\n", &mut program));
//! assert_eq!(program.run_sample(1.0), 0.5);
//! program.finish();
//! ```
//!
//! This crate is the umbrella over the phase crates: it re-exports the
//! graph runtime, the parser, and the shared diagnostics, and defines the
//! interface an audio-device player implements to drive a program in
//! blocks. No player implementation ships here; the runtime itself never
//! touches an audio device.

pub use volsung_graph::{
    group_member_name, is_builtin_type, ConnectionKind, DirectiveCallback, Frame, Number, Program,
    Sequence, SubgraphDefinition, TypedValue, UserCallback, DEFAULT_SAMPLE_RATE, TAU,
};
pub use volsung_lex::{Lexer, Token, TokenKind};
pub use volsung_par::Parser;
pub use volsung_util::{Diagnostic, Error, Handler, Level, Result};

/// Frames per block handed to an [`AudioPlayer`].
pub const BLOCK_SIZE: usize = 200;

/// Parse `source` into `program`, reporting any error through the
/// program's diagnostic handler.
///
/// The program keeps its io configuration, registered directives, and
/// host-created objects; call [`Program::reset`] first for a clean slate.
/// Returns `false` (with the program reset) if the source does not parse.
pub fn parse_program(source: &str, program: &mut Program) -> bool {
    Parser::new(source).parse_program(program)
}

/// The audio-device collaborator. A player repeatedly pulls
/// [`BLOCK_SIZE`] frames of interleaved samples from a [`Program`] and
/// hands them to the platform's audio API. The runtime only defines the
/// contract.
pub trait AudioPlayer {
    fn initialize(&mut self, sample_rate: u32);
    fn play(&mut self, frame: &[f32]);
    fn clean_up(&mut self);
}
