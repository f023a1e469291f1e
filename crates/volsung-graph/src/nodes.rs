//! The node runtime interface and the built-in node catalog.
//!
//! Nodes are a closed set of tagged variants plus a [`User`](NodeKind::User)
//! variant whose behavior is a host-supplied closure and a
//! [`Subgraph`](NodeKind::Subgraph) variant that owns a nested
//! [`Program`](crate::Program). The graph stays a flat arena: a [`Node`]
//! never references another node, only channel records
//! `(source handle, output port)` stored on the input ports of the sink.
//!
//! Each output port owns one current-frame value slot. Reading an input
//! port sums the slots its channels point at; a producer that has not run
//! yet this frame contributes its previous-frame value, which is the
//! one-frame feedback contract of the runtime.

use rand::rngs::SmallRng;
use rand::Rng;

use volsung_util::{Error, Result};

use crate::program::Program;
use crate::value::TypedValue;

/// One full turn of phase.
pub const TAU: f32 = std::f32::consts::TAU;

/// Per-frame host callback for user objects: `(inputs, outputs)`.
pub type UserCallback = Box<dyn FnMut(&[f32], &mut [f32])>;

/// A channel endpoint: which node's which output port feeds this input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel {
    pub source: usize,
    pub port: usize,
}

/// The constant-operand arithmetic family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

/// The closed catalog of node behaviors.
pub enum NodeKind {
    /// Host input scratch; one output port per configured input channel.
    Input { data: Vec<f32> },
    /// Host output scratch; one input port per configured output channel.
    Output { data: Vec<f32> },
    /// Sine oscillator: `sin(TAU·phase)`, phase advances by `f / sample_rate`.
    /// A connected input overrides the constructed frequency.
    Oscillator { phase: f32, frequency: f32 },
    /// Uniform noise in [-1, 1] from the owning program's generator.
    Noise,
    /// A constant sample value.
    Constant { value: f32 },
    /// `in₀ OP operand`; a connected second input overrides the operand.
    Arithmetic { op: ArithmeticOp, operand: f32 },
    /// Ring-buffer delay. A connected second input overrides the delay
    /// time, clamped to the capacity allocated at construction.
    Delay {
        buffer: Vec<f32>,
        write: usize,
        time: usize,
    },
    /// Host-defined behavior.
    User {
        callback: UserCallback,
        inputs: usize,
        outputs: usize,
    },
    /// A nested program behind (in, out) ports.
    Subgraph { program: Box<Program> },
}

impl NodeKind {
    /// Fixed `(inputs, outputs)` arity, decided at construction.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            NodeKind::Input { data } => (0, data.len()),
            NodeKind::Output { data } => (data.len(), 0),
            NodeKind::Oscillator { .. } => (1, 1),
            NodeKind::Noise => (0, 1),
            NodeKind::Constant { .. } => (0, 1),
            NodeKind::Arithmetic { .. } => (2, 1),
            NodeKind::Delay { .. } => (2, 1),
            NodeKind::User {
                inputs, outputs, ..
            } => (*inputs, *outputs),
            NodeKind::Subgraph { program } => (program.inputs(), program.outputs()),
        }
    }
}

/// A vertex of the audio graph: behavior, incoming channels per input
/// port, and one current-frame value slot per output port.
pub struct Node {
    kind: NodeKind,
    inputs: Vec<Vec<Channel>>,
    outputs: Vec<f32>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Node {
        let (inputs, outputs) = kind.arity();
        Node {
            kind,
            inputs: vec![Vec::new(); inputs],
            outputs: vec![0.0; outputs],
        }
    }

    /// The node's behavior variant.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Number of input ports.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output ports.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Current-frame value of an output port.
    pub fn output(&self, port: usize) -> f32 {
        self.outputs[port]
    }

    /// Incoming channels per input port.
    pub fn incoming(&self) -> &[Vec<Channel>] {
        &self.inputs
    }

    pub(crate) fn attach(&mut self, port: usize, channel: Channel) {
        self.inputs[port].push(channel);
    }

    /// Advance one frame. `inputs` holds the summed value of each input
    /// port, or `None` where no channel is attached (so constructed
    /// defaults apply).
    pub(crate) fn process(&mut self, inputs: &[Option<f32>], sample_rate: f32, rng: &mut SmallRng) {
        match &mut self.kind {
            NodeKind::Input { data } => {
                for (slot, value) in self.outputs.iter_mut().zip(data.iter()) {
                    *slot = *value;
                }
            }
            NodeKind::Output { data } => {
                for (n, slot) in data.iter_mut().enumerate() {
                    *slot = inputs.get(n).copied().flatten().unwrap_or(0.0);
                }
            }
            NodeKind::Oscillator { phase, frequency } => {
                let frequency = inputs[0].unwrap_or(*frequency);
                self.outputs[0] = (TAU * *phase).sin();
                *phase += frequency / sample_rate;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
            }
            NodeKind::Noise => {
                self.outputs[0] = rng.gen_range(-1.0f32..=1.0);
            }
            NodeKind::Constant { value } => {
                self.outputs[0] = *value;
            }
            NodeKind::Arithmetic { op, operand } => {
                let left = inputs[0].unwrap_or(0.0);
                let right = inputs[1].unwrap_or(*operand);
                self.outputs[0] = match op {
                    ArithmeticOp::Add => left + right,
                    ArithmeticOp::Subtract => left - right,
                    ArithmeticOp::Multiply => left * right,
                    ArithmeticOp::Divide => left / right,
                    ArithmeticOp::Power => left.powf(right),
                };
            }
            NodeKind::Delay {
                buffer,
                write,
                time,
            } => {
                let delay = match inputs[1] {
                    Some(value) => (value.max(0.0) as usize).min(buffer.len() - 1),
                    None => *time,
                };
                buffer[*write] = inputs[0].unwrap_or(0.0);
                let read = (*write + buffer.len() - delay) % buffer.len();
                self.outputs[0] = buffer[read];
                *write = (*write + 1) % buffer.len();
            }
            NodeKind::User { callback, .. } => {
                let frame: Vec<f32> = inputs.iter().map(|value| value.unwrap_or(0.0)).collect();
                callback(&frame, &mut self.outputs);
            }
            NodeKind::Subgraph { program } => {
                let frame: Vec<f32> = inputs.iter().map(|value| value.unwrap_or(0.0)).collect();
                let result = program.run(&frame);
                for (slot, value) in self.outputs.iter_mut().zip(result.into_iter()) {
                    *slot = value;
                }
            }
        }
    }

    /// Shutdown hook, called once by [`Program::finish`](crate::Program::finish).
    pub(crate) fn finish(&mut self) {
        if let NodeKind::Subgraph { program } = &mut self.kind {
            program.finish();
        }
    }
}

/// True if `type_name` names a node in the built-in catalog.
///
/// Both the catalog's long names and their short forms are accepted;
/// anything else is either a subgraph type or unknown, which is the
/// parser's distinction to make.
///
/// # Example
///
/// ```
/// use volsung_graph::is_builtin_type;
///
/// assert!(is_builtin_type("osc"));
/// assert!(is_builtin_type("Sine_Oscillator"));
/// assert!(!is_builtin_type("reverb"));
/// ```
pub fn is_builtin_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "osc"
            | "Sine_Oscillator"
            | "noise"
            | "Noise"
            | "const"
            | "Constant"
            | "add"
            | "Add"
            | "sub"
            | "Subtract"
            | "mult"
            | "Multiply"
            | "div"
            | "Divide"
            | "pow"
            | "Power"
            | "delay"
            | "Delay_Line"
    )
}

/// Construct a catalog node from its declaration arguments.
///
/// Arguments are positional and optional; a missing argument falls back
/// to the variant's default (0 for additive operands and frequencies,
/// 1 for multiplicative operands and the delay time).
///
/// # Errors
///
/// [`Error::Name`] for an unknown type, [`Error::TypeMismatch`] when an
/// argument is not a number.
pub(crate) fn build_builtin(type_name: &str, args: &[TypedValue]) -> Result<NodeKind> {
    match type_name {
        "osc" | "Sine_Oscillator" => Ok(NodeKind::Oscillator {
            phase: 0.0,
            frequency: number_arg(args, 0)?.unwrap_or(0.0),
        }),
        "noise" | "Noise" => Ok(NodeKind::Noise),
        "const" | "Constant" => Ok(NodeKind::Constant {
            value: number_arg(args, 0)?.unwrap_or(0.0),
        }),
        "add" | "Add" => arithmetic(ArithmeticOp::Add, args, 0.0),
        "sub" | "Subtract" => arithmetic(ArithmeticOp::Subtract, args, 0.0),
        "mult" | "Multiply" => arithmetic(ArithmeticOp::Multiply, args, 1.0),
        "div" | "Divide" => arithmetic(ArithmeticOp::Divide, args, 1.0),
        "pow" | "Power" => arithmetic(ArithmeticOp::Power, args, 1.0),
        "delay" | "Delay_Line" => {
            let time = number_arg(args, 0)?.unwrap_or(1.0).max(0.0) as usize;
            Ok(NodeKind::Delay {
                buffer: vec![0.0; time + 1],
                write: 0,
                time,
            })
        }
        other => Err(Error::Name(format!("no such object type: {other}"))),
    }
}

fn arithmetic(op: ArithmeticOp, args: &[TypedValue], default: f32) -> Result<NodeKind> {
    Ok(NodeKind::Arithmetic {
        op,
        operand: number_arg(args, 0)?.unwrap_or(default),
    })
}

/// The real part of argument `index`, if present.
fn number_arg(args: &[TypedValue], index: usize) -> Result<Option<f32>> {
    match args.get(index) {
        Some(value) => Ok(Some(value.number()?.re())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(1)
    }

    fn node(type_name: &str, args: &[TypedValue]) -> Node {
        Node::new(build_builtin(type_name, args).unwrap())
    }

    #[test]
    fn catalog_arities() {
        assert_eq!(node("osc", &[]).kind().arity(), (1, 1));
        assert_eq!(node("noise", &[]).kind().arity(), (0, 1));
        assert_eq!(node("add", &[]).kind().arity(), (2, 1));
        assert_eq!(node("Delay_Line", &[2.0.into()]).kind().arity(), (2, 1));
    }

    #[test]
    fn unknown_type_is_a_name_error() {
        assert!(matches!(
            build_builtin("reverb", &[]),
            Err(volsung_util::Error::Name(_))
        ));
    }

    #[test]
    fn oscillator_at_zero_frequency_stays_silent() {
        let mut osc = node("osc", &[0.0.into()]);
        let mut rng = rng();
        for _ in 0..8 {
            osc.process(&[None], 44100.0, &mut rng);
            assert_eq!(osc.output(0), 0.0);
        }
    }

    #[test]
    fn arithmetic_uses_argument_until_a_channel_overrides_it() {
        let mut mult = node("mult", &[3.0.into()]);
        let mut rng = rng();
        mult.process(&[Some(2.0), None], 44100.0, &mut rng);
        assert_eq!(mult.output(0), 6.0);
        // Connected second input replaces the constructed operand.
        mult.process(&[Some(2.0), Some(10.0)], 44100.0, &mut rng);
        assert_eq!(mult.output(0), 20.0);
    }

    #[test]
    fn division_by_zero_follows_ieee754() {
        let mut div = node("div", &[0.0.into()]);
        let mut rng = rng();
        div.process(&[Some(1.0), None], 44100.0, &mut rng);
        assert!(div.output(0).is_infinite());
    }

    #[test]
    fn delay_line_shifts_by_the_configured_time() {
        let mut delay = node("delay", &[2.0.into()]);
        let mut rng = rng();
        let feed = [1.0, 2.0, 3.0, 4.0];
        let mut heard = Vec::new();
        for sample in feed {
            delay.process(&[Some(sample), None], 44100.0, &mut rng);
            heard.push(delay.output(0));
        }
        assert_eq!(heard, vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn zero_delay_passes_through() {
        let mut delay = node("delay", &[0.0.into()]);
        let mut rng = rng();
        delay.process(&[Some(0.5), None], 44100.0, &mut rng);
        assert_eq!(delay.output(0), 0.5);
    }

    #[test]
    fn noise_stays_in_range() {
        let mut noise = node("noise", &[]);
        let mut rng = rng();
        for _ in 0..64 {
            noise.process(&[], 44100.0, &mut rng);
            assert!((-1.0..=1.0).contains(&noise.output(0)));
        }
    }

    #[test]
    fn sequence_argument_is_a_type_mismatch() {
        let sequence: crate::Sequence = [crate::Number::new(1.0)].into_iter().collect();
        assert!(matches!(
            build_builtin("osc", &[sequence.into()]),
            Err(volsung_util::Error::TypeMismatch(_))
        ));
    }
}
