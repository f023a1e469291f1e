//! Built-in procedures callable from expressions.
//!
//! A procedure is an implementation function plus an argument-count range
//! and a mappability flag. Mappable procedures applied to a leading
//! sequence broadcast elementwise, producing a sequence of the same
//! length. The table is process-global and immutable; anything stateful
//! (the random generator, the node count, subgraph sources, the
//! diagnostic handler) is reached through the program reference every call
//! receives.
//!
//! | name | arguments | mappable | result |
//! |------|-----------|----------|--------|
//! | `random` | 0 to 2 | no | uniform draw in `[0,1)`, `[0,max)`, or `[min,max)` |
//! | `Arg` | 1 | yes | complex argument (angle) |
//! | `abs` | 1 | yes | complex magnitude |
//! | `sin` | 1 | yes | sine of the real part |
//! | `Re` | 1 | yes | real component |
//! | `Im` | 1 | yes | imaginary component, as an imaginary number |
//! | `reverse` | 1 | no | the sequence reversed |
//! | `print` | 1 or more | no | reports each argument through the handler, yields 0 |
//! | `length_of` | 1 | no | sequence length |
//! | `implementation_of` | 1 | no | a subgraph's captured source text |
//! | `count_nodes` | 0 | no | size of the node table |

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use volsung_util::{Error, Result};

use crate::program::Program;
use crate::value::{Number, Sequence, TypedValue};

type ProcedureImpl = fn(&[TypedValue], &Program) -> Result<TypedValue>;

/// One entry of the built-in table: implementation, arity range, and
/// whether a leading sequence argument broadcasts.
pub struct Procedure {
    implementation: ProcedureImpl,
    min_arguments: usize,
    /// `None` means unbounded.
    max_arguments: Option<usize>,
    can_be_mapped: bool,
}

impl Procedure {
    const fn new(
        implementation: ProcedureImpl,
        min_arguments: usize,
        max_arguments: Option<usize>,
        can_be_mapped: bool,
    ) -> Self {
        Self {
            implementation,
            min_arguments,
            max_arguments,
            can_be_mapped,
        }
    }

    /// Check the argument count, then run the implementation - mapped
    /// elementwise when the procedure allows it and the first argument is
    /// a sequence. Mapped calls require every per-element result to be a
    /// number.
    fn invoke(&self, name: &str, args: &[TypedValue], program: &Program) -> Result<TypedValue> {
        if args.len() < self.min_arguments
            || self.max_arguments.is_some_and(|max| args.len() > max)
        {
            let expected = match self.max_arguments {
                Some(max) if max == self.min_arguments => format!("{max}"),
                Some(max) => format!("{} to {max}", self.min_arguments),
                None => format!("at least {}", self.min_arguments),
            };
            return Err(Error::Arity(format!(
                "procedure '{name}' takes {expected} argument(s), got {}",
                args.len()
            )));
        }

        if self.can_be_mapped {
            if let TypedValue::Sequence(sequence) = &args[0] {
                let mut parameters = args.to_vec();
                let mut mapped = Sequence::new();
                for &element in sequence.iter() {
                    parameters[0] = TypedValue::Number(element);
                    mapped.push((self.implementation)(&parameters, program)?.number()?);
                }
                return Ok(TypedValue::Sequence(mapped));
            }
        }
        (self.implementation)(args, program)
    }
}

static PROCEDURES: LazyLock<FxHashMap<&'static str, Procedure>> = LazyLock::new(|| {
    let mut table = FxHashMap::default();
    table.insert("random", Procedure::new(random, 0, Some(2), false));
    table.insert("Arg", Procedure::new(arg, 1, Some(1), true));
    table.insert("abs", Procedure::new(abs, 1, Some(1), true));
    table.insert("sin", Procedure::new(sin, 1, Some(1), true));
    table.insert("Re", Procedure::new(re, 1, Some(1), true));
    table.insert("Im", Procedure::new(im, 1, Some(1), true));
    table.insert("reverse", Procedure::new(reverse, 1, Some(1), false));
    table.insert("print", Procedure::new(print, 1, None, false));
    table.insert("length_of", Procedure::new(length_of, 1, Some(1), false));
    table.insert(
        "implementation_of",
        Procedure::new(implementation_of, 1, Some(1), false),
    );
    table.insert("count_nodes", Procedure::new(count_nodes, 0, Some(0), false));
    table
});

/// `random()` in [0, 1), `random(max)` in [0, max), `random(min, max)`.
fn random(args: &[TypedValue], program: &Program) -> Result<TypedValue> {
    let (min, max) = match args {
        [] => (0.0, 1.0),
        [max] => (0.0, max.number()?.re()),
        [min, max, ..] => (min.number()?.re(), max.number()?.re()),
    };
    if min > max {
        return Err(Error::Range(format!("random: empty range [{min}, {max})")));
    }
    Ok(program.random_value(min, max).into())
}

/// `Arg(z)` - the angle of `z` in radians.
fn arg(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(args[0].number()?.angle().into())
}

/// `abs(z)` - the complex magnitude.
fn abs(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(args[0].number()?.magnitude().into())
}

/// `sin(x)` - sine of the real part.
fn sin(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(args[0].number()?.re().sin().into())
}

/// `Re(z)` - the real component.
fn re(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(args[0].number()?.re().into())
}

/// `Im(z)` - the imaginary component, kept on the imaginary axis.
fn im(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    let number = args[0].number()?;
    Ok(TypedValue::Number(Number::complex(0.0, number.im())))
}

/// `reverse(s)` - the sequence with its elements reversed.
fn reverse(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(TypedValue::Sequence(args[0].sequence()?.reversed()))
}

/// `print(a, …)` - report each argument through the diagnostic handler.
fn print(args: &[TypedValue], program: &Program) -> Result<TypedValue> {
    for arg in args {
        program.handler().note(arg.to_string());
    }
    Ok(0.0.into())
}

/// `length_of(s)` - the number of elements.
fn length_of(args: &[TypedValue], _: &Program) -> Result<TypedValue> {
    Ok(TypedValue::Number(args[0].sequence()?.len().into()))
}

/// `implementation_of("name")` - the captured source of a subgraph.
fn implementation_of(args: &[TypedValue], program: &Program) -> Result<TypedValue> {
    let name = args[0].text()?;
    let definition = program.subgraph(name).ok_or_else(|| {
        Error::Name(format!("implementation_of: no subgraph named '{name}'"))
    })?;
    Ok(definition.source.clone().into())
}

/// `count_nodes()` - how many nodes the program currently holds.
fn count_nodes(_: &[TypedValue], program: &Program) -> Result<TypedValue> {
    Ok(TypedValue::Number(program.node_count().into()))
}

impl Program {
    /// Invoke a built-in procedure by name.
    ///
    /// # Errors
    ///
    /// [`Error::Name`] for an unknown procedure, [`Error::Arity`] for a
    /// bad argument count, plus whatever the implementation itself
    /// raises.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::Program;
    ///
    /// let program = Program::new();
    /// let zero = program.call_procedure("sin", &[0.0.into()]).unwrap();
    /// assert_eq!(zero.number().unwrap(), 0.0);
    /// ```
    pub fn call_procedure(&self, name: &str, args: &[TypedValue]) -> Result<TypedValue> {
        let procedure = PROCEDURES
            .get(name)
            .ok_or_else(|| Error::Name(format!("unknown procedure: {name}")))?;
        procedure.invoke(name, args, self)
    }

    /// True if `name` is in the built-in table.
    pub fn procedure_exists(name: &str) -> bool {
        PROCEDURES.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[f32]) -> TypedValue {
        TypedValue::Sequence(values.iter().map(|&v| Number::new(v)).collect())
    }

    #[test]
    fn argument_counts_are_checked() {
        let program = Program::new();
        assert!(matches!(
            program.call_procedure("sin", &[]),
            Err(Error::Arity(_))
        ));
        assert!(matches!(
            program.call_procedure("random", &[1.0.into(), 2.0.into(), 3.0.into()]),
            Err(Error::Arity(_))
        ));
        assert!(matches!(
            program.call_procedure("missing", &[]),
            Err(Error::Name(_))
        ));
    }

    #[test]
    fn mappable_procedures_broadcast_over_sequences() {
        let program = Program::new();
        let result = program.call_procedure("abs", &[seq(&[-3.0, 4.0])]).unwrap();
        let result = result.sequence().unwrap().clone();
        assert_eq!(result.at(0).unwrap(), 3.0);
        assert_eq!(result.at(1).unwrap(), 4.0);

        let result = program.call_procedure("sin", &[seq(&[0.0])]).unwrap();
        assert_eq!(result.sequence().unwrap().at(0).unwrap(), 0.0);
    }

    #[test]
    fn reverse_and_length_of() {
        let program = Program::new();
        let reversed = program
            .call_procedure("reverse", &[seq(&[1.0, 2.0, 3.0])])
            .unwrap();
        assert_eq!(reversed.sequence().unwrap().at(0).unwrap(), 3.0);

        let length = program
            .call_procedure("length_of", &[seq(&[1.0, 2.0, 3.0])])
            .unwrap();
        assert_eq!(length.number().unwrap(), 3.0);
    }

    #[test]
    fn re_im_and_arg_decompose_complex_numbers() {
        let program = Program::new();
        let value = TypedValue::Number(Number::complex(3.0, 4.0));

        assert_eq!(
            program.call_procedure("Re", &[value.clone()]).unwrap(),
            TypedValue::Number(Number::new(3.0))
        );
        let im = program.call_procedure("Im", &[value.clone()]).unwrap();
        assert_eq!(im.number().unwrap().im(), 4.0);
        assert_eq!(im.number().unwrap().re(), 0.0);

        let angle = program.call_procedure("abs", &[value]).unwrap();
        assert_eq!(angle.number().unwrap(), 5.0);
    }

    #[test]
    fn random_draws_stay_in_range() {
        let program = Program::new();
        for _ in 0..32 {
            let value = program
                .call_procedure("random", &[2.0.into(), 4.0.into()])
                .unwrap();
            let value = value.number().unwrap().re();
            assert!((2.0..4.0).contains(&value));
        }
        assert!(matches!(
            program.call_procedure("random", &[4.0.into(), 2.0.into()]),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn print_routes_through_the_diagnostic_handler() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let program = Program::new();
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        program.set_diagnostic_callback(Box::new(move |diagnostic| {
            sink.borrow_mut().push(diagnostic.message.clone());
        }));

        program
            .call_procedure("print", &["channels".into(), 2.0.into()])
            .unwrap();
        assert_eq!(*messages.borrow(), vec!["channels".to_owned(), "2.000".to_owned()]);
    }

    #[test]
    fn count_nodes_sees_the_node_table() {
        let mut program = Program::new();
        program.configure_io(1, 1);
        program.reset();
        assert_eq!(
            program.call_procedure("count_nodes", &[]).unwrap(),
            TypedValue::Number(Number::new(2.0))
        );
    }
}
