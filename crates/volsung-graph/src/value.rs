//! The typed value algebra shared by the parser, directives, and node
//! parameters.
//!
//! A [`TypedValue`] is one of three things: a complex scalar [`Number`], an
//! ordered [`Sequence`] of numbers, or immutable [`Text`](TypedValue::Text).
//! Arithmetic is closed over numbers and sequences. Dispatch is on the
//! left operand's variant and the right operand broadcasts:
//!
//! | left \ right | Number | Sequence | Text |
//! |--------------|--------|----------|------|
//! | Number | complex arithmetic | elementwise over right | error |
//! | Sequence | elementwise over left | pairwise; lengths must match | error |
//! | Text | error | error | error |
//!
//! Text never participates in arithmetic; trying is a type mismatch, as
//! is subscripting anything that is not a sequence. Every operation that
//! could violate these rules returns a [`Result`] instead of coercing.
//!
//! # Example
//!
//! ```
//! use volsung_graph::{Number, Sequence, TypedValue};
//!
//! let gains: Sequence = [0.5, 1.0, 2.0].into_iter().map(Number::new).collect();
//! let scaled = TypedValue::from(10.0).mul(&gains.into()).unwrap();
//! assert_eq!(scaled.sequence().unwrap().at(2).unwrap(), 20.0);
//! ```

use std::fmt;

use num_complex::Complex32;
use volsung_util::{Error, Result};

/// A complex scalar.
///
/// Most program values are real. The imaginary part exists so expressions
/// can do spectral math, prints only when its magnitude reaches 10⁻³, and
/// is ignored when a `Number` is compared against a plain `f32` (equality
/// with a real projects onto the real part).
///
/// # Example
///
/// ```
/// use volsung_graph::Number;
///
/// let z = Number::complex(3.0, 4.0);
/// assert_eq!(z.magnitude(), 5.0);
/// assert_eq!(z * Number::new(2.0), Number::complex(6.0, 8.0));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Number(Complex32);

impl Number {
    /// A real number.
    pub fn new(re: f32) -> Self {
        Number(Complex32::new(re, 0.0))
    }

    /// A number with explicit real and imaginary parts.
    pub fn complex(re: f32, im: f32) -> Self {
        Number(Complex32::new(re, im))
    }

    /// The real part.
    pub fn re(&self) -> f32 {
        self.0.re
    }

    /// The imaginary part.
    pub fn im(&self) -> f32 {
        self.0.im
    }

    /// True when the imaginary part is nonzero.
    pub fn is_complex(&self) -> bool {
        self.0.im != 0.0
    }

    /// The modulus `|z|`.
    pub fn magnitude(&self) -> f32 {
        self.0.norm()
    }

    /// The argument in radians.
    pub fn angle(&self) -> f32 {
        self.0.arg()
    }

    /// Exponentiation.
    ///
    /// Real non-negative bases stay on the real axis, so integer powers
    /// of positive reals come out exact; everything else goes through the
    /// polar form.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::Number;
    ///
    /// assert_eq!(Number::new(3.0).pow(Number::new(2.0)), 9.0);
    /// ```
    pub fn pow(self, exponent: Number) -> Number {
        if !self.is_complex() && !exponent.is_complex() && self.0.re >= 0.0 {
            Number::new(self.0.re.powf(exponent.0.re))
        } else {
            Number(self.0.powc(exponent.0))
        }
    }
}

impl From<f32> for Number {
    fn from(value: f32) -> Self {
        Number::new(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::new(value as f32)
    }
}

/// Equality with a real float projects onto the real part.
impl PartialEq<f32> for Number {
    fn eq(&self, other: &f32) -> bool {
        self.0.re == *other
    }
}

impl std::ops::Add for Number {
    type Output = Number;
    fn add(self, rhs: Number) -> Number {
        Number(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Number {
    type Output = Number;
    fn sub(self, rhs: Number) -> Number {
        Number(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Number {
    type Output = Number;
    fn mul(self, rhs: Number) -> Number {
        Number(self.0 * rhs.0)
    }
}

impl std::ops::Div for Number {
    type Output = Number;
    fn div(self, rhs: Number) -> Number {
        Number(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Number {
    type Output = Number;
    fn neg(self) -> Number {
        Number(-self.0)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let real = self.0.re.abs() >= 1e-3;
        let imag = self.0.im.abs() >= 1e-3;
        match (real, imag) {
            (true, true) => write!(f, "{:.3} + {:.3}i", self.0.re, self.0.im),
            (true, false) => write!(f, "{:.3}", self.0.re),
            (false, true) => write!(f, "{:.3}i", self.0.im),
            (false, false) => write!(f, "0"),
        }
    }
}

/// An ordered, mutable, one-dimensional array of [`Number`]s.
///
/// Sequences are the language's only aggregate: sequence literals, range
/// literals, gathered subscripts, and mapped procedures all produce one.
/// Indexing follows the Python convention - a negative index counts from
/// the end exactly once, and anything outside `[-len, len)` is a range
/// error rather than a wrap-around.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequence {
    data: Vec<Number>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append an element.
    pub fn push(&mut self, value: Number) {
        self.data.push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Number> {
        self.data.iter()
    }

    /// Element at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] when `index` falls outside `[-len, len)`.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::{Number, Sequence};
    ///
    /// let s: Sequence = [1.0, 2.0, 3.0].into_iter().map(Number::new).collect();
    /// assert_eq!(s.at(-1).unwrap(), 3.0);
    /// assert!(s.at(3).is_err());
    /// ```
    pub fn at(&self, index: i64) -> Result<Number> {
        let len = self.data.len() as i64;
        let wrapped = if index < 0 { index + len } else { index };
        if wrapped < 0 || wrapped >= len {
            return Err(Error::Range(format!(
                "sequence index out of range: index is {index}, length is {len}"
            )));
        }
        Ok(self.data[wrapped as usize])
    }

    /// A copy with the elements in reverse order.
    pub fn reversed(&self) -> Sequence {
        Sequence {
            data: self.data.iter().rev().copied().collect(),
        }
    }

    /// Build `lower, lower ± step, …` inclusive of `upper` where the step
    /// lands on it. Descending when `lower > upper`.
    ///
    /// # Errors
    ///
    /// [`Error::Range`] when the step is not positive.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::Sequence;
    ///
    /// let ramp = Sequence::from_range(0.0, 1.0, 0.25).unwrap();
    /// assert_eq!(ramp.len(), 5);
    /// assert_eq!(ramp.at(1).unwrap(), 0.25);
    /// ```
    pub fn from_range(lower: f32, upper: f32, step: f32) -> Result<Sequence> {
        if step <= 0.0 {
            return Err(Error::Range(format!(
                "range step must be positive, got {step}"
            )));
        }
        let mut sequence = Sequence::new();
        if lower > upper {
            let mut n = lower;
            while n >= upper {
                sequence.push(Number::new(n));
                n -= step;
            }
        } else {
            let mut n = lower;
            while n <= upper {
                sequence.push(Number::new(n));
                n += step;
            }
        }
        Ok(sequence)
    }
}

impl FromIterator<Number> for Sequence {
    fn from_iter<I: IntoIterator<Item = Number>>(iter: I) -> Self {
        Sequence {
            data: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Number>> for Sequence {
    fn from(data: Vec<Number>) -> Self {
        Sequence { data }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (n, element) in self.data.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{element}")?;
        }
        write!(f, " }}")
    }
}

/// A value in the expression language.
///
/// The tag always matches the held payload. Accessors return a
/// [`Result`] so a wrong-variant access surfaces as a type mismatch at
/// the point of use instead of silently coercing.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Number(Number),
    Sequence(Sequence),
    Text(String),
}

impl TypedValue {
    /// The variant's name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Number(_) => "number",
            TypedValue::Sequence(_) => "sequence",
            TypedValue::Text(_) => "text",
        }
    }

    /// The held number.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] for sequences and text.
    pub fn number(&self) -> Result<Number> {
        match self {
            TypedValue::Number(number) => Ok(*number),
            other => Err(Error::TypeMismatch(format!(
                "expected a number, found a {}",
                other.type_name()
            ))),
        }
    }

    /// The held sequence.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] for numbers and text.
    pub fn sequence(&self) -> Result<&Sequence> {
        match self {
            TypedValue::Sequence(sequence) => Ok(sequence),
            other => Err(Error::TypeMismatch(format!(
                "expected a sequence, found a {}",
                other.type_name()
            ))),
        }
    }

    /// The held text.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] for numbers and sequences.
    pub fn text(&self) -> Result<&str> {
        match self {
            TypedValue::Text(text) => Ok(text),
            other => Err(Error::TypeMismatch(format!(
                "expected text, found a {}",
                other.type_name()
            ))),
        }
    }

    /// Addition, broadcast per the module's dispatch table.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::TypedValue;
    ///
    /// let sum = TypedValue::from(1.0).add(&TypedValue::from(2.0)).unwrap();
    /// assert_eq!(sum.number().unwrap(), 3.0);
    /// ```
    pub fn add(&self, other: &TypedValue) -> Result<TypedValue> {
        self.combine(other, |a, b| a + b)
    }

    /// Subtraction, broadcast per the module's dispatch table.
    pub fn sub(&self, other: &TypedValue) -> Result<TypedValue> {
        self.combine(other, |a, b| a - b)
    }

    /// Multiplication, broadcast per the module's dispatch table.
    pub fn mul(&self, other: &TypedValue) -> Result<TypedValue> {
        self.combine(other, |a, b| a * b)
    }

    /// Division, broadcast per the module's dispatch table. Division by
    /// zero is not trapped; it produces IEEE 754 infinities and NaNs.
    pub fn div(&self, other: &TypedValue) -> Result<TypedValue> {
        self.combine(other, |a, b| a / b)
    }

    /// Exponentiation, broadcast per the module's dispatch table; `^` is
    /// [`Number::pow`] under the hood.
    pub fn pow(&self, other: &TypedValue) -> Result<TypedValue> {
        self.combine(other, |a, b| a.pow(b))
    }

    /// Negation; elementwise over a sequence.
    pub fn neg(&self) -> Result<TypedValue> {
        match self {
            TypedValue::Number(number) => Ok(TypedValue::Number(-*number)),
            TypedValue::Sequence(sequence) => Ok(TypedValue::Sequence(
                sequence.iter().map(|&element| -element).collect(),
            )),
            TypedValue::Text(_) => Err(text_arithmetic()),
        }
    }

    /// Binary dispatch on the left operand; the right operand broadcasts.
    ///
    /// Number ∘ Sequence maps the number over the right-hand elements,
    /// Sequence ∘ Number maps over the left, and Sequence ∘ Sequence is
    /// pairwise with an arity error on mismatched lengths. Text on either
    /// side is a type mismatch.
    fn combine(&self, other: &TypedValue, op: fn(Number, Number) -> Number) -> Result<TypedValue> {
        match (self, other) {
            (TypedValue::Number(left), TypedValue::Number(right)) => {
                Ok(TypedValue::Number(op(*left, *right)))
            }
            (TypedValue::Number(left), TypedValue::Sequence(right)) => Ok(TypedValue::Sequence(
                right.iter().map(|&element| op(*left, element)).collect(),
            )),
            (TypedValue::Sequence(left), TypedValue::Number(right)) => Ok(TypedValue::Sequence(
                left.iter().map(|&element| op(element, *right)).collect(),
            )),
            (TypedValue::Sequence(left), TypedValue::Sequence(right)) => {
                if left.len() != right.len() {
                    return Err(Error::Arity(format!(
                        "cannot combine sequences of lengths {} and {}",
                        left.len(),
                        right.len()
                    )));
                }
                Ok(TypedValue::Sequence(
                    left.iter()
                        .zip(right.iter())
                        .map(|(&a, &b)| op(a, b))
                        .collect(),
                ))
            }
            _ => Err(text_arithmetic()),
        }
    }
}

fn text_arithmetic() -> Error {
    Error::TypeMismatch("cannot perform arithmetic on an expression of type text".into())
}

impl From<Number> for TypedValue {
    fn from(value: Number) -> Self {
        TypedValue::Number(value)
    }
}

impl From<f32> for TypedValue {
    fn from(value: f32) -> Self {
        TypedValue::Number(Number::new(value))
    }
}

impl From<Sequence> for TypedValue {
    fn from(value: Sequence) -> Self {
        TypedValue::Sequence(value)
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::Text(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::Text(value.to_owned())
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Number(number) => write!(f, "{number}"),
            TypedValue::Sequence(sequence) => write!(f, "{sequence}"),
            TypedValue::Text(text) => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[f32]) -> Sequence {
        values.iter().map(|&v| Number::new(v)).collect()
    }

    #[test]
    fn complex_multiplication_and_division() {
        let a = Number::complex(1.0, 2.0);
        let b = Number::complex(3.0, 4.0);
        let product = a * b;
        assert!((product.re() + 5.0).abs() < 1e-5);
        assert!((product.im() - 10.0).abs() < 1e-5);

        let quotient = a / b;
        assert!((quotient.re() - 0.44).abs() < 1e-5);
        assert!((quotient.im() - 0.08).abs() < 1e-5);
    }

    #[test]
    fn real_exponentiation_is_exact() {
        assert_eq!(Number::new(3.0).pow(Number::new(2.0)), 9.0);
        assert_eq!(Number::new(2.0).pow(Number::new(10.0)), 1024.0);
    }

    #[test]
    fn complex_exponentiation_uses_polar_form() {
        // i² = -1
        let result = Number::complex(0.0, 1.0).pow(Number::new(2.0));
        assert!((result.re() + 1.0).abs() < 1e-5);
        assert!(result.im().abs() < 1e-5);
    }

    #[test]
    fn number_formats_by_component_magnitude() {
        assert_eq!(Number::new(1.5).to_string(), "1.500");
        assert_eq!(Number::complex(1.0, 2.0).to_string(), "1.000 + 2.000i");
        assert_eq!(Number::complex(0.0, -4.0).to_string(), "-4.000i");
        assert_eq!(Number::complex(1e-4, 1e-4).to_string(), "0");
    }

    #[test]
    fn negative_indices_wrap_around() {
        let s = seq(&[1.0, 2.0, 3.0, 4.0]);
        let len = s.len() as i64;
        for index in -len..len {
            let wrapped = (index + len).rem_euclid(len);
            assert_eq!(s.at(index).unwrap(), s.at(wrapped).unwrap());
        }
        assert_eq!(s.at(-1).unwrap(), 4.0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let s = seq(&[1.0, 2.0]);
        assert!(matches!(s.at(2), Err(Error::Range(_))));
        assert!(matches!(s.at(-3), Err(Error::Range(_))));
    }

    #[test]
    fn range_lengths_match_the_closed_formula() {
        for (lower, upper, step) in [(1.0, 5.0, 1.0), (0.0, 1.0, 0.25), (2.0, 9.0, 3.0)] {
            let sequence = Sequence::from_range(lower, upper, step).unwrap();
            let expected = ((upper - lower) / step).floor() as usize + 1;
            assert_eq!(sequence.len(), expected);
        }
    }

    #[test]
    fn descending_range() {
        let sequence = Sequence::from_range(5.0, 1.0, 1.0).unwrap();
        assert_eq!(sequence.len(), 5);
        assert_eq!(sequence.at(0).unwrap(), 5.0);
        assert_eq!(sequence.at(-1).unwrap(), 1.0);
    }

    #[test]
    fn non_positive_step_is_an_error() {
        assert!(matches!(
            Sequence::from_range(0.0, 1.0, 0.0),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn number_broadcasts_over_sequence() {
        let left = TypedValue::Number(Number::new(10.0));
        let right = TypedValue::Sequence(seq(&[1.0, 2.0, 3.0]));
        let result = left.sub(&right).unwrap();
        let TypedValue::Sequence(result) = result else {
            panic!("expected a sequence");
        };
        assert_eq!(result.at(0).unwrap(), 9.0);
        assert_eq!(result.at(2).unwrap(), 7.0);
    }

    #[test]
    fn pairwise_sequence_arithmetic_requires_equal_lengths() {
        let left = TypedValue::Sequence(seq(&[1.0, 2.0]));
        let right = TypedValue::Sequence(seq(&[1.0, 2.0, 3.0]));
        assert!(matches!(left.add(&right), Err(Error::Arity(_))));

        let right = TypedValue::Sequence(seq(&[10.0, 20.0]));
        let sum = left.add(&right).unwrap();
        assert_eq!(sum.sequence().unwrap().at(1).unwrap(), 22.0);
    }

    #[test]
    fn text_never_participates_in_arithmetic() {
        let text = TypedValue::from("440");
        let number = TypedValue::from(2.0);
        assert!(matches!(
            text.add(&number),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            number.mul(&text),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(text.neg(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn addition_is_associative_within_tolerance() {
        let (a, b, c) = (Number::new(0.1), Number::new(2.7), Number::new(31.4));
        let left = (a + b) + c;
        let right = a + (b + c);
        assert!((left.re() - right.re()).abs() / right.re().abs() < 1e-5);
    }

    #[test]
    fn equality_with_a_real_projects_to_the_real_part() {
        assert_eq!(Number::complex(2.0, 0.5), 2.0);
    }
}
