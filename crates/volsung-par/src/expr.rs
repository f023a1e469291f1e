//! Expression parsing and evaluation.
//!
//! Expressions are evaluated as they are parsed; there is no AST. Each
//! level of the ladder parses the next-tighter level and folds operators
//! left to right, except `^`, which recurses for right associativity:
//!
//! | level | operators | associativity |
//! |-------|-----------|---------------|
//! | expression | `+` `-` | left |
//! | product | `*` `/` | left |
//! | power | `^` | right |
//! | factor | literals, identifiers, calls, `(…)`, `{…}`, unary `-` | - |
//!
//! After a factor come two optional suffixes, in this order: a subscript
//! (`s[i]`, where a sequence index gathers) and a range tail
//! (`lo..hi` or `lo..hi|step`). A numeric literal may be scaled to
//! samples by an `s` or `ms` suffix, using the program's sample rate.
//!
//! Evaluation happens against a [`Program`]: identifiers resolve through
//! the parser's lexical overlay first (the group counter `n`), then the
//! program's symbol table, and `name(args)` in factor position invokes a
//! built-in procedure.

use volsung_graph::{Number, Program, Sequence, TypedValue};
use volsung_lex::TokenKind;
use volsung_util::{Error, Result};

use crate::Parser;

impl<'src> Parser<'src> {
    /// expression = product { ('+' | '-') product }
    ///
    /// The entry point for every expression position in the grammar:
    /// declaration values, object arguments, counts and indices,
    /// directive arguments. Entered with `current` on the expression's
    /// first token; returns with `current` on its last.
    pub(crate) fn parse_expression(&mut self, program: &Program) -> Result<TypedValue> {
        let mut value = self.parse_product(program)?;
        while self.lexer.peek(TokenKind::Plus) || self.lexer.peek(TokenKind::Minus) {
            self.next()?;
            let subtract = self.current.is(TokenKind::Minus);
            self.next()?;
            let operand = self.parse_product(program)?;
            value = if subtract {
                value.sub(&operand)
            } else {
                value.add(&operand)
            }
            .map_err(|e| self.located(e))?;
        }
        Ok(value)
    }

    /// product = power { ('*' | '/') power }
    fn parse_product(&mut self, program: &Program) -> Result<TypedValue> {
        let mut value = self.parse_power(program)?;
        while self.lexer.peek(TokenKind::Asterisk) || self.lexer.peek(TokenKind::Slash) {
            self.next()?;
            let divide = self.current.is(TokenKind::Slash);
            self.next()?;
            let operand = self.parse_power(program)?;
            value = if divide {
                value.div(&operand)
            } else {
                value.mul(&operand)
            }
            .map_err(|e| self.located(e))?;
        }
        Ok(value)
    }

    /// power = factor [ '^' power ]
    ///
    /// Recursing on the right-hand side is what makes `^`
    /// right-associative: `2^3^2` is `2^(3^2)`.
    fn parse_power(&mut self, program: &Program) -> Result<TypedValue> {
        let value = self.parse_factor(program)?;
        if self.lexer.peek(TokenKind::Caret) {
            self.expect(TokenKind::Caret)?;
            self.next()?;
            let exponent = self.parse_power(program)?;
            return value.pow(&exponent).map_err(|e| self.located(e));
        }
        Ok(value)
    }

    /// factor, then an optional subscript, then an optional range tail.
    ///
    /// A factor is a numeric or string literal, an identifier (symbol
    /// reference or procedure call), a parenthesized expression, a
    /// sequence literal, or a negated product. Unary minus binds the
    /// whole following product, so `-2*3` is `-(2*3)`.
    fn parse_factor(&mut self, program: &Program) -> Result<TypedValue> {
        let mut value = match self.current.kind {
            TokenKind::Identifier => {
                let name = self.current.lexeme.clone();
                if self.lexer.peek(TokenKind::OpenParen) {
                    self.parse_procedure_call(program, &name)?
                } else {
                    match self.lookup_symbol(program, &name) {
                        Some(value) => value,
                        None => {
                            return Err(
                                self.located(Error::Name(format!("symbol not found: {name}")))
                            )
                        }
                    }
                }
            }
            TokenKind::NumericLiteral => TypedValue::Number(self.parse_number(program)?),
            TokenKind::StringLiteral => TypedValue::Text(self.current.lexeme.clone()),
            TokenKind::OpenParen => {
                self.next()?;
                let value = self.parse_expression(program)?;
                self.expect(TokenKind::CloseParen)?;
                value
            }
            TokenKind::OpenBrace => TypedValue::Sequence(self.parse_sequence(program)?),
            TokenKind::Minus => {
                self.next()?;
                let value = self.parse_product(program)?;
                value.neg().map_err(|e| self.located(e))?
            }
            other => {
                return Err(self.parse_error(format!(
                    "cannot evaluate an expression factor starting with {other}"
                )))
            }
        };

        if self.lexer.peek(TokenKind::OpenBracket) {
            value = self.parse_subscript(program, value)?;
        }

        if self.lexer.peek(TokenKind::Elipsis) {
            value = self.parse_range_tail(program, value)?;
        }
        Ok(value)
    }

    /// `'[' expression ']'` after a sequence-valued factor. A number
    /// selects one element; a sequence gathers.
    fn parse_subscript(&mut self, program: &Program, value: TypedValue) -> Result<TypedValue> {
        self.expect(TokenKind::OpenBracket)?;
        let sequence = match value {
            TypedValue::Sequence(sequence) => sequence,
            other => {
                return Err(self.located(Error::TypeMismatch(format!(
                    "attempted to subscript a {}",
                    other.type_name()
                ))))
            }
        };

        self.next()?;
        let index = self.parse_expression(program)?;
        self.expect(TokenKind::CloseBracket)?;

        match index {
            TypedValue::Number(number) => {
                let element = sequence
                    .at(number.re() as i64)
                    .map_err(|e| self.located(e))?;
                Ok(TypedValue::Number(element))
            }
            TypedValue::Sequence(indices) => {
                let mut gathered = Sequence::new();
                for index in indices.iter() {
                    gathered.push(
                        sequence
                            .at(index.re() as i64)
                            .map_err(|e| self.located(e))?,
                    );
                }
                Ok(TypedValue::Sequence(gathered))
            }
            TypedValue::Text(_) => Err(self.located(Error::TypeMismatch(
                "a sequence index must be a number or a sequence".into(),
            ))),
        }
    }

    /// `'..' expression [ '|' expression ]` builds an inclusive range.
    ///
    /// The finished factor becomes the lower bound, so the tail binds
    /// tighter than the surrounding operators: `10 + 1..3` broadcasts 10
    /// over `{1, 2, 3}`. The step defaults to 1 and must be positive;
    /// a descending range comes from `lower > upper`.
    fn parse_range_tail(&mut self, program: &Program, value: TypedValue) -> Result<TypedValue> {
        self.expect(TokenKind::Elipsis)?;
        self.next()?;

        let lower = value.number().map_err(|e| self.located(e))?.re();
        let upper = self
            .parse_expression(program)?
            .number()
            .map_err(|e| self.located(e))?
            .re();

        let mut step = 1.0;
        if self.lexer.peek(TokenKind::VerticalBar) {
            self.next()?;
            self.next()?;
            step = self
                .parse_expression(program)?
                .number()
                .map_err(|e| self.located(e))?
                .re();
        }

        let sequence = Sequence::from_range(lower, upper, step).map_err(|e| self.located(e))?;
        Ok(TypedValue::Sequence(sequence))
    }

    /// `Identifier '(' expr { ',' expr } ')'` in factor position.
    ///
    /// The parenthesis decides: an identifier directly followed by `(`
    /// is always a procedure call, never a symbol reference, and an
    /// unknown procedure is a name error from the program's table.
    fn parse_procedure_call(&mut self, program: &Program, name: &str) -> Result<TypedValue> {
        self.expect(TokenKind::OpenParen)?;

        let mut args = Vec::new();
        if !self.lexer.peek(TokenKind::CloseParen) {
            self.next()?;
            args.push(self.parse_expression(program)?);
            while self.lexer.peek(TokenKind::Comma) {
                self.expect(TokenKind::Comma)?;
                self.next()?;
                args.push(self.parse_expression(program)?);
            }
        }
        self.expect(TokenKind::CloseParen)?;

        program
            .call_procedure(name, &args)
            .map_err(|e| self.located(e))
    }

    /// A numeric literal with optional fraction and `s` / `ms` suffix;
    /// the literal token is on `current`.
    ///
    /// The lexer only produces digit runs, so `2.5` arrives as three
    /// tokens (`2`, `.`, `5`) and is reassembled here. A following
    /// identifier must be one of the duration suffixes: `s` multiplies
    /// by the sample rate, `ms` by a thousandth of it.
    pub(crate) fn parse_number(&mut self, program: &Program) -> Result<Number> {
        self.verify(TokenKind::NumericLiteral)?;
        let mut literal = self.current.lexeme.clone();

        if self.lexer.peek(TokenKind::Dot) {
            self.next()?;
            literal.push('.');
            self.expect(TokenKind::NumericLiteral)?;
            literal.push_str(&self.current.lexeme);
        }

        let mut multiplier = 1.0;
        if self.lexer.peek(TokenKind::Identifier) {
            self.next()?;
            multiplier = match self.current.lexeme.as_str() {
                "s" => program.sample_rate(),
                "ms" => program.sample_rate() / 1000.0,
                other => {
                    return Err(self.parse_error(format!(
                        "invalid literal suffix or stray identifier: {other}"
                    )))
                }
            };
        }

        let value: f32 = literal
            .parse()
            .map_err(|_| self.parse_error(format!("invalid numeric literal: {literal}")))?;
        Ok(Number::new(value * multiplier))
    }

    /// `'{' expr { ',' expr } '}'` - every element must be a number.
    ///
    /// At least one element is required; an empty pair of braces is a
    /// parse error, matching the rest of the grammar where `{` always
    /// opens either a sequence or a subgraph body.
    fn parse_sequence(&mut self, program: &Program) -> Result<Sequence> {
        let mut sequence = Sequence::new();
        self.next()?;
        sequence.push(
            self.parse_expression(program)?
                .number()
                .map_err(|e| self.located(e))?,
        );
        while self.lexer.peek(TokenKind::Comma) {
            self.expect(TokenKind::Comma)?;
            self.next()?;
            sequence.push(
                self.parse_expression(program)?
                    .number()
                    .map_err(|e| self.located(e))?,
            );
        }
        self.expect(TokenKind::CloseBrace)?;
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    fn eval(source: &str) -> Result<TypedValue> {
        let mut program = Program::new();
        program.configure_io(0, 0);
        program.reset();
        let mut parser = Parser::new(source);
        parser.next()?;
        parser.parse_expression(&program)
    }

    fn eval_number(source: &str) -> f32 {
        eval(source).unwrap().number().unwrap().re()
    }

    fn eval_sequence(source: &str) -> Sequence {
        eval(source).unwrap().sequence().unwrap().clone()
    }

    #[test]
    fn precedence_and_right_associative_power() {
        assert_eq!(eval_number("(1+2)*3^2"), 27.0);
        assert_eq!(eval_number("2+3*4"), 14.0);
        // 2^3^2 = 2^(3^2)
        assert_eq!(eval_number("2^3^2"), 512.0);
        assert_eq!(eval_number("12/4/3"), 1.0);
    }

    #[test]
    fn unary_minus_binds_the_product() {
        assert_eq!(eval_number("-2*3"), -6.0);
        assert_eq!(eval_number("4 + -2"), 2.0);
    }

    #[test]
    fn fractional_literals_span_tokens() {
        assert_eq!(eval_number("2.5 * 2"), 5.0);
        assert_eq!(eval_number("0.125"), 0.125);
    }

    #[test]
    fn sequence_literal_subscripts() {
        assert_eq!(eval_number("{10, 20, 30}[1]"), 20.0);
        assert_eq!(eval_number("{10, 20, 30}[-1]"), 30.0);
    }

    #[test]
    fn sequence_subscript_by_sequence_gathers() {
        let gathered = eval_sequence("{10, 20, 30, 40}[{3, 0}]");
        assert_eq!(gathered.len(), 2);
        assert_eq!(gathered.at(0).unwrap(), 40.0);
        assert_eq!(gathered.at(1).unwrap(), 10.0);
    }

    #[test]
    fn subscripting_a_number_is_a_type_mismatch() {
        assert!(matches!(eval("4[0]"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn out_of_range_subscript_is_a_range_error() {
        assert!(matches!(eval("{1, 2}[5]"), Err(Error::Range(_))));
    }

    #[test]
    fn range_literals_with_and_without_steps() {
        assert_eq!(eval_sequence("1..5").len(), 5);
        let stepped = eval_sequence("0..1|0.25");
        assert_eq!(stepped.len(), 5);
        assert_eq!(stepped.at(1).unwrap(), 0.25);
        let descending = eval_sequence("5..1");
        assert_eq!(descending.at(0).unwrap(), 5.0);
        assert_eq!(descending.at(-1).unwrap(), 1.0);
    }

    #[test]
    fn range_bounds_may_be_expressions() {
        assert_eq!(eval_sequence("1..2+2").len(), 4);
    }

    #[test]
    fn procedure_calls_in_factor_position() {
        assert_eq!(eval_number("length_of({1, 2, 3})"), 3.0);
        assert_eq!(eval_number("abs(-4) + 1"), 5.0);
        assert_eq!(eval_number("sin(0)"), 0.0);
    }

    #[test]
    fn procedures_map_over_sequences() {
        let mapped = eval_sequence("abs({-1, 2, -3})");
        assert_eq!(mapped.at(0).unwrap(), 1.0);
        assert_eq!(mapped.at(2).unwrap(), 3.0);
    }

    #[test]
    fn unknown_procedure_is_a_name_error() {
        assert!(matches!(eval("conjure(1)"), Err(Error::Name(_))));
    }

    #[test]
    fn procedure_arity_mismatch_is_an_arity_error() {
        assert!(matches!(eval("sin(1, 2)"), Err(Error::Arity(_))));
    }

    #[test]
    fn undefined_symbol_is_a_name_error() {
        assert!(matches!(eval("missing + 1"), Err(Error::Name(_))));
    }

    #[test]
    fn sequences_broadcast_in_arithmetic() {
        let doubled = eval_sequence("{1, 2, 3} * 2");
        assert_eq!(doubled.at(2).unwrap(), 6.0);
        let offset = eval_sequence("10 + 1..3");
        assert_eq!(offset.at(0).unwrap(), 11.0);
    }

    #[test]
    fn text_in_arithmetic_is_a_type_mismatch() {
        assert!(matches!(eval("\"text\" + 1"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn strings_evaluate_to_text() {
        let value = eval("\"out.raw\"").unwrap();
        assert_eq!(value.text().unwrap(), "out.raw");
    }
}
