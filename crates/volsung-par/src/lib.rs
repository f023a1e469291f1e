//! volsung-par - The parser and graph builder.
//!
//! The parser consumes tokens and drives the [`Program`] API as it goes:
//! there is no intermediate tree. Four productions exist at the top level:
//!
//! - **Declarations** - `name: expression` binds a symbol,
//!   `name: type~ args` creates a node, `name: [count] type~ args` expands
//!   a group of nodes.
//! - **Connection chains** - objects joined by the five connection
//!   operators, with optional `|N` port indices and inline anonymous
//!   objects.
//! - **Subgraph definitions** - `name(in, out): { … }` captures the body
//!   verbatim for later instantiation.
//! - **Directives** - `&name args…` invokes a host-registered callback.
//!
//! Every method returns [`Result`]; the first error is reported once to
//! the program's diagnostic handler, the program is reset, and
//! [`Parser::parse_program`] returns `false`.
//!
//! # Connection operators
//!
//! | operator | left | right | edges |
//! |----------|------|-------|-------|
//! | `->` | object | object | one |
//! | `>>` | group | object | one per member |
//! | `<>` | object | group | one per member |
//! | `=>` | group | group | one per index pair; sizes must match |
//! | `x>` | group | group | the full product |
//!
//! Port indices attach as `source|N` before an operator and `N|sink`
//! after one; port 0 is the default on both sides.
//!
//! # Token-stream convention
//!
//! Shared with the expression module: a parse method is entered with
//! `current` on the first token of its construct and returns with
//! `current` on the last token it consumed. Lookahead goes through the
//! lexer's non-destructive `peek`.

mod expr;

use std::rc::Rc;

use volsung_graph::{
    group_member_name, is_builtin_type, ConnectionKind, Program, SubgraphDefinition, TypedValue,
};
use volsung_lex::{Lexer, Token, TokenKind};
use volsung_util::{Error, Result};

/// A single-use parser over one source string.
///
/// The parser is also the evaluator: declarations, arguments, and
/// directives are computed as they are read, and graph mutations go
/// straight to the [`Program`]. Parse state is just the lexer cursor,
/// the current token, an anonymous-name counter, and a small lexical
/// overlay for the group counter.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    /// Counter behind `Unnamed Object N` names.
    inline_index: usize,
    /// Nested parsers stop at the matching `}` instead of end of input.
    nested: bool,
    /// Lexically scoped bindings (the group counter `n`), searched before
    /// the program's symbol table and never written into it.
    locals: Vec<(String, TypedValue)>,
}

impl<'src> Parser<'src> {
    /// A parser for a top-level program.
    pub fn new(source: &'src str) -> Self {
        Self::with_nesting(source, false)
    }

    /// A parser for a captured subgraph body.
    fn nested(source: &'src str) -> Self {
        Self::with_nesting(source, true)
    }

    fn with_nesting(source: &'src str, nested: bool) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: Token::new(TokenKind::Eof, "", 0),
            inline_index: 0,
            nested,
            locals: Vec::new(),
        }
    }

    /// Parse the whole source into `program`.
    ///
    /// On failure the error has already been reported to the program's
    /// diagnostic handler and the program has been reset. The program is
    /// not reset on entry, so host-created objects, symbols, and
    /// directives registered beforehand are visible to the source.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_graph::Program;
    /// use volsung_par::Parser;
    ///
    /// let mut program = Program::new();
    /// program.configure_io(1, 1);
    /// program.reset();
    ///
    /// let ok = Parser::new("input -> *2 -> output\n").parse_program(&mut program);
    /// assert!(ok);
    /// assert_eq!(program.run_sample(3.0), 6.0);
    /// ```
    pub fn parse_program(&mut self, program: &mut Program) -> bool {
        match self.parse_top_level(program) {
            Ok(()) => true,
            Err(error) => {
                program.handler().error(error.to_string());
                program.reset();
                false
            }
        }
    }

    /// The statement loop: skip newlines, dispatch on the first
    /// significant token, stop at end of input (or at the matching `}`
    /// when nested).
    fn parse_top_level(&mut self, program: &mut Program) -> Result<()> {
        self.seed_predefined_symbols(program)?;

        loop {
            while self.lexer.peek(TokenKind::Newline) {
                self.next()?;
            }
            if self.lexer.peek(TokenKind::Eof)
                || (self.nested && self.lexer.peek(TokenKind::CloseBrace))
            {
                break;
            }

            if self.lexer.peek(TokenKind::Identifier) {
                self.next()?;
                if self.lexer.peek(TokenKind::Colon) {
                    self.parse_declaration(program)?;
                } else if self.lexer.peek_connection() {
                    self.parse_connection(program)?;
                } else if self.lexer.peek(TokenKind::OpenParen) {
                    self.parse_subgraph_declaration(program)?;
                } else {
                    self.next()?;
                    return Err(self.parse_error(format!(
                        "expected colon or connection operator, got {}",
                        self.current.kind
                    )));
                }
            } else if self.lexer.peek(TokenKind::ObjectType)
                || self.lexer.peek(TokenKind::OpenBracket)
                || self.peek_inline_operator()
            {
                self.next()?;
                self.parse_connection(program)?;
            } else if self.lexer.peek(TokenKind::Ampersand) {
                self.parse_directive(program)?;
            } else {
                self.next()?;
                return Err(self.parse_error(format!(
                    "expected a declaration or connection, got {}",
                    self.current.kind
                )));
            }
        }
        Ok(())
    }

    /// Bind the symbols every program starts with: `sample_rate` and its
    /// alias `fs`, `tau`, and `e`. A host binding under one of these
    /// names wins.
    fn seed_predefined_symbols(&mut self, program: &mut Program) -> Result<()> {
        let sample_rate = program.sample_rate();
        let predefined: [(&str, f32); 4] = [
            ("sample_rate", sample_rate),
            ("fs", sample_rate),
            ("tau", std::f32::consts::TAU),
            ("e", std::f32::consts::E),
        ];
        for (name, value) in predefined {
            if !program.symbol_exists(name) {
                program
                    .add_symbol(name, value.into())
                    .map_err(|e| self.located(e))?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// `name ':' ( expression | object-decl )` with `name` on `current`.
    ///
    /// An expression binds `name` in the symbol table; an object
    /// declaration creates a node or a group under it. Either way the
    /// name must be fresh.
    fn parse_declaration(&mut self, program: &mut Program) -> Result<()> {
        let name = self.current.lexeme.clone();
        self.expect(TokenKind::Colon)?;

        if self.lexer.peek_expression() {
            self.next()?;
            let value = self.parse_expression(program)?;
            program
                .add_symbol(&name, value)
                .map_err(|e| self.located(e))?;
            Ok(())
        } else if self.lexer.peek(TokenKind::ObjectType) || self.lexer.peek(TokenKind::OpenBracket)
        {
            self.next()?;
            self.parse_object_declaration(program, Some(name))?;
            Ok(())
        } else {
            self.next()?;
            Err(self.parse_error(format!(
                "expected an object, group, or expression, got {}",
                self.current.kind
            )))
        }
    }

    /// `[ '[' expr ']' ] ObjectType [ expr { ',' expr } ]` with the first
    /// token on `current`. Returns the declared name.
    ///
    /// Without brackets this creates a single node. With `[count]` it
    /// expands a group:
    ///
    /// 1. Evaluate the count (floor of the expression).
    /// 2. For each member, rewind the lexer to the start of the argument
    ///    list, bind the counter `n` to `member + 1` as a lexical local,
    ///    re-evaluate the arguments, and create the member under its
    ///    synthetic name.
    /// 3. Record the group's cardinality.
    ///
    /// Re-reading the arguments per member is what lets `n` appear in
    /// them, as in `bank: [8] osc~ n * 110`.
    fn parse_object_declaration(
        &mut self,
        program: &mut Program,
        name: Option<String>,
    ) -> Result<String> {
        let name = name.unwrap_or_else(|| self.fresh_inline_name());

        let mut group_size = None;
        if self.current.is(TokenKind::OpenBracket) {
            self.next()?;
            let count = self.parse_expression(program)?;
            let count = count.number().map_err(|e| self.located(e))?.re().floor();
            group_size = Some(count.max(0.0) as usize);
            self.expect(TokenKind::CloseBracket)?;
            self.next()?;
        }

        self.verify(TokenKind::ObjectType)?;
        let type_name = self.current.lexeme.clone();

        match group_size {
            Some(count) => {
                // Re-read the argument expressions once per member, with
                // the counter `n` in scope as a lexical binding.
                let saved = (self.lexer.pos(), self.lexer.line());
                for n in 0..count {
                    self.lexer.set_pos(saved.0);
                    self.lexer.set_line(saved.1);

                    self.locals
                        .push(("n".to_owned(), ((n + 1) as f32).into()));
                    let result = self.parse_argument_list(program).and_then(|args| {
                        self.make_object(program, &type_name, &group_member_name(&name, n), args)
                    });
                    self.locals.pop();
                    result?;
                }
                program
                    .add_group(&name, count)
                    .map_err(|e| self.located(e))?;
            }
            None => {
                let args = self.parse_argument_list(program)?;
                self.make_object(program, &type_name, &name, args)?;
            }
        }
        Ok(name)
    }

    /// Zero or more comma-separated argument expressions, evaluated
    /// eagerly.
    fn parse_argument_list(&mut self, program: &mut Program) -> Result<Vec<TypedValue>> {
        let mut args = Vec::new();
        if self.lexer.peek_expression() {
            self.next()?;
            args.push(self.parse_expression(program)?);
            while self.lexer.peek(TokenKind::Comma) {
                self.expect(TokenKind::Comma)?;
                self.next()?;
                args.push(self.parse_expression(program)?);
            }
        }
        Ok(args)
    }

    /// Create `name` as a catalog node or a subgraph instance.
    ///
    /// Catalog types win over subgraph recipes of the same name; a type
    /// found in neither table is a name error.
    fn make_object(
        &mut self,
        program: &mut Program,
        type_name: &str,
        name: &str,
        args: Vec<TypedValue>,
    ) -> Result<()> {
        if is_builtin_type(type_name) {
            program
                .create_node(type_name, name, &args)
                .map_err(|e| self.located(e))
        } else if program.has_subgraph(type_name) {
            self.instantiate_subgraph(program, type_name, name, args)
        } else {
            Err(self.located(Error::Name(format!("no such object type: {type_name}"))))
        }
    }

    /// Build a nested program from a stored subgraph recipe and install it
    /// behind a subgraph node.
    ///
    /// The child shares the parent's diagnostic handler and sample rate,
    /// takes the recipe's io arities, and sees the instantiation
    /// arguments as `_1, _2, …` before its body is parsed. Recipes are
    /// scoped to the program whose source defined them, so a body that
    /// needs helper subgraphs defines its own.
    fn instantiate_subgraph(
        &mut self,
        program: &mut Program,
        type_name: &str,
        name: &str,
        args: Vec<TypedValue>,
    ) -> Result<()> {
        let definition = match program.subgraph(type_name) {
            Some(definition) => definition.clone(),
            None => {
                return Err(self.located(Error::Subgraph(format!(
                    "no subgraph definition for '{type_name}'"
                ))))
            }
        };

        let mut child = Program::with_handler(Rc::clone(program.handler()));
        child.set_sample_rate(program.sample_rate());
        child.configure_io(definition.inputs, definition.outputs);
        child.reset();

        for (n, arg) in args.iter().enumerate() {
            child
                .add_symbol(&format!("_{}", n + 1), arg.clone())
                .map_err(|e| self.located(e))?;
        }

        let mut nested = Parser::nested(&definition.source);
        if !nested.parse_program(&mut child) {
            return Err(self.located(Error::Subgraph(format!(
                "subgraph '{type_name}' failed to parse"
            ))));
        }

        log::debug!("instantiated subgraph '{type_name}' as '{name}'");
        program
            .create_subgraph_node(name, child)
            .map_err(|e| self.located(e))
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// A chain of connection operators; the first operand is on `current`.
    ///
    /// Each link wires immediately and its sink becomes the next link's
    /// source, so `a -> b -> c` is two edges sharing `b`. A newline only
    /// ends the chain when the next significant token is not another
    /// connection operator, which is what allows multi-line chains.
    fn parse_connection(&mut self, program: &mut Program) -> Result<()> {
        let mut source = self.connectable_object(program)?;
        let mut out_index = self.parse_output_index()?;

        while self.lexer.peek(TokenKind::Newline) {
            self.next()?;
        }

        let mut got_newline = false;
        loop {
            self.next()?;
            let kind = match self.current.kind {
                TokenKind::Arrow => ConnectionKind::OneToOne,
                TokenKind::ManyToOne => ConnectionKind::ManyToOne,
                TokenKind::OneToMany => ConnectionKind::OneToMany,
                TokenKind::Parallel => ConnectionKind::ManyToMany,
                TokenKind::CrossConnection => ConnectionKind::Biclique,
                other => {
                    return Err(self.parse_error(format!(
                        "expected a connection operator, got {other}"
                    )))
                }
            };

            let in_index = if self.lexer.peek(TokenKind::NumericLiteral) {
                self.expect(TokenKind::NumericLiteral)?;
                let index = self.parse_port_index()?;
                self.expect(TokenKind::VerticalBar)?;
                index
            } else {
                0
            };

            self.next()?;
            let sink = self.connectable_object(program)?;
            program
                .connect(&source, out_index, &sink, in_index, kind)
                .map_err(|e| self.located(e))?;

            source = sink;
            out_index = self.parse_output_index()?;

            got_newline = false;
            while self.lexer.peek(TokenKind::Newline) {
                self.next()?;
                got_newline = true;
            }
            if !self.lexer.peek_connection_operator() {
                break;
            }
        }

        if !got_newline {
            self.next()?;
            if !self.line_end() {
                return Err(self.parse_error(format!(
                    "expected newline or connection operator, got {}",
                    self.current.kind
                )));
            }
        }
        Ok(())
    }

    /// `'|' N` on the source side of an operator, defaulting to port 0.
    fn parse_output_index(&mut self) -> Result<usize> {
        if self.lexer.peek(TokenKind::VerticalBar) {
            self.expect(TokenKind::VerticalBar)?;
            self.expect(TokenKind::NumericLiteral)?;
            self.parse_port_index()
        } else {
            Ok(0)
        }
    }

    /// The numeric literal on `current` as a port index.
    fn parse_port_index(&self) -> Result<usize> {
        self.current
            .lexeme
            .parse()
            .map_err(|_| self.parse_error(format!("invalid port index: {}", self.current.lexeme)))
    }

    /// Resolve the operand on `current` to a node or group name, creating
    /// inline and mid-chain objects as needed.
    ///
    /// Four shapes are accepted:
    ///
    /// - a leading arithmetic operator creates an anonymous
    ///   `add`/`sub`/`mult`/`div`/`pow` node with the following
    ///   expression as its constant operand,
    /// - an existing identifier names an object or group, optionally
    ///   indexed as `group[k]` to pick one member,
    /// - `name: type~ args` declares mid-chain; the node is created
    ///   first, then the incoming connection is wired to it,
    /// - a bare `type~ args` or `[n] type~ args` declares anonymously.
    fn connectable_object(&mut self, program: &mut Program) -> Result<String> {
        match self.current.kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Asterisk
            | TokenKind::Slash
            | TokenKind::Caret => {
                let type_name = match self.current.kind {
                    TokenKind::Plus => "add",
                    TokenKind::Minus => "sub",
                    TokenKind::Asterisk => "mult",
                    TokenKind::Slash => "div",
                    _ => "pow",
                };
                self.next()?;
                let argument = self.parse_expression(program)?;
                let name = self.fresh_inline_name();
                program
                    .create_node(type_name, &name, &[argument])
                    .map_err(|e| self.located(e))?;
                Ok(name)
            }

            TokenKind::Identifier => {
                let mut name = self.current.lexeme.clone();

                if self.lexer.peek(TokenKind::Colon) {
                    // Mid-chain declaration: the node is created here,
                    // before the incoming connection is wired to it.
                    self.next()?;
                    self.next()?;
                    self.parse_object_declaration(program, Some(name.clone()))?;
                } else if !program.object_exists(&name) {
                    return Err(self.located(Error::Name(format!("undefined identifier: {name}"))));
                }

                if self.lexer.peek(TokenKind::OpenBracket) {
                    self.expect(TokenKind::OpenBracket)?;
                    self.next()?;
                    let index = self.parse_number(program)?.re() as i64;
                    self.expect(TokenKind::CloseBracket)?;

                    let size = program.group_size(&name).ok_or_else(|| {
                        self.located(Error::Name(format!("'{name}' is not a group")))
                    })?;
                    if index < 0 || index as usize >= size {
                        return Err(self.located(Error::Range(format!(
                            "group index {index} out of range for '{name}' of size {size}"
                        ))));
                    }
                    name = group_member_name(&name, index as usize);
                }
                Ok(name)
            }

            TokenKind::ObjectType | TokenKind::OpenBracket => {
                self.parse_object_declaration(program, None)
            }

            other => Err(self.parse_error(format!(
                "expected an inline object declaration or identifier, got {other}"
            ))),
        }
    }

    // =========================================================================
    // Subgraph definitions and directives
    // =========================================================================

    /// `name '(' expr ',' expr ')' ':' '{' … '}'` with `name` on `current`.
    /// The body is captured verbatim, not parsed.
    ///
    /// The capture scans raw bytes from just past the opening newline,
    /// counting brace nesting, until the matching `}`; end of input
    /// inside the body is a subgraph error. The line counter is kept in
    /// sync during the scan so diagnostics after the definition stay
    /// accurate.
    fn parse_subgraph_declaration(&mut self, program: &mut Program) -> Result<()> {
        let name = self.current.lexeme.clone();

        self.expect(TokenKind::OpenParen)?;
        self.next()?;
        let inputs = self.parse_io_arity(program)?;
        self.expect(TokenKind::Comma)?;
        self.next()?;
        let outputs = self.parse_io_arity(program)?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::OpenBrace)?;
        self.expect(TokenKind::Newline)?;

        let start = self.lexer.pos();
        let mut pos = start;
        let mut line = self.lexer.line();
        let mut depth = 0usize;
        let end = loop {
            match self.lexer.source().get(pos) {
                None => {
                    return Err(self.located(Error::Subgraph(
                        "program ended with an incomplete subgraph definition".into(),
                    )))
                }
                Some(b'{') => depth += 1,
                Some(b'}') if depth == 0 => break pos,
                Some(b'}') => depth -= 1,
                Some(b'\n') => line += 1,
                Some(_) => {}
            }
            pos += 1;
        };

        let source = String::from_utf8_lossy(&self.lexer.source()[start..end]).into_owned();
        self.lexer.set_pos(end);
        self.lexer.set_line(line);
        self.expect(TokenKind::CloseBrace)?;

        log::debug!("captured subgraph '{name}' ({inputs} in, {outputs} out)");
        program.add_subgraph(
            &name,
            SubgraphDefinition {
                source,
                inputs,
                outputs,
            },
        );
        Ok(())
    }

    /// One io-arity slot of a subgraph header: a number expression,
    /// floored and clamped at zero.
    fn parse_io_arity(&mut self, program: &mut Program) -> Result<usize> {
        let value = self.parse_expression(program)?;
        let value = value.number().map_err(|e| self.located(e))?.re();
        Ok(value.floor().max(0.0) as usize)
    }

    /// `'&' Identifier [ expr { ',' expr } ]` - invoke a host directive.
    fn parse_directive(&mut self, program: &mut Program) -> Result<()> {
        self.expect(TokenKind::Ampersand)?;
        self.expect(TokenKind::Identifier)?;
        let name = self.current.lexeme.clone();

        let mut args = Vec::new();
        if !self.lexer.peek(TokenKind::Newline) && !self.lexer.peek(TokenKind::Eof) {
            self.next()?;
            args.push(self.parse_expression(program)?);
            while self.lexer.peek(TokenKind::Comma) {
                self.expect(TokenKind::Comma)?;
                self.next()?;
                args.push(self.parse_expression(program)?);
            }
        }
        program
            .invoke_directive(&name, &args)
            .map_err(|e| self.located(e))
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    /// Advance to the next token.
    ///
    /// An `Invalid` token surfaces here as a located `Lex` error; the
    /// lexer itself never reports, it only marks.
    fn next(&mut self) -> Result<&Token> {
        let token = self.lexer.next_token();
        if token.kind == TokenKind::Invalid {
            return Err(Error::Lex(format!(
                "Line {}: unrecognised token: {}",
                token.line, token.lexeme
            )));
        }
        self.current = token;
        Ok(&self.current)
    }

    /// Advance, then require the new token to have `kind`.
    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        self.next()?;
        self.verify(kind)
    }

    /// Require `current` to have `kind`, without advancing.
    fn verify(&self, kind: TokenKind) -> Result<()> {
        if self.current.kind != kind {
            return Err(
                self.parse_error(format!("got {}, expected {kind}", self.current.kind))
            );
        }
        Ok(())
    }

    /// True when `current` terminates a statement.
    fn line_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof)
    }

    /// True if the next token could open an inline arithmetic object.
    fn peek_inline_operator(&mut self) -> bool {
        self.lexer.peek(TokenKind::Plus)
            || self.lexer.peek(TokenKind::Minus)
            || self.lexer.peek(TokenKind::Asterisk)
            || self.lexer.peek(TokenKind::Slash)
            || self.lexer.peek(TokenKind::Caret)
    }

    /// The next `Unnamed Object N` name; the counter is per parser, and
    /// nested subgraph parsers count from zero in their own namespace.
    fn fresh_inline_name(&mut self) -> String {
        let name = format!("Unnamed Object {}", self.inline_index);
        self.inline_index += 1;
        name
    }

    /// Look a symbol up through the lexical overlay first, then the
    /// program table.
    fn lookup_symbol(&self, program: &Program, name: &str) -> Option<TypedValue> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value.clone())
            .or_else(|| program.get_symbol_value(name))
    }

    /// A `Parse` error carrying the current source line.
    fn parse_error(&self, message: impl AsRef<str>) -> Error {
        Error::Parse(format!("Line {}: {}", self.lexer.line(), message.as_ref()))
    }

    /// Prefix the current source line onto an error raised below the
    /// parser, keeping its kind.
    fn located(&self, error: Error) -> Error {
        error.with_message(format!("Line {}: {}", self.lexer.line(), error.message()))
    }
}
