//! volsung-lex - Lexical analysis for the Volsung source language.
//!
//! The lexer turns a byte stream into [`Token`]s on demand. It is
//! deliberately byte-oriented: the grammar is ASCII, and anything outside
//! it surfaces as an [`TokenKind::Invalid`] token for the parser to report.
//!
//! Two properties matter to the parser and are part of this crate's
//! contract:
//!
//! - **Non-destructive peeking.** [`Lexer::peek`] lexes one token ahead and
//!   restores both the byte position and the line counter.
//! - **Rewindable position.** The parser re-reads argument expressions
//!   during group expansion and captures subgraph bodies verbatim, so the
//!   cursor position and line are exposed and settable.
//!
//! Numeric literals are plain digit runs; fractional numbers and the
//! `s` / `ms` duration suffixes are assembled by the parser from adjacent
//! tokens.

mod token;

pub use token::{Token, TokenKind};

/// On-demand scanner over a source string.
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    line: usize,
}

impl<'src> Lexer<'src> {
    /// A lexer positioned at the start of `source`.
    ///
    /// # Example
    ///
    /// ```
    /// use volsung_lex::{Lexer, TokenKind};
    ///
    /// let mut lexer = Lexer::new("osc~ 440 -> output");
    /// assert_eq!(lexer.next_token().kind, TokenKind::ObjectType);
    /// assert_eq!(lexer.next_token().kind, TokenKind::NumericLiteral);
    /// assert_eq!(lexer.next_token().kind, TokenKind::Arrow);
    /// assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
    /// assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    /// ```
    pub fn new(source: &'src str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Current byte offset (the next unread byte).
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Current 1-based line number.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Rewind or advance the cursor. The caller is responsible for keeping
    /// the line counter consistent via [`set_line`](Self::set_line).
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    /// The raw source bytes, for verbatim slicing of subgraph bodies.
    pub fn source(&self) -> &'src [u8] {
        self.src
    }

    /// The byte at the cursor, if any.
    pub fn current_byte(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    /// Scan the next token, consuming it.
    ///
    /// Whitespace and `;` comments are skipped first; then the token is
    /// decided by its first byte, with two-byte operators taking the
    /// longest match. Unrecognised input becomes an `Invalid` token
    /// rather than an error; the parser reports it with line context
    /// when it tries to consume one.
    pub fn next_token(&mut self) -> Token {
        self.skip_insignificant();

        let line = self.line;
        let byte = match self.current_byte() {
            Some(byte) => byte,
            None => return Token::new(TokenKind::Eof, "", line),
        };

        match byte {
            b'\n' => {
                self.pos += 1;
                self.line += 1;
                Token::new(TokenKind::Newline, "", line)
            }
            b'-' => self.one_or_two(TokenKind::Minus, b'>', TokenKind::Arrow, line),
            b'>' => self.one_or_two(TokenKind::GreaterThan, b'>', TokenKind::ManyToOne, line),
            b'<' => self.one_or_two(TokenKind::LessThan, b'>', TokenKind::OneToMany, line),
            b'.' => self.one_or_two(TokenKind::Dot, b'.', TokenKind::Elipsis, line),
            b'=' => {
                self.pos += 1;
                if self.current_byte() == Some(b'>') {
                    self.pos += 1;
                    Token::new(TokenKind::Parallel, "", line)
                } else {
                    Token::new(TokenKind::Invalid, "=", line)
                }
            }
            b'{' => self.single(TokenKind::OpenBrace, line),
            b'}' => self.single(TokenKind::CloseBrace, line),
            b'(' => self.single(TokenKind::OpenParen, line),
            b')' => self.single(TokenKind::CloseParen, line),
            b'[' => self.single(TokenKind::OpenBracket, line),
            b']' => self.single(TokenKind::CloseBracket, line),
            b':' => self.single(TokenKind::Colon, line),
            b',' => self.single(TokenKind::Comma, line),
            b'&' => self.single(TokenKind::Ampersand, line),
            b'*' => self.single(TokenKind::Asterisk, line),
            b'+' => self.single(TokenKind::Plus, line),
            b'/' => self.single(TokenKind::Slash, line),
            b'^' => self.single(TokenKind::Caret, line),
            b'|' => self.single(TokenKind::VerticalBar, line),
            b'"' => self.scan_string(line),
            b'0'..=b'9' => self.scan_number(line),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(line),
            other => {
                self.pos += 1;
                Token::new(TokenKind::Invalid, (other as char).to_string(), line)
            }
        }
    }

    /// Check whether the next token has the given kind, without consuming
    /// anything. Position and line are restored afterwards.
    pub fn peek(&mut self, kind: TokenKind) -> bool {
        let (pos, line) = (self.pos, self.line);
        let matches = self.next_token().kind == kind;
        self.pos = pos;
        self.line = line;
        matches
    }

    /// True if the next token can begin an expression.
    pub fn peek_expression(&mut self) -> bool {
        self.peek(TokenKind::NumericLiteral)
            || self.peek(TokenKind::Minus)
            || self.peek(TokenKind::StringLiteral)
            || self.peek(TokenKind::OpenBrace)
            || self.peek(TokenKind::OpenParen)
            || self.peek(TokenKind::Identifier)
    }

    /// True if the next token can continue a connection chain.
    pub fn peek_connection(&mut self) -> bool {
        self.peek(TokenKind::VerticalBar)
            || self.peek(TokenKind::Arrow)
            || self.peek(TokenKind::Newline)
            || self.peek(TokenKind::ManyToOne)
            || self.peek(TokenKind::OneToMany)
            || self.peek(TokenKind::Parallel)
            || self.peek(TokenKind::CrossConnection)
            || self.peek(TokenKind::OpenBracket)
    }

    /// True if the next token is a connection operator proper.
    pub fn peek_connection_operator(&mut self) -> bool {
        self.peek(TokenKind::Arrow)
            || self.peek(TokenKind::ManyToOne)
            || self.peek(TokenKind::OneToMany)
            || self.peek(TokenKind::Parallel)
            || self.peek(TokenKind::CrossConnection)
    }

    /// Advance past spaces, tabs, and `;` comments. Newlines are
    /// significant and stay put.
    fn skip_insignificant(&mut self) {
        loop {
            match self.current_byte() {
                Some(b' ') | Some(b'\t') => self.pos += 1,
                Some(b';') => {
                    while !matches!(self.current_byte(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn single(&mut self, kind: TokenKind, line: usize) -> Token {
        self.pos += 1;
        Token::new(kind, "", line)
    }

    fn one_or_two(&mut self, short: TokenKind, next: u8, long: TokenKind, line: usize) -> Token {
        self.pos += 1;
        if self.current_byte() == Some(next) {
            self.pos += 1;
            Token::new(long, "", line)
        } else {
            Token::new(short, "", line)
        }
    }

    /// `"…"` with no escapes; an unterminated literal is `Invalid`.
    fn scan_string(&mut self, line: usize) -> Token {
        self.pos += 1;
        let start = self.pos;
        while let Some(byte) = self.current_byte() {
            if byte == b'"' {
                let lexeme = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                self.pos += 1;
                return Token::new(TokenKind::StringLiteral, lexeme, line);
            }
            if byte == b'\n' {
                break;
            }
            self.pos += 1;
        }
        Token::new(TokenKind::Invalid, "unterminated string", line)
    }

    /// A run of decimal digits. Fractions and duration suffixes are the
    /// parser's business.
    fn scan_number(&mut self, line: usize) -> Token {
        let start = self.pos;
        while matches!(self.current_byte(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let lexeme = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        Token::new(TokenKind::NumericLiteral, lexeme, line)
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`, then the two suffix rules: an adjacent
    /// `>` after a bare `x` makes the cross-connection operator, and an
    /// adjacent `~` turns the identifier into an object type.
    fn scan_identifier(&mut self, line: usize) -> Token {
        let start = self.pos;
        while matches!(
            self.current_byte(),
            Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_')
        ) {
            self.pos += 1;
        }
        let lexeme = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();

        // `x>` is the cross-connection operator whenever the `>` is adjacent.
        if lexeme == "x" && self.current_byte() == Some(b'>') {
            self.pos += 1;
            return Token::new(TokenKind::CrossConnection, "", line);
        }

        if self.current_byte() == Some(b'~') {
            self.pos += 1;
            return Token::new(TokenKind::ObjectType, lexeme, line);
        }

        Token::new(TokenKind::Identifier, lexeme, line)
    }
}
