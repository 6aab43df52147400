//! Lexer for script and module source text.
//!
//! Converts source text into a stream of tokens.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::value::JsString;

/// Source span information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A lexing or parsing failure, reported to scripts as a `SyntaxError`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    BigInt(i128),
    String(JsString),
    Identifier(JsString),

    // Keywords
    Const,
    Let,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    Throw,
    Try,
    Catch,
    Finally,
    New,
    Typeof,
    Void,
    Instanceof,
    In,
    This,
    Null,
    True,
    False,
    Import,
    Export,
    Default,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Colon,
    Question,
    QuestionQuestion,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    AmpAmp,
    PipePipe,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator appeared between this token and the previous one.
    pub newline_before: bool,
}

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    source_len: usize,
    line: u32,
    column: u32,
    saw_newline: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source_len: source.len(),
            line: 1,
            column: 1,
            saw_newline: false,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.source_len, |&(i, _)| i)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span_from(&mut self, start: usize, line: u32, column: u32) -> Span {
        Span {
            start,
            end: self.position(),
            line,
            column,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace_and_comments()?;

        let newline_before = std::mem::take(&mut self.saw_newline);
        let start = self.position();
        let (line, column) = (self.line, self.column);

        let Some(ch) = self.advance() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: self.span_from(start, line, column),
                newline_before,
            });
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number('.')?,
            '.' => TokenKind::Dot,
            '?' if self.eat('?') => TokenKind::QuestionQuestion,
            '?' => TokenKind::Question,
            '+' if self.eat('=') => TokenKind::PlusEq,
            '+' => TokenKind::Plus,
            '-' if self.eat('=') => TokenKind::MinusEq,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarEq,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashEq,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' if self.eat('=') => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            '=' if self.eat('>') => TokenKind::Arrow,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::EqEqEq
                } else {
                    TokenKind::EqEq
                }
            }
            '=' => TokenKind::Eq,
            '!' if self.eat('=') => {
                if self.eat('=') {
                    TokenKind::NotEqEq
                } else {
                    TokenKind::NotEq
                }
            }
            '!' => TokenKind::Bang,
            '&' if self.eat('&') => TokenKind::AmpAmp,
            '|' if self.eat('|') => TokenKind::PipePipe,
            '"' | '\'' => self.read_string(ch, line, column)?,
            c if c.is_ascii_digit() => self.read_number(c)?,
            c if is_identifier_start(c) => self.read_identifier(c),
            c => {
                return Err(SyntaxError::new(
                    format!("Unexpected character '{}'", c),
                    self.span_from(start, line, column),
                ));
            }
        };

        Ok(Token {
            kind,
            span: self.span_from(start, line, column),
            newline_before,
        })
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some('\n' | '\u{2028}' | '\u{2029}') => {
                    self.saw_newline = true;
                    self.advance();
                }
                Some(c) if c.is_whitespace() || c == '\u{FEFF}' => {
                    self.advance();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek().map(|&(_, c)| c) {
                        Some('/') => {
                            while self.peek().is_some_and(|c| c != '\n') {
                                self.advance();
                            }
                        }
                        Some('*') => {
                            let (line, column) = (self.line, self.column);
                            let start = self.position();
                            self.advance();
                            self.advance();
                            loop {
                                match self.advance() {
                                    Some('*') if self.eat('/') => break,
                                    Some('\n') => self.saw_newline = true,
                                    Some(_) => {}
                                    None => {
                                        return Err(SyntaxError::new(
                                            "Unterminated comment",
                                            self.span_from(start, line, column),
                                        ));
                                    }
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self, quote: char, line: u32, column: u32) -> Result<TokenKind, SyntaxError> {
        let mut value = String::new();
        loop {
            let Some(ch) = self.advance() else {
                let span = Span {
                    start: 0,
                    end: 0,
                    line,
                    column,
                };
                return Err(SyntaxError::new("Unterminated string literal", span));
            };
            match ch {
                c if c == quote => break,
                '\\' => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some('b') => value.push('\u{0008}'),
                    Some('f') => value.push('\u{000C}'),
                    Some('v') => value.push('\u{000B}'),
                    Some('u') => value.push(self.read_unicode_escape(line, column)?),
                    Some('\n') => {}
                    Some(c) => value.push(c),
                    None => {}
                },
                c => value.push(c),
            }
        }
        Ok(TokenKind::String(JsString::from(value)))
    }

    fn read_unicode_escape(&mut self, line: u32, column: u32) -> Result<char, SyntaxError> {
        let span = Span {
            start: 0,
            end: 0,
            line,
            column,
        };
        let mut digits = String::new();
        if self.eat('{') {
            while let Some(c) = self.advance() {
                if c == '}' {
                    break;
                }
                digits.push(c);
            }
        } else {
            for _ in 0..4 {
                if let Some(c) = self.advance() {
                    digits.push(c);
                }
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| SyntaxError::new("Invalid Unicode escape sequence", span))
    }

    fn read_number(&mut self, first: char) -> Result<TokenKind, SyntaxError> {
        let mut text = String::new();
        text.push(first);

        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let mut hex = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit() || *c == '_') {
                self.advance();
                if c != '_' {
                    hex.push(c);
                }
            }
            let value = i128::from_str_radix(&hex, 16).unwrap_or(0);
            if self.eat('n') {
                return Ok(TokenKind::BigInt(value));
            }
            return Ok(TokenKind::Number(value as f64));
        }

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '.' => text.push(c),
                '_' => {}
                'e' | 'E' => {
                    text.push(c);
                    self.advance();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.advance();
                    }
                    continue;
                }
                _ => break,
            }
            self.advance();
        }

        if self.eat('n') {
            return Ok(TokenKind::BigInt(text.parse::<i128>().unwrap_or(0)));
        }
        Ok(TokenKind::Number(text.parse::<f64>().unwrap_or(f64::NAN)))
    }

    fn read_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::new();
        name.push(first);
        while let Some(c) = self.peek().filter(|&c| is_identifier_part(c)) {
            name.push(c);
            self.advance();
        }
        match name.as_str() {
            "const" => TokenKind::Const,
            "let" => TokenKind::Let,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "throw" => TokenKind::Throw,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "new" => TokenKind::New,
            "typeof" => TokenKind::Typeof,
            "void" => TokenKind::Void,
            "instanceof" => TokenKind::Instanceof,
            "in" => TokenKind::In,
            "this" => TokenKind::This,
            "null" => TokenKind::Null,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "default" => TokenKind::Default,
            _ => TokenKind::Identifier(JsString::from(name)),
        }
    }
}

/// Whether `text` is exactly one identifier that is not a reserved word.
pub fn is_identifier(text: &str) -> bool {
    match Lexer::new(text).tokenize() {
        Ok(tokens) => matches!(
            tokens.as_slice(),
            [Token { kind: TokenKind::Identifier(_), .. }, Token { kind: TokenKind::Eof, .. }]
        ),
        Err(_) => false,
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
