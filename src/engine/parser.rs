//! Recursive-descent parser producing the AST in `ast`.

use std::rc::Rc;

use super::ast::{
    BinaryOp, ExportDecl, Expr, FunctionBody, FunctionDef, ImportDecl, LogicalOp, Program, PropertyName,
    Stmt, UnaryOp, VarKind,
};
use super::lexer::{Lexer, Span, SyntaxError, Token, TokenKind};
use super::stack;
use super::value::JsString;

pub fn parse_script(source: &str) -> Result<Program, SyntaxError> {
    Parser::new(source, false)?.parse_program()
}

pub fn parse_module(source: &str) -> Result<Program, SyntaxError> {
    Parser::new(source, true)?.parse_program()
}

/// Deepest expression or statement nesting accepted.
const MAX_NESTING: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    module: bool,
    /// Nesting depth of function bodies; `return` is only valid inside one.
    function_depth: usize,
    nesting: usize,
    stack_base: usize,
}

type ParseResult<T> = Result<T, SyntaxError>;

impl Parser {
    pub fn new(source: &str, module: bool) -> ParseResult<Self> {
        Ok(Self {
            tokens: Lexer::new(source).tokenize()?,
            pos: 0,
            module,
            function_depth: 0,
            nesting: 0,
            stack_base: stack::position(),
        })
    }

    /// Run one level of recursive descent, bounded in depth and stack use.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.nesting >= MAX_NESTING || stack::used_since(self.stack_base) > stack::PARSE_STACK_BUDGET {
            return Err(SyntaxError::new("Expression nested too deeply", self.span()));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement(true)?);
        }
        Ok(Program { body })
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).or_else(|| self.tokens.last())
    }

    fn span(&self) -> Span {
        self.current().map(|t| t.span).unwrap_or_default()
    }

    fn newline_before(&self) -> bool {
        self.current().is_some_and(|t| t.newline_before)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let found = match self.peek() {
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        SyntaxError::new(format!("Unexpected {}, expected {}", found, expected), self.span())
    }

    fn expect_identifier(&mut self) -> ParseResult<JsString> {
        match self.advance() {
            TokenKind::Identifier(name) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("identifier"))
            }
        }
    }

    /// Identifier names after `.` and in object keys may be reserved words.
    fn expect_identifier_name(&mut self) -> ParseResult<JsString> {
        let name = keyword_text(self.peek()).map(JsString::from);
        if let Some(name) = name {
            self.advance();
            return Ok(name);
        }
        self.expect_identifier()
    }

    fn expect_string(&mut self) -> ParseResult<JsString> {
        match self.advance() {
            TokenKind::String(s) => Ok(s),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("string literal"))
            }
        }
    }

    fn consume_semicolon(&mut self) -> ParseResult<()> {
        if self.eat(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Eof)
            || self.newline_before()
        {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self, top_level: bool) -> ParseResult<Stmt> {
        self.nested(|p| p.parse_statement_kind(top_level))
    }

    fn parse_statement_kind(&mut self, top_level: bool) -> ParseResult<Stmt> {
        match self.peek() {
            TokenKind::LBrace => {
                self.advance();
                Ok(Stmt::Block(self.parse_block_body()?))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::Const | TokenKind::Let | TokenKind::Var => self.parse_declaration(),
            TokenKind::Function => {
                self.advance();
                let name = self.expect_identifier()?;
                let def = self.parse_function_rest(Some(name))?;
                Ok(Stmt::Function(def))
            }
            TokenKind::Return => {
                if self.function_depth == 0 {
                    return Err(SyntaxError::new("Illegal return statement", self.span()));
                }
                self.advance();
                let value = if self.check(&TokenKind::Semicolon)
                    || self.check(&TokenKind::RBrace)
                    || self.check(&TokenKind::Eof)
                    || self.newline_before()
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LParen, "'('")?;
                let test = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.parse_statement(false)?);
                Ok(Stmt::While { test, body })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Import if !matches!(self.peek_at(1), TokenKind::LParen | TokenKind::Dot) => {
                if !self.module {
                    return Err(SyntaxError::new("Cannot use import statement outside a module", self.span()));
                }
                if !top_level {
                    return Err(SyntaxError::new("import declarations may only appear at top level", self.span()));
                }
                self.parse_import()
            }
            TokenKind::Export => {
                if !self.module {
                    return Err(SyntaxError::new("Unexpected token 'export'", self.span()));
                }
                if !top_level {
                    return Err(SyntaxError::new("export declarations may only appear at top level", self.span()));
                }
                self.parse_export()
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_block_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement(false)?);
        }
        Ok(body)
    }

    fn parse_declaration(&mut self) -> ParseResult<Stmt> {
        let kind = match self.advance() {
            TokenKind::Const => VarKind::Const,
            TokenKind::Let => VarKind::Let,
            _ => VarKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                if kind == VarKind::Const {
                    return Err(SyntaxError::new("Missing initializer in const declaration", self.span()));
                }
                None
            };
            declarations.push((name, init));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume_semicolon()?;
        Ok(Stmt::Declaration { kind, declarations })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let consequent = Box::new(self.parse_statement(false)?);
        let alternate = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement(false)?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_try(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect(&TokenKind::LBrace, "'{'")?;
        let block = self.parse_block_body()?;
        let mut param = None;
        let mut handler = None;
        if self.eat(&TokenKind::Catch) {
            if self.eat(&TokenKind::LParen) {
                param = Some(self.expect_identifier()?);
                self.expect(&TokenKind::RParen, "')'")?;
            }
            self.expect(&TokenKind::LBrace, "'{'")?;
            handler = Some(self.parse_block_body()?);
        }
        let finalizer = if self.eat(&TokenKind::Finally) {
            self.expect(&TokenKind::LBrace, "'{'")?;
            Some(self.parse_block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(SyntaxError::new("Missing catch or finally after try", self.span()));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn parse_import(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let mut decl = ImportDecl {
            source: JsString::from(""),
            default: None,
            namespace: None,
            named: Vec::new(),
        };

        if let TokenKind::String(source) = self.peek().clone() {
            self.advance();
            decl.source = source;
            self.consume_semicolon()?;
            return Ok(Stmt::Import(decl));
        }

        if let TokenKind::Identifier(name) = self.peek().clone() {
            self.advance();
            decl.default = Some(name);
            if !self.eat(&TokenKind::Comma) {
                return self.finish_import(decl);
            }
        }

        if self.eat(&TokenKind::Star) {
            self.expect_contextual("as")?;
            decl.namespace = Some(self.expect_identifier()?);
        } else if self.eat(&TokenKind::LBrace) {
            decl.named = self.parse_specifier_list()?;
        } else {
            return Err(self.unexpected("import specifier"));
        }
        self.finish_import(decl)
    }

    fn finish_import(&mut self, mut decl: ImportDecl) -> ParseResult<Stmt> {
        self.expect_contextual("from")?;
        decl.source = self.expect_string()?;
        self.consume_semicolon()?;
        Ok(Stmt::Import(decl))
    }

    fn expect_contextual(&mut self, word: &str) -> ParseResult<()> {
        match self.peek() {
            TokenKind::Identifier(name) if name.as_str() == word => {
                self.advance();
                Ok(())
            }
            _ => Err(self.unexpected(&format!("'{}'", word))),
        }
    }

    fn is_contextual(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Identifier(name) if name.as_str() == word)
    }

    /// `{ a, b as c }` after the opening brace. Returns `(first, second)`
    /// name pairs where `second` is the alias (or the same name).
    fn parse_specifier_list(&mut self) -> ParseResult<Vec<(JsString, JsString)>> {
        let mut names = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let name = self.expect_identifier_name()?;
            let alias = if self.is_contextual("as") {
                self.advance();
                self.expect_identifier_name()?
            } else {
                name.clone()
            };
            names.push((name, alias));
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "'}'")?;
                break;
            }
        }
        Ok(names)
    }

    fn parse_export(&mut self) -> ParseResult<Stmt> {
        self.advance();
        match self.peek() {
            TokenKind::Default => {
                self.advance();
                let expr = if self.check(&TokenKind::Function) {
                    self.advance();
                    let name = match self.peek().clone() {
                        TokenKind::Identifier(name) => {
                            self.advance();
                            Some(name)
                        }
                        _ => None,
                    };
                    Expr::Function(self.parse_function_rest(name)?)
                } else {
                    let expr = self.parse_assignment()?;
                    self.consume_semicolon()?;
                    expr
                };
                Ok(Stmt::Export(ExportDecl::Default(expr)))
            }
            TokenKind::Const | TokenKind::Let | TokenKind::Var | TokenKind::Function => {
                let stmt = self.parse_statement(false)?;
                Ok(Stmt::Export(ExportDecl::Declaration(Box::new(stmt))))
            }
            TokenKind::Star => {
                self.advance();
                self.expect_contextual("from")?;
                let source = self.expect_string()?;
                self.consume_semicolon()?;
                Ok(Stmt::Export(ExportDecl::From {
                    source,
                    names: Vec::new(),
                }))
            }
            TokenKind::LBrace => {
                self.advance();
                let names = self.parse_specifier_list()?;
                if self.is_contextual("from") {
                    self.advance();
                    let source = self.expect_string()?;
                    self.consume_semicolon()?;
                    return Ok(Stmt::Export(ExportDecl::From { source, names }));
                }
                self.consume_semicolon()?;
                Ok(Stmt::Export(ExportDecl::Named(names)))
            }
            _ => Err(self.unexpected("export declaration")),
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Parameter list and body after `function [name]`.
    fn parse_function_rest(&mut self, name: Option<JsString>) -> ParseResult<Rc<FunctionDef>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.function_depth += 1;
        let body = self.parse_block_body();
        self.function_depth -= 1;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body?),
            arrow: false,
        }))
    }

    /// Parameters after the opening parenthesis, through the closing one.
    fn parse_params(&mut self) -> ParseResult<Vec<JsString>> {
        let mut params = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            params.push(self.expect_identifier()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_arrow_body(&mut self, params: Vec<JsString>) -> ParseResult<Expr> {
        self.expect(&TokenKind::Arrow, "'=>'")?;
        self.function_depth += 1;
        let body = if self.eat(&TokenKind::LBrace) {
            self.parse_block_body().map(FunctionBody::Block)
        } else {
            self.parse_assignment().map(|e| FunctionBody::Expr(Box::new(e)))
        };
        self.function_depth -= 1;
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body: body?,
            arrow: true,
        })))
    }

    /// Whether the parenthesis at the cursor opens an arrow parameter list.
    fn is_arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(token) = self.tokens.get(i) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::Arrow));
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        self.nested(Self::parse_assignment_expr)
    }

    fn parse_assignment_expr(&mut self) -> ParseResult<Expr> {
        if let TokenKind::Identifier(name) = self.peek().clone()
            && self.peek_at(1) == &TokenKind::Arrow
        {
            self.advance();
            return self.parse_arrow_body(vec![name]);
        }
        if self.check(&TokenKind::LParen) && self.is_arrow_ahead() {
            self.advance();
            let params = self.parse_params()?;
            return self.parse_arrow_body(params);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            TokenKind::StarEq => Some(BinaryOp::Mul),
            TokenKind::SlashEq => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            return Err(SyntaxError::new("Invalid left-hand side in assignment", self.span()));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let test = self.parse_logical_or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(&TokenKind::Colon, "':'")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate)))
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_logical_and()?;
        loop {
            let op = match self.peek() {
                TokenKind::PipePipe => LogicalOp::Or,
                TokenKind::QuestionQuestion => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_binary(0)?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_binary(0)?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Precedence climbing over equality, relational, additive and
    /// multiplicative operators.
    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, precedence)) = binary_operator(self.peek()) else {
                return Ok(left);
            };
            if precedence < min_precedence {
                return Ok(left);
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            _ => return self.parse_call_member(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_call_member(&mut self) -> ParseResult<Expr> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier_name()?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> ParseResult<Expr> {
        self.advance();
        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier_name()?;
                    callee = Expr::Member(Box::new(callee), name);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    callee = Expr::Index(Box::new(callee), Box::new(index));
                }
                _ => break,
            }
        }
        let args = if self.eat(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New(Box::new(callee), args))
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            args.push(self.parse_assignment()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::BigInt(n) => Ok(Expr::BigInt(n)),
            TokenKind::String(s) => Ok(Expr::String(s)),
            TokenKind::True => Ok(Expr::Boolean(true)),
            TokenKind::False => Ok(Expr::Boolean(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::This => Ok(Expr::This),
            TokenKind::Identifier(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                while !self.eat(&TokenKind::RBracket) {
                    elements.push(self.parse_assignment()?);
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::Array(elements))
            }
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                let name = match self.peek().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                Ok(Expr::Function(self.parse_function_rest(name)?))
            }
            TokenKind::Import => {
                if self.eat(&TokenKind::Dot) {
                    self.expect_contextual("meta")?;
                    if !self.module {
                        return Err(SyntaxError::new("Cannot use 'import.meta' outside a module", span));
                    }
                    return Ok(Expr::ImportMeta);
                }
                self.expect(&TokenKind::LParen, "'('")?;
                let specifier = self.parse_assignment()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr::ImportCall(Box::new(specifier)))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expression"))
            }
        }
    }

    fn parse_object_literal(&mut self) -> ParseResult<Expr> {
        let mut properties = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let key = match self.peek().clone() {
                TokenKind::String(s) => {
                    self.advance();
                    PropertyName::Ident(s)
                }
                TokenKind::Number(n) => {
                    self.advance();
                    PropertyName::Ident(JsString::from(super::value::number_to_string(n)))
                }
                TokenKind::LBracket => {
                    self.advance();
                    let expr = self.parse_assignment()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    PropertyName::Computed(Box::new(expr))
                }
                _ => PropertyName::Ident(self.expect_identifier_name()?),
            };

            let value = if self.eat(&TokenKind::Colon) {
                self.parse_assignment()?
            } else if self.check(&TokenKind::LParen) {
                let name = match &key {
                    PropertyName::Ident(n) => Some(n.clone()),
                    PropertyName::Computed(_) => None,
                };
                Expr::Function(self.parse_function_rest(name)?)
            } else {
                match &key {
                    PropertyName::Ident(name) => Expr::Ident(name.clone()),
                    PropertyName::Computed(_) => return Err(self.unexpected("':'")),
                }
            };
            properties.push((key, value));

            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "'}'")?;
                break;
            }
        }
        Ok(Expr::Object(properties))
    }
}

fn binary_operator(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::EqEq => (BinaryOp::Eq, 1),
        TokenKind::NotEq => (BinaryOp::NotEq, 1),
        TokenKind::EqEqEq => (BinaryOp::StrictEq, 1),
        TokenKind::NotEqEq => (BinaryOp::StrictNotEq, 1),
        TokenKind::Lt => (BinaryOp::Lt, 2),
        TokenKind::Gt => (BinaryOp::Gt, 2),
        TokenKind::LtEq => (BinaryOp::LtEq, 2),
        TokenKind::GtEq => (BinaryOp::GtEq, 2),
        TokenKind::Instanceof => (BinaryOp::Instanceof, 2),
        TokenKind::In => (BinaryOp::In, 2),
        TokenKind::Plus => (BinaryOp::Add, 3),
        TokenKind::Minus => (BinaryOp::Sub, 3),
        TokenKind::Star => (BinaryOp::Mul, 4),
        TokenKind::Slash => (BinaryOp::Div, 4),
        TokenKind::Percent => (BinaryOp::Mod, 4),
        _ => return None,
    };
    Some(entry)
}

fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    let text = match kind {
        TokenKind::Const => "const",
        TokenKind::Let => "let",
        TokenKind::Var => "var",
        TokenKind::Function => "function",
        TokenKind::Return => "return",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::While => "while",
        TokenKind::Throw => "throw",
        TokenKind::Try => "try",
        TokenKind::Catch => "catch",
        TokenKind::Finally => "finally",
        TokenKind::New => "new",
        TokenKind::Typeof => "typeof",
        TokenKind::Void => "void",
        TokenKind::Instanceof => "instanceof",
        TokenKind::In => "in",
        TokenKind::This => "this",
        TokenKind::Null => "null",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Import => "import",
        TokenKind::Export => "export",
        TokenKind::Default => "default",
        _ => return None,
    };
    Some(text)
}
