//! Abstract syntax tree for scripts and modules.

use std::rc::Rc;

use super::value::JsString;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    /// Module specifiers requested by static `import` / `export ... from`
    /// declarations, deduplicated, in source order.
    pub fn requested_modules(&self) -> Vec<JsString> {
        let mut specifiers: Vec<JsString> = Vec::new();
        for stmt in &self.body {
            let specifier = match stmt {
                Stmt::Import(import) => Some(&import.source),
                Stmt::Export(ExportDecl::From { source, .. }) => Some(source),
                _ => None,
            };
            if let Some(s) = specifier
                && !specifiers.contains(s)
            {
                specifiers.push(s.clone());
            }
        }
        specifiers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Declaration {
        kind: VarKind,
        declarations: Vec<(JsString, Option<Expr>)>,
    },
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    Throw(Expr),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Try {
        block: Vec<Stmt>,
        param: Option<JsString>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Import(ImportDecl),
    Export(ExportDecl),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub source: JsString,
    pub default: Option<JsString>,
    pub namespace: Option<JsString>,
    /// `(imported, local)` pairs.
    pub named: Vec<(JsString, JsString)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    /// `export const x = ...` / `export function f() {}`
    Declaration(Box<Stmt>),
    /// `export default <expr>`
    Default(Expr),
    /// `export { local as exported }`
    Named(Vec<(JsString, JsString)>),
    /// `export { a as b } from "m"` and `export * from "m"` (empty list).
    From {
        source: JsString,
        names: Vec<(JsString, JsString)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<JsString>,
    pub params: Vec<JsString>,
    pub body: FunctionBody,
    pub arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    Typeof,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Instanceof,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    Ident(JsString),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    BigInt(i128),
    String(JsString),
    Boolean(bool),
    Null,
    This,
    Ident(JsString),
    Array(Vec<Expr>),
    Object(Vec<(PropertyName, Expr)>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Member(Box<Expr>, JsString),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    ImportCall(Box<Expr>),
    ImportMeta,
}
