//! Syntax tree for generated code

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// A node with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Concat,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Eq,
    NotEq,
    BitOr,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// `[a, b]` or `['k' => v]`
    Array(Vec<(Option<Expr>, Expr)>),
    Variable(String),
    This,
    Constant(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Property(Box<Expr>, String),
    MethodCall {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// One statement of a code tag
///
/// Block statements use the alternative syntax (`if (c) :` ... `endif`), so
/// openers and closers are separate statements that may sit in different
/// code tags.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Echo(Vec<Expr>),
    Assign(String, Expr),
    Expr(Expr),
    If(Expr),
    ElseIf(Expr),
    Else,
    EndIf,
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
    },
    EndForeach,
    /// `for (init; condition; step) :` with each clause optional
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Box<Stmt>>,
    },
    EndFor,
    While(Expr),
    EndWhile,
    Continue,
    Break,
}
