//! Rachet AST
//!
//! The tree is strictly owned top-down: a `Program` owns its items, items own
//! their blocks, blocks own statements. Nothing points back up.

use serde::Serialize;
use std::fmt;

use crate::span::Span;

/// Output artifact requested by `use crate::<target>;`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrateTarget {
    /// Flat kernel image
    #[default]
    Bin,
    /// GRUB bootable ISO
    Iso,
}

impl CrateTarget {
    pub fn extension(self) -> &'static str {
        match self {
            CrateTarget::Bin => "bin",
            CrateTarget::Iso => "iso",
        }
    }
}

impl fmt::Display for CrateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub items: Vec<Item>,
    pub span: Span,
}

impl Program {
    /// The declared crate target, `bin` when no `use` statement is present
    pub fn target(&self) -> CrateTarget {
        self.items
            .iter()
            .find_map(|item| match item {
                Item::Use(u) => Some(u.target),
                Item::Function(_) => None,
            })
            .unwrap_or_default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            Item::Use(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum Item {
    Use(UseStatement),
    Function(FunctionDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseStatement {
    pub target: CrateTarget,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    /// Never checked; `str`/`String` only make `print` treat the slot as text
    pub ty: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<String>,
        value: Expr,
        span: Span,
    },
    If(IfStmt),
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        span: Span,
    },
    Call(Call),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. } | Stmt::Match { span, .. } => *span,
            Stmt::If(stmt) => stmt.span,
            Stmt::Call(call) => call.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Block,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum ElseBranch {
    Else(Block),
    ElseIf(Box<IfStmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchArm {
    /// Raw literal text, escapes untouched
    pub pattern: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum Expr {
    Number {
        value: i32,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call(Call),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::Str { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. } => *span,
            Expr::Call(call) => call.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Argument>,
    pub span: Span,
}

/// Call arguments are limited to literals and bare identifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum Argument {
    Number { value: i32, span: Span },
    Str { value: String, span: Span },
    Ident { name: String, span: Span },
}

impl Argument {
    pub fn span(&self) -> Span {
        match self {
            Argument::Number { span, .. } | Argument::Str { span, .. } | Argument::Ident { span, .. } => {
                *span
            }
        }
    }
}
