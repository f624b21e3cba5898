//! Error types for the Rachet compiler

use crate::span::Span;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RachetError {
    #[error("Lexer error at byte {offset}: {message}")]
    Lexer {
        message: String,
        ch: char,
        offset: usize,
        span: Span,
    },

    #[error("Syntax error at {span}: expected {expected}, found {found}")]
    Syntax {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Undefined variable `{name}` at {span}")]
    UndefinedVariable { name: String, span: Span },

    #[error("Codegen error at {span}: {message}")]
    Codegen { message: String, span: Span },

    #[error("Toolchain error ({tool}): {message}")]
    Toolchain { tool: String, message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RachetError {
    /// Unrecognized input at `offset`; `ch` is the first offending character.
    pub fn lexer(message: impl Into<String>, ch: char, span: Span) -> Self {
        RachetError::Lexer {
            message: message.into(),
            ch,
            offset: span.start,
            span,
        }
    }

    pub fn syntax(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        RachetError::Syntax {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        RachetError::UndefinedVariable {
            name: name.into(),
            span,
        }
    }

    pub fn codegen(message: impl Into<String>, span: Span) -> Self {
        RachetError::Codegen {
            message: message.into(),
            span,
        }
    }

    pub fn toolchain(tool: impl Into<String>, message: impl Into<String>) -> Self {
        RachetError::Toolchain {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        RachetError::Config {
            message: message.into(),
        }
    }

    /// Source location, when the error points into the compiled file
    pub fn span(&self) -> Option<Span> {
        match self {
            RachetError::Lexer { span, .. }
            | RachetError::Syntax { span, .. }
            | RachetError::UndefinedVariable { span, .. }
            | RachetError::Codegen { span, .. } => Some(*span),
            RachetError::Toolchain { .. } | RachetError::Config { .. } | RachetError::Io(_) => None,
        }
    }
}

/// Result type for Rachet operations
pub type RachetResult<T> = Result<T, RachetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A user-function call argument that could not be lowered
    UnsupportedConstruct,
}

/// Recoverable problem found during code generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub span: Span,
}

impl Warning {
    pub fn unsupported(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: WarningKind::UnsupportedConstruct,
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warning at {}: {}", self.span, self.message)
    }
}
