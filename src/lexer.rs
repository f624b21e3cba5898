//! Rachet Lexer - brace-delimited, Rust-flavoured tokens
//!
//! Keywords and multi-character operators are declared as exact tokens so they
//! always win over the identifier pattern and over their shorter prefixes
//! (`==` over `=`, `::` over `:`). String literals keep their escapes raw;
//! the code generator translates them when it lays out the bytes.

use logos::Logos;
use std::fmt;

use crate::ast::CrateTarget;
use crate::error::{RachetError, RachetResult};
use crate::span::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // === Keywords ===
    #[token("use")]
    Use,
    #[token("crate")]
    Crate,
    #[token("fn")]
    Fn,
    #[token("main")]
    Main,
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("match")]
    Match,
    #[token("not")]
    Not,
    #[token("input")]
    Input,
    #[token("os")]
    Os,

    #[token("iso", |_| CrateTarget::Iso)]
    #[token("bin", |_| CrateTarget::Bin)]
    CrateName(CrateTarget),

    // === Literals ===
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    Number(i32),

    /// Raw text between the quotes, escapes untouched
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("=")]
    Eq,

    // === Punctuation ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token("=>")]
    FatArrow,

    #[regex(r"//[^\n]*", priority = 3)]
    Comment,

    Eof,
}

impl TokenKind {
    /// Short human-readable name used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Use => "`use`".into(),
            TokenKind::Crate => "`crate`".into(),
            TokenKind::Fn => "`fn`".into(),
            TokenKind::Main => "`main`".into(),
            TokenKind::Let => "`let`".into(),
            TokenKind::If => "`if`".into(),
            TokenKind::Else => "`else`".into(),
            TokenKind::Match => "`match`".into(),
            TokenKind::Not => "`not`".into(),
            TokenKind::Input => "`input`".into(),
            TokenKind::Os => "`os`".into(),
            TokenKind::CrateName(target) => format!("crate name `{}`", target),
            TokenKind::Number(n) => format!("number `{}`", n),
            TokenKind::Str(s) => format!("string \"{}\"", s),
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::Plus => "`+`".into(),
            TokenKind::Minus => "`-`".into(),
            TokenKind::Star => "`*`".into(),
            TokenKind::Slash => "`/`".into(),
            TokenKind::EqEq => "`==`".into(),
            TokenKind::NotEq => "`!=`".into(),
            TokenKind::And => "`&&`".into(),
            TokenKind::Or => "`||`".into(),
            TokenKind::Eq => "`=`".into(),
            TokenKind::LParen => "`(`".into(),
            TokenKind::RParen => "`)`".into(),
            TokenKind::LBrace => "`{`".into(),
            TokenKind::RBrace => "`}`".into(),
            TokenKind::Semi => "`;`".into(),
            TokenKind::Comma => "`,`".into(),
            TokenKind::ColonColon => "`::`".into(),
            TokenKind::Colon => "`:`".into(),
            TokenKind::FatArrow => "`=>`".into(),
            TokenKind::Comment => "comment".into(),
            TokenKind::Eof => "end of input".into(),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact lexeme; string literals keep their quotes
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// Lex the whole source into a token vector terminated by `Eof`.
    pub fn tokenize(&self) -> RachetResult<Vec<Token>> {
        let mut lex = TokenKind::lexer(self.source);
        let mut tokens = Vec::new();

        while let Some(result) = lex.next() {
            let span = Span::new(lex.span().start, lex.span().end);
            match result {
                Ok(TokenKind::Comment) => continue,
                Ok(kind) => tokens.push(Token::new(kind, lex.slice(), span)),
                Err(()) => return Err(self.error_at(span)),
            }
        }

        let end = self.source.len();
        tokens.push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
        Ok(tokens)
    }

    fn error_at(&self, span: Span) -> RachetError {
        let slice = &self.source[span.start..span.end];
        let ch = self.source[span.start..].chars().next().unwrap_or('\0');
        let message = if ch.is_ascii_digit() {
            format!("number literal `{}` does not fit in 32 bits", slice)
        } else if ch == '"' {
            "unterminated string literal".to_string()
        } else {
            format!("unexpected character '{}'", ch)
        };
        RachetError::lexer(message, ch, Span::new(span.start, span.start + ch.len_utf8()))
    }
}

/// Convenience wrapper around [`Lexer::tokenize`].
pub fn tokenize(source: &str) -> RachetResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}
