//! # Rachet
//!
//! A tiny brace-delimited language compiled to 32-bit x86 and booted on bare
//! metal. Source goes through a logos lexer, a recursive-descent parser and a
//! single-pass code generator; the result is assembled together with a small
//! multiboot kernel into a flat binary or a GRUB ISO.
//!
//! ## Example
//! ```text
//! use crate::iso;
//!
//! fn main() {
//!     let name = input("name? ");
//!     match name {
//!         "root" => { print("welcome back\n"); }
//!     }
//!     os(shutdown);
//! }
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod linker;
pub mod parser;
pub mod runtime;
pub mod span;

use tracing::debug;

pub use ast::{CrateTarget, Program};
pub use codegen::Generated;
pub use error::{RachetError, RachetResult, Warning};
pub use lexer::Lexer;
pub use parser::Parser;
pub use span::Span;

/// Lex and parse Rachet source
pub fn parse_source(source: &str) -> RachetResult<Program> {
    // 1. Lex
    let tokens = Lexer::new(source).tokenize()?;
    debug!(tokens = tokens.len(), "lexed source");

    // 2. Parse
    let program = Parser::new(&tokens).parse()?;
    debug!(items = program.items.len(), target = %program.target(), "parsed program");
    Ok(program)
}

/// Compile Rachet source to data and text sections
pub fn compile(source: &str) -> RachetResult<Generated> {
    let program = parse_source(source)?;

    // 3. Generate code
    codegen::generate(&program)
}

/// Version of the Rachet compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LANGUAGE_NAME: &str = "Rachet";
