//! Expression Compiler
//!
//! Turns binding expressions such as `user.address['zip']` into compiled
//! [`Accessor`]s that read safely through missing links.
//!
//! # Pipeline
//!
//! 1. `lexer` splits the text into tokens.
//! 2. `ast` builds a syntax tree by recursive descent.
//! 3. `codegen` flattens the tree into a guarded-read [`Program`] (`ir`).
//! 4. `accessor` lowers the program into boxed closures.
//!
//! # Grammar
//!
//! Numbers (with fractions and exponents), single- or double-quoted strings,
//! `null`, `true`, `false`, `this`, `$locals`, identifiers, dotted and
//! bracketed member access, array literals and object literals. There are
//! no operators, calls or assignments, which is what makes every accessor
//! side-effect free.
//!
//! Lex and parse failures are programmer errors in the binding text; they are
//! returned from [`compile`] and never retried.

mod accessor;
mod cache;
pub mod ast;
pub mod codegen;
pub mod ir;
pub mod lexer;

pub use accessor::Accessor;
pub use cache::ExpressionCache;
pub use ir::Program;

use tracing::debug;

use crate::error::CompileError;

/// Compile expression text into an accessor.
pub fn compile(text: &str) -> Result<Accessor, CompileError> {
    let tokens = lexer::tokenize(text)?;
    let ast = ast::parse(tokens)?;
    let accessor = codegen::compile(&ast).with_source(text);
    debug!(
        expression = text,
        temps = accessor.program().temp_count(),
        "compiled expression"
    );
    Ok(accessor)
}
