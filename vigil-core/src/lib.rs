//! Vigil Core
//!
//! This crate provides the computational core of the Vigil data-binding
//! runtime. It implements:
//!
//! - A compiler for binding expressions (`user.address['zip']`) that
//!   produces safe-navigation accessors
//! - A dirty-checking scheduler that re-evaluates watchers until their
//!   values settle
//!
//! # Architecture
//!
//! - `value`: the dynamic value model shared by both halves, plus the
//!   structural equality and deep copy used by value-based watchers
//! - `expr`: lexer, parser, code generator, compiled accessors and the
//!   expression cache
//! - `scope`: watchers, digest passes and the `eval`/`apply` entry points
//! - `error`: error types for compilation and digests
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_core::{Comparison, Scope, Value};
//!
//! let scope = Scope::new();
//! scope.set("user", Value::object([("name", "ann")]));
//!
//! scope.watch_expr("user.name", |new, _old, _scope| {
//!     println!("name is now {new:?}");
//! }, Comparison::Reference)?;
//!
//! // Prints: name is now String("ann")
//! scope.digest()?;
//! ```

pub mod error;
pub mod expr;
pub mod scope;
pub mod value;

pub use error::{CompileError, DigestConvergenceError, LexError, ParseError, WatcherFault};
pub use expr::{compile, Accessor, ExpressionCache};
pub use scope::{Comparison, Scope, ScopeConfig, WatchHandle};
pub use value::Value;
