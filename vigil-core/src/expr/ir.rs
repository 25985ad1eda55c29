//! Guarded Read Program
//!
//! The code generator flattens a syntax tree into a short straight-line
//! program over numbered temporaries. Every read is guarded: identifiers
//! check locals (by key membership) and then context, and member reads only
//! dereference a truthy left side. A broken link anywhere in a chain leaves
//! its temporary `undefined`, which in turn fails the next guard.
//!
//! `Program` renders as source text, for example `aKey.anotherKey`:
//!
//! ```text
//! var v0,v1;
//! if(l&&('aKey' in l)){v0=(l).aKey;}
//! if(!(l&&('aKey' in l))&&s){v0=(s).aKey;}
//! if(v0){v1=(v0).anotherKey;}
//! return v1;
//! ```
//!
//! (shown wrapped; the rendering is a single line). `s` is the context
//! object and `l` the locals object.

use std::fmt;

use super::ast::Literal;
use crate::value::format_number;

/// A numbered temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub usize);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value-producing expression with no side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    Temp(TempId),
    Context,
    Locals,
    Array(Vec<Operand>),
    Object(Vec<(String, Operand)>),
}

/// The guard of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// Locals is present and genuinely has the key.
    LocalsHas(String),
    /// Locals does not have the key and context is present.
    ContextFallback(String),
    /// The operand is truthy.
    Truthy(Operand),
}

/// The read performed when a guard passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Read {
    Member { object: Operand, name: String },
    Computed { object: Operand, key: Operand },
}

/// `if (test) { target = read; }`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub test: Test,
    pub target: TempId,
    pub read: Read,
}

/// A complete generated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub vars: Vec<TempId>,
    pub body: Vec<Statement>,
    pub result: Operand,
}

impl Program {
    /// Number of temporaries the program needs.
    pub fn temp_count(&self) -> usize {
        self.vars.len()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.vars.is_empty() {
            f.write_str("var ")?;
            for (i, var) in self.vars.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{var}")?;
            }
            f.write_str(";")?;
        }
        for statement in &self.body {
            write!(f, "{statement}")?;
        }
        write!(f, "return {};", self.result)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if({}){{{}={};}}", self.test, self.target, self.read)
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Test::LocalsHas(name) => write!(f, "l&&({} in l)", escape_str(name)),
            Test::ContextFallback(name) => write!(f, "!(l&&({} in l))&&s", escape_str(name)),
            Test::Truthy(operand) => write!(f, "{operand}"),
        }
    }
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Read::Member { object, name } => write!(f, "({object}).{name}"),
            Read::Computed { object, key } => write!(f, "({object})[{key}]"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(literal) => f.write_str(&escape(literal)),
            Operand::Temp(id) => write!(f, "{id}"),
            Operand::Context => f.write_str("s"),
            Operand::Locals => f.write_str("l"),
            Operand::Array(elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Operand::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if is_plain_name(key) {
                        write!(f, "{key}:{value}")?;
                    } else {
                        write!(f, "{}:{value}", escape_str(key))?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

/// Render a literal as program text.
pub fn escape(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => format_number(*n),
        Literal::String(s) => escape_str(s),
    }
}

/// Quote a string, turning every character outside `[ a-zA-Z0-9]` into a
/// `\uXXXX` escape (per UTF-16 code unit).
pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == ' ' || ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out.push('\'');
    out
}

fn is_plain_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_everything_but_alphanumerics_and_space() {
        assert_eq!(escape_str("a b1"), "'a b1'");
        assert_eq!(escape_str("it's"), "'it\\u0027s'");
        assert_eq!(escape_str("\u{00A0}"), "'\\u00a0'");
        assert_eq!(escape_str("😀"), "'\\ud83d\\ude00'");
        assert_eq!(escape_str("');alert(1);//"), "'\\u0027\\u0029\\u003balert\\u00281\\u0029\\u003b\\u002f\\u002f'");
    }

    #[test]
    fn escapes_literals() {
        assert_eq!(escape(&Literal::Null), "null");
        assert_eq!(escape(&Literal::Bool(false)), "false");
        assert_eq!(escape(&Literal::Number(4.2)), "4.2");
        assert_eq!(escape(&Literal::String("x".into())), "'x'");
    }

    #[test]
    fn renders_object_keys() {
        let operand = Operand::Object(vec![
            ("plain".into(), Operand::Literal(Literal::Number(1.0))),
            ("two words".into(), Operand::Context),
            ("1".into(), Operand::Locals),
        ]);
        assert_eq!(operand.to_string(), "{plain:1,'two words':s,'1':l}");
    }
}
