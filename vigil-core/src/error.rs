//! Error types shared by the expression compiler and the digest loop.

use thiserror::Error;

/// Boxed error returned by fallible watch and listener callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while turning expression text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A character outside the expression alphabet.
    #[error("unexpected next character '{ch}' at {index}")]
    UnexpectedCharacter { ch: char, index: usize },

    /// An exponent marker or sign not followed by a digit.
    #[error("invalid exponent in number literal at {index}")]
    InvalidExponent { index: usize },

    /// `\u` not followed by four hex digits, or an unpaired surrogate.
    #[error("invalid unicode escape at {index}")]
    InvalidUnicodeEscape { index: usize },

    /// The closing quote never arrived.
    #[error("unmatched quote: string starting at {index} is not terminated")]
    UnterminatedString { index: usize },
}

/// Errors raised while building the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected '{found}', expecting: {expected}")]
    Expected { expected: String, found: String },

    #[error("unexpected end of input, expecting: {expected}")]
    UnexpectedEnd { expected: String },
}

impl ParseError {
    pub fn expected(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Expected {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_end(expected: impl Into<String>) -> Self {
        Self::UnexpectedEnd {
            expected: expected.into(),
        }
    }

    /// The token the parser was waiting for.
    pub fn expected_token(&self) -> &str {
        match self {
            Self::Expected { expected, .. } | Self::UnexpectedEnd { expected } => expected,
        }
    }
}

/// Any failure turning expression text into an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A digest kept finding dirty watchers after the allowed number of passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{ttl} digest iterations reached without the watchers settling")]
pub struct DigestConvergenceError {
    pub ttl: usize,
}

/// A fault raised by one watcher's watch or listener callable.
///
/// These never leave the digest loop; they are reported and the pass moves on.
#[derive(Debug, Error)]
pub enum WatcherFault {
    #[error("{0}")]
    Failed(BoxError),

    #[error("panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_expected_token() {
        let err = ParseError::expected("]", ",");
        assert_eq!(err.expected_token(), "]");
        assert_eq!(err.to_string(), "unexpected ',', expecting: ]");

        let err = ParseError::unexpected_end(":");
        assert_eq!(err.expected_token(), ":");
    }

    #[test]
    fn compile_error_is_transparent() {
        let err: CompileError = LexError::InvalidUnicodeEscape { index: 3 }.into();
        assert_eq!(err.to_string(), "invalid unicode escape at 3");
    }
}
