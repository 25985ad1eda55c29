//! Lexer
//!
//! Turns expression text into a flat token sequence for the parser. The
//! alphabet is small: numbers, quoted strings, identifiers and the
//! punctuation `[ ] { } : , .`. Whitespace is skipped.

use crate::error::LexError;

/// Literal payload carried by number and string tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Number(f64),
    String(String),
}

/// A single token.
///
/// `text` is the source text of the token, except that string tokens keep
/// their quotes so that `'null'` never reads as the `null` keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub value: Option<Constant>,
    pub identifier: bool,
}

impl Token {
    fn punctuation(ch: char) -> Self {
        Self {
            text: ch.to_string(),
            value: None,
            identifier: false,
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

/// Tokenize `text`.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(text).lex()
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            index: 0,
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || (ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit())) {
                self.read_number()?;
            } else if ch == '\'' || ch == '"' {
                self.read_string(ch)?;
            } else if "[]{}:,.".contains(ch) {
                self.tokens.push(Token::punctuation(ch));
                self.index += 1;
            } else if is_identifier_start(ch) {
                self.read_identifier();
            } else if is_whitespace(ch) {
                self.index += 1;
            } else {
                return Err(LexError::UnexpectedCharacter {
                    ch,
                    index: self.index,
                });
            }
        }
        Ok(self.tokens)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn read_number(&mut self) -> Result<(), LexError> {
        let mut number = String::new();
        let mut seen_dot = false;
        let mut seen_exponent = false;

        while let Some(ch) = self.current() {
            let ch = ch.to_ascii_lowercase();
            let next = self.peek();
            let next_is_digit = next.is_some_and(|c| c.is_ascii_digit());

            if ch.is_ascii_digit() {
                number.push(ch);
            } else if ch == '.' && !seen_dot && !seen_exponent && next_is_digit {
                seen_dot = true;
                number.push(ch);
            } else if ch == 'e' && !seen_exponent {
                if !next.is_some_and(is_exponent_operator) {
                    return Err(LexError::InvalidExponent { index: self.index });
                }
                seen_exponent = true;
                number.push(ch);
            } else if (ch == '+' || ch == '-') && number.ends_with('e') {
                if !next_is_digit {
                    return Err(LexError::InvalidExponent { index: self.index });
                }
                number.push(ch);
            } else {
                break;
            }
            self.index += 1;
        }

        // Digits, at most one '.' and a checked exponent always parse.
        let value = number.parse::<f64>().unwrap_or(f64::NAN);
        self.tokens.push(Token {
            text: number,
            value: Some(Constant::Number(value)),
            identifier: false,
        });
        Ok(())
    }

    fn read_string(&mut self, quote: char) -> Result<(), LexError> {
        let start = self.index;
        self.index += 1;
        let mut string = String::new();
        let mut escape = false;

        while let Some(ch) = self.current() {
            if escape {
                if ch == 'u' {
                    string.push(self.read_unicode_escape()?);
                } else {
                    string.push(unescape(ch));
                }
                escape = false;
            } else if ch == quote {
                self.index += 1;
                self.tokens.push(Token {
                    text: self.chars[start..self.index].iter().collect(),
                    value: Some(Constant::String(string)),
                    identifier: false,
                });
                return Ok(());
            } else if ch == '\\' {
                escape = true;
            } else {
                string.push(ch);
            }
            self.index += 1;
        }

        Err(LexError::UnterminatedString { index: start })
    }

    /// Decode `\uXXXX` with `self.index` on the `u`, leaving it on the last
    /// hex digit consumed. A high surrogate must be followed by an escaped
    /// low surrogate.
    fn read_unicode_escape(&mut self) -> Result<char, LexError> {
        let at = self.index;
        let high = self.hex4(self.index + 1).ok_or(LexError::InvalidUnicodeEscape { index: at })?;
        self.index += 4;

        if let Some(ch) = char::from_u32(high) {
            return Ok(ch);
        }
        if !(0xD800..0xDC00).contains(&high) {
            return Err(LexError::InvalidUnicodeEscape { index: at });
        }

        // high surrogate: expect `\uDC00`..`\uDFFF` right after
        let follows = self.chars.get(self.index + 1) == Some(&'\\')
            && self.chars.get(self.index + 2) == Some(&'u');
        let low = follows
            .then(|| self.hex4(self.index + 3))
            .flatten()
            .filter(|low| (0xDC00..0xE000).contains(low))
            .ok_or(LexError::InvalidUnicodeEscape { index: at })?;
        self.index += 6;

        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(code).ok_or(LexError::InvalidUnicodeEscape { index: at })
    }

    fn hex4(&self, from: usize) -> Option<u32> {
        let digits = self.chars.get(from..from + 4)?;
        digits
            .iter()
            .try_fold(0u32, |acc, ch| ch.to_digit(16).map(|d| acc * 16 + d))
    }

    fn read_identifier(&mut self) {
        let start = self.index;
        while self
            .current()
            .is_some_and(|ch| is_identifier_start(ch) || ch.is_ascii_digit())
        {
            self.index += 1;
        }
        self.tokens.push(Token {
            text: self.chars[start..self.index].iter().collect(),
            value: None,
            identifier: true,
        });
    }
}

fn unescape(ch: char) -> char {
    match ch {
        'n' => '\n',
        'f' => '\u{000C}',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{000B}',
        other => other,
    }
}

fn is_exponent_operator(ch: char) -> bool {
    ch == '-' || ch == '+' || ch.is_ascii_digit()
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\r' | '\t' | '\n' | '\u{000B}' | '\u{00A0}')
}
