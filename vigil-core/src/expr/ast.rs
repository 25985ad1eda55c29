//! Syntax Tree
//!
//! A recursive-descent parser over the token sequence. The grammar has no
//! operators, so the only structure beyond literals is member access:
//!
//! ```text
//! program  := primary
//! primary  := ( '[' array ']' | '{' object '}' | keyword | identifier | constant )
//!             ( '.' identifier | '[' primary ']' )*
//! array    := ( primary ( ',' primary )* ','? )?
//! object   := ( key ':' primary ( ',' key ':' primary )* ','? )?
//! key      := identifier | constant
//! keyword  := 'null' | 'true' | 'false' | 'this' | '$locals'
//! ```

use std::collections::VecDeque;

use super::lexer::{Constant, Token};
use crate::error::ParseError;
use crate::value::format_number;

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<Constant> for Literal {
    fn from(constant: Constant) -> Self {
        match constant {
            Constant::Number(n) => Literal::Number(n),
            Constant::String(s) => Literal::String(s),
        }
    }
}

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Program {
        body: Box<Node>,
    },
    Literal(Literal),
    ArrayExpression {
        elements: Vec<Node>,
    },
    ObjectExpression {
        properties: Vec<Property>,
    },
    Identifier {
        name: String,
    },
    ThisExpression,
    LocalsExpression,
    MemberExpression {
        object: Box<Node>,
        property: Box<Node>,
        computed: bool,
    },
}

/// One `key: value` entry of an object literal.
///
/// Keys are resolved to their property name at parse time: identifiers by
/// name, numbers in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Node,
}

/// Build a `Program` from a token sequence.
pub fn parse(tokens: Vec<Token>) -> Result<Node, ParseError> {
    let mut parser = Parser {
        tokens: tokens.into(),
    };
    let body = parser.primary()?;
    if let Some(token) = parser.tokens.front() {
        return Err(ParseError::expected("end of input", token.text.clone()));
    }
    Ok(Node::Program {
        body: Box::new(body),
    })
}

struct Parser {
    tokens: VecDeque<Token>,
}

impl Parser {
    fn primary(&mut self) -> Result<Node, ParseError> {
        let mut primary = if self.expect("[").is_some() {
            self.array()?
        } else if self.expect("{").is_some() {
            self.object()?
        } else if let Some(keyword) = self.keyword() {
            self.tokens.pop_front();
            keyword
        } else if self.tokens.front().is_some_and(|t| t.identifier) {
            self.identifier()?
        } else {
            Node::Literal(self.constant("expression")?)
        };

        while let Some(next) = self.expect_any(&[".", "["]) {
            primary = if next.is("[") {
                let property = self.primary()?;
                self.consume("]")?;
                Node::MemberExpression {
                    object: Box::new(primary),
                    property: Box::new(property),
                    computed: true,
                }
            } else {
                Node::MemberExpression {
                    object: Box::new(primary),
                    property: Box::new(self.identifier()?),
                    computed: false,
                }
            };
        }

        Ok(primary)
    }

    fn keyword(&self) -> Option<Node> {
        let token = self.tokens.front()?;
        let node = match token.text.as_str() {
            "null" => Node::Literal(Literal::Null),
            "true" => Node::Literal(Literal::Bool(true)),
            "false" => Node::Literal(Literal::Bool(false)),
            "this" => Node::ThisExpression,
            "$locals" => Node::LocalsExpression,
            _ => return None,
        };
        Some(node)
    }

    fn array(&mut self) -> Result<Node, ParseError> {
        let mut elements = Vec::new();
        loop {
            if self.peek("]") {
                break;
            }
            elements.push(self.primary()?);
            if self.expect(",").is_none() {
                break;
            }
        }
        self.consume("]")?;
        Ok(Node::ArrayExpression { elements })
    }

    fn object(&mut self) -> Result<Node, ParseError> {
        let mut properties = Vec::new();
        loop {
            if self.peek("}") {
                break;
            }
            let key = self.property_key()?;
            self.consume(":")?;
            let value = self.primary()?;
            properties.push(Property { key, value });
            if self.expect(",").is_none() {
                break;
            }
        }
        self.consume("}")?;
        Ok(Node::ObjectExpression { properties })
    }

    fn property_key(&mut self) -> Result<String, ParseError> {
        if self.tokens.front().is_some_and(|t| t.identifier) {
            return Ok(self.consume_any()?.text);
        }
        match self.constant("property key")? {
            Literal::String(s) => Ok(s),
            Literal::Number(n) => Ok(format_number(n)),
            Literal::Null => Ok("null".to_string()),
            Literal::Bool(b) => Ok(b.to_string()),
        }
    }

    fn identifier(&mut self) -> Result<Node, ParseError> {
        match self.tokens.pop_front() {
            Some(token) if token.identifier => Ok(Node::Identifier { name: token.text }),
            Some(token) => Err(ParseError::expected("identifier", token.text)),
            None => Err(ParseError::unexpected_end("identifier")),
        }
    }

    fn constant(&mut self, expected: &str) -> Result<Literal, ParseError> {
        match self.tokens.pop_front() {
            Some(Token {
                value: Some(value), ..
            }) => Ok(value.into()),
            Some(token) => Err(ParseError::expected(expected, token.text)),
            None => Err(ParseError::unexpected_end(expected)),
        }
    }

    fn peek(&self, text: &str) -> bool {
        self.tokens.front().is_some_and(|t| t.is(text))
    }

    fn expect(&mut self, text: &str) -> Option<Token> {
        self.expect_any(&[text])
    }

    fn expect_any(&mut self, texts: &[&str]) -> Option<Token> {
        let front = self.tokens.front()?;
        if texts.iter().any(|text| front.is(text)) {
            self.tokens.pop_front()
        } else {
            None
        }
    }

    fn consume(&mut self, text: &str) -> Result<Token, ParseError> {
        match self.tokens.front() {
            Some(token) if token.is(text) => self.consume_any(),
            Some(token) => Err(ParseError::expected(text, token.text.clone())),
            None => Err(ParseError::unexpected_end(text)),
        }
    }

    fn consume_any(&mut self) -> Result<Token, ParseError> {
        self.tokens
            .pop_front()
            .ok_or_else(|| ParseError::unexpected_end("token"))
    }
}
