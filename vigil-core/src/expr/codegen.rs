//! Code Generation
//!
//! Walks a syntax tree and emits a [`Program`] of guarded reads, then hands
//! it to [`Accessor::from_program`] to be lowered into callable form.
//!
//! The compiler state lives only for one `compile` call: the statements
//! emitted so far, the next temporary number and the temporaries declared.

use super::accessor::Accessor;
use super::ast::Node;
use super::ir::{Operand, Program, Read, Statement, TempId, Test};

/// Compile a syntax tree into an accessor.
pub fn compile(ast: &Node) -> Accessor {
    Accessor::from_program(generate(ast))
}

/// Generate the guarded-read program for a syntax tree.
pub fn generate(ast: &Node) -> Program {
    let mut state = CompilerState::new();
    let root = match ast {
        Node::Program { body } => body.as_ref(),
        other => other,
    };
    let result = state.recurse(root);
    state.finish(result)
}

/// Per-compilation scratch state.
#[derive(Debug, Default)]
pub struct CompilerState {
    body: Vec<Statement>,
    next_id: usize,
    vars: Vec<TempId>,
}

impl CompilerState {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(self, result: Operand) -> Program {
        Program {
            vars: self.vars,
            body: self.body,
            result,
        }
    }

    fn next_id(&mut self) -> TempId {
        let id = TempId(self.next_id);
        self.next_id += 1;
        self.vars.push(id);
        id
    }

    fn emit(&mut self, test: Test, target: TempId, read: Read) {
        self.body.push(Statement { test, target, read });
    }

    fn recurse(&mut self, node: &Node) -> Operand {
        match node {
            Node::Program { body } => self.recurse(body),
            Node::Literal(literal) => Operand::Literal(literal.clone()),
            Node::ArrayExpression { elements } => {
                Operand::Array(elements.iter().map(|e| self.recurse(e)).collect())
            }
            Node::ObjectExpression { properties } => Operand::Object(
                properties
                    .iter()
                    .map(|p| (p.key.clone(), self.recurse(&p.value)))
                    .collect(),
            ),
            Node::Identifier { name } => {
                let id = self.next_id();
                self.emit(
                    Test::LocalsHas(name.clone()),
                    id,
                    Read::Member {
                        object: Operand::Locals,
                        name: name.clone(),
                    },
                );
                self.emit(
                    Test::ContextFallback(name.clone()),
                    id,
                    Read::Member {
                        object: Operand::Context,
                        name: name.clone(),
                    },
                );
                Operand::Temp(id)
            }
            Node::ThisExpression => Operand::Context,
            Node::LocalsExpression => Operand::Locals,
            Node::MemberExpression {
                object,
                property,
                computed,
            } => {
                let left = self.recurse(object);
                let id = self.next_id();
                let read = match (computed, property.as_ref()) {
                    (false, Node::Identifier { name }) => Read::Member {
                        object: left.clone(),
                        name: name.clone(),
                    },
                    _ => Read::Computed {
                        object: left.clone(),
                        key: self.recurse(property),
                    },
                };
                self.emit(Test::Truthy(left), id, read);
                Operand::Temp(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::parse;
    use crate::expr::lexer::tokenize;

    fn source(text: &str) -> String {
        generate(&parse(tokenize(text).unwrap()).unwrap()).to_string()
    }

    #[test]
    fn literals_inline() {
        assert_eq!(source("42"), "return 42;");
        assert_eq!(source("null"), "return null;");
        assert_eq!(source("'a-b'"), "return 'a\\u002db';");
        assert_eq!(source("[1, {x: true}]"), "return [1,{x:true}];");
    }

    #[test]
    fn this_and_locals_need_no_temporaries() {
        assert_eq!(source("this"), "return s;");
        assert_eq!(source("$locals"), "return l;");
    }

    #[test]
    fn identifiers_check_locals_then_context() {
        assert_eq!(
            source("aKey"),
            "var v0;\
             if(l&&('aKey' in l)){v0=(l).aKey;}\
             if(!(l&&('aKey' in l))&&s){v0=(s).aKey;}\
             return v0;"
        );
    }

    #[test]
    fn member_reads_are_guarded() {
        assert_eq!(
            source("aKey.anotherKey"),
            "var v0,v1;\
             if(l&&('aKey' in l)){v0=(l).aKey;}\
             if(!(l&&('aKey' in l))&&s){v0=(s).aKey;}\
             if(v0){v1=(v0).anotherKey;}\
             return v1;"
        );
    }

    #[test]
    fn computed_keys_are_generated_before_the_guard() {
        let program = generate(&parse(tokenize("this[key]").unwrap()).unwrap());
        assert_eq!(program.temp_count(), 2);
        assert_eq!(
            program.to_string(),
            "var v0,v1;\
             if(l&&('key' in l)){v1=(l).key;}\
             if(!(l&&('key' in l))&&s){v1=(s).key;}\
             if(s){v0=(s)[v1];}\
             return v0;"
        );
    }
}
