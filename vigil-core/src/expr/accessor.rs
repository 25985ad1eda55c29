//! Compiled Accessors
//!
//! An [`Accessor`] is the callable form of a generated [`Program`]. Each
//! statement is lowered once into a boxed closure; invoking the accessor
//! runs those closures over a small frame of temporaries, so the per-call
//! cost is a handful of guarded reads with no parsing or tree walking.
//!
//! Accessors are pure: they never mutate their inputs and never fail. Every
//! array or object literal in the expression builds a fresh value per call.

use std::fmt;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use super::ast::Literal;
use super::ir::{Operand, Program, Read, Statement, TempId, Test};
use crate::value::{Array, Object, Value};

/// Evaluation frame for one accessor call.
struct Frame<'a> {
    context: Option<&'a Value>,
    locals: Option<&'a Value>,
    temps: SmallVec<[Value; 8]>,
}

type Step = Box<dyn Fn(&mut Frame<'_>) + Send + Sync>;
type Load = Box<dyn Fn(&Frame<'_>) -> Value + Send + Sync>;
type Check = Box<dyn Fn(&Frame<'_>) -> bool + Send + Sync>;

struct Compiled {
    temps: usize,
    steps: Vec<Step>,
    result: Load,
}

/// A compiled expression: `(context?, locals?) -> value`.
///
/// Cloning is cheap; clones share the compiled code.
#[derive(Clone)]
pub struct Accessor {
    source: Option<Arc<str>>,
    program: Arc<Program>,
    compiled: Arc<Compiled>,
}

impl Accessor {
    /// Lower a generated program into callable form.
    pub fn from_program(program: Program) -> Self {
        let compiled = Compiled {
            temps: program.temp_count(),
            steps: program.body.iter().map(lower_statement).collect(),
            result: lower_operand(&program.result),
        };
        Self {
            source: None,
            program: Arc::new(program),
            compiled: Arc::new(compiled),
        }
    }

    pub(crate) fn with_source(mut self, text: &str) -> Self {
        self.source = Some(Arc::from(text));
        self
    }

    /// Evaluate against an optional context and optional locals.
    ///
    /// Missing arguments, like `undefined` or `null` ones, are falsy: an
    /// identifier then resolves to `Undefined`.
    pub fn call(&self, context: Option<&Value>, locals: Option<&Value>) -> Value {
        let mut frame = Frame {
            context,
            locals,
            temps: smallvec![Value::Undefined; self.compiled.temps],
        };
        for step in &self.compiled.steps {
            step(&mut frame);
        }
        (self.compiled.result)(&frame)
    }

    /// Evaluate against a context with no locals.
    pub fn eval(&self, context: &Value) -> Value {
        self.call(Some(context), None)
    }

    /// The expression text this accessor was compiled from, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The generated program.
    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("source", &self.source)
            .field("program", &self.program.to_string())
            .finish()
    }
}

fn lower_statement(statement: &Statement) -> Step {
    let test = lower_test(&statement.test);
    let read = lower_read(&statement.read);
    let TempId(target) = statement.target;
    Box::new(move |frame: &mut Frame<'_>| {
        if test(&*frame) {
            let value = read(&*frame);
            if let Some(slot) = frame.temps.get_mut(target) {
                *slot = value;
            }
        }
    })
}

fn lower_test(test: &Test) -> Check {
    match test {
        Test::LocalsHas(name) => {
            let name = name.clone();
            Box::new(move |frame: &Frame<'_>| locals_has(frame, &name))
        }
        Test::ContextFallback(name) => {
            let name = name.clone();
            Box::new(move |frame: &Frame<'_>| {
                !locals_has(frame, &name) && frame.context.is_some_and(Value::is_truthy)
            })
        }
        Test::Truthy(operand) => {
            let load = lower_operand(operand);
            Box::new(move |frame: &Frame<'_>| load(frame).is_truthy())
        }
    }
}

fn locals_has(frame: &Frame<'_>, name: &str) -> bool {
    frame
        .locals
        .is_some_and(|locals| locals.is_truthy() && locals.has_key(name))
}

fn lower_read(read: &Read) -> Load {
    match read {
        Read::Member { object, name } => {
            let object = lower_operand(object);
            let name = name.clone();
            Box::new(move |frame: &Frame<'_>| object(frame).member(&name))
        }
        Read::Computed { object, key } => {
            let object = lower_operand(object);
            let key = lower_operand(key);
            Box::new(move |frame: &Frame<'_>| object(frame).member_at(&key(frame)))
        }
    }
}

fn lower_operand(operand: &Operand) -> Load {
    match operand {
        Operand::Literal(literal) => {
            let value = literal_value(literal);
            Box::new(move |_: &Frame<'_>| value.clone())
        }
        Operand::Temp(TempId(index)) => {
            let index = *index;
            Box::new(move |frame: &Frame<'_>| frame.temps.get(index).cloned().unwrap_or_default())
        }
        Operand::Context => {
            Box::new(|frame: &Frame<'_>| frame.context.cloned().unwrap_or_default())
        }
        Operand::Locals => Box::new(|frame: &Frame<'_>| frame.locals.cloned().unwrap_or_default()),
        Operand::Array(elements) => {
            let loads: Vec<Load> = elements.iter().map(lower_operand).collect();
            Box::new(move |frame: &Frame<'_>| {
                Value::Array(Array::from_vec(loads.iter().map(|load| load(frame)).collect()))
            })
        }
        Operand::Object(entries) => {
            let loads: Vec<(String, Load)> = entries
                .iter()
                .map(|(key, value)| (key.clone(), lower_operand(value)))
                .collect();
            Box::new(move |frame: &Frame<'_>| {
                let object = Object::new();
                for (key, load) in &loads {
                    object.insert(key.clone(), load(frame));
                }
                Value::Object(object)
            })
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compile;
    use serde_json::json;

    fn accessor(text: &str) -> Accessor {
        compile(text).unwrap()
    }

    #[test]
    fn accessors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Accessor>();
    }

    #[test]
    fn falsy_arguments_behave_like_missing_ones() {
        let get = accessor("aKey");
        assert!(get.call(None, None).is_undefined());
        assert!(get.call(Some(&Value::Null), Some(&Value::Undefined)).is_undefined());
        assert!(get.call(Some(&Value::Number(0.0)), None).is_undefined());
    }

    #[test]
    fn locals_shadow_only_with_the_exact_key() {
        let get = accessor("aKey");
        let context = Value::from(json!({"aKey": 42}));

        let shadowing = Value::from(json!({"aKey": null}));
        assert_eq!(get.call(Some(&context), Some(&shadowing)), Value::Null);

        let unrelated = Value::from(json!({"other": 1}));
        assert_eq!(get.call(Some(&context), Some(&unrelated)), Value::from(42));
    }

    #[test]
    fn falsy_links_short_circuit() {
        let get = accessor("a.length");
        assert!(get.eval(&Value::from(json!({"a": ""}))).is_undefined());
        assert_eq!(get.eval(&Value::from(json!({"a": "abc"}))), Value::from(3));
        assert!(get.eval(&Value::from(json!({"a": 0}))).is_undefined());
    }

    #[test]
    fn literals_build_fresh_values_per_call() {
        let get = accessor("[1, 2]");
        let first = get.call(None, None);
        let second = get.call(None, None);

        assert_eq!(first, second);
        assert!(!crate::value::identical(&first, &second));
    }

    #[test]
    fn keeps_its_source_text() {
        let get = accessor("a.b");
        assert_eq!(get.source(), Some("a.b"));
        assert_eq!(get.program().temp_count(), 2);
        assert!(format!("{get:?}").contains("(v0).b"));
    }
}
