//! Equality and Deep Copy
//!
//! Watchers compare the value they just computed with the one they saw last
//! time. Two policies exist:
//!
//! - [`identical`]: reference comparison. Primitives compare by value (with
//!   `NaN` equal to itself, so a `NaN`-valued watcher settles), arrays and
//!   objects compare by handle identity.
//! - [`deep_equal`]: structural comparison, paired with [`deep_clone`] so the
//!   remembered value cannot be mutated behind the watcher's back.
//!
//! Both structural walks tolerate cyclic structures.

use std::collections::HashMap;

use super::{Array, Object, Value};

/// Reference equality with `NaN` treated as equal to `NaN`.
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Structural equality.
///
/// Arrays must match element by element; objects must have the same key set
/// with structurally equal values, in any order.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    DeepEqual::default().eq(a, b)
}

/// Copy a value so that no array or object storage is shared with the input.
///
/// Shared and cyclic references inside the input are preserved as shared and
/// cyclic references inside the copy.
pub fn deep_clone(value: &Value) -> Value {
    DeepClone::default().copy(value)
}

#[derive(Default)]
struct DeepEqual {
    /// Pairs of containers currently being compared further up the stack.
    in_progress: Vec<(usize, usize)>,
}

impl DeepEqual {
    fn eq(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => self.arrays(x, y),
            (Value::Object(x), Value::Object(y)) => self.objects(x, y),
            _ => identical(a, b),
        }
    }

    fn arrays(&mut self, x: &Array, y: &Array) -> bool {
        if x.ptr_eq(y) {
            return true;
        }
        let pair = (x.addr(), y.addr());
        if self.in_progress.contains(&pair) {
            return true;
        }

        let (left, right) = (x.to_vec(), y.to_vec());
        if left.len() != right.len() {
            return false;
        }

        self.in_progress.push(pair);
        let equal = left.iter().zip(&right).all(|(l, r)| self.eq(l, r));
        self.in_progress.pop();
        equal
    }

    fn objects(&mut self, x: &Object, y: &Object) -> bool {
        if x.ptr_eq(y) {
            return true;
        }
        let pair = (x.addr(), y.addr());
        if self.in_progress.contains(&pair) {
            return true;
        }

        let left = x.entries();
        if left.len() != y.len() {
            return false;
        }

        self.in_progress.push(pair);
        let equal = left.iter().all(|(key, l)| match y.get(key) {
            Some(r) => self.eq(l, &r),
            None => false,
        });
        self.in_progress.pop();
        equal
    }
}

#[derive(Default)]
struct DeepClone {
    /// Copies already made, keyed by the address of the original storage.
    copies: HashMap<usize, Value>,
}

impl DeepClone {
    fn copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Array(array) => {
                if let Some(copy) = self.copies.get(&array.addr()) {
                    return copy.clone();
                }
                let copy = Array::new();
                self.copies.insert(array.addr(), Value::Array(copy.clone()));
                for item in array.to_vec() {
                    copy.push(self.copy(&item));
                }
                Value::Array(copy)
            }
            Value::Object(object) => {
                if let Some(copy) = self.copies.get(&object.addr()) {
                    return copy.clone();
                }
                let copy = Object::new();
                self.copies.insert(object.addr(), Value::Object(copy.clone()));
                for (key, item) in object.entries() {
                    copy.insert(key, self.copy(&item));
                }
                Value::Object(copy)
            }
            primitive => primitive.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_treats_nan_as_equal() {
        assert!(identical(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(identical(&Value::Number(0.0), &Value::Number(-0.0)));
        assert!(!identical(&Value::Undefined, &Value::Null));
        assert!(!identical(&Value::from(1), &Value::from("1")));
    }

    #[test]
    fn identical_compares_containers_by_handle() {
        let a = Value::array([1, 2, 3]);
        let alias = a.clone();
        let twin = Value::array([1, 2, 3]);

        assert!(identical(&a, &alias));
        assert!(!identical(&a, &twin));
        assert!(deep_equal(&a, &twin));
    }

    #[test]
    fn deep_equal_ignores_key_order() {
        let a = Value::from(json!({"x": 1, "y": [true, null]}));
        let b = Value::from(json!({"y": [true, null], "x": 1}));
        let c = Value::from(json!({"x": 1, "y": [true]}));

        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
        assert!(!deep_equal(&Value::from(json!({"x": null})), &Value::from(json!({}))));
    }

    #[test]
    fn deep_clone_breaks_aliasing() {
        let original = Value::from(json!({"list": [1, 2]}));
        let copy = deep_clone(&original);

        assert!(deep_equal(&original, &copy));
        original.member("list").as_array().unwrap().push(3);
        assert!(!deep_equal(&original, &copy));
        assert_eq!(copy.member("list").member("length"), Value::from(2));
    }

    #[test]
    fn cyclic_values_are_handled() {
        let array = Array::from_vec(vec![Value::from(1)]);
        array.push(Value::Array(array.clone()));

        let copy = deep_clone(&Value::Array(array.clone()));
        let copied = copy.as_array().unwrap();
        assert!(!copied.ptr_eq(&array));
        assert!(copied.get(1).unwrap().as_array().unwrap().ptr_eq(copied));
        assert!(deep_equal(&Value::Array(array), &copy));
    }

    #[test]
    fn cyclic_values_debug_and_serialize_safely() {
        let array = Array::new();
        array.push(Value::Array(array.clone()));
        let object = Object::new();
        object.insert("self", Value::Object(object.clone()));
        object.insert("list", Value::Array(array.clone()));

        assert_eq!(format!("{:?}", array), "[Array([Circular])]");
        let printed = format!("{:?}", Value::Object(object.clone()));
        assert!(printed.contains("{Circular}"));
        assert!(printed.contains("[Circular]"));

        assert!(Value::Array(array.clone()).try_to_json().is_err());
        assert_eq!(Value::Object(object).to_json(), json!(null));

        let shared = Value::array([1]);
        let twice = Value::array([shared.clone(), shared]);
        assert_eq!(
            format!("{twice:?}"),
            "Array([Array([Number(1.0)]), Array([Number(1.0)])])"
        );
        assert_eq!(twice.to_json(), json!([[1], [1]]));
    }
}
