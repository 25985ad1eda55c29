//! Dynamic Values
//!
//! Compiled expressions and watchers trade in `Value`, a dynamically typed
//! structured value shaped after the data binding layer's needs:
//!
//! - `Undefined` is distinct from `Null`. Reads that find nothing produce
//!   `Undefined` and never fail.
//! - Arrays and objects are shared handles. Cloning an `Array` or `Object`
//!   aliases the same storage, so an in-place mutation is visible through
//!   every handle, and reference identity is observable with `ptr_eq`.
//!   That is what lets a reference-compared watcher miss an in-place
//!   mutation while a value-compared watcher catches it.
//!
//! # Thread Safety
//!
//! The storage behind a handle is an `Arc<RwLock<..>>`, which keeps `Value`
//! `Send + Sync` so compiled accessors holding literal values can live in a
//! process-wide cache. Locks are only held for the duration of a single read
//! or write; no guard ever escapes this module.

mod equality;

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

pub use equality::{deep_clone, deep_equal, identical};

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
}

impl Value {
    /// Build an array value from its elements.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Array(Array::from_vec(items.into_iter().map(Into::into).collect()))
    }

    /// Build an object value from key/value pairs, keeping their order.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let object = Object::new();
        for (key, value) in entries {
            object.insert(key, value);
        }
        Value::Object(object)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness as the expression language sees it.
    ///
    /// `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy.
    /// Every array and object is truthy, even an empty one.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Whether `key` genuinely exists on this value.
    ///
    /// Objects test key membership regardless of the stored value, so a key
    /// holding `undefined` still counts. Arrays expose `length` and their
    /// in-bounds indices. Nothing else has keys.
    pub fn has_key(&self, key: &str) -> bool {
        match self {
            Value::Object(object) => object.contains_key(key),
            Value::Array(array) => {
                key == "length" || array_index(key).is_some_and(|index| index < array.len())
            }
            _ => false,
        }
    }

    /// Read a named member. Missing members read as `Undefined`.
    pub fn member(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key).unwrap_or_default(),
            Value::Array(array) => {
                if key == "length" {
                    Value::Number(array.len() as f64)
                } else {
                    array_index(key)
                        .and_then(|index| array.get(index))
                        .unwrap_or_default()
                }
            }
            Value::String(s) => {
                if key == "length" {
                    Value::Number(s.chars().count() as f64)
                } else {
                    array_index(key)
                        .and_then(|index| s.chars().nth(index))
                        .map(|ch| Value::String(ch.to_string()))
                        .unwrap_or_default()
                }
            }
            _ => Value::Undefined,
        }
    }

    /// Read a member through a dynamically computed key.
    pub fn member_at(&self, key: &Value) -> Value {
        if let (Value::Array(array), Value::Number(n)) = (self, key) {
            if n.fract() == 0.0 && *n >= 0.0 {
                return array.get(*n as usize).unwrap_or_default();
            }
        }
        match key.to_key() {
            Some(name) => self.member(&name),
            None => Value::Undefined,
        }
    }

    /// The property name this value stands for when used as a key.
    ///
    /// Arrays and objects are not usable as keys.
    pub fn to_key(&self) -> Option<String> {
        match self {
            Value::Undefined => Some("undefined".to_string()),
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::String(s) => Some(s.clone()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert into a `serde_json::Value`.
    ///
    /// `Undefined` becomes `null`, undefined object members are dropped and
    /// integral numbers come out as JSON integers. Cyclic values have no JSON
    /// form and come out as `null`; use [`Value::try_to_json`] to see why.
    pub fn to_json(&self) -> serde_json::Value {
        self.try_to_json().unwrap_or(serde_json::Value::Null)
    }

    /// Convert into a `serde_json::Value`, failing on cyclic values.
    pub fn try_to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Canonical text for a number used as a key or rendered into source.
///
/// Magnitudes from `1e-6` up to `1e21` print in positional notation; outside
/// that range the shortest round-trip digits print with an exponent
/// (`1e+21`, `1.5e-7`).
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((digits, exponent)) if !exponent.starts_with('-') => {
                format!("{digits}e+{exponent}")
            }
            _ => text,
        }
    } else {
        n.to_string()
    }
}

thread_local! {
    static WALKING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a container as open in the current `Debug` or `Serialize` walk.
///
/// Entering a container that is already open means the walk found a cycle.
struct WalkGuard(usize);

impl WalkGuard {
    fn enter(addr: usize) -> Option<Self> {
        WALKING.with(|walking| {
            let mut walking = walking.borrow_mut();
            if walking.contains(&addr) {
                None
            } else {
                walking.push(addr);
                Some(WalkGuard(addr))
            }
        })
    }
}

impl Drop for WalkGuard {
    fn drop(&mut self) {
        WALKING.with(|walking| {
            let mut walking = walking.borrow_mut();
            if let Some(index) = walking.iter().rposition(|addr| *addr == self.0) {
                walking.remove(index);
            }
        });
    }
}

/// Parse a canonical array index (`"0"`, `"12"`, but not `"01"` or `"+1"`).
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

impl PartialEq for Value {
    /// Structural comparison; see [`deep_equal`].
    fn eq(&self, other: &Self) -> bool {
        deep_equal(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::object(map),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(array) => {
                let _open = WalkGuard::enter(array.addr())
                    .ok_or_else(|| <S::Error as ser::Error>::custom("cyclic value"))?;
                let items = array.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let _open = WalkGuard::enter(object.addr())
                    .ok_or_else(|| <S::Error as ser::Error>::custom("cyclic value"))?;
                let entries = object.entries();
                let mut map = serializer.serialize_map(None)?;
                for (key, value) in entries.iter().filter(|(_, v)| !v.is_undefined()) {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Shared handle on a growable list of values.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    /// Store `value` at `index`, padding any gap with `Undefined`.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.write();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.write().pop()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match WalkGuard::enter(self.addr()) {
            Some(_open) => f.debug_list().entries(self.to_vec()).finish(),
            None => f.write_str("[Circular]"),
        }
    }
}

/// Shared handle on an insertion-ordered string-keyed map of values.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<IndexMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().shift_remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    /// Snapshot of the current entries, in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match WalkGuard::enter(self.addr()) {
            Some(_open) => f.debug_map().entries(self.entries()).finish(),
            None => f.write_str("{Circular}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_expression_rules() {
        for falsy in [
            Value::Undefined,
            Value::Null,
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(-0.0),
            Value::Number(f64::NAN),
            Value::from(""),
        ] {
            assert!(!falsy.is_truthy(), "{falsy:?} should be falsy");
        }

        for truthy in [
            Value::Bool(true),
            Value::Number(-1.5),
            Value::from("0"),
            Value::array(Vec::<Value>::new()),
            Value::Object(Object::new()),
        ] {
            assert!(truthy.is_truthy(), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn has_key_is_membership_not_truthiness() {
        let object = Value::object([("present", Value::Undefined), ("zero", Value::from(0))]);
        assert!(object.has_key("present"));
        assert!(object.has_key("zero"));
        assert!(!object.has_key("absent"));

        let array = Value::array([1, 2]);
        assert!(array.has_key("length"));
        assert!(array.has_key("1"));
        assert!(!array.has_key("2"));

        assert!(!Value::from("text").has_key("length"));
        assert!(!Value::Null.has_key("anything"));
    }

    #[test]
    fn member_reads_never_fail() {
        let value = Value::from(json!({"list": [10, 20], "name": "vigil"}));

        assert_eq!(value.member("list").member("1"), Value::from(20));
        assert_eq!(value.member("list").member("length"), Value::from(2));
        assert_eq!(value.member("name").member("length"), Value::from(5));
        assert_eq!(value.member("name").member("0"), Value::from("v"));
        assert!(value.member("missing").member("deeper").is_undefined());
        assert!(Value::Number(4.0).member("x").is_undefined());
    }

    #[test]
    fn computed_keys_convert_to_names() {
        let value = Value::from(json!({"1": "one", "true": "yes", "null": "nothing"}));

        assert_eq!(value.member_at(&Value::from(1)), Value::from("one"));
        assert_eq!(value.member_at(&Value::Bool(true)), Value::from("yes"));
        assert_eq!(value.member_at(&Value::Null), Value::from("nothing"));
        assert!(value.member_at(&Value::array([1])).is_undefined());

        let array = Value::array(["a", "b"]);
        assert_eq!(array.member_at(&Value::from(1)), Value::from("b"));
        assert!(array.member_at(&Value::Number(0.5)).is_undefined());
    }

    #[test]
    fn handles_alias_storage() {
        let array = Array::from_vec(vec![Value::from(1)]);
        let alias = array.clone();
        alias.push(2);

        assert_eq!(array.len(), 2);
        assert!(array.ptr_eq(&alias));
        assert!(!array.ptr_eq(&Array::from_vec(array.to_vec())));

        array.set(4, "tail");
        assert_eq!(alias.len(), 5);
        assert!(alias.get(3).is_some_and(|v| v.is_undefined()));
    }

    #[test]
    fn json_round_trip_drops_undefined_members() {
        let value = Value::object([
            ("kept", Value::from(1)),
            ("dropped", Value::Undefined),
            ("nested", Value::array([Value::from(0.5), Value::Null])),
        ]);

        assert_eq!(value.to_json(), json!({"kept": 1, "nested": [0.5, null]}));
    }

    #[test]
    fn numbers_format_canonically() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn extreme_magnitudes_use_exponent_form() {
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-1.5e300), "-1.5e+300");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");

        let object = Value::object([("1e+21", "big")]);
        assert_eq!(object.member_at(&Value::Number(1e21)), Value::from("big"));
    }
}
