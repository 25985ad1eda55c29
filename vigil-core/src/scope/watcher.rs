//! Watchers
//!
//! A watcher pairs a watch callable, which produces a value from the scope,
//! with an optional listener that reacts when that value changes. The
//! watcher remembers the last value it saw; before its first evaluation it
//! remembers nothing at all, which no legal value can equal, so the first
//! evaluation always counts as a change.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use super::Scope;
use crate::error::{BoxError, WatcherFault};
use crate::value::{deep_clone, deep_equal, identical, Value};

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// How a watcher decides whether its value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Reference identity; `NaN` equals `NaN`.
    #[default]
    Reference,
    /// Structural equality against a deep copy of the last value.
    Value,
}

impl Comparison {
    pub fn equal(self, new: &Value, last: &Value) -> bool {
        match self {
            Comparison::Reference => identical(new, last),
            Comparison::Value => deep_equal(new, last),
        }
    }

    /// What to store as the last seen value.
    fn remember(self, value: &Value) -> Value {
        match self {
            Comparison::Reference => value.clone(),
            Comparison::Value => deep_clone(value),
        }
    }
}

impl From<bool> for Comparison {
    fn from(value_eq: bool) -> Self {
        if value_eq {
            Comparison::Value
        } else {
            Comparison::Reference
        }
    }
}

/// Conversion of a callable's return value into a watcher outcome.
///
/// Watch callables may return a plain [`Value`] or a `Result<Value, E>`;
/// listeners may return `()` or a `Result<(), E>`.
pub trait IntoOutcome<T> {
    fn into_outcome(self) -> Result<T, BoxError>;
}

impl IntoOutcome<Value> for Value {
    fn into_outcome(self) -> Result<Value, BoxError> {
        Ok(self)
    }
}

impl IntoOutcome<()> for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T, E> IntoOutcome<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<T, BoxError> {
        self.map_err(Into::into)
    }
}

pub(crate) type WatchFn = dyn Fn(&Scope) -> Result<Value, BoxError>;
pub(crate) type ListenerFn = dyn Fn(&Value, &Value, &Scope) -> Result<(), BoxError>;

pub(crate) struct Watcher {
    id: WatcherId,
    watch_fn: Box<WatchFn>,
    listener: Option<Box<ListenerFn>>,
    comparison: Comparison,
    /// `None` until the first evaluation.
    last: RefCell<Option<Value>>,
    removed: Cell<bool>,
}

impl Watcher {
    pub(crate) fn new(
        watch_fn: Box<WatchFn>,
        listener: Option<Box<ListenerFn>>,
        comparison: Comparison,
    ) -> Self {
        Self {
            id: WatcherId::new(),
            watch_fn,
            listener,
            comparison,
            last: RefCell::new(None),
            removed: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> WatcherId {
        self.id
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.set(true);
    }

    pub(crate) fn evaluate(&self, scope: &Scope) -> Result<Value, WatcherFault> {
        guarded(|| (self.watch_fn)(scope))
    }

    /// Whether `new` matches the last seen value.
    pub(crate) fn is_settled(&self, new: &Value) -> bool {
        match &*self.last.borrow() {
            Some(last) => self.comparison.equal(new, last),
            None => false,
        }
    }

    /// Store `new` as the last seen value, returning the previous one.
    pub(crate) fn record(&self, new: &Value) -> Option<Value> {
        self.last.replace(Some(self.comparison.remember(new)))
    }

    pub(crate) fn react(&self, new: &Value, old: &Value, scope: &Scope) -> Result<(), WatcherFault> {
        match &self.listener {
            Some(listener) => guarded(|| listener(new, old, scope)),
            None => Ok(()),
        }
    }
}

/// Run a watcher callable, turning both errors and panics into faults.
fn guarded<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, WatcherFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(WatcherFault::Failed(err)),
        Err(payload) => Err(WatcherFault::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_ids_are_unique() {
        let id1 = WatcherId::new();
        let id2 = WatcherId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn comparison_from_value_eq_flag() {
        assert_eq!(Comparison::from(false), Comparison::Reference);
        assert_eq!(Comparison::from(true), Comparison::Value);
        assert_eq!(Comparison::default(), Comparison::Reference);
    }

    #[test]
    fn value_comparison_remembers_a_copy() {
        let list = Value::array([1, 2]);
        let remembered = Comparison::Value.remember(&list);
        list.as_array().unwrap().push(3);

        assert!(!Comparison::Value.equal(&list, &remembered));
        assert!(Comparison::Reference.equal(&list, &Comparison::Reference.remember(&list)));
    }

    #[test]
    fn guarded_catches_errors_and_panics() {
        let failed = guarded::<()>(|| Err("boom".into()));
        assert!(matches!(failed, Err(WatcherFault::Failed(ref e)) if e.to_string() == "boom"));

        let panicked = guarded::<()>(|| panic!("kaboom"));
        assert!(matches!(panicked, Err(WatcherFault::Panicked(ref m)) if m == "kaboom"));

        let formatted = guarded::<()>(|| panic!("code {}", 7));
        assert!(matches!(formatted, Err(WatcherFault::Panicked(ref m)) if m == "code 7"));
    }

    #[test]
    fn outcomes_convert() {
        assert!(Value::from(1).into_outcome().is_ok());
        assert!(().into_outcome().is_ok());
        let err: Result<Value, std::fmt::Error> = Err(std::fmt::Error);
        assert!(err.into_outcome().is_err());
    }
}
