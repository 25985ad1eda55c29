//! Digest Scheduler
//!
//! A [`Scope`] owns a data object and an ordered set of watchers. Calling
//! [`Scope::digest`] evaluates every watcher, fires the listeners of those
//! whose value changed, and repeats until a whole pass finds nothing dirty.
//!
//! # How It Works
//!
//! 1. Each pass visits a snapshot of the watcher list, oldest first.
//!    Watchers removed after the snapshot was taken are skipped; watchers
//!    added during a pass are picked up by the next one.
//!
//! 2. A dirty watcher becomes the convergence marker. When a later pass
//!    reaches the marker again and finds it clean, every watcher has been
//!    confirmed stable since the last change, so the pass stops early.
//!
//! 3. The marker remembers the watcher-set generation of the pass that set
//!    it. Adding or removing a watcher bumps the generation, so a stale
//!    marker can never end a pass before a newly added watcher is seen.
//!
//! 4. If pass number `ttl` is still dirty the digest fails with
//!    [`DigestConvergenceError`].
//!
//! Errors and panics raised by watch or listener callables are caught per
//! watcher, logged, and never stop the rest of the pass.
//!
//! # Threading
//!
//! Scopes are single-threaded (`!Send`). All digest work runs to completion
//! on the caller's thread.

mod config;
mod watcher;

pub use config::{ScopeConfig, DEFAULT_TTL};
pub use watcher::{Comparison, IntoOutcome, WatcherId};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use self::watcher::{ListenerFn, WatchFn, Watcher};
use crate::error::{CompileError, DigestConvergenceError, WatcherFault};
use crate::expr::ExpressionCache;
use crate::value::{Object, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    watcher: WatcherId,
    generation: u64,
}

struct ScopeState {
    data: Object,
    watchers: RefCell<Vec<Rc<Watcher>>>,
    last_dirty: Cell<Option<Marker>>,
    generation: Cell<u64>,
    config: ScopeConfig,
}

impl ScopeState {
    /// Record a structural change to the watcher set.
    fn invalidate(&self) {
        self.last_dirty.set(None);
        self.generation.set(self.generation.get().wrapping_add(1));
    }
}

/// A data object plus the watchers observing it.
///
/// Cloning a `Scope` yields another handle to the same state.
#[derive(Clone)]
pub struct Scope {
    state: Rc<ScopeState>,
}

impl Scope {
    pub fn new() -> Self {
        Self::with_config(ScopeConfig::default())
    }

    pub fn with_config(config: ScopeConfig) -> Self {
        Self {
            state: Rc::new(ScopeState {
                data: Object::new(),
                watchers: RefCell::new(Vec::new()),
                last_dirty: Cell::new(None),
                generation: Cell::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.state.config
    }

    /// Read a top-level field of the scope's data; `Undefined` when absent.
    pub fn get(&self, key: &str) -> Value {
        self.state.data.get(key).unwrap_or_default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.data.insert(key, value);
    }

    /// The scope's data object, usable as an accessor context.
    pub fn data(&self) -> Value {
        Value::Object(self.state.data.clone())
    }

    pub fn watcher_count(&self) -> usize {
        self.state.watchers.borrow().len()
    }

    /// Watch a value with reference comparison.
    pub fn watch<W, R, L, S>(&self, watch_fn: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> R + 'static,
        R: IntoOutcome<Value>,
        L: Fn(&Value, &Value, &Scope) -> S + 'static,
        S: IntoOutcome<()>,
    {
        self.register(watch_fn, Some(listener), Comparison::Reference)
    }

    /// Watch a value with structural comparison.
    pub fn watch_by_value<W, R, L, S>(&self, watch_fn: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> R + 'static,
        R: IntoOutcome<Value>,
        L: Fn(&Value, &Value, &Scope) -> S + 'static,
        S: IntoOutcome<()>,
    {
        self.register(watch_fn, Some(listener), Comparison::Value)
    }

    /// Register a watch callable with no listener. It still runs on every
    /// pass, which makes it a hook for "something is digesting".
    pub fn watch_silent<W, R>(&self, watch_fn: W) -> WatchHandle
    where
        W: Fn(&Scope) -> R + 'static,
        R: IntoOutcome<Value>,
    {
        self.insert(box_watch_fn(watch_fn), None, Comparison::Reference)
    }

    /// Register a watcher.
    ///
    /// Its first evaluation always counts as a change, and the listener's
    /// first call receives the new value as both `new` and `old`.
    pub fn register<W, R, L, S>(
        &self,
        watch_fn: W,
        listener: Option<L>,
        comparison: Comparison,
    ) -> WatchHandle
    where
        W: Fn(&Scope) -> R + 'static,
        R: IntoOutcome<Value>,
        L: Fn(&Value, &Value, &Scope) -> S + 'static,
        S: IntoOutcome<()>,
    {
        let listener = listener.map(|listener| -> Box<ListenerFn> {
            Box::new(move |new: &Value, old: &Value, scope: &Scope| {
                listener(new, old, scope).into_outcome()
            })
        });
        self.insert(box_watch_fn(watch_fn), listener, comparison)
    }

    /// Compile `text` (through the global expression cache) and watch its
    /// value against this scope's data.
    pub fn watch_expr<L, S>(
        &self,
        text: &str,
        listener: L,
        comparison: Comparison,
    ) -> Result<WatchHandle, CompileError>
    where
        L: Fn(&Value, &Value, &Scope) -> S + 'static,
        S: IntoOutcome<()>,
    {
        let accessor = ExpressionCache::global().get_or_compile(text)?;
        Ok(self.register(
            move |scope: &Scope| accessor.eval(&scope.data()),
            Some(listener),
            comparison,
        ))
    }

    fn insert(
        &self,
        watch_fn: Box<WatchFn>,
        listener: Option<Box<ListenerFn>>,
        comparison: Comparison,
    ) -> WatchHandle {
        let watcher = Rc::new(Watcher::new(watch_fn, listener, comparison));
        let id = watcher.id();
        self.state.watchers.borrow_mut().push(watcher);
        self.state.invalidate();
        trace!(watcher = %id, ?comparison, "registered watcher");
        WatchHandle {
            id,
            scope: Rc::downgrade(&self.state),
        }
    }

    /// Run passes until one is clean.
    pub fn digest(&self) -> Result<(), DigestConvergenceError> {
        let ttl = self.state.config.ttl;
        self.state.last_dirty.set(None);

        let mut passes = 0;
        while self.digest_once() {
            passes += 1;
            if passes >= ttl {
                warn!(ttl, "digest did not converge");
                return Err(DigestConvergenceError { ttl });
            }
        }
        debug!(passes = passes + 1, "digest converged");
        Ok(())
    }

    /// One pass over the watchers. Returns whether anything was dirty.
    fn digest_once(&self) -> bool {
        let snapshot: Vec<Rc<Watcher>> = self.state.watchers.borrow().clone();
        let generation = self.state.generation.get();
        let mut dirty = false;

        for watcher in &snapshot {
            if watcher.is_removed() {
                continue;
            }

            let new = match watcher.evaluate(self) {
                Ok(value) => value,
                Err(fault) => {
                    report(watcher.id(), "watch", &fault);
                    continue;
                }
            };
            if watcher.is_removed() {
                continue;
            }

            if watcher.is_settled(&new) {
                let current = Marker {
                    watcher: watcher.id(),
                    generation: self.state.generation.get(),
                };
                if self.state.last_dirty.get() == Some(current) {
                    break;
                }
                continue;
            }

            dirty = true;
            self.state.last_dirty.set(Some(Marker {
                watcher: watcher.id(),
                generation,
            }));
            let old = watcher.record(&new);
            let old = old.as_ref().unwrap_or(&new);
            if let Err(fault) = watcher.react(&new, old, self) {
                report(watcher.id(), "listener", &fault);
            }
        }

        trace!(dirty, watchers = snapshot.len(), "digest pass");
        dirty
    }

    /// Call `f` with this scope and `arg`. Never digests.
    pub fn eval<R>(&self, f: impl FnOnce(&Scope, Option<&Value>) -> R, arg: Option<&Value>) -> R {
        f(self, arg)
    }

    /// Evaluate expression text against this scope's data, with optional
    /// locals shadowing it.
    pub fn eval_expr(&self, text: &str, locals: Option<&Value>) -> Result<Value, CompileError> {
        let accessor = ExpressionCache::global().get_or_compile(text)?;
        Ok(accessor.call(Some(&self.data()), locals))
    }

    /// Run `f`, then digest.
    ///
    /// The digest also runs when `f` panics; the panic then continues to
    /// unwind. A digest failure is returned in place of `f`'s result.
    pub fn apply<R>(&self, f: impl FnOnce(&Scope) -> R) -> Result<R, DigestConvergenceError> {
        let mut guard = DigestOnExit {
            scope: self,
            armed: true,
        };
        let result = self.eval(|scope, _| f(scope), None);
        guard.armed = false;
        self.digest()?;
        Ok(result)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.state.data)
            .field("watchers", &self.watcher_count())
            .field("config", &self.state.config)
            .finish()
    }
}

fn box_watch_fn<W, R>(watch_fn: W) -> Box<WatchFn>
where
    W: Fn(&Scope) -> R + 'static,
    R: IntoOutcome<Value>,
{
    Box::new(move |scope: &Scope| watch_fn(scope).into_outcome())
}

fn report(watcher: WatcherId, phase: &'static str, fault: &WatcherFault) {
    error!(%watcher, phase, error = %fault, "watcher fault");
}

/// Digests the scope if dropped while still armed, i.e. during unwinding.
struct DigestOnExit<'a> {
    scope: &'a Scope,
    armed: bool,
}

impl Drop for DigestOnExit<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.scope.digest() {
                error!(error = %err, "digest after failed apply did not converge");
            }
        }
    }
}

/// Handle returned by watcher registration.
///
/// Dropping the handle leaves the watcher registered; call
/// [`WatchHandle::deregister`] to remove it.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    id: WatcherId,
    scope: Weak<ScopeState>,
}

impl WatchHandle {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Remove the watcher. Repeated calls, or calls after the scope is
    /// gone, do nothing.
    pub fn deregister(&self) {
        let Some(state) = self.scope.upgrade() else {
            return;
        };
        let removed = {
            let mut watchers = state.watchers.borrow_mut();
            watchers
                .iter()
                .position(|watcher| watcher.id() == self.id)
                .map(|index| watchers.remove(index))
        };
        if let Some(watcher) = removed {
            watcher.mark_removed();
            state.invalidate();
            trace!(watcher = %self.id, "deregistered watcher");
        }
    }
}
