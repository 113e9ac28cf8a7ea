//! Scopes
//!
//! A [`Scope`] is an observation context. It holds application state as an
//! open property bag, a registry of watchers over that state, and a queue
//! of deferred tasks. Running [`Scope::digest`] re-evaluates every watcher
//! until nothing changes any more, calling each listener exactly when its
//! watched value changed.
//!
//! # Concepts
//!
//! ## Watchers
//!
//! A watch function reads a value from the scope; it gets `&Scope` and so
//! cannot mutate state. A listener reacts to a change; it gets `&mut Scope`
//! and may set properties, register more watchers or schedule tasks.
//!
//! ## Digest
//!
//! A digest is a loop of passes. Each pass first drains the deferred queue,
//! then evaluates every watcher in registration order. The loop stops when
//! a pass is clean and the queue is empty, or fails with
//! [`DigestError::NotConverged`] once the pass budget is spent.
//!
//! ## Phases
//!
//! A scope runs at most one `digest` or `apply` at a time. Starting either
//! while one is active (for example from inside a listener) returns
//! [`DigestError::InProgress`]. The phase is cleared when the operation
//! returns or unwinds.
//!
//! # Implementation Notes
//!
//! Everything is single-threaded. Watchers are stored behind `Rc` and
//! cloned out of the registry before they are invoked, so a listener can
//! grow the registry while a pass is iterating over it by index.

pub(crate) mod equality;
mod digest;
mod queue;
mod watcher;

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

pub use digest::DigestStats;
pub use equality::Equality;
pub use watcher::{LastValue, Watcher, WatcherId};

use crate::config::ScopeConfig;
use crate::diagnostics::{DiagnosticSink, Fault, FaultOrigin, TracingSink};
use crate::error::{ConfigError, DigestError, DigestResult, WatchError, WatchResult};
use crate::value::Value;
use queue::{AsyncQueue, AsyncTask};
use watcher::Registered;

/// Extra named values passed to [`Scope::eval_with`].
pub type Locals = IndexMap<String, Value>;

/// The top-level operation a scope is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Digest,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Digest => f.write_str("digest"),
            Phase::Apply => f.write_str("apply"),
        }
    }
}

/// An observation context: state, watchers and the digest loop.
///
/// ```rust
/// use vigil_core::Scope;
///
/// let mut scope = Scope::new();
/// scope.set("name", "Jane");
/// scope.watch(
///     |s| s.get("name"),
///     |new, _old, s| {
///         if let Some(name) = new.as_str() {
///             s.set("greeting", format!("Hello, {name}"));
///         }
///     },
/// );
///
/// scope.digest().unwrap();
/// assert_eq!(scope.get("greeting").as_str(), Some("Hello, Jane"));
/// ```
pub struct Scope {
    state: IndexMap<String, Value>,
    watchers: Vec<Rc<Registered>>,
    /// Last watcher seen dirty in the current digest; a back-reference,
    /// cleared whenever the registry grows.
    last_dirty: Option<WatcherId>,
    queue: AsyncQueue,
    phase: Rc<Cell<Option<Phase>>>,
    next_watcher_id: u64,
    config: ScopeConfig,
    sink: Box<dyn DiagnosticSink>,
}

impl Scope {
    /// Create an empty scope with the default configuration.
    pub fn new() -> Self {
        Self {
            state: IndexMap::new(),
            watchers: Vec::new(),
            last_dirty: None,
            queue: AsyncQueue::default(),
            phase: Rc::default(),
            next_watcher_id: 0,
            config: ScopeConfig::default(),
            sink: Box::new(TracingSink),
        }
    }

    /// Create an empty scope with a validated configuration.
    pub fn with_config(config: ScopeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Replace the diagnostic sink that receives caught faults.
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Property bag
    // ------------------------------------------------------------------

    /// Read a property. Missing properties read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        self.state.get(key).cloned().unwrap_or_default()
    }

    /// Write a property, returning the previous value if there was one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.state.insert(key.into(), value.into())
    }

    /// Replace a property with a function of its current value.
    pub fn update<F>(&mut self, key: &str, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get(key));
        self.state.insert(key.to_owned(), next);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.state.keys().map(String::as_str)
    }

    pub fn state(&self) -> &IndexMap<String, Value> {
        &self.state
    }

    // ------------------------------------------------------------------
    // Watch registry
    // ------------------------------------------------------------------

    /// Add a watcher at the end of the evaluation order.
    ///
    /// Its first evaluation always counts as a change. The dirty cursor is
    /// reset so that a digest already in progress cannot short-circuit past
    /// the new watcher.
    pub fn register(&mut self, watcher: Watcher) -> WatcherId {
        let id = WatcherId::new(self.next_watcher_id);
        self.next_watcher_id += 1;

        self.watchers.push(Rc::new(Registered::new(id, watcher)));
        self.last_dirty = None;

        tracing::trace!(%id, watchers = self.watchers.len(), "watcher registered");
        id
    }

    /// Register an identity-compared watcher.
    pub fn watch<W, L>(&mut self, watch_fn: W, listener: L) -> WatcherId
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &mut Scope) + 'static,
    {
        self.register(Watcher::new(watch_fn).listener(listener))
    }

    /// Register a structurally compared watcher.
    pub fn watch_deep<W, L>(&mut self, watch_fn: W, listener: L) -> WatcherId
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &mut Scope) + 'static,
    {
        self.register(Watcher::new(watch_fn).listener(listener).deep())
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// The watcher most recently seen dirty in the current digest, if any.
    pub fn last_dirty_watcher(&self) -> Option<WatcherId> {
        self.last_dirty
    }

    /// The value a watcher stored at its last evaluation.
    pub fn last_value(&self, id: WatcherId) -> Option<LastValue> {
        self.watchers
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.last.borrow().clone())
    }

    // ------------------------------------------------------------------
    // Evaluation and scheduling
    // ------------------------------------------------------------------

    /// Run `expression` against the scope right now and return its result.
    pub fn eval<R, F>(&mut self, expression: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        expression(self)
    }

    /// Like [`eval`](Self::eval), with extra named values.
    pub fn eval_with<R, F>(&mut self, expression: F, locals: &Locals) -> R
    where
        F: FnOnce(&mut Scope, &Locals) -> R,
    {
        expression(self, locals)
    }

    /// Queue `expression` to run inside the current (or next) digest, before
    /// that digest returns. It never runs at the call site.
    pub fn eval_async<F>(&mut self, expression: F)
    where
        F: FnOnce(&mut Scope) + 'static,
    {
        self.try_eval_async(move |scope| {
            expression(scope);
            Ok(())
        });
    }

    /// Queue a fallible expression. An `Err` is reported to the diagnostic
    /// sink when the task runs.
    pub fn try_eval_async<F>(&mut self, expression: F)
    where
        F: FnOnce(&mut Scope) -> WatchResult<()> + 'static,
    {
        self.queue.push(AsyncTask::new(expression));
        tracing::trace!(pending = self.queue.len(), "task scheduled");
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Run `expression`, then digest.
    ///
    /// A fault in the expression is reported, not returned, and the digest
    /// runs regardless. Yields `Ok(None)` when the expression faulted and
    /// `Err` only when the digest itself fails.
    pub fn apply<R, F>(&mut self, expression: F) -> DigestResult<Option<R>>
    where
        F: FnOnce(&mut Scope) -> WatchResult<R>,
    {
        let phase = self.begin_phase(Phase::Apply)?;
        let outcome = expression(self);
        drop(phase);

        let result = match outcome {
            Ok(value) => Some(value),
            Err(error) => {
                self.report(FaultOrigin::Apply, error);
                None
            }
        };

        self.digest()?;
        Ok(result)
    }

    /// The operation currently running, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.phase.get()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn begin_phase(&self, phase: Phase) -> DigestResult<PhaseGuard> {
        if let Some(current) = self.phase.get() {
            return Err(DigestError::InProgress(current));
        }
        self.phase.set(Some(phase));
        Ok(PhaseGuard {
            slot: Rc::clone(&self.phase),
        })
    }

    fn report(&self, origin: FaultOrigin, error: WatchError) {
        self.sink.report(&Fault { origin, error });
    }
}

/// Clears the scope's phase when dropped, including during unwinding.
struct PhaseGuard {
    slot: Rc<Cell<Option<Phase>>>,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.slot.set(None);
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
            .field("state", &self.state)
            .field("watchers", &self.watchers.len())
            .field("last_dirty", &self.last_dirty)
            .field("queue", &self.queue)
            .field("phase", &self.phase.get())
            .field("config", &self.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_is_a_property_bag() {
        let mut scope = Scope::new();
        assert!(scope.get("aProperty").is_undefined());

        assert!(scope.set("aProperty", 1).is_none());
        assert_eq!(scope.get("aProperty").as_f64(), Some(1.0));
        assert!(scope.contains("aProperty"));

        scope.update("aProperty", |v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
        assert_eq!(scope.get("aProperty").as_f64(), Some(2.0));

        scope.set("other", "x");
        assert_eq!(scope.keys().collect::<Vec<_>>(), vec!["aProperty", "other"]);

        assert!(scope.remove("aProperty").is_some());
        assert!(!scope.contains("aProperty"));
    }

    #[test]
    fn register_assigns_sequential_ids_and_resets_cursor() {
        let mut scope = Scope::new();
        let a = scope.register(Watcher::new(|_| Value::Null));
        scope.digest().unwrap();
        assert_eq!(scope.last_dirty_watcher(), Some(a));

        let b = scope.register(Watcher::new(|_| Value::Null));
        assert!(a < b);
        assert_eq!(scope.watcher_count(), 2);
        assert_eq!(scope.last_dirty_watcher(), None);
    }

    #[test]
    fn eval_returns_expression_result() {
        let mut scope = Scope::new();
        scope.set("aValue", 42);

        let result = scope.eval(|s| s.get("aValue").as_f64().unwrap_or(0.0));
        assert_eq!(result, 42.0);
    }

    #[test]
    fn eval_with_passes_locals() {
        let mut scope = Scope::new();
        scope.set("aValue", 42);
        let mut locals = Locals::new();
        locals.insert("delta".into(), Value::from(2));

        let result = scope.eval_with(
            |s, locals| {
                s.get("aValue").as_f64().unwrap_or(0.0)
                    + locals.get("delta").and_then(Value::as_f64).unwrap_or(0.0)
            },
            &locals,
        );
        assert_eq!(result, 44.0);
    }

    #[test]
    fn eval_async_is_not_synchronous() {
        let mut scope = Scope::new();
        scope.eval_async(|s| {
            s.set("ran", true);
        });

        assert!(scope.get("ran").is_undefined());
        assert_eq!(scope.pending_tasks(), 1);

        scope.digest().unwrap();
        assert_eq!(scope.get("ran").as_bool(), Some(true));
        assert_eq!(scope.pending_tasks(), 0);
    }

    #[test]
    fn with_config_validates() {
        assert!(Scope::with_config(ScopeConfig::new().with_ttl(0)).is_err());

        let scope = Scope::with_config(ScopeConfig::new().with_ttl(3)).unwrap();
        assert_eq!(scope.config().ttl, 3);
    }

    #[test]
    fn phase_is_cleared_after_apply() {
        let mut scope = Scope::new();
        let seen = scope.apply(|s| Ok(s.phase())).unwrap();

        assert_eq!(seen, Some(Some(Phase::Apply)));
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn phase_is_cleared_when_apply_expression_panics() {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let mut scope = Scope::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            scope.apply(|_| -> WatchResult<()> { panic!("expression panicked") })
        }));

        assert!(outcome.is_err());
        assert_eq!(scope.phase(), None);
        assert_eq!(scope.apply(|_| Ok(1)).unwrap(), Some(1));
    }
}
