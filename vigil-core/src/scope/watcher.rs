//! Watchers
//!
//! A watcher pairs a watch function (a read of some value from the scope)
//! with a listener (called when that value changes between evaluations).
//! Watchers are built with [`Watcher`] and handed to
//! [`Scope::register`](super::Scope::register), which owns them for the
//! rest of the scope's life.

use std::cell::RefCell;
use std::fmt;

use super::equality::Equality;
use super::Scope;
use crate::error::WatchResult;
use crate::value::Value;

/// Identifier of a registered watcher, unique within its scope.
///
/// Ids are handed out in registration order, so they also sort in
/// evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

pub(crate) type WatchFn = Box<dyn Fn(&Scope) -> WatchResult<Value>>;
pub(crate) type ListenerFn = Box<dyn Fn(&Value, &Value, &mut Scope) -> WatchResult<()>>;

/// What a watcher remembers about its previous evaluation.
///
/// `Uninitialized` is distinct from every [`Value`], including `Undefined`,
/// `Null` and `NaN`, so the first evaluation always counts as a change.
#[derive(Debug, Clone, Default)]
pub enum LastValue {
    #[default]
    Uninitialized,
    Seen(Value),
}

/// A watch function, its listener and its equality mode, ready to register.
///
/// ```rust
/// use vigil_core::{Scope, Watcher};
///
/// let mut scope = Scope::new();
/// scope.set("items", vigil_core::Value::array([1, 2]));
/// scope.register(
///     Watcher::new(|s| s.get("items"))
///         .listener(|new, _old, s| {
///             s.set("count", new.len().unwrap_or(0));
///         })
///         .deep(),
/// );
/// scope.digest().unwrap();
/// assert_eq!(scope.get("count").as_f64(), Some(2.0));
/// ```
pub struct Watcher {
    pub(crate) watch_fn: WatchFn,
    pub(crate) listener: ListenerFn,
    pub(crate) equality: Equality,
}

impl Watcher {
    /// Watch an infallible function. The listener defaults to a no-op.
    pub fn new<W>(watch_fn: W) -> Self
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        Self::try_new(move |scope| Ok(watch_fn(scope)))
    }

    /// Watch a function that may fail. An `Err` is reported to the scope's
    /// diagnostic sink and the watcher counts as clean for that pass.
    pub fn try_new<W>(watch_fn: W) -> Self
    where
        W: Fn(&Scope) -> WatchResult<Value> + 'static,
    {
        Self {
            watch_fn: Box::new(watch_fn),
            listener: Box::new(noop_listener),
            equality: Equality::Identity,
        }
    }

    /// Set the listener, called as `listener(new, old, scope)`.
    pub fn listener<L>(self, listener: L) -> Self
    where
        L: Fn(&Value, &Value, &mut Scope) + 'static,
    {
        self.try_listener(move |new, old, scope| {
            listener(new, old, scope);
            Ok(())
        })
    }

    /// Set a listener that may fail.
    pub fn try_listener<L>(mut self, listener: L) -> Self
    where
        L: Fn(&Value, &Value, &mut Scope) -> WatchResult<()> + 'static,
    {
        self.listener = Box::new(listener);
        self
    }

    /// Compare structurally and keep deep-copied snapshots.
    pub fn deep(self) -> Self {
        self.equality(Equality::Deep)
    }

    pub fn equality(mut self, equality: Equality) -> Self {
        self.equality = equality;
        self
    }
}

fn noop_listener(_: &Value, _: &Value, _: &mut Scope) -> WatchResult<()> {
    Ok(())
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("equality", &self.equality)
            .finish_non_exhaustive()
    }
}

/// A watcher as stored in the registry.
pub(crate) struct Registered {
    pub(crate) id: WatcherId,
    pub(crate) watcher: Watcher,
    pub(crate) last: RefCell<LastValue>,
}

impl Registered {
    pub(crate) fn new(id: WatcherId, watcher: Watcher) -> Self {
        Self {
            id,
            watcher,
            last: RefCell::new(LastValue::Uninitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_ids_order_by_registration() {
        let first = WatcherId::new(0);
        let second = WatcherId::new(1);

        assert!(first < second);
        assert_ne!(first, second);
        assert_eq!(second.to_string(), "watcher#1");
    }

    #[test]
    fn builder_defaults_to_identity_and_noop_listener() {
        let watcher = Watcher::new(|_| Value::Null);
        assert_eq!(watcher.equality, Equality::Identity);

        let mut scope = Scope::new();
        assert!((watcher.listener)(&Value::Null, &Value::Null, &mut scope).is_ok());
    }

    #[test]
    fn deep_sets_equality() {
        let watcher = Watcher::new(|_| Value::Null).deep();
        assert_eq!(watcher.equality, Equality::Deep);
    }

    #[test]
    fn last_value_starts_uninitialized() {
        let registered = Registered::new(WatcherId::new(7), Watcher::new(|_| Value::Null));
        assert!(matches!(*registered.last.borrow(), LastValue::Uninitialized));
    }
}
