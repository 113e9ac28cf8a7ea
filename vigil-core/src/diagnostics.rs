//! Fault Reporting
//!
//! User code running inside a digest (watch functions, listeners, deferred
//! tasks, `apply` expressions) may fail. Such a fault is local: the digest
//! reports it here and moves on to the next watcher.
//!
//! Where reports go is up to the embedding application. A scope owns one
//! [`DiagnosticSink`]; the default, [`TracingSink`], emits a `tracing` error
//! event, which is silent unless a subscriber is installed.
//! [`RecordingSink`] keeps faults in memory for inspection, and any
//! `Fn(&Fault)` closure is a sink too.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::WatchError;
use crate::scope::WatcherId;

/// Where a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// The watch function of the given watcher.
    Watch(WatcherId),
    /// The listener of the given watcher.
    Listener(WatcherId),
    /// A task scheduled with `eval_async`.
    AsyncTask,
    /// The expression passed to `apply`.
    Apply,
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultOrigin::Watch(id) => write!(f, "watch function of {id}"),
            FaultOrigin::Listener(id) => write!(f, "listener of {id}"),
            FaultOrigin::AsyncTask => f.write_str("deferred task"),
            FaultOrigin::Apply => f.write_str("apply expression"),
        }
    }
}

/// A recoverable fault caught by the scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub origin: FaultOrigin,
    pub error: WatchError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.origin, self.error)
    }
}

/// Receives faults caught during digests.
pub trait DiagnosticSink {
    fn report(&self, fault: &Fault);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Fault),
{
    fn report(&self, fault: &Fault) {
        self(fault)
    }
}

/// Reports faults as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, fault: &Fault) {
        tracing::error!(origin = %fault.origin, error = %fault.error, "scope fault");
    }
}

/// Collects faults in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the scope
/// and keep another to inspect.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    faults: Rc<RefCell<Vec<Fault>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every fault reported so far.
    pub fn faults(&self) -> Vec<Fault> {
        self.faults.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.faults.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.faults.borrow_mut().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, fault: &Fault) {
        self.faults.borrow_mut().push(fault.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn recording_sink_clones_share_buffer() {
        let sink = RecordingSink::new();
        let handle = sink.clone();

        sink.report(&Fault {
            origin: FaultOrigin::AsyncTask,
            error: WatchError::msg("boom"),
        });

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.faults()[0].origin, FaultOrigin::AsyncTask);

        handle.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        let sink = move |_: &Fault| seen_clone.set(seen_clone.get() + 1);

        sink.report(&Fault {
            origin: FaultOrigin::Apply,
            error: WatchError::msg("x"),
        });
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn fault_display_names_origin() {
        let fault = Fault {
            origin: FaultOrigin::Apply,
            error: WatchError::msg("bad input"),
        };
        assert_eq!(fault.to_string(), "apply expression failed: bad input");
    }
}
