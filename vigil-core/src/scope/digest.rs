//! Digest Loop
//!
//! # Algorithm
//!
//! A digest repeats two steps until the scope is quiescent:
//!
//! 1. Drain the deferred queue. Each task is popped before it runs, so it
//!    can schedule more tasks; those run in the next round of the same
//!    drain. A task may change any state, so the dirty cursor is cleared
//!    after each one.
//! 2. Run one pass over the watchers in registration order:
//!    - evaluate the watch function and compare with the stored value;
//!    - on a change, store the new value (a deep copy in deep mode), make
//!      the watcher the dirty cursor, call the listener;
//!    - on no change, if this watcher is the dirty cursor, stop the pass:
//!      everything after it was already confirmed clean and nothing has
//!      changed since.
//!
//! The loop ends when a pass is clean and the queue is empty. If that has
//! not happened after `ttl` passes, or the queue still holds tasks after
//! `ttl` drain rounds, the digest fails with [`DigestError::NotConverged`].
//!
//! A fault in a watch function or listener is reported to the diagnostic
//! sink and the watcher counts as clean for that pass.

use tracing::{debug, debug_span, trace, warn};

use super::watcher::LastValue;
use super::{Phase, Scope};
use crate::diagnostics::FaultOrigin;
use crate::error::{DigestError, DigestResult};

/// Work done by one `digest()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestStats {
    /// Watcher passes run.
    pub passes: usize,
    /// Watch function evaluations, including ones that faulted.
    pub evaluations: usize,
    /// Listener invocations, including ones that faulted.
    pub listener_calls: usize,
    /// Deferred tasks run.
    pub tasks_run: usize,
    /// Faults reported to the diagnostic sink.
    pub faults: usize,
}

impl Scope {
    /// Run passes until no watcher is dirty and no task is queued.
    pub fn digest(&mut self) -> DigestResult<DigestStats> {
        let _phase = self.begin_phase(Phase::Digest)?;

        let span = debug_span!("digest", watchers = self.watchers.len());
        span.in_scope(|| self.run_digest())
    }

    /// Run a single pass over the watchers without touching the deferred
    /// queue. Returns whether any watcher was dirty.
    pub fn digest_once(&mut self) -> bool {
        let mut stats = DigestStats::default();
        self.pass(&mut stats)
    }

    fn run_digest(&mut self) -> DigestResult<DigestStats> {
        let ttl = self.config.ttl;
        let mut stats = DigestStats::default();
        let mut rounds = 0;
        self.last_dirty = None;

        loop {
            self.drain_queue(&mut stats, &mut rounds)?;

            let dirty = self.pass(&mut stats);
            stats.passes += 1;
            trace!(
                pass = stats.passes,
                dirty,
                pending = self.queue.len(),
                "digest pass"
            );

            if !dirty && self.queue.is_empty() {
                break;
            }
            if stats.passes >= ttl {
                return Err(self.not_converged());
            }
        }

        debug!(
            passes = stats.passes,
            evaluations = stats.evaluations,
            listener_calls = stats.listener_calls,
            tasks_run = stats.tasks_run,
            faults = stats.faults,
            "digest converged"
        );
        Ok(stats)
    }

    /// Run queued tasks in rounds until the queue is empty. A round runs the
    /// tasks queued when it started; `rounds` counts across the whole digest
    /// and is bounded by the ttl.
    fn drain_queue(&mut self, stats: &mut DigestStats, rounds: &mut usize) -> DigestResult<()> {
        while !self.queue.is_empty() {
            if *rounds >= self.config.ttl {
                return Err(self.not_converged());
            }
            *rounds += 1;

            for _ in 0..self.queue.len() {
                let Some(task) = self.queue.pop() else { break };
                stats.tasks_run += 1;
                if let Err(error) = task.run(self) {
                    stats.faults += 1;
                    self.report(FaultOrigin::AsyncTask, error);
                }
                self.last_dirty = None;
            }
        }
        Ok(())
    }

    fn not_converged(&self) -> DigestError {
        let ttl = self.config.ttl;
        let pending_tasks = self.queue.len();
        warn!(ttl, pending_tasks, "digest did not converge");
        DigestError::NotConverged { ttl, pending_tasks }
    }

    fn pass(&mut self, stats: &mut DigestStats) -> bool {
        let mut dirty = false;
        let mut index = 0;

        // The registry may grow while we iterate; re-read its length each step.
        while let Some(entry) = self.watchers.get(index).cloned() {
            index += 1;
            stats.evaluations += 1;

            let new_value = match (entry.watcher.watch_fn)(&*self) {
                Ok(value) => value,
                Err(error) => {
                    stats.faults += 1;
                    self.report(FaultOrigin::Watch(entry.id), error);
                    continue;
                }
            };

            let changed = match &*entry.last.borrow() {
                LastValue::Uninitialized => true,
                LastValue::Seen(last) => !entry.watcher.equality.are_equal(&new_value, last),
            };

            if changed {
                self.last_dirty = Some(entry.id);

                let snapshot = entry.watcher.equality.snapshot(&new_value);
                let old_value = match entry.last.replace(LastValue::Seen(snapshot)) {
                    LastValue::Uninitialized => new_value.clone(),
                    LastValue::Seen(previous) => previous,
                };

                stats.listener_calls += 1;
                match (entry.watcher.listener)(&new_value, &old_value, &mut *self) {
                    Ok(()) => dirty = true,
                    Err(error) => {
                        stats.faults += 1;
                        self.report(FaultOrigin::Listener(entry.id), error);
                    }
                }
            } else if self.last_dirty == Some(entry.id) {
                trace!(id = %entry.id, "short-circuit");
                break;
            }
        }

        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::{ScopeConfig, Watcher};

    #[test]
    fn digest_once_reports_dirtiness() {
        let mut scope = Scope::new();
        scope.set("a", 1);
        scope.register(Watcher::new(|s| s.get("a")));

        assert!(scope.digest_once());
        assert!(!scope.digest_once());

        scope.set("a", 2);
        assert!(scope.digest_once());
    }

    #[test]
    fn stats_count_passes_and_calls() {
        let mut scope = Scope::new();
        scope.set("a", 1);
        scope.watch(|s| s.get("a"), |_, _, _| {});

        let stats = scope.digest().unwrap();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.listener_calls, 1);
        assert_eq!(stats.faults, 0);

        let stats = scope.digest().unwrap();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.listener_calls, 0);
    }

    #[test]
    fn empty_scope_digests_in_one_pass() {
        let mut scope = Scope::new();
        let stats = scope.digest().unwrap();
        assert_eq!(stats, DigestStats { passes: 1, ..Default::default() });
    }

    #[test]
    fn first_listener_call_sees_new_as_old() {
        let mut scope = Scope::new();
        scope.set("someValue", 123);
        scope.watch(
            |s| s.get("someValue"),
            |new, old, s| {
                s.set("oldValueGiven", old.clone());
                s.set("newValueGiven", new.clone());
            },
        );

        scope.digest().unwrap();
        assert_eq!(scope.get("oldValueGiven"), Value::from(123));
        assert_eq!(scope.get("newValueGiven"), Value::from(123));
    }

    #[test]
    fn undefined_is_a_change_from_uninitialized() {
        let mut scope = Scope::new();
        let id = scope.watch(|s| s.get("missing"), |_, _, s| {
            s.update("calls", |v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
        });

        scope.digest().unwrap();
        assert_eq!(scope.get("calls").as_f64(), Some(1.0));
        assert!(matches!(
            scope.last_value(id),
            Some(LastValue::Seen(Value::Undefined))
        ));
    }

    #[test]
    fn digest_from_listener_is_rejected() {
        let mut scope = Scope::new();
        scope.watch(
            |_| Value::Null,
            |_, _, s| {
                let nested = s.digest();
                s.set("nested", nested.is_err());
                s.set("phase", s.phase().map(|p| p.to_string()));
            },
        );

        scope.digest().unwrap();
        assert_eq!(scope.get("nested").as_bool(), Some(true));
        assert_eq!(scope.get("phase").as_str(), Some("digest"));
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn phase_is_cleared_after_failure() {
        let mut scope = Scope::new();
        scope.set("n", 0);
        scope.watch(
            |s| s.get("n"),
            |new, _, s| {
                s.set("n", new.as_f64().unwrap_or(0.0) + 1.0);
            },
        );

        assert!(scope.digest().is_err());
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn phase_is_cleared_when_a_listener_panics() {
        use std::cell::Cell;
        use std::panic::{catch_unwind, AssertUnwindSafe};
        use std::rc::Rc;

        let mut scope = Scope::new();
        let armed = Rc::new(Cell::new(true));
        let armed_clone = armed.clone();
        scope.watch(
            |_| Value::Null,
            move |_, _, _| {
                if armed_clone.replace(false) {
                    panic!("listener panicked");
                }
            },
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| scope.digest()));
        assert!(outcome.is_err());
        assert_eq!(scope.phase(), None);
        assert!(scope.digest().is_ok());
    }

    #[test]
    fn task_rescheduled_within_budget_converges() {
        let mut scope = Scope::with_config(ScopeConfig::new().with_ttl(3)).unwrap();
        scope.eval_async(|s| {
            s.eval_async(|s| {
                s.set("ran", true);
            });
        });

        let stats = scope.digest().unwrap();
        assert_eq!(stats.tasks_run, 2);
        assert_eq!(scope.get("ran").as_bool(), Some(true));
    }
}
