//! Deferred Task Queue
//!
//! `eval_async` does not run its expression at the call site. The
//! expression is queued here and run by the digest: the queue is drained
//! completely before every pass, in FIFO order, and each task is popped
//! before it runs so it may schedule further tasks.

use std::collections::VecDeque;
use std::fmt;

use super::Scope;
use crate::error::WatchResult;

/// A queued expression, bound to the scope that scheduled it.
pub(crate) struct AsyncTask {
    expression: Box<dyn FnOnce(&mut Scope) -> WatchResult<()>>,
}

impl AsyncTask {
    pub(crate) fn new<F>(expression: F) -> Self
    where
        F: FnOnce(&mut Scope) -> WatchResult<()> + 'static,
    {
        Self {
            expression: Box::new(expression),
        }
    }

    pub(crate) fn run(self, scope: &mut Scope) -> WatchResult<()> {
        (self.expression)(scope)
    }
}

/// FIFO of pending tasks.
#[derive(Default)]
pub(crate) struct AsyncQueue {
    tasks: VecDeque<AsyncTask>,
}

impl AsyncQueue {
    pub(crate) fn push(&mut self, task: AsyncTask) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<AsyncTask> {
        self.tasks.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for AsyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueue")
            .field("pending", &self.tasks.len())
            .finish()
    }
}
