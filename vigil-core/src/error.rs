//! Error Types
//!
//! Errors fall into two families:
//!
//! - [`WatchError`] is a local, recoverable fault raised by user code
//!   (a watch function, a listener, a deferred task or an `apply`
//!   expression). The digest catches it, reports it to the scope's
//!   diagnostic sink and carries on with the next watcher.
//!
//! - [`DigestError`] is fatal to the digest call that produced it and is
//!   always returned to the caller. Non-convergence means the watcher graph
//!   is wired wrong; it is never retried.

use thiserror::Error;

use crate::scope::Phase;

/// A fault raised by user code running inside the scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WatchError {
    /// Free-form failure reported by a watch function, listener or task.
    #[error("{0}")]
    Failed(String),

    /// A value did not have the shape the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl WatchError {
    /// Shorthand for [`WatchError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A digest (or apply) could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// The pass budget ran out while watchers were still dirty or deferred
    /// tasks were still queued.
    #[error("{ttl} digest iterations reached without converging ({pending_tasks} deferred tasks pending)")]
    NotConverged { ttl: usize, pending_tasks: usize },

    /// A digest or apply was started while another one was running.
    #[error("{0} already in progress")]
    InProgress(Phase),
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse scope config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("ttl must be at least 1")]
    ZeroTtl,
}

pub type DigestResult<T> = Result<T, DigestError>;
pub type WatchResult<T> = Result<T, WatchError>;
