//! Vigil Core
//!
//! This crate implements dirty-checking change detection. It provides:
//!
//! - Scopes: mutable observation contexts holding application state
//! - Watchers: watch functions paired with change listeners
//! - The digest loop: repeated evaluation until nothing changes
//! - Deferred tasks scheduled within the current digest
//!
//! # Architecture
//!
//! - `scope`: the [`Scope`] type, its watcher registry and the digest loop
//! - `value`: the dynamic [`Value`] type scope properties hold
//! - `diagnostics`: where faults caught during a digest are reported
//! - `error`: typed errors
//! - `config`: scope tunables
//!
//! Everything is single-threaded and synchronous. "Deferred" means "later in
//! the same digest", never on another thread or event loop.
//!
//! # Example
//!
//! ```rust
//! use vigil_core::Scope;
//!
//! let mut scope = Scope::new();
//! scope.set("name", "Jane");
//!
//! scope.watch(
//!     |s| s.get("nameUpper"),
//!     |new, _old, s| {
//!         if let Some(initial) = new.as_str().and_then(|upper| upper.chars().next()) {
//!             s.set("initial", format!("{initial}."));
//!         }
//!     },
//! );
//! scope.watch(
//!     |s| s.get("name"),
//!     |new, _old, s| {
//!         if let Some(name) = new.as_str() {
//!             s.set("nameUpper", name.to_uppercase());
//!         }
//!     },
//! );
//!
//! scope.digest().unwrap();
//! assert_eq!(scope.get("initial").as_str(), Some("J."));
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod scope;
pub mod value;

pub use config::ScopeConfig;
pub use diagnostics::{DiagnosticSink, Fault, FaultOrigin, RecordingSink, TracingSink};
pub use error::{ConfigError, DigestError, DigestResult, WatchError, WatchResult};
pub use scope::{
    DigestStats, Equality, LastValue, Locals, Phase, Scope, Watcher, WatcherId,
};
pub use value::Value;
