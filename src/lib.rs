//! # observable-set - A set that tells you when it grows
//!
//! `ObservableSet` decorates an ordinary set with a registry of listeners that
//! are invoked synchronously, on the inserting thread, for every element that
//! is newly added.
//!
//! ## Core Concepts
//!
//! - **Listener**: a [`SetListener`] callback, shared as an `Arc` and compared by address
//! - **Registry**: the ordered list of registrations; order is notification order
//! - **Snapshot**: a copy of the registry taken at insertion time; listeners are
//!   called from the snapshot with no lock held
//! - **Notify policy**: whether a failing listener aborts the notification or is isolated
//!
//! Because callbacks never run under a lock, a listener may change the registry
//! or add more elements, either directly or by handing the call to another
//! thread and blocking on it.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use observable_set::{ListenerError, ObservableSet, SetListener};
//!
//! struct StopAt(u32);
//!
//! impl SetListener<u32> for StopAt {
//!     fn on_added(&self, set: &ObservableSet<u32>, element: &u32) -> Result<(), ListenerError> {
//!         if *element == self.0 {
//!             set.unregister(self);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let set: ObservableSet<u32> = ObservableSet::default();
//! let listener = Arc::new(StopAt(3));
//! set.register(listener.clone());
//!
//! set.add_all(1..=5).unwrap();
//! assert!(!set.contains_listener(&*listener));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backing;
pub mod config;
pub mod error;
pub mod listener;
pub mod set;
pub mod stream;

// Re-export primary types at crate root for convenience
pub use backing::BackingSet;
pub use config::{NotifyPolicy, ObservableSetConfig, MAX_LISTENER_CAPACITY};
pub use error::{ListenerError, ObservableError, ObservableResult};
pub use listener::{Listener, ListenerId, SetListener};
pub use set::ObservableSet;
pub use stream::AdditionStream;
