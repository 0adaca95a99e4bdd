//! Listener capability and registration identifiers.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ListenerError;
use crate::set::ObservableSet;

/// Unique identifier for one registration.
///
/// Registering the same listener twice yields two ids, one per copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Callback invoked once per successful insertion.
///
/// `on_added` runs on the thread that called `add`, with no lock held, so it
/// may call back into `set` (register, unregister, add, contains) or hand work
/// to another thread that does.
///
/// Any closure of the right shape is a listener:
///
/// ```
/// use observable_set::{ListenerError, ObservableSet};
///
/// let set: ObservableSet<u32> = ObservableSet::default();
/// set.register_fn(|_set: &ObservableSet<u32>, element: &u32| {
///     if *element == 0 {
///         return Err(ListenerError::new("zero is reserved"));
///     }
///     Ok(())
/// });
/// assert!(set.add(1).unwrap());
/// assert!(set.add(0).is_err());
/// ```
pub trait SetListener<E, S = HashSet<E>>: Send + Sync {
    /// Called after `element` was newly inserted into `set`.
    ///
    /// # Errors
    ///
    /// Returning an error is reported according to the set's notify policy.
    fn on_added(&self, set: &ObservableSet<E, S>, element: &E) -> Result<(), ListenerError>;
}

impl<E, S, F> SetListener<E, S> for F
where
    F: Fn(&ObservableSet<E, S>, &E) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_added(&self, set: &ObservableSet<E, S>, element: &E) -> Result<(), ListenerError> {
        self(set, element)
    }
}

/// Shared handle to a registered listener.
pub type Listener<E, S = HashSet<E>> = Arc<dyn SetListener<E, S>>;

/// Address of the listener object, ignoring any vtable metadata.
pub(crate) fn listener_addr<L: ?Sized>(listener: *const L) -> *const () {
    listener.cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_ids_are_unique() {
        let a = ListenerId::new();
        let b = ListenerId::new();
        assert_ne!(a, b);
        assert_eq!(ListenerId::from_uuid(*a.as_uuid()), a);
    }

    #[test]
    fn listener_id_serializes_as_plain_uuid() {
        let id = ListenerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ListenerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn listener_addr_ignores_vtable() {
        let concrete = Arc::new(|_: &ObservableSet<u8>, _: &u8| Ok::<(), ListenerError>(()));
        let erased: Listener<u8> = concrete.clone();
        assert_eq!(
            listener_addr(Arc::as_ptr(&concrete)),
            listener_addr(Arc::as_ptr(&erased))
        );
    }
}
