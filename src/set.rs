//! The observable set.
//!
//! `ObservableSet` decorates a [`BackingSet`] with a registry of listeners that
//! are called synchronously for every newly inserted element.
//!
//! Two locks are involved:
//! - the backing lock guards the wrapped set;
//! - the registry lock guards the ordered listener list.
//!
//! `add` inserts and copies the registry while holding the backing lock (lock
//! order is always backing, then registry), drops both guards, and only then
//! walks the copy. Listener code therefore never runs under either lock and
//! may call back into the set from the same thread or from a thread it
//! blocks on.

use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace, warn};

use crate::backing::BackingSet;
use crate::config::{NotifyPolicy, ObservableSetConfig, MAX_LISTENER_CAPACITY};
use crate::error::{ListenerError, ObservableError, ObservableResult};
use crate::listener::{listener_addr, Listener, ListenerId, SetListener};
use crate::stream::AdditionStream;

fn lock_err(context: &'static str) -> ObservableError {
    ObservableError::Poisoned { context }
}

struct Registration<E, S> {
    id: ListenerId,
    listener: Listener<E, S>,
}

impl<E, S> Registration<E, S> {
    fn is<L: ?Sized>(&self, listener: &L) -> bool {
        let target: *const L = listener;
        listener_addr(Arc::as_ptr(&self.listener)) == listener_addr(target)
            && mem::size_of_val(&*self.listener) == mem::size_of_val(listener)
    }
}

type Registry<E, S> = Mutex<Vec<Registration<E, S>>>;

// Registry critical sections never run user code, so a poisoned guard still
// holds a consistent list.
fn lock_registry<E, S>(registry: &Registry<E, S>) -> MutexGuard<'_, Vec<Registration<E, S>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_by_id<E, S>(registry: &Registry<E, S>, id: ListenerId) -> Option<Registration<E, S>> {
    let mut guard = lock_registry(registry);
    guard
        .iter()
        .position(|r| r.id == id)
        .map(|pos| guard.remove(pos))
}

/// Removes a registration by id without borrowing the set.
pub(crate) trait Detach: Send + Sync {
    /// Drops the registration if both it and the set still exist.
    fn detach(&self, id: ListenerId) -> bool;
}

/// Weak handle on a set's registry. Outliving the set is harmless.
pub(crate) struct RegistryHandle<E, S> {
    registry: Weak<Registry<E, S>>,
}

impl<E, S> Detach for RegistryHandle<E, S> {
    fn detach(&self, id: ListenerId) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        take_by_id(&registry, id).is_some()
    }
}

impl<E, S> Clone for Registration<E, S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

/// A thread-safe set that notifies registered listeners of every insertion.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use observable_set::{ObservableSet, ListenerError};
///
/// let set: ObservableSet<i32> = ObservableSet::default();
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&log);
/// set.register_fn(move |_set: &ObservableSet<i32>, element: &i32| {
///     sink.lock().unwrap().push(*element);
///     Ok::<(), ListenerError>(())
/// });
///
/// assert!(set.add_all([1, 2, 3]).unwrap());
/// assert!(!set.add(2).unwrap());
/// assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
/// ```
pub struct ObservableSet<E, S = HashSet<E>> {
    backing: Mutex<S>,
    listeners: Arc<Registry<E, S>>,
    config: ObservableSetConfig,
    isolated_failures: AtomicU64,
}

impl<E, S> ObservableSet<E, S>
where
    S: BackingSet<E>,
{
    /// Wraps `backing` with the default configuration.
    #[must_use]
    pub fn new(backing: S) -> Self {
        Self::with_config(backing, ObservableSetConfig::default())
    }

    /// Wraps `backing` with an explicit configuration.
    ///
    /// `listener_capacity` is only a hint and is capped at
    /// [`MAX_LISTENER_CAPACITY`].
    #[must_use]
    pub fn with_config(backing: S, config: ObservableSetConfig) -> Self {
        let capacity = config.listener_capacity.min(MAX_LISTENER_CAPACITY);
        Self {
            backing: Mutex::new(backing),
            listeners: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
            config,
            isolated_failures: AtomicU64::new(0),
        }
    }

    /// The configuration this set was built with.
    #[must_use]
    pub const fn config(&self) -> &ObservableSetConfig {
        &self.config
    }

    /// Number of listener failures swallowed under [`NotifyPolicy::Isolate`].
    #[must_use]
    pub fn isolated_failures(&self) -> u64 {
        self.isolated_failures.load(Ordering::Relaxed)
    }

    /// Appends `listener` to the registry.
    ///
    /// The listener is notified starting with the first insertion whose
    /// snapshot is taken after this call returns. Registering the same handle
    /// twice notifies it twice per element.
    pub fn register(&self, listener: Listener<E, S>) -> ListenerId {
        let id = ListenerId::new();
        let count = {
            let mut registry = self.registry();
            registry.push(Registration { id, listener });
            registry.len()
        };

        debug!(listener_id = %id, listeners = count, "Registered listener");
        id
    }

    /// Registers a closure as a listener.
    pub fn register_fn<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Self, &E) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.register(Arc::new(listener))
    }

    /// Removes the first registration of `listener`, compared by address.
    ///
    /// Pass `&*handle` for a shared handle, or `self` from inside
    /// [`SetListener::on_added`]. Safe to call while a notification is in
    /// progress on this or any other thread; in-flight snapshots are not
    /// affected.
    ///
    /// Identity is the data address plus the object size. A listener stored
    /// at offset zero of a registered wrapper of the same size (a newtype)
    /// still matches the wrapper; use [`unregister_id`](Self::unregister_id)
    /// when that can happen.
    pub fn unregister<L>(&self, listener: &L) -> bool
    where
        L: SetListener<E, S> + ?Sized,
    {
        let removed = {
            let mut registry = self.registry();
            registry
                .iter()
                .position(|r| r.is(listener))
                .map(|pos| registry.remove(pos))
        };

        // The removed handle is dropped here, outside the registry lock.
        Self::log_unregister(removed)
    }

    /// Removes the registration with the given id.
    pub fn unregister_id(&self, id: ListenerId) -> bool {
        let removed = take_by_id(&self.listeners, id);
        Self::log_unregister(removed)
    }

    /// Removes every listener, returning how many registrations were dropped.
    pub fn clear_listeners(&self) -> usize {
        let removed = mem::take(&mut *self.registry());
        let count = removed.len();
        drop(removed);

        debug!(count, "Cleared all listeners");
        count
    }

    /// True if `listener` currently has at least one registration.
    #[must_use]
    pub fn contains_listener<L>(&self, listener: &L) -> bool
    where
        L: SetListener<E, S> + ?Sized,
    {
        self.registry().iter().any(|r| r.is(listener))
    }

    /// Number of registrations, counting duplicates.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    /// Inserts `element` and, if it was not already present, notifies every
    /// listener registered at the moment of insertion.
    ///
    /// Listeners run on the calling thread, in registration order, with no
    /// lock held.
    ///
    /// Ordering across threads is not guaranteed. Concurrent `add` calls
    /// insert one at a time, but their notifications run in parallel and a
    /// listener may see a later insertion before an earlier one.
    ///
    /// # Errors
    ///
    /// - `Poisoned` if the backing lock was poisoned.
    /// - `Listener` if a listener failed and the policy is
    ///   [`NotifyPolicy::FailFast`]. The element remains inserted.
    pub fn add(&self, element: E) -> ObservableResult<bool>
    where
        E: Clone,
    {
        let snapshot = {
            let mut backing = self.lock_backing("backing.add")?;
            if !backing.insert(element.clone()) {
                trace!("Duplicate insert ignored");
                return Ok(false);
            }
            // Taken before the backing guard drops so concurrent adds cannot
            // interleave insert and snapshot.
            let snapshot = self.registry().clone();
            drop(backing);
            snapshot
        };

        self.notify(&element, &snapshot)?;
        Ok(true)
    }

    /// Adds each element in iteration order, returning true if any was new.
    ///
    /// Each element's notifications complete before the next element is
    /// inserted.
    ///
    /// # Errors
    ///
    /// Stops at the first error from [`add`](Self::add); earlier elements
    /// stay inserted.
    pub fn add_all<I>(&self, elements: I) -> ObservableResult<bool>
    where
        I: IntoIterator<Item = E>,
        E: Clone,
    {
        let mut changed = false;
        for element in elements {
            changed |= self.add(element)?;
        }
        Ok(changed)
    }

    /// Removes `element`. Removal does not notify listeners.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the backing lock was poisoned.
    pub fn remove(&self, element: &E) -> ObservableResult<bool> {
        Ok(self.lock_backing("backing.remove")?.remove(element))
    }

    /// Membership test.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the backing lock was poisoned.
    pub fn contains(&self, element: &E) -> ObservableResult<bool> {
        Ok(self.lock_backing("backing.contains")?.contains(element))
    }

    /// Number of elements.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the backing lock was poisoned.
    pub fn len(&self) -> ObservableResult<usize> {
        Ok(self.lock_backing("backing.len")?.len())
    }

    /// True if the set has no elements.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the backing lock was poisoned.
    pub fn is_empty(&self) -> ObservableResult<bool> {
        Ok(self.lock_backing("backing.is_empty")?.is_empty())
    }

    /// Copies the current elements out in the backing set's order.
    ///
    /// # Errors
    ///
    /// Returns `Poisoned` if the backing lock was poisoned.
    pub fn to_vec(&self) -> ObservableResult<Vec<E>>
    where
        E: Clone,
    {
        Ok(self.lock_backing("backing.to_vec")?.to_vec())
    }

    /// Opens a stream that receives a copy of every element added from now on.
    ///
    /// `capacity` bounds the stream buffer; when it is full further elements
    /// are dropped and counted rather than blocking `add`. Dropping the
    /// stream removes its registration.
    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> AdditionStream<E>
    where
        E: Clone + Send + 'static,
        S: 'static,
    {
        AdditionStream::attach(self, capacity)
    }

    pub(crate) fn registry_handle(&self) -> RegistryHandle<E, S> {
        RegistryHandle {
            registry: Arc::downgrade(&self.listeners),
        }
    }

    fn notify(&self, element: &E, snapshot: &[Registration<E, S>]) -> ObservableResult<()> {
        if snapshot.is_empty() {
            return Ok(());
        }
        trace!(listeners = snapshot.len(), "Notifying listeners");

        for (position, registration) in snapshot.iter().enumerate() {
            let Err(source) = registration.listener.on_added(self, element) else {
                continue;
            };

            match self.config.notify_policy {
                NotifyPolicy::FailFast => {
                    debug!(
                        listener_id = %registration.id,
                        position,
                        error = %source,
                        "Listener failed, aborting notification"
                    );
                    return Err(ObservableError::Listener {
                        listener: registration.id,
                        position,
                        source,
                    });
                }
                NotifyPolicy::Isolate => {
                    self.isolated_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        listener_id = %registration.id,
                        position,
                        error = %source,
                        "Listener failed, continuing notification"
                    );
                }
            }
        }

        Ok(())
    }

    fn log_unregister(removed: Option<Registration<E, S>>) -> bool {
        match removed {
            Some(registration) => {
                debug!(listener_id = %registration.id, "Unregistered listener");
                true
            }
            None => {
                debug!("Attempted to unregister a listener that is not registered");
                false
            }
        }
    }

    fn lock_backing(&self, context: &'static str) -> ObservableResult<MutexGuard<'_, S>> {
        self.backing.lock().map_err(|_| lock_err(context))
    }

    fn registry(&self) -> MutexGuard<'_, Vec<Registration<E, S>>> {
        lock_registry(&self.listeners)
    }
}

impl<E, S> Default for ObservableSet<E, S>
where
    S: BackingSet<E> + Default,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<E, S> fmt::Debug for ObservableSet<E, S>
where
    S: BackingSet<E>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet")
            .field("listeners", &self.listener_count())
            .field("config", &self.config)
            .field("isolated_failures", &self.isolated_failures())
            .finish_non_exhaustive()
    }
}
