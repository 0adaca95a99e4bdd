//! Pull-based subscriptions to additions.
//!
//! An [`AdditionStream`] is a bounded channel fed by a forwarding listener.
//! The forwarding listener never blocks `add`: when the buffer is full the
//! element is dropped and counted.
//!
//! Dropping the stream removes the forwarding registration through a weak
//! handle on the set's registry. A notification already holding the
//! forwarder in its snapshot sees the closed channel and unregisters it from
//! inside the callback instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::debug;

use crate::backing::BackingSet;
use crate::error::{ListenerError, ObservableError, ObservableResult};
use crate::listener::{ListenerId, SetListener};
use crate::set::{Detach, ObservableSet};

const STREAM_PATH: &str = "addition_stream";

struct ForwardingListener<E> {
    tx: Sender<E>,
    dropped: Arc<AtomicU64>,
}

impl<E, S> SetListener<E, S> for ForwardingListener<E>
where
    E: Clone + Send,
    S: BackingSet<E>,
{
    fn on_added(&self, set: &ObservableSet<E, S>, element: &E) -> Result<(), ListenerError> {
        match self.tx.try_send(element.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                set.unregister(self);
                debug!("Addition stream closed, forwarding listener removed");
            }
        }
        Ok(())
    }
}

/// A subscription stream of newly added elements.
///
/// Created by [`ObservableSet::subscribe`]. Elements arrive in the order the
/// notifying threads delivered them.
pub struct AdditionStream<E> {
    listener_id: ListenerId,
    rx: Receiver<E>,
    dropped: Arc<AtomicU64>,
    registry: Box<dyn Detach>,
}

impl<E> AdditionStream<E>
where
    E: Clone + Send + 'static,
{
    pub(crate) fn attach<S>(set: &ObservableSet<E, S>, capacity: usize) -> Self
    where
        S: BackingSet<E> + 'static,
    {
        let (tx, rx) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let listener_id = set.register(Arc::new(ForwardingListener {
            tx,
            dropped: Arc::clone(&dropped),
        }));
        debug!(listener_id = %listener_id, capacity, "Opened addition stream");

        Self {
            listener_id,
            rx,
            dropped,
            registry: Box::new(set.registry_handle()),
        }
    }
}

impl<E> Drop for AdditionStream<E> {
    fn drop(&mut self) {
        if self.registry.detach(self.listener_id) {
            debug!(listener_id = %self.listener_id, "Closed addition stream");
        }
    }
}

impl<E> fmt::Debug for AdditionStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdditionStream")
            .field("listener_id", &self.listener_id)
            .field("buffered", &self.rx.len())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl<E> AdditionStream<E> {
    /// The registration backing this stream.
    ///
    /// Passing it to [`ObservableSet::unregister_id`] ends the subscription;
    /// buffered elements can still be drained afterwards.
    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Elements discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of buffered elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Receive the next element (blocking).
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` once the subscription has ended (the set was
    /// dropped or the listener unregistered) and the buffer is empty.
    pub fn recv(&self) -> ObservableResult<E> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next element with a timeout.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if nothing arrived in time, or `Disconnected` as for
    /// [`recv`](Self::recv).
    pub fn recv_timeout(&self, timeout: Duration) -> ObservableResult<E> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ObservableError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive a buffered element without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` as for [`recv`](Self::recv).
    pub fn try_recv(&self) -> ObservableResult<Option<E>> {
        match self.rx.try_recv() {
            Ok(element) => Ok(Some(element)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Takes every currently buffered element.
    pub fn drain(&self) -> Vec<E> {
        self.rx.try_iter().collect()
    }
}

fn disconnected() -> ObservableError {
    ObservableError::Disconnected {
        path: STREAM_PATH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_receives_additions_in_order() {
        let set: ObservableSet<u32> = ObservableSet::default();
        set.add(0).unwrap();
        let stream = set.subscribe(8);

        set.add_all([1, 2, 3]).unwrap();
        set.add(2).unwrap();

        assert_eq!(stream.len(), 3);
        assert_eq!(stream.recv().unwrap(), 1);
        assert_eq!(stream.try_recv().unwrap(), Some(2));
        assert_eq!(stream.drain(), vec![3]);
        assert!(stream.is_empty());
        assert_eq!(stream.try_recv().unwrap(), None);
    }

    #[test]
    fn full_buffer_drops_instead_of_blocking() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(2);

        set.add_all(0..5).unwrap();

        assert_eq!(stream.drain(), vec![0, 1]);
        assert_eq!(stream.dropped(), 3);
    }

    #[test]
    fn zero_capacity_still_buffers_one() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(0);
        set.add(9).unwrap();
        assert_eq!(stream.try_recv().unwrap(), Some(9));
    }

    #[test]
    fn dropping_stream_unregisters_immediately() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(4);
        assert_eq!(set.listener_count(), 1);

        drop(stream);
        assert_eq!(set.listener_count(), 0);
    }

    #[test]
    fn subscribe_and_drop_without_adds_does_not_grow_registry() {
        let set: ObservableSet<u32> = ObservableSet::default();
        for _ in 0..1000 {
            drop(set.subscribe(1));
        }
        assert_eq!(set.listener_count(), 0);
    }

    #[test]
    fn stream_dropped_mid_notification_is_removed_once() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let slot: Arc<std::sync::Mutex<Option<AdditionStream<u32>>>> = Arc::default();

        let closer = Arc::clone(&slot);
        let first = set.register_fn(move |_, _| {
            closer.lock().unwrap().take();
            Ok(())
        });
        *slot.lock().unwrap() = Some(set.subscribe(4));
        assert_eq!(set.listener_count(), 2);

        // The forwarder is still in this snapshot after its stream is gone.
        set.add(1).unwrap();
        assert!(slot.lock().unwrap().is_none());
        assert_eq!(set.listener_count(), 1);

        set.add(2).unwrap();
        assert!(set.unregister_id(first));
        assert_eq!(set.listener_count(), 0);
    }

    #[test]
    fn stream_outliving_set_drops_cleanly() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(4);
        drop(set);
        drop(stream);
    }

    #[test]
    fn unregister_id_ends_stream_after_drain() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(4);
        set.add(1).unwrap();

        assert!(set.unregister_id(stream.listener_id()));
        set.add(2).unwrap();

        assert_eq!(stream.recv().unwrap(), 1);
        assert!(stream.recv().unwrap_err().is_disconnected());
    }

    #[test]
    fn recv_timeout_reports_timeout() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(1);
        let err = stream.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_timeout());
        drop(set);
    }

    #[test]
    fn dropping_set_disconnects_stream() {
        let set: ObservableSet<u32> = ObservableSet::default();
        let stream = set.subscribe(4);
        set.add(7).unwrap();
        drop(set);

        assert_eq!(stream.recv().unwrap(), 7);
        assert!(stream.recv().unwrap_err().is_disconnected());
        assert!(stream.try_recv().unwrap_err().is_disconnected());
    }
}
