//! Change notifications.
//!
//! Subscribers are plain callbacks invoked synchronously on the thread that
//! made the change, after the document lock has been released. A callback
//! may therefore read the document, but it must not assume it runs before
//! the next mutation.

use crate::track::TrackId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which part of a track's data changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChange {
    Name,
    Content,
}

/// Notification emitted by a [`TrackDocument`](super::TrackDocument).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Added(TrackId),
    Removed(TrackId),
    Permuted,
    Resized(TrackId),
    SelectionChanged(TrackId),
    DataChanged(TrackId, DataChange),
}

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of callbacks for events of type `E`.
pub(crate) struct Subscribers<E> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> Subscribers<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(sub, _)| *sub != id);
        callbacks.len() != before
    }

    /// Delivers `events` in order to every subscriber.
    pub fn notify(&self, events: &[E]) {
        if events.is_empty() {
            return;
        }
        // Callbacks may subscribe or unsubscribe, so never call them with
        // the list locked.
        let callbacks: Vec<Callback<E>> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for event in events {
            for callback in &callbacks {
                callback(event);
            }
        }
    }
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}
