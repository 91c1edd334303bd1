//! One-way observers of batch transmission.

use std::sync::{Arc, PoisonError, RwLock};

/// Receives notifications about flushes. Every method defaults to a no-op.
///
/// Callbacks run on whichever task completes the flush and must not block.
pub trait TelemetryListener: Send + Sync {
    /// A batch of `count` events was handed to the transport.
    fn on_batch_sent(&self, _count: usize) {}

    /// The server answered a batch with `status`.
    fn on_transmission_result(&self, _success: bool, _status: u16) {}

    /// A batch was lost without a server response.
    fn on_transmission_failure(&self, _message: &str) {}
}

/// Registered listeners. Registration is identity-based: the same `Arc`
/// is never added twice.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn TelemetryListener>>>,
}

impl ListenerSet {
    /// Returns false when the listener was already registered.
    pub(crate) fn add(&self, listener: Arc<dyn TelemetryListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns false when the listener was not registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn TelemetryListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Call `f` for each listener on a snapshot, so listeners may
    /// register or unregister from inside a callback.
    pub(crate) fn notify(&self, f: impl Fn(&dyn TelemetryListener)) {
        let snapshot: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in snapshot {
            f(listener.as_ref());
        }
    }
}
