//! Capacity-bounded, append-only event buffer.

use beacon_core::models::Event;
use thiserror::Error;

/// Returned by [`EventQueue::append`] when the queue already holds `capacity`
/// events. Carries the rejected event back to the caller.
#[derive(Debug, Error)]
#[error("event queue is full ({capacity} events)")]
pub struct QueueFull {
    pub capacity: usize,
    pub event: Event,
}

/// Ordered buffer of pending events with a hard capacity.
///
/// There is no per-event removal: [`EventQueue::drain_all`] is the only way
/// events leave the queue, so a batch is always handed off whole.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<Event>,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::new(),
            capacity,
        }
    }

    /// Append an event. `Ok(true)` means this append filled the queue and the
    /// caller should flush before appending again.
    pub fn append(&mut self, event: Event) -> Result<bool, QueueFull> {
        if self.events.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
                event,
            });
        }
        self.events.push(event);
        Ok(self.is_full())
    }

    /// Remove and return every queued event, in append order.
    pub fn drain_all(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True when the next append would be rejected.
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
