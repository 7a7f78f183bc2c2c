//! Bounded drop-oldest frame buffer
//!
//! Hand-off between the ingestion thread and the processing worker. The
//! producer is real-time and must never wait; the consumer may be arbitrarily
//! slow. When the buffer is full the oldest frame is evicted to admit the new
//! one, so staleness is capped at `capacity` frames.
//!
//! ```text
//!  push(f4) on [f1, f2, f3] (capacity 3)  =>  [f2, f3, f4]   (f1 evicted)
//!  pop()                                  =>  f2
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued into free capacity
    Stored,
    /// Buffer was full; the oldest element was evicted first
    EvictedOldest,
}

/// Fixed-capacity FIFO with drop-oldest-on-full semantics
///
/// Thread-safe: one producer and one consumer may live in different
/// execution contexts.
#[derive(Debug)]
pub struct FrameBuffer<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> FrameBuffer<T> {
    /// Create a buffer holding at most `capacity` elements.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking holder cannot leave the deque half-modified
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue `item`, evicting the oldest element if full. Never blocks on
    /// space and never rejects the new element.
    pub fn push(&self, item: T) -> PushOutcome {
        let outcome = {
            let mut items = self.lock();
            let outcome = if items.len() >= self.capacity {
                items.pop_front();
                PushOutcome::EvictedOldest
            } else {
                PushOutcome::Stored
            };
            items.push_back(item);
            outcome
        };

        self.available.notify_one();
        outcome
    }

    /// Remove and return the oldest element, blocking until one is available
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.available.wait(items).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(items, remaining)
                .unwrap_or_else(|e| e.into_inner());
            items = guard;
        }
    }

    /// Remove and return the oldest element without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Number of buffered elements
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of buffered elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
