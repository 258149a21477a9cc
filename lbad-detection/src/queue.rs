//! Bounded handoff between the ingestion and detection threads
//!
//! Pushing never blocks the producer. When the queue is full the oldest
//! pending item is displaced, so a slow consumer sees the most recent frames.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use lbad_core::{Error, Result};
use parking_lot::{Condvar, Mutex};

/// Result of a [`HandoffQueue::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome<T> {
    Queued,
    /// The queue was full; the returned item was evicted to make room
    Displaced(T),
    /// The queue was closed; the item was not accepted
    Rejected(T),
}

/// Single-producer, single-consumer queue with drop-oldest overflow
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: ArrayQueue<T>,
    closed: AtomicBool,
    pushed: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
    lock: Mutex<()>,
    available: Condvar,
}

impl<T> HandoffQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".to_string()));
        }
        Ok(Self {
            items: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
            pushed: CachePadded::new(AtomicU64::new(0)),
            dropped: CachePadded::new(AtomicU64::new(0)),
            lock: Mutex::new(()),
            available: Condvar::new(),
        })
    }

    /// Enqueue without blocking, evicting the oldest item if full
    pub fn push(&self, item: T) -> PushOutcome<T> {
        if self.is_closed() {
            return PushOutcome::Rejected(item);
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);
        let outcome = match self.items.force_push(item) {
            Some(evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Displaced(evicted)
            }
            None => PushOutcome::Queued,
        };

        let _guard = self.lock.lock();
        self.available.notify_one();
        outcome
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop_blocking(&self) -> Option<T> {
        loop {
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if self.is_closed() {
                return self.items.pop();
            }

            let mut guard = self.lock.lock();
            while self.items.is_empty() && !self.is_closed() {
                self.available.wait(&mut guard);
            }
        }
    }

    /// Stop accepting items and wake the consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Items accepted since creation, including ones later displaced
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Items evicted by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
