use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Result of taking from the queue
#[derive(Debug, PartialEq)]
pub enum Pop<T> {
    Item(T),
    /// The producer has finished and everything before the sentinel was taken
    Finished,
    /// The queue was stopped
    Stopped,
}

struct QueueState<T> {
    items: VecDeque<T>,
    /// Items pushed but not yet marked done by the consumer
    unfinished: usize,
    /// Sentinel: set once, never cleared
    finished: bool,
    stopped: bool,
}

/// Bounded FIFO between the producer and the consumer
///
/// One mutex and one condition variable guard everything. Producers block
/// while the queue is full, consumers while it is empty. The terminal
/// sentinel stays in place once set, so every later pop keeps observing it.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    changed: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.clamp(1, 64)),
                unfinished: 0,
                finished: false,
                stopped: false,
            }),
            changed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Append an item, waiting for a free slot; hands the item back if the
    /// queue was stopped or already finished
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self
            .changed
            .wait_while(self.lock(), |s| {
                s.items.len() >= self.capacity && !s.stopped
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.stopped || state.finished {
            return Err(item);
        }
        state.items.push_back(item);
        state.unfinished += 1;
        self.changed.notify_all();
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty
    pub fn pop(&self) -> Pop<T> {
        let mut state = self
            .changed
            .wait_while(self.lock(), |s| {
                s.items.is_empty() && !s.finished && !s.stopped
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.stopped {
            return Pop::Stopped;
        }
        match state.items.pop_front() {
            Some(item) => {
                // a slot is free again
                self.changed.notify_all();
                Pop::Item(item)
            }
            None => Pop::Finished,
        }
    }

    /// Enqueue the sentinel; idempotent
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        self.changed.notify_all();
    }

    /// Mark a popped item as fully handled
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        self.changed.notify_all();
    }

    /// Wait until every pushed item was popped and marked done, or the
    /// queue is stopped
    pub fn wait_drained(&self) {
        let _state = self
            .changed
            .wait_while(self.lock(), |s| s.unfinished > 0 && !s.stopped)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wake every waiter and refuse further work
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        self.changed.notify_all();
    }

    /// Drop whatever is still queued
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.unfinished = state.unfinished.saturating_sub(dropped);
        self.changed.notify_all();
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
