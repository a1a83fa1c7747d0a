/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! FIFO job queue + counting semaphore (spec §4.4).
//!
//! Single-producer (driver thread), single-consumer (worker thread). The
//! semaphore counts wake tokens: one per `add_job`, plus any extra
//! `release` the driver issues as a shutdown nudge. A wake with an empty
//! queue is the shutdown signal, not an error — [`JobQueue::acquire_and_pop`]
//! returns `None` in that case.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A counting semaphore built on `Mutex` + `Condvar`, since `std` has no
/// semaphore primitive of its own. Counts "wake tokens available".
struct Semaphore {
    count: Mutex<u64>,
    cond: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Release one token, waking at most one blocked `acquire`.
    fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Block until a token is available, then consume it.
    fn acquire(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// The FIFO job queue a single [`crate::task::Task`] owns.
///
/// `add_job` never blocks (spec §4.1): it appends under a short-held lock
/// and releases the semaphore. The worker calls [`acquire_and_pop`] in a
/// loop; it blocks on the semaphore, then pops — an empty pop after waking
/// is the clean shutdown signal.
///
/// [`acquire_and_pop`]: JobQueue::acquire_and_pop
pub struct JobQueue<T> {
    queue: Mutex<VecDeque<T>>,
    sem: Semaphore,
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sem: Semaphore::new(),
        }
    }

    /// Enqueue `payload` and release one wake token. Never blocks.
    pub fn add_job(&self, payload: T) {
        self.queue.lock().unwrap().push_back(payload);
        self.sem.release();
    }

    /// Release one wake token without enqueuing — a shutdown nudge, or any
    /// other reason the driver wants the worker to re-check its queue.
    pub fn signal(&self) {
        self.sem.release();
    }

    /// Block for a wake token, then pop the head of the queue. `None` means
    /// the token woke the worker onto an empty queue: shut down.
    pub fn acquire_and_pop(&self) -> Option<T> {
        self.sem.acquire();
        self.queue.lock().unwrap().pop_front()
    }

    /// Current queue length. Diagnostic only — the worker is the sole
    /// consumer, so a driver reading this races with draining by design.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_is_preserved() {
        let q: JobQueue<i32> = JobQueue::new();
        q.add_job(1);
        q.add_job(2);
        q.add_job(3);
        assert_eq!(q.acquire_and_pop(), Some(1));
        assert_eq!(q.acquire_and_pop(), Some(2));
        assert_eq!(q.acquire_and_pop(), Some(3));
    }

    #[test]
    fn signal_without_enqueue_wakes_to_none() {
        let q: JobQueue<i32> = JobQueue::new();
        q.signal();
        assert_eq!(q.acquire_and_pop(), None);
    }

    #[test]
    fn acquire_blocks_until_add_job_from_another_thread() {
        let q = Arc::new(JobQueue::<i32>::new());
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.acquire_and_pop());

        // Give the consumer a chance to block before producing.
        thread::sleep(std::time::Duration::from_millis(20));
        q.add_job(42);

        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn len_reflects_pending_jobs() {
        let q: JobQueue<i32> = JobQueue::new();
        assert!(q.is_empty());
        q.add_job(1);
        q.add_job(2);
        assert_eq!(q.len(), 2);
        q.acquire_and_pop();
        assert_eq!(q.len(), 1);
    }
}
