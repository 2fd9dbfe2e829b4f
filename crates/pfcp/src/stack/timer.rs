// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot timer pool.
//!
//! A single background thread holds a min-heap of deadlines; on expiration
//! the registered event is handed to the posting hook (in the stack, the
//! Communication queue). Cancellation is lazy: `unregister` drops the event
//! and the heap entry is skipped when it surfaces.

use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct TimerState<E> {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    events: HashMap<u64, E>,
}

struct TimerShared<E> {
    state: Mutex<TimerState<E>>,
    cv: Condvar,
    running: AtomicBool,
    next_id: AtomicU64,
}

/// Pool of one-shot timers delivering events through a posting hook.
pub(crate) struct TimerPool<E: Send + 'static> {
    shared: Arc<TimerShared<E>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Send + 'static> TimerPool<E> {
    /// Spawn the pool thread; `post` is invoked (off-lock) for every expiry.
    pub(crate) fn start<F>(post: F) -> Self
    where
        F: Fn(E) + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState { heap: BinaryHeap::new(), events: HashMap::new() }),
            cv: Condvar::new(),
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("pfcp-timer".into())
            .spawn(move || run(&thread_shared, post))
            .expect("timer thread should spawn");

        Self { shared, handle: Mutex::new(Some(handle)) }
    }

    /// Arm a one-shot timer. The returned id cancels it.
    pub(crate) fn register(&self, delay: Duration, event: E) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;
        {
            let mut state = self.shared.state.lock();
            state.heap.push(Reverse((deadline, id)));
            state.events.insert(id, event);
        }
        self.cv_notify();
        id
    }

    /// Cancel a timer. Unknown (or already fired) ids are tolerated.
    pub(crate) fn unregister(&self, id: u64) -> bool {
        self.shared.state.lock().events.remove(&id).is_some()
    }

    /// Number of armed timers.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.shared.state.lock().events.len()
    }

    /// Stop and join the pool thread; pending events are dropped.
    pub(crate) fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.cv_notify();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn cv_notify(&self) {
        // take the lock so the pool thread cannot miss the wakeup
        let _guard = self.shared.state.lock();
        self.shared.cv.notify_one();
    }
}

impl<E: Send + 'static> Drop for TimerPool<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<E, F>(shared: &TimerShared<E>, post: F)
where
    E: Send + 'static,
    F: Fn(E),
{
    let mut due: Vec<E> = Vec::new();

    while shared.running.load(Ordering::Acquire) {
        {
            let mut state = shared.state.lock();
            let now = Instant::now();

            while let Some(&Reverse((deadline, id))) = state.heap.peek() {
                if deadline > now {
                    break;
                }
                state.heap.pop();
                // cancelled ids are simply absent
                if let Some(event) = state.events.remove(&id) {
                    due.push(event);
                }
            }

            if due.is_empty() {
                match state.heap.peek() {
                    Some(&Reverse((deadline, _))) => {
                        shared.cv.wait_until(&mut state, deadline);
                    }
                    None => {
                        shared.cv.wait(&mut state);
                    }
                }
            }
        }

        for event in due.drain(..) {
            post(event);
        }
    }
}
