//! Two-queue exclusive lock with admission-time preemption.
//!
//! High-priority waiters are granted the lock strictly before any
//! low-priority waiter. A low-priority holder is never interrupted
//! mid-critical-section; preemption happens only at admission.

use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Default)]
struct LockState {
    held: bool,
    waiting_high: usize,
}

#[derive(Default)]
pub struct PriorityMutex {
    state: Mutex<LockState>,
    high_queue: Condvar,
    low_queue: Condvar,
}

impl PriorityMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is exclusively held, ahead of all low-priority
    /// waiters.
    pub fn lock_high_priority(&self) -> HighPriorityGuard<'_> {
        let mut state = self.state_guard();
        state.waiting_high += 1;
        while state.held {
            state = self
                .high_queue
                .wait(state)
                .unwrap_or_else(|err| err.into_inner());
        }
        state.waiting_high -= 1;
        state.held = true;
        HighPriorityGuard { mutex: self }
    }

    /// Block until the lock is exclusively held and no high-priority waiter
    /// is queued.
    pub fn lock_low_priority(&self) -> LowPriorityGuard<'_> {
        let mut state = self.state_guard();
        while state.held || state.waiting_high > 0 {
            state = self
                .low_queue
                .wait(state)
                .unwrap_or_else(|err| err.into_inner());
        }
        state.held = true;
        LowPriorityGuard { mutex: self }
    }

    fn unlock(&self) {
        let mut state = self.state_guard();
        state.held = false;
        if state.waiting_high > 0 {
            self.high_queue.notify_one();
        } else {
            self.low_queue.notify_all();
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

pub struct HighPriorityGuard<'a> {
    mutex: &'a PriorityMutex,
}

impl Drop for HighPriorityGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

pub struct LowPriorityGuard<'a> {
    mutex: &'a PriorityMutex,
}

impl Drop for LowPriorityGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn exclusive_between_modes() {
        let mutex = Arc::new(PriorityMutex::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for index in 0..8 {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    if index % 2 == 0 {
                        let _guard = mutex.lock_high_priority();
                        let seen = counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(counter.load(Ordering::SeqCst), seen + 1);
                        counter.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _guard = mutex.lock_low_priority();
                        let seen = counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(counter.load(Ordering::SeqCst), seen + 1);
                        counter.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("join");
        }
    }

    #[test]
    fn high_priority_preempts_queued_low() {
        let mutex = Arc::new(PriorityMutex::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let holder = mutex.lock_low_priority();

        let high = {
            let mutex = Arc::clone(&mutex);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _guard = mutex.lock_high_priority();
                order.lock().expect("order").push("high");
            })
        };
        // Give the high-priority waiter time to queue before the low one.
        thread::sleep(Duration::from_millis(50));
        let low = {
            let mutex = Arc::clone(&mutex);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _guard = mutex.lock_low_priority();
                order.lock().expect("order").push("low");
            })
        };
        thread::sleep(Duration::from_millis(50));

        drop(holder);
        high.join().expect("high");
        low.join().expect("low");
        assert_eq!(*order.lock().expect("order"), vec!["high", "low"]);
    }
}
