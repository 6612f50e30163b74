//! Concurrency ceiling
//!
//! Counts active handlers against a fixed capacity. A slot is held by a
//! [`Permit`] and returned when the permit drops, on every exit path of the
//! handler that owns it.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct LimiterState {
    active: usize,
    closed: bool,
}

#[derive(Debug)]
struct LimiterInner {
    state: Mutex<LimiterState>,
    released: Condvar,
    capacity: usize,
}

/// Fixed-size pool of handler slots
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<LimiterInner>,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                state: Mutex::new(LimiterState {
                    active: 0,
                    closed: false,
                }),
                released: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Block until a slot frees up
    ///
    /// Returns `None` once the limiter has been closed.
    pub fn acquire(&self) -> Option<Permit> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if state.active < self.inner.capacity {
                state.active += 1;
                return Some(self.permit());
            }
            self.inner.released.wait(&mut state);
        }
    }

    /// Refuse new permits and wake every waiter
    ///
    /// Permits already handed out stay valid until dropped.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.released.notify_all();
    }

    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn permit(&self) -> Permit {
        Permit {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// One occupied handler slot
#[derive(Debug)]
pub struct Permit {
    inner: Arc<LimiterInner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.inner.state.lock().active -= 1;
        self.inner.released.notify_one();
    }
}
