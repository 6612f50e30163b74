//! Shared State Guard
//!
//! The one piece of state shared by every handler on both transports.
//!
//! ## Concurrency Model
//! - The value lives inside a `parking_lot::Mutex`; there is no other path
//!   to it, so every read and write happens inside the critical section.
//! - The lock is released by the guard's `Drop`, which also runs during a
//!   panic unwind. `parking_lot` does not poison, so a handler that fails
//!   while holding the lock leaves the counter usable for everyone else.
//! - Acquire/release ordering on the mutex makes each increment visible to
//!   every later `get`/`increment`.

use parking_lot::Mutex;

/// A 64-bit signed counter behind a mutex
#[derive(Debug, Default)]
pub struct SharedCounter {
    value: Mutex<i64>,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self::with_value(0)
    }

    pub fn with_value(value: i64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Add one and return the new value
    ///
    /// Wraps from `i64::MAX` to `i64::MIN`.
    pub fn increment(&self) -> i64 {
        let mut value = self.value.lock();
        *value = value.wrapping_add(1);
        *value
    }

    /// Current value
    pub fn get(&self) -> i64 {
        *self.value.lock()
    }
}
