/// Blocking wait primitive
///
/// An auto-reset event: `signal()` wakes waiters, and a successful wait
/// consumes the signal. Backed by a mutex/condvar pair.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct WaitEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl WaitEvent {
    /// Create an unsignaled event
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event and wake every waiter
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Block until the event is signaled, then consume the signal
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        while !*signaled {
            signaled = self.condvar.wait(signaled).unwrap_or_else(|e| e.into_inner());
        }
        *signaled = false;
    }

    /// Block until signaled or `timeout` elapses
    ///
    /// Returns `true` if the signal was consumed, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        while !*signaled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.condvar
                .wait_timeout(signaled, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            signaled = guard;
        }
        *signaled = false;
        true
    }

    /// Consume the signal if set, without blocking
    pub fn try_wait(&self) -> bool {
        let mut signaled = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *signaled, false)
    }
}

#[cfg(test)]
#[path = "wait_event_tests.rs"]
mod tests;
