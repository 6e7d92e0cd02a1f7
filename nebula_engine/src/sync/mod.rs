//! Concurrency building blocks
//!
//! - `LockFreeLinkedQueue`: unbounded MPMC FIFO (Michael–Scott)
//! - `BoundedRingQueue`: fixed-capacity MPMC FIFO over a preallocated ring
//! - `WaitEvent`: blocking signal/wait primitive used for fence waits

pub mod linked_queue;
pub mod ring_queue;
pub mod wait_event;

pub use linked_queue::LockFreeLinkedQueue;
pub use ring_queue::BoundedRingQueue;
pub use wait_event::WaitEvent;

use std::sync::{Mutex, MutexGuard};
use crate::error::Result;

/// Lock a mutex, turning poisoning into a logged `Error::BackendError`
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock()
        .map_err(|_| crate::engine_err!("nebula::sync", "{} lock poisoned", what))
}
