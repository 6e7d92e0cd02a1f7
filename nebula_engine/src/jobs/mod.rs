//! Job system
//!
//! A fixed set of worker threads pulling closures from a `BoundedRingQueue`.

pub mod worker_pool;

pub use worker_pool::{Task, WorkerPool, WorkerPoolConfig};
