/// Unbounded lock-free MPMC queue (Michael–Scott)
///
/// A singly linked list with a permanent sentinel. `head` points at the
/// sentinel (the last consumed node), `tail` at the last node or one node
/// behind it. Any thread that finds `tail` lagging swings it forward before
/// retrying, so a stalled enqueuer never blocks the others.
///
/// Unlinked nodes are reclaimed through `crossbeam-epoch`: a node is only
/// freed once no pinned thread can still be reading it.

use std::mem::MaybeUninit;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;

struct Node<T> {
    /// Uninitialized for the sentinel; moved out once the node becomes the sentinel
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

pub struct LockFreeLinkedQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

// SAFETY: values are moved between threads only through the queue, each
// value is handed to exactly one consumer.
unsafe impl<T: Send> Send for LockFreeLinkedQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeLinkedQueue<T> {}

impl<T> LockFreeLinkedQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
        };
        let sentinel = Owned::new(Node {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        // SAFETY: the queue is not shared yet
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = sentinel.into_shared(guard);
            queue.head.store(sentinel, Relaxed);
            queue.tail.store(sentinel, Relaxed);
        }
        queue
    }

    /// Append a value. Never blocks, never fails.
    pub fn enqueue(&self, value: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Acquire, guard);
            // SAFETY: tail is never null and the guard keeps it alive
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, guard);

            if !next.is_null() {
                // Tail is lagging: help the other enqueuer finish
                let _ = self.tail.compare_exchange(tail, next, Release, Relaxed, guard);
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(Shared::null(), new, Release, Relaxed, guard)
                .is_ok()
            {
                // Best effort: a failed swing is repaired by the next helper
                let _ = self.tail.compare_exchange(tail, new, Release, Relaxed, guard);
                return;
            }
        }
    }

    /// Remove the oldest value, or `None` if the queue is observably empty
    pub fn dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Acquire, guard);
            let tail = self.tail.load(Acquire, guard);
            // SAFETY: head is never null and the guard keeps it alive
            let next = unsafe { head.deref() }.next.load(Acquire, guard);

            if head == tail {
                if next.is_null() {
                    return None;
                }
                let _ = self.tail.compare_exchange(tail, next, Release, Relaxed, guard);
                continue;
            }

            // SAFETY: next is protected by the guard
            let next_ref = match unsafe { next.as_ref() } {
                Some(node) => node,
                None => continue,
            };

            if self
                .head
                .compare_exchange(head, next, Release, Relaxed, guard)
                .is_ok()
            {
                // SAFETY: winning the CAS makes this thread the only reader of
                // next's value; the old sentinel is unreachable for new readers.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(next_ref.value.assume_init_read());
                }
            }
        }
    }

    /// Snapshot emptiness check
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Acquire, guard);
        // SAFETY: head is never null and the guard keeps it alive
        unsafe { head.deref() }.next.load(Acquire, guard).is_null()
    }
}

impl<T> Default for LockFreeLinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeLinkedQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}

        // SAFETY: &mut self, no other thread can observe the sentinel
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = self.head.load(Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> std::fmt::Debug for LockFreeLinkedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFreeLinkedQueue")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
#[path = "linked_queue_tests.rs"]
mod tests;
