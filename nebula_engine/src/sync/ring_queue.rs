/// Bounded lock-free MPMC queue over a preallocated ring
///
/// Cursors are monotonically increasing tickets; a ticket maps to the slot
/// `ticket & mask` where the slot count is the capacity rounded up to a power
/// of two.
///
/// Producers reserve a ticket by CAS on `push_cursor`, write the slot, then
/// publish by advancing `publish_cursor` from their ticket to the next one.
/// Publishing happens strictly in ticket order, so a producer whose
/// predecessor is still writing spins until it catches up. Consumers only
/// read tickets below `publish_cursor`, never a reserved-but-unwritten slot.
///
/// Consumers mirror this: reserve on `pop_cursor`, move the value out, then
/// release in order on `release_cursor`. Producers measure fullness against
/// `release_cursor`, so a slot is never rewritten while it is being read.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

pub struct BoundedRingQueue<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    capacity: usize,
    /// Next ticket a producer may reserve
    push_cursor: CachePadded<AtomicUsize>,
    /// Tickets below this are fully written
    publish_cursor: CachePadded<AtomicUsize>,
    /// Next ticket a consumer may reserve
    pop_cursor: CachePadded<AtomicUsize>,
    /// Tickets below this are fully read
    release_cursor: CachePadded<AtomicUsize>,
}

// SAFETY: slot access is serialized by the reserve/publish/release protocol
unsafe impl<T: Send> Send for BoundedRingQueue<T> {}
unsafe impl<T: Send> Sync for BoundedRingQueue<T> {}

impl<T> BoundedRingQueue<T> {
    /// Create a queue holding at most `capacity` values
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedRingQueue capacity must be non-zero");

        let slot_count = capacity.next_power_of_two();
        let slots = (0..slot_count)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: slot_count - 1,
            capacity,
            push_cursor: CachePadded::new(AtomicUsize::new(0)),
            publish_cursor: CachePadded::new(AtomicUsize::new(0)),
            pop_cursor: CachePadded::new(AtomicUsize::new(0)),
            release_cursor: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Maximum number of values the queue holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, ticket: usize) -> *mut MaybeUninit<T> {
        self.slots[ticket & self.mask].get()
    }

    /// Append a value, handing it back if the queue is full
    pub fn enqueue(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let ticket = loop {
            // Read the trailing cursor first so the difference never underflows
            let released = self.release_cursor.load(Ordering::Acquire);
            let push = self.push_cursor.load(Ordering::Relaxed);
            if push.wrapping_sub(released) >= self.capacity {
                return Err(value);
            }
            if self.push_cursor
                .compare_exchange_weak(push, push.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break push;
            }
            backoff.spin();
        };

        // SAFETY: the ticket is reserved by this thread and its slot was
        // released by the consumer of `ticket - slot_count`
        unsafe {
            (*self.slot(ticket)).write(value);
        }

        let backoff = Backoff::new();
        while self.publish_cursor
            .compare_exchange_weak(ticket, ticket.wrapping_add(1), Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
        Ok(())
    }

    /// Remove the oldest published value, or `None` if empty
    pub fn dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        let ticket = loop {
            let pop = self.pop_cursor.load(Ordering::Relaxed);
            let published = self.publish_cursor.load(Ordering::Acquire);
            if pop == published {
                return None;
            }
            if self.pop_cursor
                .compare_exchange_weak(pop, pop.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break pop;
            }
            backoff.spin();
        };

        // SAFETY: the ticket is below publish_cursor and reserved by this
        // thread; the value is moved out exactly once
        let value = unsafe { (*self.slot(ticket)).assume_init_read() };

        let backoff = Backoff::new();
        while self.release_cursor
            .compare_exchange_weak(ticket, ticket.wrapping_add(1), Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
        Some(value)
    }

    /// Best-effort number of published, unconsumed values
    pub fn len(&self) -> usize {
        let pop = self.pop_cursor.load(Ordering::Acquire);
        let published = self.publish_cursor.load(Ordering::Acquire);
        published.wrapping_sub(pop).min(self.capacity)
    }

    /// Best-effort emptiness snapshot
    pub fn is_empty(&self) -> bool {
        self.pop_cursor.load(Ordering::Acquire) == self.publish_cursor.load(Ordering::Acquire)
    }

    /// Best-effort fullness snapshot
    pub fn is_full(&self) -> bool {
        let released = self.release_cursor.load(Ordering::Acquire);
        let push = self.push_cursor.load(Ordering::Acquire);
        push.wrapping_sub(released) >= self.capacity
    }
}

impl<T> Drop for BoundedRingQueue<T> {
    fn drop(&mut self) {
        let pop = *self.pop_cursor.get_mut();
        let published = *self.publish_cursor.get_mut();
        let mut ticket = pop;
        while ticket != published {
            // SAFETY: &mut self; tickets in [pop, published) hold written values
            unsafe {
                (*self.slot(ticket)).assume_init_drop();
            }
            ticket = ticket.wrapping_add(1);
        }
    }
}

impl<T> std::fmt::Debug for BoundedRingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRingQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "ring_queue_tests.rs"]
mod tests;
