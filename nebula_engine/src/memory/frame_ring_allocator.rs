/// Frame ring allocator - fence-tagged circular sub-allocation
///
/// Hands out byte offsets from a fixed-size circular range. Allocations made
/// between two `finish_frame` calls form one frame record tagged with the
/// fence value that marks them safe to reuse; `release_completed` retires
/// every record whose fence has completed.
///
/// Only offsets are managed here. The backing memory belongs to the caller
/// (see `GpuRingBuffer`).

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    fence_value: u64,
    tail_at_finish: u64,
    size: u64,
}

#[derive(Debug)]
pub struct FrameRingAllocator {
    records: VecDeque<FrameRecord>,
    head: u64,
    tail: u64,
    capacity: u64,
    used_size: u64,
    current_frame_size: u64,
}

impl FrameRingAllocator {
    pub fn new(capacity: u64) -> Self {
        Self {
            records: VecDeque::new(),
            head: 0,
            tail: 0,
            capacity,
            used_size: 0,
            current_frame_size: 0,
        }
    }

    /// Reserve `size` contiguous bytes at an offset aligned to `alignment`
    ///
    /// Returns `None` if the request does not fit the free space, either
    /// after `tail` or, by wrapping, before `head`. Alignment padding before
    /// the offset, and on a wrap the bytes skipped at the end of the range,
    /// are charged to the current frame.
    ///
    /// `alignment` must be a power of two.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        debug_assert!(alignment.is_power_of_two());
        if size == 0 || size > self.capacity || self.is_full() {
            return None;
        }

        if let Some(offset) = self.try_allocate(size, alignment) {
            return Some(offset);
        }

        // Nothing outstanding: the free space is the whole range
        if self.used_size == 0 && self.records.is_empty() && (self.head != 0 || self.tail != 0) {
            self.head = 0;
            self.tail = 0;
            return self.try_allocate(size, alignment);
        }

        None
    }

    fn try_allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let aligned_tail = self.tail.checked_next_multiple_of(alignment)?;
        let padding = aligned_tail - self.tail;

        if self.tail >= self.head {
            if aligned_tail.checked_add(size)? <= self.capacity {
                self.tail = aligned_tail + size;
                self.charge(padding + size);
                return Some(aligned_tail);
            }

            if size <= self.head {
                let skipped = self.capacity - self.tail;
                self.tail = size;
                self.charge(skipped + size);
                return Some(0);
            }
        } else if aligned_tail.checked_add(size)? <= self.head {
            self.tail = aligned_tail + size;
            self.charge(padding + size);
            return Some(aligned_tail);
        }

        None
    }

    fn charge(&mut self, size: u64) {
        self.used_size += size;
        self.current_frame_size += size;
        debug_assert!(self.used_size <= self.capacity);
    }

    /// Close the current frame, tagging its allocations with `fence_value`
    ///
    /// A frame without allocations leaves no record.
    pub fn finish_frame(&mut self, fence_value: u64) {
        if self.current_frame_size == 0 {
            return;
        }
        self.records.push_back(FrameRecord {
            fence_value,
            tail_at_finish: self.tail,
            size: self.current_frame_size,
        });
        self.current_frame_size = 0;
    }

    /// Reclaim every frame whose fence value is `<= last_completed`
    pub fn release_completed(&mut self, last_completed: u64) {
        while let Some(record) = self.records.front().copied() {
            if record.fence_value > last_completed {
                break;
            }
            debug_assert!(self.used_size >= record.size);
            self.used_size -= record.size;
            self.head = record.tail_at_finish;
            self.records.pop_front();
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes allocated and not yet reclaimed, alignment and wrap padding included
    pub fn used_size(&self) -> u64 {
        self.used_size
    }

    pub fn is_full(&self) -> bool {
        self.used_size == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.used_size == 0
    }

    /// No allocation is pending reclamation, closed frame or not
    pub fn is_idle(&self) -> bool {
        self.used_size == 0 && self.current_frame_size == 0 && self.records.is_empty()
    }

    /// Number of closed frames still awaiting their fence
    pub fn pending_frames(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
#[path = "frame_ring_allocator_tests.rs"]
mod tests;
