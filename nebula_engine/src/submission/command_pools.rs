/// Recycle pools for command allocators and buffer objects
///
/// Entries are tagged with the fence value of their last use and handed out
/// again only once that value is complete. Pools are checked oldest first.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::device::{AllocatorHandle, BufferHandle};
use crate::error::Result;
use crate::submission::CompletionFence;
use crate::sync;

struct TaggedPool<H> {
    entries: Mutex<VecDeque<(u64, H)>>,
    name: &'static str,
}

impl<H: Copy> TaggedPool<H> {
    fn new(name: &'static str) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            name,
        }
    }

    fn take_completed(&self, fence: &CompletionFence) -> Result<Option<H>> {
        let mut entries = sync::lock(&self.entries, self.name)?;
        match entries.front() {
            Some(&(tag, handle)) if fence.is_complete(tag) => {
                entries.pop_front();
                Ok(Some(handle))
            }
            _ => Ok(None),
        }
    }

    fn give_back(&self, tag: u64, handle: H) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push_back((tag, handle));
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

pub(crate) struct CommandPools {
    allocators: TaggedPool<AllocatorHandle>,
    buffers: TaggedPool<BufferHandle>,
}

impl CommandPools {
    pub(crate) fn new() -> Self {
        Self {
            allocators: TaggedPool::new("allocator pool"),
            buffers: TaggedPool::new("buffer pool"),
        }
    }

    /// Oldest pooled allocator whose last use has completed
    pub(crate) fn take_allocator(&self, fence: &CompletionFence) -> Result<Option<AllocatorHandle>> {
        self.allocators.take_completed(fence)
    }

    /// Oldest pooled buffer object whose last use has completed
    pub(crate) fn take_buffer(&self, fence: &CompletionFence) -> Result<Option<BufferHandle>> {
        self.buffers.take_completed(fence)
    }

    pub(crate) fn return_allocator(&self, fence_value: u64, allocator: AllocatorHandle) {
        self.allocators.give_back(fence_value, allocator);
    }

    pub(crate) fn return_buffer(&self, fence_value: u64, buffer: BufferHandle) {
        self.buffers.give_back(fence_value, buffer);
    }

    /// (pooled allocators, pooled buffers)
    pub(crate) fn pooled(&self) -> (usize, usize) {
        (self.allocators.len(), self.buffers.len())
    }
}
