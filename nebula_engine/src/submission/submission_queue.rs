/// Submission queue - command buffer lifecycle on one device queue
///
/// Owns the queue's completion fence, the allocator/buffer recycle pools and
/// the deferred priority buckets. Any thread may acquire, record, submit and
/// wait. Submission and fence signaling form one critical section, so fence
/// values follow device submission order.
///
/// Lock order: pools and buckets are never held across a device submit;
/// hooks run with no internal lock held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::device::{AllocatorHandle, BufferHandle, Device, QueueKind};
use crate::error::{Error, Result};
use crate::submission::command_pools::CommandPools;
use crate::submission::priority_bucket::PriorityBucket;
use crate::submission::{CommandBuffer, CommandBufferDesc, CommandBufferState, CompletionFence};
use crate::sync;
use crate::{engine_bail, engine_debug, engine_err, engine_info, engine_trace, engine_warn};

/// Submission queue configuration
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    /// Number of deferred priority buckets (valid priorities are `0..priority_levels`)
    pub priority_levels: usize,
    /// Name used in log messages
    pub label: String,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            priority_levels: 4,
            label: "main".to_string(),
        }
    }
}

/// Lifetime counters of a submission queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    pub submissions: u64,
    pub allocators_created: u64,
    pub allocators_recycled: u64,
    pub buffers_created: u64,
    pub buffers_recycled: u64,
}

#[derive(Default)]
struct StatCounters {
    submissions: AtomicU64,
    allocators_created: AtomicU64,
    allocators_recycled: AtomicU64,
    buffers_created: AtomicU64,
    buffers_recycled: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SubmissionStats {
        SubmissionStats {
            submissions: self.submissions.load(Ordering::Relaxed),
            allocators_created: self.allocators_created.load(Ordering::Relaxed),
            allocators_recycled: self.allocators_recycled.load(Ordering::Relaxed),
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            buffers_recycled: self.buffers_recycled.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the queue and the command buffers it hands out
pub(crate) struct QueueShared {
    pub(crate) device: Arc<dyn Device>,
    kind: QueueKind,
    label: String,
    fence: CompletionFence,
    pools: CommandPools,
    buckets: Vec<PriorityBucket>,
    /// Allocator backing each buffer currently out of the pools
    in_flight: Mutex<FxHashMap<BufferHandle, AllocatorHandle>>,
    stats: StatCounters,
}

impl QueueShared {
    fn owns(&self, buffer: &CommandBuffer) -> bool {
        std::ptr::eq(buffer.owner.as_ptr(), self as *const QueueShared)
    }

    fn acquire_allocator(&self) -> Result<AllocatorHandle> {
        if let Some(allocator) = self.pools.take_allocator(&self.fence)? {
            self.device.reset_allocator(allocator)?;
            StatCounters::bump(&self.stats.allocators_recycled);
            engine_trace!("nebula::SubmissionQueue", "[{}] Recycled command allocator", self.label);
            return Ok(allocator);
        }

        let allocator = self.device.create_command_allocator(self.kind)?;
        StatCounters::bump(&self.stats.allocators_created);
        engine_debug!("nebula::SubmissionQueue", "[{}] Created command allocator", self.label);
        Ok(allocator)
    }

    fn acquire_buffer_object(&self, allocator: AllocatorHandle) -> Result<BufferHandle> {
        if let Some(buffer) = self.pools.take_buffer(&self.fence)? {
            self.device.reset_buffer(buffer, allocator)?;
            StatCounters::bump(&self.stats.buffers_recycled);
            engine_trace!("nebula::SubmissionQueue", "[{}] Recycled command buffer", self.label);
            return Ok(buffer);
        }

        let buffer = self.device.create_command_buffer(self.kind, allocator)?;
        StatCounters::bump(&self.stats.buffers_created);
        engine_debug!("nebula::SubmissionQueue", "[{}] Created command buffer", self.label);
        Ok(buffer)
    }

    fn submit(&self, buffer: &mut CommandBuffer) -> Result<u64> {
        if !self.owns(buffer) {
            engine_bail!("nebula::SubmissionQueue", Error::InvalidResource =>
                "[{}] Command buffer was not acquired from this queue", self.label);
        }
        let allocator = match sync::lock(&self.in_flight, "SubmissionQueue in-flight table")?.remove(&buffer.handle) {
            Some(allocator) => allocator,
            None => engine_bail!("nebula::SubmissionQueue", Error::InvalidResource =>
                "[{}] Command buffer is not in flight on this queue", self.label),
        };

        if buffer.registered {
            self.buckets[buffer.priority].withdraw();
            buffer.registered = false;
        }

        if buffer.state == CommandBufferState::Recording {
            self.device.close_buffer(buffer.handle)?;
            buffer.state = CommandBufferState::Closed;
        }

        if let Some(hook) = buffer.before_exec.take() {
            hook();
        }

        let handle = buffer.handle;
        let kind = self.kind;
        let after_exec = buffer.after_exec.take();
        let value = self
            .fence
            .signal_after(|| {
                self.device.submit(kind, &[handle])?;
                if let Some(hook) = after_exec {
                    hook();
                }
                Ok(())
            })
            .map_err(|e| engine_err!("nebula::SubmissionQueue", "[{}] Submit failed: {}", self.label, e))?;
        buffer.state = CommandBufferState::Submitted;

        self.pools.return_allocator(value, allocator);
        self.pools.return_buffer(value, handle);
        StatCounters::bump(&self.stats.submissions);
        engine_trace!("nebula::SubmissionQueue", "[{}] Submitted buffer at fence value {}", self.label, value);

        Ok(value)
    }

    /// Return the objects of a buffer dropped without being submitted
    pub(crate) fn abandon(&self, buffer: &mut CommandBuffer) {
        if buffer.registered {
            self.buckets[buffer.priority].withdraw();
            buffer.registered = false;
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let allocator = in_flight.remove(&buffer.handle).unwrap_or(buffer.allocator);
        drop(in_flight);

        let tag = self.fence.last_signaled();
        self.pools.return_allocator(tag, allocator);
        self.pools.return_buffer(tag, buffer.handle);
        engine_warn!("nebula::SubmissionQueue", "[{}] Command buffer dropped without submission", self.label);
    }
}

pub struct SubmissionQueue {
    shared: Arc<QueueShared>,
}

impl SubmissionQueue {
    /// Create a queue of the given kind on `device`
    ///
    /// # Errors
    ///
    /// - `InitializationFailed` if `priority_levels` is zero or the fence
    ///   cannot be created
    pub fn new(device: Arc<dyn Device>, kind: QueueKind, config: SubmissionConfig) -> Result<Self> {
        if config.priority_levels == 0 {
            engine_bail!("nebula::SubmissionQueue", Error::InitializationFailed =>
                "[{}] priority_levels must be at least 1", config.label);
        }

        let fence = CompletionFence::new(device.clone(), kind)?;
        let buckets = (0..config.priority_levels).map(|_| PriorityBucket::new()).collect();

        engine_info!("nebula::SubmissionQueue", "[{}] Created {} queue with {} priority levels",
            config.label, kind.name(), config.priority_levels);

        Ok(Self {
            shared: Arc::new(QueueShared {
                device,
                kind,
                label: config.label,
                fence,
                pools: CommandPools::new(),
                buckets,
                in_flight: Mutex::new(FxHashMap::default()),
                stats: StatCounters::default(),
            }),
        })
    }

    /// Acquire an immediate buffer at priority 0 with no hooks
    pub fn acquire_buffer(&self) -> Result<CommandBuffer> {
        self.acquire_buffer_with(CommandBufferDesc::default())
    }

    /// Acquire a buffer backed by a recycled or new allocator
    ///
    /// A deferred buffer is registered in its priority bucket and must be
    /// handed back through `mark_ready`.
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if `desc.priority` is not below `priority_levels`
    /// - `OutOfMemory` / `BackendError` from the device
    pub fn acquire_buffer_with(&self, desc: CommandBufferDesc) -> Result<CommandBuffer> {
        let shared = &self.shared;
        if desc.priority >= shared.buckets.len() {
            engine_bail!("nebula::SubmissionQueue", Error::InvalidResource =>
                "[{}] Priority {} out of range (0..{})", shared.label, desc.priority, shared.buckets.len());
        }

        let allocator = shared.acquire_allocator()?;
        let handle = match shared.acquire_buffer_object(allocator) {
            Ok(handle) => handle,
            Err(e) => {
                shared.pools.return_allocator(shared.fence.last_signaled(), allocator);
                return Err(e);
            }
        };

        sync::lock(&shared.in_flight, "SubmissionQueue in-flight table")?.insert(handle, allocator);

        let mut buffer = CommandBuffer {
            handle,
            allocator,
            kind: shared.kind,
            priority: desc.priority,
            deferred: desc.deferred,
            registered: false,
            state: CommandBufferState::Recording,
            before_exec: desc.before_exec,
            after_exec: desc.after_exec,
            owner: Arc::downgrade(shared),
        };

        if desc.deferred {
            shared.buckets[desc.priority].register()?;
            buffer.registered = true;
        }
        Ok(buffer)
    }

    /// Hand a deferred buffer to its bucket, ready for `drain_deferred`
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if the buffer is not a pending deferred buffer of
    ///   this queue (the buffer is then dropped and recycled)
    pub fn mark_ready(&self, buffer: CommandBuffer) -> Result<()> {
        let shared = &self.shared;
        if !shared.owns(&buffer) {
            engine_bail!("nebula::SubmissionQueue", Error::InvalidResource =>
                "[{}] Command buffer was not acquired from this queue", shared.label);
        }
        if !buffer.registered {
            engine_bail!("nebula::SubmissionQueue", Error::InvalidResource =>
                "[{}] Only deferred buffers can be marked ready", shared.label);
        }
        shared.buckets[buffer.priority].mark_ready(buffer)
    }

    /// Close, run hooks, submit and signal; returns the buffer's fence value
    ///
    /// # Errors
    ///
    /// - `InvalidResource` for a buffer acquired from another queue
    /// - `BackendError` if the device rejects the submission (fatal)
    pub fn submit(&self, mut buffer: CommandBuffer) -> Result<u64> {
        self.shared.submit(&mut buffer)
    }

    /// `submit`, then block until the device completes the buffer
    pub fn submit_and_wait(&self, buffer: CommandBuffer) -> Result<u64> {
        let value = self.submit(buffer)?;
        self.shared.fence.wait_for(value)?;
        Ok(value)
    }

    /// Submit deferred buffers bucket by bucket, lowest priority index first
    ///
    /// Each bucket is drained until no buffer is ready or pending in it;
    /// the call blocks while registered buffers have not been marked ready.
    /// Returns the fence value of the last submission, 0 if none.
    pub fn drain_deferred(&self) -> Result<u64> {
        let mut last_value = 0;
        for bucket in &self.shared.buckets {
            while let Some(mut buffer) = bucket.next_ready()? {
                last_value = self.shared.submit(&mut buffer)?;
            }
        }
        Ok(last_value)
    }

    /// Signal the next fence value with no work attached
    pub fn signal(&self) -> Result<u64> {
        self.shared.fence.signal()
    }

    pub fn is_complete(&self, fence_value: u64) -> bool {
        self.shared.fence.is_complete(fence_value)
    }

    pub fn wait_for(&self, fence_value: u64) -> Result<()> {
        self.shared.fence.wait_for(fence_value)
    }

    /// Returns `Ok(false)` if `timeout` elapsed first
    pub fn wait_for_timeout(&self, fence_value: u64, timeout: Duration) -> Result<bool> {
        self.shared.fence.wait_for_timeout(fence_value, timeout)
    }

    /// Signal, then wait for everything submitted so far
    pub fn flush(&self) -> Result<u64> {
        let value = self.signal()?;
        self.wait_for(value)?;
        Ok(value)
    }

    pub fn last_completed(&self) -> u64 {
        self.shared.fence.last_completed()
    }

    pub fn last_signaled(&self) -> u64 {
        self.shared.fence.last_signaled()
    }

    pub fn stats(&self) -> SubmissionStats {
        self.shared.stats.snapshot()
    }

    /// (pooled allocators, pooled buffers) awaiting reuse
    pub fn pooled(&self) -> (usize, usize) {
        self.shared.pools.pooled()
    }

    /// (ready, pending) deferred buffers in a priority bucket
    pub fn bucket_counts(&self, priority: usize) -> Option<(usize, usize)> {
        self.shared.buckets.get(priority).map(PriorityBucket::counts)
    }

    pub fn kind(&self) -> QueueKind {
        self.shared.kind
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn priority_levels(&self) -> usize {
        self.shared.buckets.len()
    }

    pub fn fence(&self) -> &CompletionFence {
        &self.shared.fence
    }
}

impl std::fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("label", &self.shared.label)
            .field("kind", &self.shared.kind)
            .field("fence", &self.shared.fence)
            .finish()
    }
}

#[cfg(test)]
#[path = "submission_queue_tests.rs"]
mod tests;
