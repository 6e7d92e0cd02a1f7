/// Command buffer - a recordable unit of work acquired from a `SubmissionQueue`
///
/// The buffer is exclusively owned by the recording thread. Ownership moves
/// back to the queue on `submit`, on `mark_ready` (deferred buffers), or on
/// drop: an abandoned buffer returns its allocator and buffer object to the
/// recycle pools, and a deferred one is withdrawn from its priority bucket.

use std::sync::Weak;

use crate::device::{AllocatorHandle, BufferHandle, DeviceCommand, MemoryHandle, QueueKind};
use crate::error::{Error, Result};
use crate::submission::submission_queue::QueueShared;

/// One-shot hook run around submission
pub type ExecHook = Box<dyn FnOnce() + Send + 'static>;

/// Parameters of `SubmissionQueue::acquire_buffer_with`
pub struct CommandBufferDesc {
    /// Priority bucket for deferred execution (0 drains first)
    pub priority: usize,
    /// Run just before the buffer is handed to the device
    pub before_exec: Option<ExecHook>,
    /// Run after the device accepts the buffer, before its fence value is
    /// signaled. Runs inside the queue's signal section, so it must not
    /// signal or submit on the same queue.
    pub after_exec: Option<ExecHook>,
    /// Register in the priority bucket and wait for `mark_ready`
    pub deferred: bool,
}

impl CommandBufferDesc {
    /// Deferred buffer in the given priority bucket
    pub fn deferred(priority: usize) -> Self {
        Self {
            priority,
            deferred: true,
            ..Default::default()
        }
    }
}

impl Default for CommandBufferDesc {
    fn default() -> Self {
        Self {
            priority: 0,
            before_exec: None,
            after_exec: None,
            deferred: false,
        }
    }
}

impl std::fmt::Debug for CommandBufferDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBufferDesc")
            .field("priority", &self.priority)
            .field("before_exec", &self.before_exec.is_some())
            .field("after_exec", &self.after_exec.is_some())
            .field("deferred", &self.deferred)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Open for recording
    Recording,
    /// Recording closed, not yet submitted
    Closed,
    /// Handed to the device
    Submitted,
}

pub struct CommandBuffer {
    pub(crate) handle: BufferHandle,
    pub(crate) allocator: AllocatorHandle,
    pub(crate) kind: QueueKind,
    pub(crate) priority: usize,
    pub(crate) deferred: bool,
    /// Counted as not-ready in its priority bucket
    pub(crate) registered: bool,
    pub(crate) state: CommandBufferState,
    pub(crate) before_exec: Option<ExecHook>,
    pub(crate) after_exec: Option<ExecHook>,
    pub(crate) owner: Weak<QueueShared>,
}

impl CommandBuffer {
    /// Record a command
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if the buffer is closed or its queue is gone
    pub fn record(&mut self, command: DeviceCommand) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(Error::InvalidResource(format!(
                "Command buffer is {:?}, not recording", self.state
            )));
        }
        let shared = self.queue()?;
        shared.device.record(self.handle, command)
    }

    pub fn copy_buffer(
        &mut self,
        src: MemoryHandle,
        src_offset: u64,
        dst: MemoryHandle,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.record(DeviceCommand::CopyBuffer { src, src_offset, dst, dst_offset, size })
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.record(DeviceCommand::Draw { vertex_count, first_vertex })
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.record(DeviceCommand::Dispatch { x, y, z })
    }

    pub fn marker(&mut self, name: impl Into<String>) -> Result<()> {
        self.record(DeviceCommand::Marker(name.into()))
    }

    /// Close recording (submission closes implicitly)
    pub fn close(&mut self) -> Result<()> {
        if self.state != CommandBufferState::Recording {
            return Err(Error::InvalidResource(format!(
                "Command buffer is {:?}, not recording", self.state
            )));
        }
        let shared = self.queue()?;
        shared.device.close_buffer(self.handle)?;
        self.state = CommandBufferState::Closed;
        Ok(())
    }

    fn queue(&self) -> Result<std::sync::Arc<QueueShared>> {
        self.owner
            .upgrade()
            .ok_or_else(|| Error::InvalidResource("Submission queue was destroyed".to_string()))
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn allocator(&self) -> AllocatorHandle {
        self.allocator
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.state == CommandBufferState::Submitted {
            return;
        }
        if let Some(shared) = self.owner.upgrade() {
            shared.abandon(self);
        }
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("deferred", &self.deferred)
            .field("state", &self.state)
            .finish()
    }
}
