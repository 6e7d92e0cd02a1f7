/// Device trait - the asynchronous execution unit the engine submits to
///
/// Everything the submission and memory subsystems need from a backend:
/// command allocators and buffers, queue submission, completion fences and
/// transient memory. Backends store their native objects behind the opaque
/// handle types below.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::Result;
use crate::sync::WaitEvent;

slotmap::new_key_type! {
    /// Command allocator (backing arena a command buffer records into)
    pub struct AllocatorHandle;
    /// Recordable command buffer object
    pub struct BufferHandle;
    /// Monotonic completion fence
    pub struct FenceHandle;
    /// Transient memory block
    pub struct MemoryHandle;
}

/// Device queue / engine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Compute,
    Copy,
}

impl QueueKind {
    /// All queue kinds, in creation order
    pub const ALL: [QueueKind; 3] = [QueueKind::Graphics, QueueKind::Compute, QueueKind::Copy];

    pub fn name(&self) -> &'static str {
        match self {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
            QueueKind::Copy => "copy",
        }
    }
}

/// A command recorded into a command buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Copy `size` bytes between two transient memory blocks
    CopyBuffer {
        src: MemoryHandle,
        src_offset: u64,
        dst: MemoryHandle,
        dst_offset: u64,
        size: u64,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    /// Debug marker, visible in device captures
    Marker(String),
}

/// Alignment of every transient memory block's `device_address`
pub const TRANSIENT_BUFFER_ALIGNMENT: u64 = 64 * 1024;

/// A block of transient memory created by the device
///
/// `device_address` is aligned to `TRANSIENT_BUFFER_ALIGNMENT`.
/// `mapped_ptr` is set for CPU-visible memory and stays valid until the
/// block is destroyed through `Device::destroy_transient_buffer`.
#[derive(Debug, Clone, Copy)]
pub struct TransientBuffer {
    pub handle: MemoryHandle,
    pub size: u64,
    pub device_address: u64,
    pub mapped_ptr: Option<NonNull<u8>>,
}

// SAFETY: the mapping is plain device-visible memory; synchronizing access to
// byte ranges is the ring allocator's job
unsafe impl Send for TransientBuffer {}
unsafe impl Sync for TransientBuffer {}

/// Backend device interface
///
/// Creation failures surface as `Error::OutOfMemory`, submission and signal
/// failures as `Error::BackendError`. Both are fatal for the caller.
pub trait Device: Send + Sync {
    /// Create a command allocator for the given queue kind
    fn create_command_allocator(&self, kind: QueueKind) -> Result<AllocatorHandle>;

    /// Create a command buffer in the recording state, backed by `allocator`
    fn create_command_buffer(&self, kind: QueueKind, allocator: AllocatorHandle) -> Result<BufferHandle>;

    /// Reset an allocator for reuse
    ///
    /// Only valid once every buffer recorded from it has completed on the device.
    fn reset_allocator(&self, allocator: AllocatorHandle) -> Result<()>;

    /// Reopen a command buffer for recording against `allocator`
    fn reset_buffer(&self, buffer: BufferHandle, allocator: AllocatorHandle) -> Result<()>;

    /// Record a command
    fn record(&self, buffer: BufferHandle, command: DeviceCommand) -> Result<()>;

    /// Close recording
    fn close_buffer(&self, buffer: BufferHandle) -> Result<()>;

    /// Hand closed buffers to the queue of the given kind, in order
    fn submit(&self, kind: QueueKind, buffers: &[BufferHandle]) -> Result<()>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64) -> Result<FenceHandle>;

    /// Ask the queue to set `fence` to `value` once preceding work completes
    fn signal_fence(&self, kind: QueueKind, fence: FenceHandle, value: u64) -> Result<()>;

    /// Last value the device reported complete
    fn completed_value(&self, fence: FenceHandle) -> u64;

    /// Signal `event` when `fence` reaches `value` (immediately if it already has)
    fn set_completion_event(&self, fence: FenceHandle, value: u64, event: Arc<WaitEvent>) -> Result<()>;

    /// Create a block of transient memory
    fn create_transient_buffer(&self, size: u64, cpu_visible: bool) -> Result<TransientBuffer>;

    /// Release a block of transient memory
    fn destroy_transient_buffer(&self, handle: MemoryHandle);
}
