/// Simulated device for tests and headless tools (no GPU required)
///
/// Implements `Device` entirely on the host. Transient memory is host heap
/// memory, copies recorded with `DeviceCommand::CopyBuffer` execute at submit
/// time, and fences either complete as soon as they are signaled
/// (`CompletionMode::Immediate`) or wait for the test to complete them
/// (`CompletionMode::Manual`).

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use slotmap::SlotMap;

use crate::device::{
    AllocatorHandle, BufferHandle, Device, DeviceCommand, FenceHandle, MemoryHandle,
    QueueKind, TransientBuffer, TRANSIENT_BUFFER_ALIGNMENT,
};
use crate::error::{Error, Result};
use crate::sync::WaitEvent;
use crate::{engine_bail, engine_error, engine_trace};

/// When signaled fence values become complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// A signal completes immediately
    Immediate,
    /// Signals queue up until `complete_next`, `complete_fence` or `complete_all`
    Manual,
}

#[derive(Debug, Clone)]
pub struct SimulatedDeviceConfig {
    pub completion: CompletionMode,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            completion: CompletionMode::Immediate,
        }
    }
}

/// One command buffer as seen by a queue at submit time
#[derive(Debug, Clone)]
pub struct SubmittedBuffer {
    pub queue: QueueKind,
    pub buffer: BufferHandle,
    pub allocator: AllocatorHandle,
    pub commands: Vec<DeviceCommand>,
}

// ============================================================================
// Internal state
// ============================================================================

struct AllocatorState {
    kind: QueueKind,
}

struct BufferState {
    kind: QueueKind,
    allocator: AllocatorHandle,
    commands: Vec<DeviceCommand>,
    recording: bool,
}

struct FenceState {
    completed: u64,
    signaled: u64,
    pending: VecDeque<u64>,
    waiters: Vec<(u64, Arc<WaitEvent>)>,
}

impl FenceState {
    fn complete_to(&mut self, value: u64) {
        if value > self.completed {
            self.completed = value;
        }
        let completed = self.completed;
        self.pending.retain(|v| *v > completed);
        self.waiters.retain(|(target, event)| {
            if *target <= completed {
                event.signal();
                false
            } else {
                true
            }
        });
    }
}

/// Host allocation standing in for device memory
struct HostMemory {
    ptr: NonNull<u8>,
    len: usize,
    cpu_visible: bool,
}

// SAFETY: the allocation is exclusively owned and only touched under the device lock
unsafe impl Send for HostMemory {}

impl HostMemory {
    /// Returns `None` if the host cannot provide `len` bytes
    fn new(len: usize, cpu_visible: bool) -> Option<Self> {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.try_reserve_exact(len).ok()?;
        bytes.resize(len, 0);
        let raw = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
        Some(Self {
            // SAFETY: Box::into_raw never returns null
            ptr: unsafe { NonNull::new_unchecked(raw) },
            len,
            cpu_visible,
        })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr/len describe the live allocation made in new()
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        // SAFETY: reconstructs the box leaked in new()
        unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
            drop(Box::from_raw(slice));
        }
    }
}

struct DeviceState {
    allocators: SlotMap<AllocatorHandle, AllocatorState>,
    buffers: SlotMap<BufferHandle, BufferState>,
    fences: SlotMap<FenceHandle, FenceState>,
    memory: SlotMap<MemoryHandle, HostMemory>,
    submissions: Vec<SubmittedBuffer>,
    allocator_resets: Vec<AllocatorHandle>,
    next_device_address: u64,
}

const DEVICE_ADDRESS_BASE: u64 = 0x1000_0000;

// ============================================================================
// SimulatedDevice
// ============================================================================

pub struct SimulatedDevice {
    config: SimulatedDeviceConfig,
    state: Mutex<DeviceState>,
    fail_next_submit: AtomicBool,
    fail_allocations: AtomicBool,
}

impl SimulatedDevice {
    /// Create a device whose fences complete on signal
    pub fn new() -> Self {
        Self::with_config(SimulatedDeviceConfig::default())
    }

    pub fn with_config(config: SimulatedDeviceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DeviceState {
                allocators: SlotMap::with_key(),
                buffers: SlotMap::with_key(),
                fences: SlotMap::with_key(),
                memory: SlotMap::with_key(),
                submissions: Vec::new(),
                allocator_resets: Vec::new(),
                next_device_address: DEVICE_ADDRESS_BASE,
            }),
            fail_next_submit: AtomicBool::new(false),
            fail_allocations: AtomicBool::new(false),
        }
    }

    /// Create a device whose fences complete only when told to
    pub fn manual() -> Self {
        Self::with_config(SimulatedDeviceConfig {
            completion: CompletionMode::Manual,
        })
    }

    pub fn config(&self) -> &SimulatedDeviceConfig {
        &self.config
    }

    // The state holds no invariants a panicking test could break halfway
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Completion control =====

    /// Complete the oldest outstanding signal on `fence`, returning its value
    pub fn complete_next(&self, fence: FenceHandle) -> Option<u64> {
        let mut state = self.state();
        let fence_state = state.fences.get_mut(fence)?;
        let value = fence_state.pending.pop_front()?;
        fence_state.complete_to(value);
        Some(value)
    }

    /// Complete `fence` up to `value`
    ///
    /// Values beyond what was signaled are accepted; the device is simulated.
    pub fn complete_fence(&self, fence: FenceHandle, value: u64) {
        let mut state = self.state();
        if let Some(fence_state) = state.fences.get_mut(fence) {
            fence_state.complete_to(value);
        }
    }

    /// Complete every outstanding signal on every fence
    pub fn complete_all(&self) {
        let mut state = self.state();
        for (_, fence_state) in state.fences.iter_mut() {
            let signaled = fence_state.signaled;
            fence_state.complete_to(signaled);
        }
    }

    /// Highest value queued for `fence`, completed or not
    pub fn signaled_value(&self, fence: FenceHandle) -> Option<u64> {
        self.state().fences.get(fence).map(|f| f.signaled)
    }

    // ===== Failure injection =====

    /// Make the next `submit` fail with `Error::BackendError`
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::SeqCst);
    }

    /// Make allocator, command buffer and memory creation fail with `Error::OutOfMemory`
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    // ===== Inspection =====

    /// Every buffer submitted so far, in submission order
    pub fn submissions(&self) -> Vec<SubmittedBuffer> {
        self.state().submissions.clone()
    }

    /// Marker commands in submission order, across all queues
    pub fn submitted_markers(&self) -> Vec<String> {
        self.state()
            .submissions
            .iter()
            .flat_map(|s| s.commands.iter())
            .filter_map(|c| match c {
                DeviceCommand::Marker(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Allocators passed to `reset_allocator`, in call order
    pub fn allocator_resets(&self) -> Vec<AllocatorHandle> {
        self.state().allocator_resets.clone()
    }

    pub fn allocator_count(&self) -> usize {
        self.state().allocators.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of live transient memory blocks
    pub fn transient_buffer_count(&self) -> usize {
        self.state().memory.len()
    }

    /// Read back `len` bytes of a transient memory block
    pub fn read_memory(&self, handle: MemoryHandle, offset: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.state();
        let memory = state.memory.get(handle)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        memory.bytes().get(start..end).map(<[u8]>::to_vec)
    }

    fn execute_copy(state: &mut DeviceState, command: &DeviceCommand) -> Result<()> {
        let DeviceCommand::CopyBuffer { src, src_offset, dst, dst_offset, size } = *command else {
            return Ok(());
        };

        let source: Vec<u8> = {
            let memory = state.memory.get(src).ok_or_else(|| {
                Error::BackendError("CopyBuffer source was destroyed".to_string())
            })?;
            let start = src_offset as usize;
            let end = start.saturating_add(size as usize);
            memory.bytes().get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
                Error::BackendError(format!(
                    "CopyBuffer source range {}..{} out of bounds ({} bytes)",
                    start, end, memory.len
                ))
            })?
        };

        let target = state.memory.get_mut(dst).ok_or_else(|| {
            Error::BackendError("CopyBuffer destination was destroyed".to_string())
        })?;
        let start = dst_offset as usize;
        if start.saturating_add(source.len()) > target.len {
            return Err(Error::BackendError(format!(
                "CopyBuffer destination range {}..{} out of bounds ({} bytes)",
                start,
                start + source.len(),
                target.len
            )));
        }
        // SAFETY: range checked above, exclusive access under the device lock
        unsafe {
            std::ptr::copy_nonoverlapping(
                source.as_ptr(),
                target.ptr.as_ptr().add(start),
                source.len(),
            );
        }
        Ok(())
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SimulatedDevice")
            .field("completion", &self.config.completion)
            .field("allocators", &state.allocators.len())
            .field("buffers", &state.buffers.len())
            .field("fences", &state.fences.len())
            .field("transient_buffers", &state.memory.len())
            .finish()
    }
}

impl Device for SimulatedDevice {
    fn create_command_allocator(&self, kind: QueueKind) -> Result<AllocatorHandle> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            engine_error!("nebula::SimulatedDevice", "Command allocator creation failed ({})", kind.name());
            return Err(Error::OutOfMemory);
        }
        Ok(self.state().allocators.insert(AllocatorState { kind }))
    }

    fn create_command_buffer(&self, kind: QueueKind, allocator: AllocatorHandle) -> Result<BufferHandle> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            engine_error!("nebula::SimulatedDevice", "Command buffer creation failed ({})", kind.name());
            return Err(Error::OutOfMemory);
        }

        let mut state = self.state();
        match state.allocators.get(allocator) {
            Some(a) if a.kind == kind => {}
            Some(a) => engine_bail!("nebula::SimulatedDevice", Error::InvalidResource =>
                "Allocator for {} queue used to create a {} buffer", a.kind.name(), kind.name()),
            None => engine_bail!("nebula::SimulatedDevice", Error::InvalidResource =>
                "Unknown command allocator"),
        }

        Ok(state.buffers.insert(BufferState {
            kind,
            allocator,
            commands: Vec::new(),
            recording: true,
        }))
    }

    fn reset_allocator(&self, allocator: AllocatorHandle) -> Result<()> {
        let mut state = self.state();
        if !state.allocators.contains_key(allocator) {
            engine_bail!("nebula::SimulatedDevice", Error::InvalidResource => "Unknown command allocator");
        }
        state.allocator_resets.push(allocator);
        Ok(())
    }

    fn reset_buffer(&self, buffer: BufferHandle, allocator: AllocatorHandle) -> Result<()> {
        let mut state = self.state();
        if !state.allocators.contains_key(allocator) {
            engine_bail!("nebula::SimulatedDevice", Error::InvalidResource => "Unknown command allocator");
        }
        let Some(buffer_state) = state.buffers.get_mut(buffer) else {
            engine_bail!("nebula::SimulatedDevice", Error::InvalidResource => "Unknown command buffer");
        };
        buffer_state.allocator = allocator;
        buffer_state.commands.clear();
        buffer_state.recording = true;
        Ok(())
    }

    fn record(&self, buffer: BufferHandle, command: DeviceCommand) -> Result<()> {
        let mut state = self.state();
        match state.buffers.get_mut(buffer) {
            Some(b) if b.recording => {
                b.commands.push(command);
                Ok(())
            }
            Some(_) => Err(Error::InvalidResource("Command buffer is not recording".to_string())),
            None => Err(Error::InvalidResource("Unknown command buffer".to_string())),
        }
    }

    fn close_buffer(&self, buffer: BufferHandle) -> Result<()> {
        let mut state = self.state();
        match state.buffers.get_mut(buffer) {
            Some(b) if b.recording => {
                b.recording = false;
                Ok(())
            }
            Some(_) => Err(Error::InvalidResource("Command buffer is already closed".to_string())),
            None => Err(Error::InvalidResource("Unknown command buffer".to_string())),
        }
    }

    fn submit(&self, kind: QueueKind, buffers: &[BufferHandle]) -> Result<()> {
        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            engine_bail!("nebula::SimulatedDevice", "Device removed during {} submit", kind.name());
        }

        let mut state = self.state();
        let mut batch = Vec::with_capacity(buffers.len());
        for &buffer in buffers {
            let Some(b) = state.buffers.get(buffer) else {
                engine_bail!("nebula::SimulatedDevice", Error::InvalidResource => "Unknown command buffer submitted");
            };
            if b.recording {
                engine_bail!("nebula::SimulatedDevice", Error::InvalidResource => "Submitted command buffer is still recording");
            }
            if b.kind != kind {
                engine_bail!("nebula::SimulatedDevice", Error::InvalidResource =>
                    "{} buffer submitted to {} queue", b.kind.name(), kind.name());
            }
            batch.push(SubmittedBuffer {
                queue: kind,
                buffer,
                allocator: b.allocator,
                commands: b.commands.clone(),
            });
        }

        for submitted in &batch {
            for command in &submitted.commands {
                Self::execute_copy(&mut state, command)?;
            }
        }

        engine_trace!("nebula::SimulatedDevice", "{} queue executed {} buffers", kind.name(), batch.len());
        state.submissions.extend(batch);
        Ok(())
    }

    fn create_fence(&self, initial_value: u64) -> Result<FenceHandle> {
        Ok(self.state().fences.insert(FenceState {
            completed: initial_value,
            signaled: initial_value,
            pending: VecDeque::new(),
            waiters: Vec::new(),
        }))
    }

    fn signal_fence(&self, _kind: QueueKind, fence: FenceHandle, value: u64) -> Result<()> {
        let completion = self.config.completion;
        let mut state = self.state();
        let Some(fence_state) = state.fences.get_mut(fence) else {
            engine_bail!("nebula::SimulatedDevice", "Signal on unknown fence");
        };

        fence_state.signaled = fence_state.signaled.max(value);
        match completion {
            CompletionMode::Immediate => fence_state.complete_to(value),
            CompletionMode::Manual => fence_state.pending.push_back(value),
        }
        Ok(())
    }

    fn completed_value(&self, fence: FenceHandle) -> u64 {
        self.state().fences.get(fence).map_or(0, |f| f.completed)
    }

    fn set_completion_event(&self, fence: FenceHandle, value: u64, event: Arc<WaitEvent>) -> Result<()> {
        let mut state = self.state();
        let Some(fence_state) = state.fences.get_mut(fence) else {
            engine_bail!("nebula::SimulatedDevice", "Completion event on unknown fence");
        };

        if fence_state.completed >= value {
            event.signal();
        } else {
            fence_state.waiters.push((value, event));
        }
        Ok(())
    }

    fn create_transient_buffer(&self, size: u64, cpu_visible: bool) -> Result<TransientBuffer> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            engine_error!("nebula::SimulatedDevice", "Transient buffer creation failed ({} bytes)", size);
            return Err(Error::OutOfMemory);
        }
        let Ok(len) = usize::try_from(size) else {
            engine_error!("nebula::SimulatedDevice", "Transient buffer of {} bytes exceeds host memory", size);
            return Err(Error::OutOfMemory);
        };

        let Some(memory) = HostMemory::new(len, cpu_visible) else {
            engine_error!("nebula::SimulatedDevice", "Host allocation of {} bytes failed", size);
            return Err(Error::OutOfMemory);
        };
        let mut state = self.state();
        let mapped_ptr = memory.cpu_visible.then_some(memory.ptr);
        let handle = state.memory.insert(memory);

        let device_address = state.next_device_address;
        let span = size.max(1).div_ceil(TRANSIENT_BUFFER_ALIGNMENT) * TRANSIENT_BUFFER_ALIGNMENT;
        state.next_device_address = device_address.saturating_add(span);

        Ok(TransientBuffer {
            handle,
            size,
            device_address,
            mapped_ptr,
        })
    }

    fn destroy_transient_buffer(&self, handle: MemoryHandle) {
        self.state().memory.remove(handle);
    }
}

#[cfg(test)]
#[path = "simulated_device_tests.rs"]
mod tests;
