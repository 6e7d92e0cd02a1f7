/// Growable upload heap - per-frame transient memory backed by a chain of rings
///
/// Allocations come from the newest `GpuRingBuffer`. When it cannot satisfy
/// a request, a new ring is created with at least twice its capacity (more
/// if the request needs it). Rings other than the newest are retired once
/// idle, one per `finish_frame`.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::device::{Device, MemoryHandle, TransientBuffer, TRANSIENT_BUFFER_ALIGNMENT};
use crate::error::{Error, Result};
use crate::memory::FrameRingAllocator;
use crate::sync;
use crate::{engine_bail, engine_debug};

/// Upload heap descriptor
#[derive(Debug, Clone)]
pub struct UploadHeapDesc {
    /// Capacity of the first ring, in bytes
    pub initial_capacity: u64,
    /// Rings are created CPU-visible (mapped)
    pub cpu_visible: bool,
}

impl Default for UploadHeapDesc {
    fn default() -> Self {
        Self {
            initial_capacity: 64 * 1024,
            cpu_visible: true,
        }
    }
}

/// A byte range handed out by the upload heap
///
/// Valid until the fence value of the frame it was allocated in completes
/// and the heap's next `finish_frame` reclaims it.
#[derive(Debug, Clone, Copy)]
pub struct DynamicAllocation {
    pub memory: MemoryHandle,
    pub offset: u64,
    pub size: u64,
    /// CPU address of the first byte, for mapped memory
    pub cpu_address: Option<NonNull<u8>>,
    pub device_address: u64,
}

// SAFETY: the range is exclusively owned by whoever received the allocation
unsafe impl Send for DynamicAllocation {}
unsafe impl Sync for DynamicAllocation {}

impl DynamicAllocation {
    /// Copy `data` to the start of the range
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if the memory is not CPU-visible or `data` is
    ///   larger than the range
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let Some(cpu_address) = self.cpu_address else {
            engine_bail!("nebula::DynamicAllocation", Error::InvalidResource =>
                "Write to an allocation without CPU mapping");
        };
        if data.len() as u64 > self.size {
            engine_bail!("nebula::DynamicAllocation", Error::InvalidResource =>
                "Write of {} bytes exceeds allocation of {} bytes", data.len(), self.size);
        }

        // SAFETY: the range [cpu_address, cpu_address + size) is mapped and
        // not reused before the frame's fence completes
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), cpu_address.as_ptr(), data.len());
        }
        Ok(())
    }
}

// ============================================================================
// GpuRingBuffer
// ============================================================================

/// A `FrameRingAllocator` over one block of device transient memory
///
/// The memory block is released when the ring is dropped.
pub struct GpuRingBuffer {
    allocator: FrameRingAllocator,
    buffer: TransientBuffer,
    device: Arc<dyn Device>,
}

impl GpuRingBuffer {
    pub fn new(device: Arc<dyn Device>, capacity: u64, cpu_visible: bool) -> Result<Self> {
        let buffer = device.create_transient_buffer(capacity, cpu_visible)?;
        engine_debug!("nebula::UploadHeap", "Created ring of {} bytes at {:#x}", capacity, buffer.device_address);
        Ok(Self {
            allocator: FrameRingAllocator::new(capacity),
            buffer,
            device,
        })
    }

    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<DynamicAllocation> {
        let offset = self.allocator.allocate(size, alignment)?;
        let cpu_address = self.buffer.mapped_ptr.map(|base| {
            // SAFETY: offset + size <= capacity, inside the mapping
            unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) }
        });
        Some(DynamicAllocation {
            memory: self.buffer.handle,
            offset,
            size,
            cpu_address,
            device_address: self.buffer.device_address + offset,
        })
    }

    pub fn finish_frame(&mut self, fence_value: u64, last_completed: u64) {
        self.allocator.finish_frame(fence_value);
        self.allocator.release_completed(last_completed);
    }

    pub fn capacity(&self) -> u64 {
        self.allocator.capacity()
    }

    pub fn used_size(&self) -> u64 {
        self.allocator.used_size()
    }

    pub fn is_idle(&self) -> bool {
        self.allocator.is_idle()
    }
}

impl Drop for GpuRingBuffer {
    fn drop(&mut self) {
        self.device.destroy_transient_buffer(self.buffer.handle);
    }
}

impl std::fmt::Debug for GpuRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuRingBuffer")
            .field("allocator", &self.allocator)
            .field("device_address", &self.buffer.device_address)
            .finish()
    }
}

// ============================================================================
// GrowableUploadHeap
// ============================================================================

pub struct GrowableUploadHeap {
    device: Arc<dyn Device>,
    desc: UploadHeapDesc,
    rings: Mutex<Vec<GpuRingBuffer>>,
}

impl GrowableUploadHeap {
    /// Create the heap and its first ring
    ///
    /// # Errors
    ///
    /// - `InitializationFailed` if `initial_capacity` is zero
    /// - `OutOfMemory` if the device cannot create the ring memory
    pub fn new(device: Arc<dyn Device>, desc: UploadHeapDesc) -> Result<Self> {
        if desc.initial_capacity == 0 {
            engine_bail!("nebula::UploadHeap", Error::InitializationFailed =>
                "Upload heap initial capacity must be non-zero");
        }

        let first = GpuRingBuffer::new(device.clone(), desc.initial_capacity, desc.cpu_visible)?;
        Ok(Self {
            device,
            desc,
            rings: Mutex::new(vec![first]),
        })
    }

    /// Allocate `size` bytes, rounded up to `alignment`
    ///
    /// Both the offset and the device address are aligned to `alignment`.
    /// Grows the heap when the newest ring is out of space.
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if `size` is zero, or `alignment` is not a power
    ///   of two or exceeds `TRANSIENT_BUFFER_ALIGNMENT`
    /// - `OutOfMemory` if a new ring cannot be created
    pub fn allocate(&self, size: u64, alignment: u64) -> Result<DynamicAllocation> {
        if !alignment.is_power_of_two() {
            engine_bail!("nebula::UploadHeap", Error::InvalidResource =>
                "Alignment {} is not a power of two", alignment);
        }
        if alignment > TRANSIENT_BUFFER_ALIGNMENT {
            engine_bail!("nebula::UploadHeap", Error::InvalidResource =>
                "Alignment {} exceeds the transient memory alignment {}", alignment, TRANSIENT_BUFFER_ALIGNMENT);
        }
        if size == 0 {
            engine_bail!("nebula::UploadHeap", Error::InvalidResource => "Zero-sized allocation");
        }
        let Some(aligned_size) = size.checked_add(alignment - 1).map(|s| s & !(alignment - 1)) else {
            engine_bail!("nebula::UploadHeap", Error::InvalidResource =>
                "Allocation of {} bytes overflows", size);
        };

        let mut rings = sync::lock(&self.rings, "UploadHeap rings")?;

        let newest_capacity = match rings.last_mut() {
            Some(ring) => {
                if let Some(allocation) = ring.allocate(aligned_size, alignment) {
                    return Ok(allocation);
                }
                ring.capacity()
            }
            None => self.desc.initial_capacity,
        };

        let mut capacity = newest_capacity.saturating_mul(2);
        while capacity < aligned_size {
            capacity = capacity.saturating_mul(2);
        }

        let mut ring = GpuRingBuffer::new(self.device.clone(), capacity, self.desc.cpu_visible)?;
        let Some(allocation) = ring.allocate(aligned_size, alignment) else {
            engine_bail!("nebula::UploadHeap", "Fresh ring of {} bytes rejected {} bytes", capacity, aligned_size);
        };
        rings.push(ring);
        engine_debug!("nebula::UploadHeap", "Grew to {} rings ({} bytes requested)", rings.len(), aligned_size);

        Ok(allocation)
    }

    /// Allocate and fill a range with `data`
    ///
    /// # Errors
    ///
    /// Same as `allocate`, plus `InvalidResource` if the heap is not CPU-visible.
    pub fn upload<T: bytemuck::Pod>(&self, data: &[T], alignment: u64) -> Result<DynamicAllocation> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let allocation = self.allocate(bytes.len() as u64, alignment)?;
        allocation.write(bytes)?;
        Ok(allocation)
    }

    /// Close the frame on every ring and reclaim completed frames
    ///
    /// Retires at most one idle ring that is not the newest.
    pub fn finish_frame(&self, fence_value: u64, last_completed: u64) -> Result<()> {
        let mut rings = sync::lock(&self.rings, "UploadHeap rings")?;

        for ring in rings.iter_mut() {
            ring.finish_frame(fence_value, last_completed);
        }

        let newest = rings.len().saturating_sub(1);
        if let Some(index) = rings[..newest].iter().position(GpuRingBuffer::is_idle) {
            let retired = rings.remove(index);
            engine_debug!("nebula::UploadHeap", "Retired ring of {} bytes, {} left", retired.capacity(), rings.len());
        }
        Ok(())
    }

    /// Number of live rings
    pub fn ring_count(&self) -> usize {
        self.rings.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Capacity of each live ring, oldest first
    pub fn ring_capacities(&self) -> Vec<u64> {
        self.rings
            .lock()
            .map(|r| r.iter().map(GpuRingBuffer::capacity).collect())
            .unwrap_or_default()
    }

    /// Total capacity across rings
    pub fn capacity(&self) -> u64 {
        self.rings.lock().map(|r| r.iter().map(GpuRingBuffer::capacity).sum()).unwrap_or(0)
    }

    /// Bytes allocated and not yet reclaimed across rings
    pub fn used_size(&self) -> u64 {
        self.rings.lock().map(|r| r.iter().map(GpuRingBuffer::used_size).sum()).unwrap_or(0)
    }

    pub fn desc(&self) -> &UploadHeapDesc {
        &self.desc
    }
}

impl std::fmt::Debug for GrowableUploadHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableUploadHeap")
            .field("rings", &self.ring_count())
            .field("capacity", &self.capacity())
            .field("used_size", &self.used_size())
            .finish()
    }
}

#[cfg(test)]
#[path = "upload_heap_tests.rs"]
mod tests;
