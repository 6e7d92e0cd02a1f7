//! Transient memory
//!
//! `FrameRingAllocator` manages fence-tagged offsets in a circular range;
//! `GrowableUploadHeap` chains `GpuRingBuffer`s over device memory and grows
//! on demand.

pub mod frame_ring_allocator;
pub mod upload_heap;

pub use frame_ring_allocator::FrameRingAllocator;
pub use upload_heap::{DynamicAllocation, GpuRingBuffer, GrowableUploadHeap, UploadHeapDesc};
