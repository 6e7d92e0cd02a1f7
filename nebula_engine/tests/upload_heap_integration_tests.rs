//! Integration tests for the upload heap driven by a submission queue
//!
//! Run with: cargo test --test upload_heap_integration_tests

use nebula_engine::nebula::device::{Device, QueueKind, SimulatedDevice};
use nebula_engine::nebula::memory::{GrowableUploadHeap, UploadHeapDesc};
use nebula_engine::nebula::submission::{SubmissionConfig, SubmissionQueue};
use std::sync::Arc;

#[test]
fn test_integration_upload_and_copy_to_device_memory() {
    let device = Arc::new(SimulatedDevice::new());
    let queue = SubmissionQueue::new(device.clone(), QueueKind::Copy, SubmissionConfig::default()).unwrap();
    let heap = GrowableUploadHeap::new(device.clone(), UploadHeapDesc::default()).unwrap();
    let destination = device.create_transient_buffer(256, false).unwrap();

    let vertices: [[f32; 3]; 3] = [[0.0, 1.0, 0.0], [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0]];
    let staging = heap.upload(&vertices, 16).unwrap();

    let mut buffer = queue.acquire_buffer().unwrap();
    buffer
        .copy_buffer(staging.memory, staging.offset, destination.handle, 0, 36)
        .unwrap();
    let value = queue.submit_and_wait(buffer).unwrap();
    heap.finish_frame(value, queue.last_completed()).unwrap();

    let copied = device.read_memory(destination.handle, 0, 36).unwrap();
    assert_eq!(copied, bytemuck::cast_slice::<[f32; 3], u8>(&vertices).to_vec());
    assert_eq!(heap.used_size(), 0);

    device.destroy_transient_buffer(destination.handle);
}

#[test]
fn test_integration_frame_loop_reclaims_after_fence() {
    let device = Arc::new(SimulatedDevice::manual());
    let queue = SubmissionQueue::new(device.clone(), QueueKind::Graphics, SubmissionConfig::default()).unwrap();
    let heap = GrowableUploadHeap::new(
        device.clone(),
        UploadHeapDesc { initial_capacity: 1024, cpu_visible: true },
    )
    .unwrap();
    let fence = queue.fence().handle();

    // Three frames of 400 bytes with the device two frames behind
    let mut frame_values = Vec::new();
    for _ in 0..3 {
        heap.upload(&[7u8; 400], 4).unwrap();
        let value = queue.signal().unwrap();
        heap.finish_frame(value, queue.last_completed()).unwrap();
        frame_values.push(value);
    }

    // 1200 bytes in flight cannot fit one 1024-byte ring
    assert_eq!(heap.ring_count(), 2);
    assert_eq!(heap.ring_capacities(), vec![1024, 2048]);

    device.complete_fence(fence, frame_values[2]);
    let value = queue.signal().unwrap();
    heap.finish_frame(value, queue.last_completed()).unwrap();

    assert_eq!(heap.used_size(), 0);
    assert_eq!(heap.ring_capacities(), vec![2048]);
    assert_eq!(device.transient_buffer_count(), 1);
}

#[test]
fn test_integration_heap_and_queue_share_device() {
    let device: Arc<dyn Device> = Arc::new(SimulatedDevice::new());
    let queue = SubmissionQueue::new(device.clone(), QueueKind::Graphics, SubmissionConfig::default()).unwrap();
    let heap = GrowableUploadHeap::new(device, UploadHeapDesc::default()).unwrap();

    let constants = heap.upload(&[1.0f32, 2.0, 3.0, 4.0], 256).unwrap();
    assert_eq!(constants.size, 256);
    assert!(constants.cpu_address.is_some());

    let value = queue.flush().unwrap();
    heap.finish_frame(value, queue.last_completed()).unwrap();
    assert_eq!(heap.used_size(), 0);
}
