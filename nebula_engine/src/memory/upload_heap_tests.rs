use super::*;
use crate::device::SimulatedDevice;

fn heap_with(initial_capacity: u64) -> (Arc<SimulatedDevice>, GrowableUploadHeap) {
    let device = Arc::new(SimulatedDevice::new());
    let heap = GrowableUploadHeap::new(
        device.clone(),
        UploadHeapDesc {
            initial_capacity,
            ..Default::default()
        },
    )
    .unwrap();
    (device, heap)
}

#[test]
fn test_default_desc() {
    let desc = UploadHeapDesc::default();
    assert_eq!(desc.initial_capacity, 64 * 1024);
    assert!(desc.cpu_visible);
}

#[test]
fn test_zero_initial_capacity_fails() {
    let device: Arc<dyn Device> = Arc::new(SimulatedDevice::new());
    let result = GrowableUploadHeap::new(device, UploadHeapDesc { initial_capacity: 0, cpu_visible: true });
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_allocation_rounds_to_alignment() {
    let (_device, heap) = heap_with(1024);
    let first = heap.allocate(10, 16).unwrap();
    let second = heap.allocate(1, 256).unwrap();

    assert_eq!(first.offset, 0);
    assert_eq!(first.size, 16);
    assert_eq!(second.offset, 256);
    assert_eq!(second.size, 256);
    assert_eq!(second.device_address, first.device_address + 256);
    assert_eq!(heap.used_size(), 512);
}

#[test]
fn test_mixed_alignments_yield_aligned_addresses() {
    let (_device, heap) = heap_with(1024);
    let small = heap.allocate(3, 1).unwrap();
    let constants = heap.allocate(16, 256).unwrap();
    let vertices = heap.allocate(12, 4).unwrap();

    assert_eq!(small.offset, 0);
    assert_eq!(constants.offset, 256);
    assert_eq!(constants.device_address % 256, 0);
    assert_eq!(vertices.offset, 512);
    assert_eq!(vertices.device_address % 4, 0);
    assert_eq!(heap.used_size(), 524);
}

#[test]
fn test_alignment_holds_with_non_power_of_two_capacity() {
    let (_device, heap) = heap_with(1000);
    heap.allocate(100, 1).unwrap();
    let aligned = heap.allocate(64, 64).unwrap();
    assert_eq!(aligned.offset, 128);
    assert_eq!(aligned.device_address % 64, 0);

    // Rounded to 512 at offset 512: 1024 > 1000, served by a new ring
    let grown = heap.allocate(300, 512).unwrap();
    assert_eq!(grown.offset, 0);
    assert_eq!(grown.device_address % 512, 0);
    assert_eq!(heap.ring_capacities(), vec![1000, 2000]);
}

#[test]
fn test_alignment_beyond_memory_alignment_rejected() {
    let (_device, heap) = heap_with(1024);
    let result = heap.allocate(16, TRANSIENT_BUFFER_ALIGNMENT * 2);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_invalid_requests() {
    let (_device, heap) = heap_with(1024);
    assert!(matches!(heap.allocate(16, 3), Err(Error::InvalidResource(_))));
    assert!(matches!(heap.allocate(16, 0), Err(Error::InvalidResource(_))));
    assert!(matches!(heap.allocate(0, 4), Err(Error::InvalidResource(_))));
    assert_eq!(heap.ring_count(), 1);
}

#[test]
fn test_growth_doubles_until_request_fits() {
    let (device, heap) = heap_with(1024);
    heap.allocate(512, 1).unwrap();

    let big = heap.allocate(3000, 1).unwrap();
    assert_eq!(big.offset, 0);
    assert_eq!(heap.ring_capacities(), vec![1024, 4096]);
    assert_eq!(heap.capacity(), 1024 + 4096);
    assert_eq!(device.transient_buffer_count(), 2);
}

#[test]
fn test_growth_doubles_at_least_once() {
    let (_device, heap) = heap_with(1024);
    heap.allocate(1000, 1).unwrap();
    heap.allocate(100, 1).unwrap();
    assert_eq!(heap.ring_capacities(), vec![1024, 2048]);
}

#[test]
fn test_old_ring_retired_once_idle() {
    let (device, heap) = heap_with(1024);
    heap.allocate(512, 1).unwrap();
    heap.allocate(3000, 1).unwrap();

    // Frame 1 is still in flight
    heap.finish_frame(1, 0).unwrap();
    assert_eq!(heap.ring_count(), 2);

    heap.finish_frame(2, 1).unwrap();
    assert_eq!(heap.ring_capacities(), vec![4096]);
    assert_eq!(device.transient_buffer_count(), 1);
    assert_eq!(heap.used_size(), 0);
}

#[test]
fn test_newest_ring_is_never_retired() {
    let (device, heap) = heap_with(256);
    heap.allocate(64, 1).unwrap();
    heap.finish_frame(1, 1).unwrap();
    heap.finish_frame(2, 2).unwrap();
    assert_eq!(heap.ring_count(), 1);
    assert_eq!(device.transient_buffer_count(), 1);
}

#[test]
fn test_one_ring_retired_per_frame() {
    let (_device, heap) = heap_with(64);
    heap.allocate(64, 1).unwrap();
    heap.allocate(128, 1).unwrap();
    heap.allocate(256, 1).unwrap();
    assert_eq!(heap.ring_capacities(), vec![64, 128, 256]);

    heap.finish_frame(1, 1).unwrap();
    assert_eq!(heap.ring_capacities(), vec![128, 256]);
    heap.finish_frame(2, 2).unwrap();
    assert_eq!(heap.ring_capacities(), vec![256]);
}

#[test]
fn test_write_and_upload() {
    let (device, heap) = heap_with(1024);

    let allocation = heap.allocate(16, 4).unwrap();
    allocation.write(&[9, 8, 7, 6]).unwrap();
    assert_eq!(device.read_memory(allocation.memory, allocation.offset, 4), Some(vec![9, 8, 7, 6]));

    let values: [u32; 3] = [1, 2, 0xdead_beef];
    let uploaded = heap.upload(&values, 16).unwrap();
    assert_eq!(uploaded.offset, 16);
    assert_eq!(uploaded.size, 16);
    let bytes = device.read_memory(uploaded.memory, uploaded.offset, 12).unwrap();
    assert_eq!(bytes, bytemuck::cast_slice::<u32, u8>(&values).to_vec());
}

#[test]
fn test_write_out_of_bounds() {
    let (_device, heap) = heap_with(1024);
    let allocation = heap.allocate(4, 4).unwrap();
    assert!(matches!(allocation.write(&[0; 5]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_write_without_mapping() {
    let device: Arc<dyn Device> = Arc::new(SimulatedDevice::new());
    let heap = GrowableUploadHeap::new(device, UploadHeapDesc { initial_capacity: 256, cpu_visible: false }).unwrap();
    let allocation = heap.allocate(4, 4).unwrap();
    assert!(allocation.cpu_address.is_none());
    assert!(matches!(allocation.write(&[1]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_ring_creation_failure_propagates() {
    let (device, heap) = heap_with(128);
    heap.allocate(128, 1).unwrap();
    device.set_fail_allocations(true);
    assert!(matches!(heap.allocate(64, 1), Err(Error::OutOfMemory)));
    assert_eq!(heap.ring_count(), 1);
}
