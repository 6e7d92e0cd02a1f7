use super::*;

#[test]
fn test_new_allocator_is_empty() {
    let ring = FrameRingAllocator::new(256);
    assert_eq!(ring.capacity(), 256);
    assert_eq!(ring.used_size(), 0);
    assert!(ring.is_empty());
    assert!(ring.is_idle());
    assert!(!ring.is_full());
}

#[test]
fn test_sequential_allocations() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(10, 1), Some(0));
    assert_eq!(ring.allocate(20, 1), Some(10));
    assert_eq!(ring.allocate(70, 1), Some(30));
    assert!(ring.is_full());
    assert_eq!(ring.allocate(1, 1), None);
}

#[test]
fn test_zero_and_oversized_requests_fail() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(0, 1), None);
    assert_eq!(ring.allocate(101, 1), None);
    assert!(ring.is_idle());
}

#[test]
fn test_wraparound_after_completion() {
    let mut ring = FrameRingAllocator::new(100);

    assert_eq!(ring.allocate(60, 1), Some(0));
    ring.finish_frame(1);

    // Head still at 0: no room after tail, no room before head
    assert_eq!(ring.allocate(60, 1), None);

    ring.release_completed(1);
    assert_eq!(ring.used_size(), 0);

    // Wraps to 0, charging the 40 skipped bytes
    assert_eq!(ring.allocate(60, 1), Some(0));
    assert_eq!(ring.used_size(), 100);
    assert!(ring.used_size() <= ring.capacity());
    assert!(ring.is_full());
}

#[test]
fn test_wrap_with_exact_head_gap() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(30, 1), Some(0));
    ring.finish_frame(1);
    assert_eq!(ring.allocate(50, 1), Some(30));
    ring.finish_frame(2);
    ring.release_completed(1);

    // head = 30, tail = 80: 30 bytes before head, 20 after tail
    assert_eq!(ring.allocate(30, 1), Some(0));
    assert_eq!(ring.used_size(), 50 + 20 + 30);
    assert!(ring.is_full());
}

#[test]
fn test_wrap_gap_one_byte_short_fails() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(30, 1), Some(0));
    ring.finish_frame(1);
    assert_eq!(ring.allocate(50, 1), Some(30));
    ring.finish_frame(2);
    ring.release_completed(1);

    assert_eq!(ring.allocate(31, 1), None);
    assert_eq!(ring.used_size(), 50);
}

#[test]
fn test_allocation_between_tail_and_head() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(50, 1), Some(0));
    ring.finish_frame(1);
    assert_eq!(ring.allocate(40, 1), Some(50));
    ring.finish_frame(2);
    ring.release_completed(1);

    // head = 50, tail = 90; wrap to 0 then extend towards head
    assert_eq!(ring.allocate(20, 1), Some(0));
    assert_eq!(ring.allocate(30, 1), Some(20));
    assert_eq!(ring.allocate(1, 1), None);
    assert!(ring.is_full());
}

#[test]
fn test_wrap_padding_is_reclaimed_with_frame() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(70, 1), Some(0));
    ring.finish_frame(1);
    ring.release_completed(1);

    assert_eq!(ring.allocate(50, 1), Some(0));
    ring.finish_frame(2);
    assert_eq!(ring.used_size(), 80);

    ring.release_completed(2);
    assert_eq!(ring.used_size(), 0);
    assert!(ring.is_idle());
}

#[test]
fn test_release_stops_at_incomplete_fence() {
    let mut ring = FrameRingAllocator::new(100);
    ring.allocate(10, 1);
    ring.finish_frame(1);
    ring.allocate(20, 1);
    ring.finish_frame(2);
    ring.allocate(30, 1);
    ring.finish_frame(3);

    ring.release_completed(2);
    assert_eq!(ring.used_size(), 30);
    assert_eq!(ring.pending_frames(), 1);

    ring.release_completed(0);
    assert_eq!(ring.pending_frames(), 1);
}

#[test]
fn test_empty_frame_leaves_no_record() {
    let mut ring = FrameRingAllocator::new(100);
    ring.finish_frame(1);
    assert_eq!(ring.pending_frames(), 0);
    assert!(ring.is_idle());
}

#[test]
fn test_open_frame_is_not_idle() {
    let mut ring = FrameRingAllocator::new(100);
    ring.allocate(10, 1);
    assert!(!ring.is_idle());
    ring.finish_frame(1);
    assert!(!ring.is_idle());
    ring.release_completed(1);
    assert!(ring.is_idle());
}

#[test]
fn test_idle_ring_rewinds_for_large_request() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(40, 1), Some(0));
    ring.finish_frame(1);
    ring.release_completed(1);

    // head = tail = 40; 80 fits neither after tail nor before head
    assert_eq!(ring.allocate(80, 1), Some(0));
    assert_eq!(ring.used_size(), 80);
}

#[test]
fn test_full_capacity_request() {
    let mut ring = FrameRingAllocator::new(64);
    assert_eq!(ring.allocate(64, 1), Some(0));
    assert!(ring.is_full());
    ring.finish_frame(1);
    ring.release_completed(1);
    assert_eq!(ring.allocate(64, 1), Some(0));
}

#[test]
fn test_offset_padded_to_alignment() {
    let mut ring = FrameRingAllocator::new(1024);
    assert_eq!(ring.allocate(3, 1), Some(0));
    assert_eq!(ring.allocate(16, 256), Some(256));
    assert_eq!(ring.used_size(), 256 + 16);

    // Padding is reclaimed with the frame that paid for it
    ring.finish_frame(1);
    ring.release_completed(1);
    assert_eq!(ring.used_size(), 0);
    assert!(ring.is_idle());
}

#[test]
fn test_alignment_padding_between_tail_and_head() {
    let mut ring = FrameRingAllocator::new(100);
    assert_eq!(ring.allocate(60, 1), Some(0));
    ring.finish_frame(1);
    assert_eq!(ring.allocate(30, 1), Some(60));
    ring.finish_frame(2);
    ring.release_completed(1);

    // head = 60, tail = 90: wrap to 0, then pad 15 -> 16
    assert_eq!(ring.allocate(15, 1), Some(0));
    assert_eq!(ring.allocate(40, 8), Some(16));
    assert_eq!(ring.used_size(), 30 + 10 + 15 + 1 + 40);

    // 56 + 5 > 60
    assert_eq!(ring.allocate(5, 4), None);
    assert_eq!(ring.allocate(4, 4), Some(56));
    assert!(ring.is_full());
}

#[test]
fn test_padding_that_overruns_end_wraps_instead() {
    let mut ring = FrameRingAllocator::new(256);
    assert_eq!(ring.allocate(100, 1), Some(0));
    ring.finish_frame(1);
    ring.release_completed(1);
    assert_eq!(ring.allocate(100, 1), Some(100));

    // Aligned tail would be 256: no room left, wrap before head (100)
    assert_eq!(ring.allocate(64, 128), Some(0));
    assert_eq!(ring.used_size(), 100 + 56 + 64);
}
