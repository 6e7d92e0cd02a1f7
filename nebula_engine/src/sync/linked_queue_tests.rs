use super::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Single-thread behavior
// ============================================================================

#[test]
fn test_new_queue_is_empty() {
    let queue: LockFreeLinkedQueue<u32> = LockFreeLinkedQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn test_fifo_order() {
    let queue = LockFreeLinkedQueue::new();
    for i in 0..5 {
        queue.enqueue(i);
    }
    assert!(!queue.is_empty());
    for i in 0..5 {
        assert_eq!(queue.dequeue(), Some(i));
    }
    assert!(queue.is_empty());
}

#[test]
fn test_interleaved_enqueue_dequeue() {
    let queue = LockFreeLinkedQueue::new();
    queue.enqueue("a".to_string());
    assert_eq!(queue.dequeue().as_deref(), Some("a"));
    assert_eq!(queue.dequeue(), None);
    queue.enqueue("b".to_string());
    queue.enqueue("c".to_string());
    assert_eq!(queue.dequeue().as_deref(), Some("b"));
    assert_eq!(queue.dequeue().as_deref(), Some("c"));
}

#[test]
fn test_drop_releases_remaining_values() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    {
        let queue = LockFreeLinkedQueue::new();
        for _ in 0..3 {
            queue.enqueue(Tracked(drops.clone()));
        }
        drop(queue.dequeue());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_producers_and_consumers_lose_nothing() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 5_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(LockFreeLinkedQueue::new());
    let consumed = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(p * PER_PRODUCER + i + 1);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let consumed = consumed.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while consumed.load(Ordering::SeqCst) < TOTAL {
                    if let Some(value) = queue.dequeue() {
                        seen.push(value);
                        consumed.fetch_add(1, Ordering::SeqCst);
                    } else {
                        thread::yield_now();
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = Vec::with_capacity(TOTAL);
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }

    assert_eq!(all.len(), TOTAL);
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), TOTAL);
    assert!(unique.iter().all(|v| (1..=TOTAL).contains(v)));
    assert!(queue.is_empty());
}

#[test]
fn test_single_producer_order_preserved_under_concurrent_consumer() {
    let queue = Arc::new(LockFreeLinkedQueue::new());
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..10_000u32 {
                queue.enqueue(i);
            }
        })
    };

    let mut last = None;
    let mut received = 0;
    while received < 10_000 {
        if let Some(value) = queue.dequeue() {
            if let Some(prev) = last {
                assert!(value > prev);
            }
            last = Some(value);
            received += 1;
        }
    }
    producer.join().unwrap();
}
