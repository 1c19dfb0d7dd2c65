use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// A pending tone.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundRequest {
    pub frequency: u32,
    pub duration_ms: u32,
    pub volume: f32,
    /// Higher plays first.
    pub priority: u8,
    pub enqueued_at: Instant,
    seq: u64,
}

/// Heap entry: max-heap by priority, then earliest insertion.
struct Entry(SoundRequest);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Bounded priority queue of tone requests.
///
/// Pops the highest priority first; equal priorities come out in insertion
/// order. Pushing onto a full queue is refused rather than evicting.
pub struct SoundQueue {
    heap: BinaryHeap<Entry>,
    capacity: usize,
    next_seq: u64,
}

impl SoundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            capacity,
            next_seq: 0,
        }
    }

    /// Queues a request. Returns `false` (and drops it) when full.
    pub fn push(&mut self, frequency: u32, duration_ms: u32, volume: f32, priority: u8) -> bool {
        if self.is_full() {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Entry(SoundRequest {
            frequency,
            duration_ms,
            volume,
            priority,
            enqueued_at: Instant::now(),
            seq,
        }));
        true
    }

    pub fn pop(&mut self) -> Option<SoundRequest> {
        self.heap.pop().map(|entry| entry.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_highest_priority_first() {
        let mut queue = SoundQueue::new(10);
        queue.push(100, 50, 0.5, 1);
        queue.push(500, 50, 0.5, 5);
        queue.push(300, 50, 0.5, 3);

        let order: Vec<u8> = std::iter::from_fn(|| queue.pop()).map(|r| r.priority).collect();
        assert_eq!(order, [5, 3, 1]);
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        let mut queue = SoundQueue::new(10);
        for frequency in [440, 550, 660] {
            queue.push(frequency, 50, 0.5, 2);
        }
        queue.push(880, 50, 0.5, 7);

        let order: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.frequency)
            .collect();
        assert_eq!(order, [880, 440, 550, 660]);
    }

    #[test]
    fn test_push_on_full_queue_is_refused() {
        let mut queue = SoundQueue::new(2);
        assert!(queue.push(1, 1, 1.0, 0));
        assert!(queue.push(2, 1, 1.0, 9));
        assert!(!queue.push(3, 1, 1.0, 9));
        assert_eq!(queue.len(), 2);
        assert!(queue.is_full());
    }

    #[test]
    fn test_zero_capacity_refuses_everything() {
        let mut queue = SoundQueue::new(0);
        assert!(!queue.push(1, 1, 1.0, 0));
        assert!(queue.is_empty());
    }
}
