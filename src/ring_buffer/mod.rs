use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// An entry taken from the ring, tagged with its push sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub data: T,
}

struct Ring<T> {
    slots: VecDeque<Sequenced<T>>,
    next_seq: u64,
}

/// Bounded FIFO with freshness bias: pushing into a full ring drops the
/// oldest entry. Sequence numbers start at 1 and never repeat, so a reader
/// can tell from a gap how many entries it lost.
pub struct RingBuffer<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: VecDeque::with_capacity(capacity),
                next_seq: 1,
            }),
            capacity,
        }
    }

    /// Appends `data`, returns its sequence number.
    pub fn push(&self, data: T) -> u64 {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.slots.len() == self.capacity {
            ring.slots.pop_front();
        }

        let seq = ring.next_seq;
        ring.next_seq += 1;
        ring.slots.push_back(Sequenced { seq, data });
        seq
    }

    /// Removes the oldest entry still held.
    pub fn pop(&self) -> Option<Sequenced<T>> {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .pop_front()
    }
}
