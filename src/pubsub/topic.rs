use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::message::Message;
use crate::ring_buffer::RingBuffer;

/// Named queue of messages, shared by one publishing and one consuming side.
pub struct Topic<T: Message> {
    name: String,
    queue: RingBuffer<T>,
}

impl<T: Message> Topic<T> {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            queue: RingBuffer::new(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Write end of a topic.
pub struct Publisher<T: Message> {
    topic: Arc<Topic<T>>,
}

impl<T: Message> Publisher<T> {
    pub fn new(topic: Arc<Topic<T>>) -> Self {
        Self { topic }
    }

    /// Queues `msg`; when the queue is full the oldest message is lost.
    pub fn publish(&self, msg: T) -> u64 {
        self.topic.queue.push(msg)
    }
}

/// Read end of a topic. Counts messages that were overwritten before they
/// could be taken.
pub struct Subscriber<T: Message> {
    topic: Arc<Topic<T>>,
    last_seq: AtomicU64,
    missed: AtomicU64,
}

impl<T: Message> Subscriber<T> {
    pub fn new(topic: Arc<Topic<T>>) -> Self {
        Self {
            topic,
            last_seq: AtomicU64::new(0),
            missed: AtomicU64::new(0),
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        let entry = self.topic.queue.pop()?;
        let last = self.last_seq.swap(entry.seq, Ordering::AcqRel);
        if entry.seq > last + 1 {
            self.missed.fetch_add(entry.seq - last - 1, Ordering::AcqRel);
        }
        Some(entry.data)
    }

    /// Total messages lost to overflow so far.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Acquire)
    }

    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}
