//! Bounded ingestion buffer
//!
//! Fixed-capacity holding area between the tailer and the batch writer.
//! Overflow evicts the oldest pending event; the buffer never grows past
//! its capacity. One producer and one consumer operate concurrently, each
//! holding the lock only for a bounded critical section.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::decoder::DnsEvent;

pub struct EventBuffer {
    inner: Mutex<VecDeque<DnsEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest pending one when full.
    /// Returns the buffered length after the push.
    pub fn push(&self, event: DnsEvent) -> usize {
        let mut queue = lock_or_recover(&self.inner);
        if queue.len() == self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dns_events_dropped_total").increment(1);
        }
        queue.push_back(event);
        queue.len()
    }

    /// Remove and return everything currently buffered, in arrival order.
    /// A push racing with the drain lands in the emptied buffer and is
    /// picked up by the next drain.
    pub fn drain_all(&self) -> Vec<DnsEvent> {
        let mut queue = lock_or_recover(&self.inner);
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted due to overflow since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::decoder::{DnsEvent, QueryOutcome, QueryType};

    fn event(n: i64) -> DnsEvent {
        DnsEvent {
            timestamp: n,
            client: Some(format!("10.0.0.{n}")),
            domain: format!("host{n}.example.com"),
            query_type: Some(QueryType::A),
            outcome: QueryOutcome::Allowed,
            response_time_ms: None,
        }
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_newest() {
        let buffer = EventBuffer::new(5);
        for n in 0..12 {
            buffer.push(event(n));
            assert!(buffer.len() <= 5);
        }

        let drained = buffer.drain_all();
        let timestamps: Vec<i64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![7, 8, 9, 10, 11]);
        assert_eq!(buffer.dropped(), 7);
    }

    #[test]
    fn drain_returns_arrival_order_and_empties() {
        let buffer = EventBuffer::new(10);
        for n in 0..4 {
            buffer.push(event(n));
        }

        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 4);
        assert!(drained.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn push_after_drain_is_not_lost() {
        let buffer = EventBuffer::new(10);
        for n in 0..3 {
            buffer.push(event(n));
        }

        let first = buffer.drain_all();
        assert_eq!(first.len(), 3);

        buffer.push(event(99));
        let second = buffer.drain_all();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].timestamp, 99);
    }

    #[test]
    fn concurrent_producer_and_consumer() {
        use std::sync::Arc;

        let buffer = Arc::new(EventBuffer::new(64));
        let producer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for n in 0..1000 {
                    buffer.push(event(n));
                }
            })
        };

        let mut seen = 0usize;
        while seen < 1000 {
            let drained = buffer.drain_all();
            seen += drained.len();
            if producer.is_finished() && buffer.is_empty() {
                seen += buffer.drain_all().len();
                break;
            }
        }
        producer.join().unwrap();

        // Everything pushed either drained or was counted as dropped.
        let total = seen as u64 + buffer.dropped() + buffer.len() as u64;
        assert_eq!(total, 1000);
    }
}
