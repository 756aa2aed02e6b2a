//! # Outbound Audio Queue
//!
//! FIFO of synthesized audio chunks waiting to be written to the call leg.
//! The producer (engine) and consumer (transmitter task) run on different
//! execution contexts and meet only here.
//!
//! ## Key Properties:
//! - **Non-blocking enqueue**: the engine is never stalled by transmission
//!   pace. Growth policy is explicit: unbounded by default, or bounded with
//!   drop-oldest when a capacity is configured.
//! - **Timed dequeue**: the consumer waits at most one poll interval, so a
//!   stop signal is observed within that bound.
//! - **Atomic drain**: barge-in empties everything queued in one step;
//!   chunks enqueued after the drain survive.
//!
//! ## Thread Safety:
//! A `Mutex<VecDeque>` guards the chunks, as the audio buffer does elsewhere
//! in this codebase; a `tokio::sync::Notify` wakes the waiting consumer.
//! All three operations are linearizable under concurrent use.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::warn;

/// Concurrency-safe FIFO of owned audio chunks.
pub struct OutputQueue {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    /// 0 = unbounded
    capacity: usize,
    dropped: AtomicU64,
}

impl OutputQueue {
    /// Create a queue. `capacity` of 0 means unbounded; otherwise the oldest
    /// chunk is discarded when a new one would exceed the bound.
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a chunk without blocking the caller.
    pub fn enqueue(&self, chunk: Vec<u8>) {
        {
            let mut chunks = self.chunks.lock().unwrap();
            if self.capacity > 0 && chunks.len() >= self.capacity {
                chunks.pop_front();
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_total = total, "output queue full, dropped oldest chunk");
            }
            chunks.push_back(chunk);
        }
        self.notify.notify_one();
    }

    /// Remove and return the oldest chunk, waiting up to `wait` for one to
    /// arrive. Returns `None` if the queue stayed empty for the full window.
    pub async fn dequeue_timeout(&self, wait: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(chunk) = self.chunks.lock().unwrap().pop_front() {
                return Some(chunk);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            // Notify stores a permit when nobody is waiting yet, so a chunk
            // enqueued between the check above and this await is not missed.
            let notified = self.notify.notified();
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                // The timer and an enqueue can fire together; take a last look.
                return self.chunks.lock().unwrap().pop_front();
            }
        }
    }

    /// Remove and discard every currently queued chunk, returning how many
    /// were dropped. Chunks enqueued after this call are unaffected.
    pub fn drain(&self) -> usize {
        let mut chunks = self.chunks.lock().unwrap();
        let count = chunks.len();
        chunks.clear();
        count
    }

    /// Number of chunks currently waiting.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().unwrap().is_empty()
    }

    /// Chunks discarded by the bounded-capacity policy since creation.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OutputQueue::new(0);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);

        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![1])
        );
        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![2])
        );
        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![3])
        );
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = OutputQueue::new(0);
        let start = Instant::now();
        let result = queue.dequeue_timeout(Duration::from_millis(50)).await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(OutputQueue::new(0));
        let producer = queue.clone();

        let consumer = tokio::spawn(async move {
            queue.dequeue_timeout(Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.enqueue(vec![7]);

        assert_eq!(consumer.await.unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_drain_removes_everything() {
        let queue = OutputQueue::new(0);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);

        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());

        // Chunks enqueued after the drain survive it.
        queue.enqueue(vec![3]);
        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![3])
        );
    }

    #[tokio::test]
    async fn test_bounded_queue_drops_oldest() {
        let queue = OutputQueue::new(2);
        queue.enqueue(vec![1]);
        queue.enqueue(vec![2]);
        queue.enqueue(vec![3]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_chunks(), 1);
        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![2])
        );
        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10)).await,
            Some(vec![3])
        );
    }

    #[tokio::test]
    async fn test_concurrent_producers_preserve_all_chunks() {
        let queue = Arc::new(OutputQueue::new(0));
        let mut handles = Vec::new();

        for i in 0..4u8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25u8 {
                    queue.enqueue(vec![i, j]);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len(), 100);
    }
}
