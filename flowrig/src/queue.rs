//! Bounded hand-off between generator workers and the collector.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Default bound on records buffered between producers and the consumer.
/// At the default link rate this is well under a chunk width of lead.
pub const DEFAULT_CAPACITY: usize = 65_536;

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    done: bool,
}

/// A bounded multi-producer, single-consumer queue with an explicit
/// end-of-stream flag.
///
/// Producers block in [`push`](Self::push) while the queue is full; the
/// consumer blocks in [`pop`](Self::pop) or bounds its wait with
/// [`try_pop`](Self::try_pop). Once [`set_done`](Self::set_done) is
/// called every sleeper wakes, remaining items drain, and later pushes
/// are dropped. Items come out in push order.
#[derive(Debug)]
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Queue<T> {
    /// Construct a queue bounded at `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                done: false,
            }),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue an item, blocking while the queue is at capacity.
    ///
    /// After [`set_done`](Self::set_done) the item is silently dropped;
    /// well-behaved producers stop pushing once the done flag is raised.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity && !inner.done {
            self.not_full.wait(&mut inner);
        }
        if inner.done {
            debug!("push after set_done; record dropped");
            return;
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Dequeue an item, blocking until one arrives or the queue is done.
    ///
    /// Returns `None` exactly when the queue is done and empty.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while inner.items.is_empty() && !inner.done {
            self.not_empty.wait(&mut inner);
        }
        let item = inner.items.pop_front();
        drop(inner);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Dequeue with a bounded wait.
    ///
    /// Returns `None` when the wait times out or the queue is done and
    /// empty.
    pub fn try_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.items.is_empty() && !inner.done {
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        let item = inner.items.pop_front();
        drop(inner);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Mark the stream finished and wake every waiter.
    ///
    /// Idempotent; the consumer may also call this to release producers
    /// when it abandons the run early.
    pub fn set_done(&self) {
        let mut inner = self.inner.lock();
        inner.done = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Whether the done flag has been raised.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    /// Whether the queue currently holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    #[test]
    fn items_come_out_in_push_order() {
        let queue = Queue::new(16);
        for i in 0..10 {
            queue.push(i);
        }
        for i in 0..10 {
            assert_eq!(queue.pop(), Some(i));
        }
    }

    #[test]
    fn try_pop_times_out_on_an_empty_queue() {
        let queue: Queue<u32> = Queue::new(4);
        let start = Instant::now();
        assert_eq!(queue.try_pop(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_returns_none_only_when_done_and_empty() {
        let queue = Queue::new(4);
        queue.push(1u32);
        queue.set_done();
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_done());
        assert!(queue.is_empty());
    }

    #[test]
    fn set_done_wakes_a_blocked_consumer() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::new(4));
        let consumer_queue = Arc::clone(&queue);
        let handle = thread::spawn(move || consumer_queue.pop());

        thread::sleep(Duration::from_millis(20));
        queue.set_done();
        assert_eq!(handle.join().expect("consumer panicked"), None);
    }

    #[test]
    fn push_blocks_at_capacity_until_a_pop() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::new(2));
        queue.push(1);
        queue.push(2);

        let producer_queue = Arc::clone(&queue);
        let pushed = Arc::new(AtomicBool::new(false));
        let pushed_flag = Arc::clone(&pushed);
        let handle = thread::spawn(move || {
            producer_queue.push(3);
            pushed_flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!pushed.load(Ordering::SeqCst), "push should be blocked");

        assert_eq!(queue.pop(), Some(1));
        handle.join().expect("producer panicked");
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn set_done_releases_blocked_producers() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::new(1));
        queue.push(1);

        let producer_queue = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            // Blocks on the full queue, then drops the item when done.
            producer_queue.push(2);
        });

        thread::sleep(Duration::from_millis(20));
        queue.set_done();
        handle.join().expect("producer panicked");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn many_producers_one_consumer_conserves_items() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 1_000;

        let queue: Arc<Queue<usize>> = Arc::new(Queue::new(64));
        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push(p * PER_PRODUCER + i);
                }
            }));
        }

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(item) = consumer_queue.pop() {
                seen.push(item);
            }
            seen
        });

        for producer in producers {
            producer.join().expect("producer panicked");
        }
        queue.set_done();

        let mut seen = consumer.join().expect("consumer panicked");
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }
}
