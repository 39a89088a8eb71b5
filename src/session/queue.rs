//! Blocking hand-off queues shared between session tasks.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Lanes<T> {
    priority: VecDeque<T>,
    normal: VecDeque<T>,
    stopped: bool,
}

/// Multi-producer queue with an async pop and a priority lane.
///
/// Items pushed with [`push_priority`](Self::push_priority) are popped before
/// any item pushed with [`push`](Self::push); each lane is FIFO. After
/// [`stop`](Self::stop) pushes are refused and `pop` returns `None`.
pub struct Queue<T> {
    lanes: Mutex<Lanes<T>>,
    notify: Notify,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lanes = self.lanes.lock();
        f.debug_struct("Queue")
            .field("priority", &lanes.priority.len())
            .field("normal", &lanes.normal.len())
            .field("stopped", &lanes.stopped)
            .finish()
    }
}

impl<T> Queue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                priority: VecDeque::new(),
                normal: VecDeque::new(),
                stopped: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append an item to the normal lane.
    ///
    /// Returns the item back if the queue has been stopped.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.push_lane(item, false)
    }

    /// Append an item to the priority lane.
    pub fn push_priority(&self, item: T) -> Result<(), T> {
        self.push_lane(item, true)
    }

    fn push_lane(&self, item: T, priority: bool) -> Result<(), T> {
        {
            let mut lanes = self.lanes.lock();
            if lanes.stopped {
                return Err(item);
            }
            if priority {
                lanes.priority.push_back(item);
            } else {
                lanes.normal.push_back(item);
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next item. Returns `None` once the queue is stopped.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut lanes = self.lanes.lock();
                if lanes.stopped {
                    return None;
                }
                if let Some(item) = lanes.priority.pop_front().or_else(|| lanes.normal.pop_front()) {
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Take the next item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut lanes = self.lanes.lock();
        lanes.priority.pop_front().or_else(|| lanes.normal.pop_front())
    }

    /// Refuse further pushes and wake every waiting `pop`.
    pub fn stop(&self) {
        self.lanes.lock().stopped = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Remove and return every queued item, priority lane first.
    pub fn drain(&self) -> Vec<T> {
        let mut lanes = self.lanes.lock();
        let mut items: Vec<T> = lanes.priority.drain(..).collect();
        items.extend(lanes.normal.drain(..));
        items
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.priority.len() + lanes.normal.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.lanes.lock().stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_within_lane() {
        let queue = Queue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test]
    async fn test_priority_lane_first() {
        let queue = Queue::new();
        queue.push("data-1").unwrap();
        queue.push("close").unwrap();
        queue.push_priority("ping").unwrap();

        assert_eq!(queue.pop().await, Some("ping"));
        assert_eq!(queue.pop().await, Some("data-1"));
        assert_eq!(queue.pop().await, Some("close"));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(Queue::new());
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!popper.is_finished());

        queue.push(7u32).unwrap();
        assert_eq!(popper.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_stop_unblocks_pop() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::new());
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.stop();
        assert_eq!(popper.await.unwrap(), None);
    }

    #[test]
    fn test_stop_refuses_push_and_drain_empties() {
        let queue = Queue::new();
        queue.push(1).unwrap();
        queue.push_priority(0).unwrap();

        queue.stop();
        assert_eq!(queue.push(2), Err(2));
        assert!(queue.is_stopped());

        assert_eq!(queue.drain(), vec![0, 1]);
        assert!(queue.is_empty());
    }
}
