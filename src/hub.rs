//! Fan-out of monitor events to live subscribers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ocpwatch_types::MonitorEvent;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

#[derive(Debug)]
struct SubscriberQueue {
    events: Mutex<VecDeque<MonitorEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, event: MonitorEvent, capacity: usize) {
        let mut events = self.events.lock();
        while events.len() >= capacity.max(1) {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
    }

    fn truncate(&self, capacity: usize) {
        let mut events = self.events.lock();
        while events.len() > capacity.max(1) {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Delivers every published event to every subscriber.
///
/// Each subscriber has its own bounded queue. Publishing never waits: when a
/// queue is full its oldest event is discarded and counted, so a slow
/// subscriber loses events instead of holding up the pipeline or other
/// subscribers.
#[derive(Debug)]
pub struct PublishHub {
    subscribers: RwLock<BTreeMap<u64, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    capacity: AtomicUsize,
    closed: AtomicBool,
}

impl PublishHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            capacity: AtomicUsize::new(queue_capacity),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new subscriber. It sees only events published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new());
        // `close` sets the flag before draining the map, so checking it under
        // the write lock cannot miss a concurrent shutdown.
        let mut subscribers = self.subscribers.write();
        if self.closed.load(Ordering::Acquire) {
            queue.close();
        } else {
            subscribers.insert(id, queue.clone());
        }
        drop(subscribers);
        tracing::debug!(subscriber = id, "subscribed");
        Subscription { id, queue }
    }

    /// Remove a subscriber. Its pending events remain readable.
    pub fn unsubscribe(&self, id: u64) -> bool {
        match self.subscribers.write().remove(&id) {
            Some(queue) => {
                queue.close();
                tracing::debug!(subscriber = id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Enqueue `event` for every live subscriber.
    pub fn publish(&self, event: MonitorEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let capacity = self.capacity.load(Ordering::Relaxed);
        let mut gone = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, queue) in subscribers.iter() {
                if queue.is_closed() {
                    gone.push(*id);
                } else {
                    queue.push(event.clone(), capacity);
                }
            }
        }
        if !gone.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in gone {
                subscribers.remove(&id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .values()
            .filter(|queue| !queue.is_closed())
            .count()
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Resize every queue. Shrinking discards the oldest pending events.
    pub fn set_queue_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
        for queue in self.subscribers.read().values() {
            queue.truncate(capacity);
        }
    }

    /// Stop delivering. Subscribers drain what is queued and then see the end
    /// of the stream.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let subscribers = std::mem::take(&mut *self.subscribers.write());
        for queue in subscribers.values() {
            queue.close();
        }
    }
}

impl Default for PublishHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live event stream from a [`PublishHub`].
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the stream has ended and
    /// every queued event has been read.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(event) = self.queue.events.lock().pop_front() {
                return Some(event);
            }
            if self.queue.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        self.queue.events.lock().pop_front()
    }

    /// Events discarded because this subscriber fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.queue.events.lock().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}
