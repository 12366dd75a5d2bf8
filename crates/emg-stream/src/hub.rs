//! Fan-out of processed records to dashboard subscribers
//!
//! Each subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: when a queue is full its oldest entry is discarded and the
//! subscriber's dropped counter goes up. A slow or stalled dashboard only
//! ever loses its own messages.

use crate::messages::DashboardMessage;
use emg_core::{EmgError, EmgResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Bounded drop-oldest queue of one subscriber
#[derive(Debug)]
struct SubscriberQueue {
    capacity: usize,
    messages: Mutex<VecDeque<Arc<DashboardMessage>>>,
    ready: Notify,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, message: Arc<DashboardMessage>) {
        {
            let mut messages = self.messages.lock();
            if messages.len() >= self.capacity {
                messages.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            messages.push_back(message);
        }
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Arc<DashboardMessage>> {
        self.messages.lock().pop_front()
    }
}

/// Registry of connected dashboards
#[derive(Debug)]
pub struct BroadcastHub {
    capacity: usize,
    subscribers: RwLock<HashMap<Uuid, Arc<SubscriberQueue>>>,
}

impl BroadcastHub {
    /// Create a hub whose subscribers buffer at most `capacity` messages
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new subscriber; dropping the handle unregisters it
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        let total = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, queue.clone());
            subscribers.len()
        };
        info!(subscriber = %id, total, "Dashboard subscribed");

        Subscription {
            id,
            queue,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver to every subscriber without blocking; returns how many were reached
    pub fn publish(&self, message: DashboardMessage) -> usize {
        let message = Arc::new(message);
        let subscribers = self.subscribers.read();
        for queue in subscribers.values() {
            queue.push(message.clone());
        }
        subscribers.len()
    }

    /// Deliver to one subscriber only
    pub fn send_to(&self, id: Uuid, message: DashboardMessage) -> EmgResult<()> {
        let subscribers = self.subscribers.read();
        let queue = subscribers
            .get(&id)
            .ok_or(EmgError::SubscriberUnreachable { id })?;
        queue.push(Arc::new(message));
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn unsubscribe(&self, id: &Uuid) {
        let removed = self.subscribers.write().remove(id).is_some();
        if removed {
            info!(subscriber = %id, "Dashboard unsubscribed");
        }
    }
}

/// Receiving end of one dashboard subscription
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    queue: Arc<SubscriberQueue>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next message
    pub async fn recv(&self) -> Arc<DashboardMessage> {
        loop {
            if let Some(message) = self.queue.pop() {
                return message;
            }
            // notify_one stores a permit, so a push between pop and here is not lost
            self.queue.ready.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Arc<DashboardMessage>> {
        self.queue.pop()
    }

    /// Messages discarded since the last call
    pub fn take_dropped(&self) -> u64 {
        let dropped = self.queue.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            trace!(subscriber = %self.id, dropped, "Subscriber overflowed");
        }
        dropped
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.hub.upgrade() {
            Some(hub) => hub.unsubscribe(&self.id),
            None => debug!(subscriber = %self.id, "Hub gone before subscriber"),
        }
    }
}
