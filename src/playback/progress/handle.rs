use super::PlaybackSnapshot;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, RwLock,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{error, trace};

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&PlaybackSnapshot) + Send + Sync>;

#[derive(Clone)]
enum Subscription {
    Callback(Callback),
    Channel(tokio_mpsc::UnboundedSender<PlaybackSnapshot>),
}

/// Fan-out of playback snapshots to UI observers
///
/// Callbacks run synchronously on the publishing task, in subscription
/// order. A panicking callback is logged and skipped; the others still run.
#[derive(Clone)]
pub struct ListenerBroadcast {
    subscriptions: Arc<Mutex<BTreeMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
    latest: Arc<RwLock<PlaybackSnapshot>>,
}

impl Default for ListenerBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerBroadcast {
    pub fn new() -> Self {
        ListenerBroadcast {
            subscriptions: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            latest: Arc::new(RwLock::new(PlaybackSnapshot::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, subscription: Subscription) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, subscription);
        id
    }

    /// Register a callback invoked with every published snapshot
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PlaybackSnapshot) + Send + Sync + 'static,
    {
        self.insert(Subscription::Callback(Arc::new(callback)))
    }

    /// Subscribe to all snapshots through a channel
    /// Subscription is automatically removed when the receiver is dropped
    pub fn subscribe_channel(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackSnapshot> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        self.insert(Subscription::Channel(tx));
        rx
    }

    /// Returns whether the id was subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// The last published snapshot
    pub fn latest(&self) -> PlaybackSnapshot {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn publish(&self, snapshot: PlaybackSnapshot) {
        *self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();

        // Snapshot the list so callbacks may subscribe/unsubscribe without deadlocking
        let subscriptions: Vec<(SubscriptionId, Subscription)> = self
            .lock()
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect();

        let mut to_remove = Vec::new();
        for (id, subscription) in subscriptions {
            match subscription {
                Subscription::Callback(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(&snapshot))).is_err() {
                        error!("Playback listener {} panicked, continuing", id);
                    }
                }
                Subscription::Channel(tx) => {
                    // If send fails, receiver was dropped - mark for removal
                    if tx.send(snapshot.clone()).is_err() {
                        to_remove.push(id);
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.lock();
            for id in to_remove {
                trace!("Removing closed playback subscription {}", id);
                subs.remove(&id);
            }
        }
    }
}
