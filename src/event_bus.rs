//! Typed in-process publish/subscribe.
//!
//! `publish` only enqueues. A dispatcher task fans every event out to the
//! subscriptions for its type that exist *at dispatch time*. The number of
//! queued-but-undispatched events is tracked so callers can wait for the
//! bus to go idle before subscribing, and so avoid being handed events that
//! were published before they started listening.

pub mod error;
pub mod subscription;
pub mod synchronizer;

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use subscription::EventBusSubscription;
use subscription::SubscriptionId;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

/// Anything that can travel on the bus.
pub trait Event: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Event for T {}

type Payload = Arc<dyn Any + Send + Sync>;

struct Envelope {
    type_id: TypeId,
    type_name: &'static str,
    payload: Payload,
}

#[derive(Debug)]
struct Slot {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<Payload>,
}

/// Subscriptions per event type.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: Mutex<HashMap<TypeId, Vec<Slot>>>,
}

impl Registry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, Vec<Slot>>> {
        // a panic while holding the lock cannot leave the map inconsistent
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn insert(&self, type_id: TypeId, slot: Slot) {
        self.lock().entry(type_id).or_default().push(slot);
    }

    /// Returns `true` if the subscription was registered.
    pub(crate) fn remove(&self, type_id: TypeId, id: SubscriptionId) -> bool {
        let mut slots = self.lock();
        let Some(list) = slots.get_mut(&type_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|slot| slot.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            slots.remove(&type_id);
        }
        removed
    }

    fn count(&self, type_id: TypeId) -> usize {
        self.lock().get(&type_id).map_or(0, Vec::len)
    }

    fn deliver(&self, envelope: &Envelope) -> usize {
        let slots = self.lock();
        let Some(list) = slots.get(&envelope.type_id) else {
            return 0;
        };
        list.iter()
            .filter(|slot| slot.sender.send(Arc::clone(&envelope.payload)).is_ok())
            .count()
    }
}

#[derive(Debug)]
struct Inner {
    registry: Arc<Registry>,
    dispatch_tx: mpsc::UnboundedSender<Envelope>,
    in_flight: Arc<watch::Sender<usize>>,
    next_subscription_id: AtomicU64,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Cloning yields another handle to the same bus. The dispatcher stops
/// once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::default());
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);

        tokio::spawn(dispatch_loop(
            dispatch_rx,
            Arc::clone(&registry),
            Arc::clone(&in_flight),
        ));

        Self {
            inner: Arc::new(Inner {
                registry,
                dispatch_tx,
                in_flight,
                next_subscription_id: AtomicU64::new(0),
            }),
        }
    }

    /// Registers interest in events of type `T`. Events published before
    /// this call but not yet dispatched will be delivered too; see
    /// [`EventBus::wait_until_idle`].
    pub fn subscribe<T: Event>(&self) -> EventBusSubscription<T> {
        let id = SubscriptionId(
            self.inner
                .next_subscription_id
                .fetch_add(1, Ordering::Relaxed),
        );
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner
            .registry
            .insert(TypeId::of::<T>(), Slot { id, sender });
        debug!(
            "subscribed {} to {}",
            id,
            std::any::type_name::<T>()
        );

        EventBusSubscription::new(id, Arc::downgrade(&self.inner.registry), receiver)
    }

    /// Releases `subscription`. Returns `false` if it had already been
    /// released (for instance because the bus was dropped).
    pub fn try_unsubscribe<T: Event>(&self, mut subscription: EventBusSubscription<T>) -> bool {
        subscription.release()
    }

    pub fn publish<T: Event>(&self, event: T) {
        let envelope = Envelope {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            payload: Arc::new(event),
        };

        self.inner.in_flight.send_modify(|n| *n += 1);
        if self.inner.dispatch_tx.send(envelope).is_err() {
            // dispatcher gone; nothing will ever decrement for this event
            self.inner.in_flight.send_modify(|n| *n -= 1);
            warn!(
                "event bus dispatcher has stopped; dropping {}",
                std::any::type_name::<T>()
            );
        }
    }

    /// Resolves once every published event has been handed to the
    /// subscriptions that existed when it was dispatched.
    pub async fn wait_until_idle(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        // the sender lives in `self`, so this cannot fail
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Number of live subscriptions for `T`.
    pub fn subscriber_count<T: Event>(&self) -> usize {
        self.inner.registry.count(TypeId::of::<T>())
    }
}

async fn dispatch_loop(
    mut dispatch_rx: mpsc::UnboundedReceiver<Envelope>,
    registry: Arc<Registry>,
    in_flight: Arc<watch::Sender<usize>>,
) {
    while let Some(envelope) = dispatch_rx.recv().await {
        let delivered = registry.deliver(&envelope);
        trace!(
            "dispatched {} to {} subscription(s)",
            envelope.type_name,
            delivered
        );
        in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
    debug!("event bus dispatcher stopped");
}
