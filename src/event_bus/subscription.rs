use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;

use super::Event;
use super::Payload;
use super::Registry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription#{}", self.0)
    }
}

/// A live registration for events of type `T`.
///
/// Dropping the subscription unsubscribes it, so a subscription held in a
/// local is released on every exit path of the enclosing scope, including
/// `?` returns, timeouts and cancellation.
#[derive(Debug)]
pub struct EventBusSubscription<T: Event> {
    id: SubscriptionId,
    registry: Weak<Registry>,
    receiver: mpsc::UnboundedReceiver<Payload>,
    registered: bool,
    _event: PhantomData<fn() -> T>,
}

impl<T: Event> EventBusSubscription<T> {
    pub(super) fn new(
        id: SubscriptionId,
        registry: Weak<Registry>,
        receiver: mpsc::UnboundedReceiver<Payload>,
    ) -> Self {
        Self {
            id,
            registry,
            receiver,
            registered: true,
            _event: PhantomData,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Next event, or `None` once the bus is gone and everything already
    /// delivered has been read.
    pub async fn read(&mut self) -> Option<T> {
        loop {
            let payload = self.receiver.recv().await?;
            if let Some(event) = payload.downcast_ref::<T>() {
                return Some(event.clone());
            }
            trace!("{} ignored payload of unexpected type", self.id);
        }
    }

    /// Next already-delivered event, if any.
    pub fn try_read(&mut self) -> Option<T> {
        while let Ok(payload) = self.receiver.try_recv() {
            if let Some(event) = payload.downcast_ref::<T>() {
                return Some(event.clone());
            }
        }
        None
    }

    /// Removes the registration from the bus. Only the first call has an
    /// effect; returns whether the bus still knew this subscription.
    pub(crate) fn release(&mut self) -> bool {
        if !std::mem::take(&mut self.registered) {
            return false;
        }
        self.receiver.close();

        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(TypeId::of::<T>(), self.id));
        debug!(
            "unsubscribed {} from {}",
            self.id,
            std::any::type_name::<T>()
        );
        removed
    }
}

impl<T: Event> Drop for EventBusSubscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}
