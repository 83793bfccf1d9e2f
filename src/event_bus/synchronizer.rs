//! Rendezvous between a test and the asynchronous reactions of the system
//! under test.
//!
//! The usual sequence is: [`EventSynchronizer::drain_idle`], then
//! [`EventSynchronizer::subscribe`], then trigger the effect, then
//! [`EventSynchronizer::wait_for`], then let the subscription go out of
//! scope (or hand it to [`EventSynchronizer::unsubscribe`]).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::error::SyncError;
use super::subscription::EventBusSubscription;
use super::Event;
use super::EventBus;

pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EventSynchronizer {
    bus: EventBus,
    default_timeout: Duration,
}

impl EventSynchronizer {
    pub fn new(bus: EventBus, default_timeout: Duration) -> Self {
        Self {
            bus,
            default_timeout,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Safe to call before anything publishes `T`.
    pub fn subscribe<T: Event>(&self) -> EventBusSubscription<T> {
        self.bus.subscribe()
    }

    /// Waits for the first event on `subscription` satisfying `predicate`.
    /// Events that do not match are consumed and discarded.
    ///
    /// `timeout` falls back to the synchronizer's default.
    pub async fn wait_for<T, P>(
        &self,
        subscription: &mut EventBusSubscription<T>,
        description: &str,
        mut predicate: P,
        timeout: Option<Duration>,
    ) -> Result<T, SyncError>
    where
        T: Event + std::fmt::Debug,
        P: FnMut(&T) -> bool,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!("waiting up to {timeout:?} for {description}");

        let matching = async {
            loop {
                match subscription.read().await {
                    Some(event) if predicate(&event) => return Ok(event),
                    Some(event) => trace!("discarding {event:?} while waiting for {description}"),
                    None => {
                        return Err(SyncError::BusClosed {
                            description: description.to_string(),
                        })
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, matching).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                description: description.to_string(),
                timeout,
            }),
        }
    }

    /// Like [`Self::wait_for`], but also gives up as soon as `cancel` fires.
    pub async fn wait_for_cancellable<T, P>(
        &self,
        subscription: &mut EventBusSubscription<T>,
        description: &str,
        predicate: P,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<T, SyncError>
    where
        T: Event + std::fmt::Debug,
        P: FnMut(&T) -> bool,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled {
                description: description.to_string(),
            }),
            result = self.wait_for(subscription, description, predicate, timeout) => result,
        }
    }

    /// Returns `false` if the subscription had already been released.
    pub fn unsubscribe<T: Event>(&self, subscription: EventBusSubscription<T>) -> bool {
        self.bus.try_unsubscribe(subscription)
    }

    /// Resolves once no published event is waiting to be dispatched.
    pub async fn drain_idle(&self) {
        self.bus.wait_until_idle().await;
    }
}
