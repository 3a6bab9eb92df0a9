//! Event dispatch and subscription
//!
//! This module provides the publish/subscribe dispatcher that alert rules
//! are wired onto:
//! - Typed subscriptions with callback handlers
//! - Per-subscription filter chains (stateful filters supported)
//! - Unsubscription via `SubscriptionId` handles

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A stateful per-subscription event filter.
///
/// Filters decide per event whether the subscription's handler is skipped.
/// They take `&mut self` because detection filters carry state (sample
/// windows, refire cooldowns).
pub trait EventFilter<E>: Send {
    /// Returns true when the event must NOT be delivered to the handler.
    fn excludes(&mut self, event: &E) -> bool;
}

/// Adapter turning a closure returning the exclusion verdict into a filter.
pub struct FnFilter<F>(pub F);

impl<E, F> EventFilter<E> for FnFilter<F>
where
    F: FnMut(&E) -> bool + Send,
{
    fn excludes(&mut self, event: &E) -> bool {
        (self.0)(event)
    }
}

/// Conjunction of filters: excludes when any member excludes.
///
/// Members run left to right and stop at the first exclusion, so earlier
/// members gate what later stateful members observe. Rule composition
/// relies on this: the scope filter runs before the detection filter, and
/// out-of-scope events never enter a detection window.
pub struct AllFilter<E> {
    members: Vec<Box<dyn EventFilter<E>>>,
}

impl<E> AllFilter<E> {
    pub fn new(members: Vec<Box<dyn EventFilter<E>>>) -> Self {
        Self { members }
    }
}

impl<E> EventFilter<E> for AllFilter<E> {
    fn excludes(&mut self, event: &E) -> bool {
        self.members.iter_mut().any(|member| member.excludes(event))
    }
}

struct Subscriber<E> {
    handler: Arc<dyn Fn(&E) + Send + Sync>,
    filter: Mutex<Option<Box<dyn EventFilter<E>>>>,
}

/// Typed event dispatcher.
///
/// `fire` delivers an event to every subscription whose filter chain does
/// not exclude it. The subscriber table is snapshotted before delivery, so
/// handlers may subscribe or unsubscribe without deadlocking the dispatcher.
pub struct EventDispatcher<E> {
    subscribers: RwLock<HashMap<SubscriptionId, Arc<Subscriber<E>>>>,
    next_id: AtomicU64,
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe a handler to all events fired on this dispatcher.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscriber = Arc::new(Subscriber {
            handler: Arc::new(handler),
            filter: Mutex::new(None),
        });
        if let Ok(mut subs) = self.subscribers.write() {
            subs.insert(id, subscriber);
        }
        id
    }

    /// Attach a filter to an existing subscription, replacing any previous
    /// filter. Returns false when the subscription no longer exists.
    pub fn filter(&self, id: SubscriptionId, filter: Box<dyn EventFilter<E>>) -> bool {
        if let Ok(subs) = self.subscribers.read() {
            if let Some(subscriber) = subs.get(&id) {
                if let Ok(mut slot) = subscriber.filter.lock() {
                    *slot = Some(filter);
                    return true;
                }
            }
        }
        false
    }

    /// Remove a subscription. Events fired after this returns are no longer
    /// delivered to it.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.remove(&id);
        }
    }

    /// Deliver an event to every non-excluded subscription.
    ///
    /// Membership is re-checked right before each delivery, so a
    /// subscription removed mid-fire (by a handler, or concurrently) is
    /// skipped for the rest of the pass. A delivery already past that
    /// check may still complete after `unsubscribe` returns.
    pub fn fire(&self, event: &E) {
        let snapshot: Vec<(SubscriptionId, Arc<Subscriber<E>>)> = match self.subscribers.read()
        {
            Ok(subs) => subs.iter().map(|(id, sub)| (*id, sub.clone())).collect(),
            Err(_) => return,
        };
        for (id, subscriber) in snapshot {
            let still_subscribed = self
                .subscribers
                .read()
                .map(|subs| subs.contains_key(&id))
                .unwrap_or(false);
            if !still_subscribed {
                continue;
            }
            let excluded = match subscriber.filter.lock() {
                Ok(mut slot) => match slot.as_mut() {
                    Some(filter) => filter.excludes(event),
                    None => false,
                },
                // a filter panicked earlier; skip rather than bypass it
                Err(_) => true,
            };
            if !excluded {
                (subscriber.handler)(event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
