//! Event stream subscribers.

use crate::recipient::Recipient;
use crate::registry::Registry;
use causeway_core::DurableEvent;
use std::collections::HashSet;
use tracing::warn;

/// Tells a subscriber that an event was written to its stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Written<P> {
    pub event: DurableEvent<P>,
}

/// Subscribers keyed by stream id, plus default subscribers that see every
/// event.
#[derive(Clone, Debug)]
pub struct SubscriberRegistry<S> {
    registry: Registry<String, S>,
    defaults: HashSet<S>,
}

impl<S> Default for SubscriberRegistry<S> {
    fn default() -> Self {
        Self {
            registry: Registry::default(),
            defaults: HashSet::new(),
        }
    }
}

impl<S: Clone + Eq + std::hash::Hash> SubscriberRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of `stream_id`.
    pub fn register(self, subscriber: S, stream_id: impl Into<String>) -> Self {
        Self {
            registry: self.registry.add(stream_id.into(), subscriber),
            defaults: self.defaults,
        }
    }

    /// Subscribe to every event regardless of its stream.
    pub fn register_default(mut self, subscriber: S) -> Self {
        self.defaults.insert(subscriber);
        self
    }

    /// Remove `subscriber` from whichever group it belongs to.
    pub fn unregister(mut self, subscriber: &S) -> Self {
        match self.registry.key_of(subscriber).cloned() {
            Some(stream_id) => Self {
                registry: self.registry.remove(&stream_id, subscriber),
                defaults: self.defaults,
            },
            None => {
                self.defaults.remove(subscriber);
                self
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty() && self.defaults.is_empty()
    }

    /// Send `Written` for every event to the default subscribers and to the
    /// subscribers of the event's stream, optionally restricted by
    /// `predicate`.
    ///
    /// Returns the subscribers that turned out to be closed; callers should
    /// [`unregister`](Self::unregister) them.
    pub fn notify<P>(&self, events: &[DurableEvent<P>], predicate: Option<&dyn Fn(&S) -> bool>) -> Vec<S>
    where
        P: Clone,
        S: Recipient<Written<P>>,
    {
        let accepts = |subscriber: &S| predicate.map_or(true, |p| p(subscriber));
        let mut closed: Vec<S> = Vec::new();

        for event in events {
            let by_stream = event
                .stream_id
                .as_ref()
                .into_iter()
                .flat_map(|stream_id| self.registry.values(stream_id));

            for subscriber in self.defaults.iter().chain(by_stream) {
                if !accepts(subscriber) || closed.contains(subscriber) {
                    continue;
                }
                let written = Written {
                    event: event.clone(),
                };
                if !subscriber.tell(written) {
                    warn!(stream = ?event.stream_id, "subscriber closed");
                    closed.push(subscriber.clone());
                }
            }
        }
        closed
    }
}
