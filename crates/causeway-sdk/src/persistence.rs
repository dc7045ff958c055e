//! Persistence collaborators.
//!
//! The replication core only needs a journal it can query and append to, and
//! a place to keep snapshots. [`EventLog`] and [`SnapshotStore`] describe
//! those; the in-memory implementations back tests and simulations.

use crate::actor::ActorRef;
use crate::error::{Result, SdkError};
use crate::notification::{DueHandle, NotificationChannelRef};
use async_trait::async_trait;
use causeway_core::{DurableEvent, ReplicaId, VectorClock, VersionClock};
use causeway_notify::{
    ReplicationRead, ReplicationReadSuccess, ReplicationWrite, SubscriberRegistry, Written,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// An append-only journal of durable events.
#[async_trait]
pub trait EventLog<P>: Send + Sync {
    /// Events with `from_sequence_nr <= sequence_nr <= to_sequence_nr`, at
    /// most `max` of them.
    fn query(
        &self,
        from_sequence_nr: u64,
        to_sequence_nr: u64,
        max: usize,
    ) -> BoxStream<'static, DurableEvent<P>>;

    /// Events from `from_sequence_nr` on, followed by everything written
    /// later.
    fn live_query(&self, from_sequence_nr: u64) -> BoxStream<'static, DurableEvent<P>>;

    /// Append a locally emitted event.
    async fn persist(&self, payload: P, stream_id: Option<String>) -> Result<DurableEvent<P>>;
}

/// Storage for serialized state snapshots.
#[async_trait]
pub trait SnapshotStore<S>: Send + Sync {
    async fn load(&self, id: &str) -> Result<S>;
    async fn save(&self, id: &str, state: &S) -> Result<()>;
    /// Returns false if there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool>;
}

const LIVE_CAPACITY: usize = 1024;

struct LogState<P> {
    events: Vec<DurableEvent<P>>,
    version: VectorClock,
    subscribers: SubscriberRegistry<ActorRef<Written<P>>>,
}

/// In-memory event log.
///
/// Stamps local events with the log's vector time, feeds a notification
/// channel when one is attached and notifies stream subscribers.
pub struct MemoryEventLog<P> {
    id: ReplicaId,
    state: Arc<RwLock<LogState<P>>>,
    live: broadcast::Sender<DurableEvent<P>>,
    channel: Option<NotificationChannelRef<P>>,
}

impl<P> MemoryEventLog<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(LogState {
                events: Vec::new(),
                version: VectorClock::zero(),
                subscribers: SubscriberRegistry::new(),
            })),
            live,
            channel: None,
        }
    }

    /// Signal replication readiness through `channel`.
    pub fn with_notifications(mut self, channel: NotificationChannelRef<P>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// Every event this log has stored.
    pub fn version(&self) -> VectorClock {
        self.state.read().version.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().events.is_empty()
    }

    /// Receive `Written` for events of `stream_id`, or of every stream when
    /// `None`.
    pub fn subscribe(&self, stream_id: Option<&str>) -> mpsc::UnboundedReceiver<Written<P>> {
        let (subscriber, rx) = ActorRef::channel();
        let mut state = self.state.write();
        let subscribers = std::mem::take(&mut state.subscribers);
        state.subscribers = match stream_id {
            Some(stream_id) => subscribers.register(subscriber, stream_id),
            None => subscribers.register_default(subscriber),
        };
        rx
    }

    fn append(&self, state: &mut LogState<P>, incoming: DurableEvent<P>) -> DurableEvent<P> {
        let sequence_nr = state.events.len() as u64 + 1;
        let event = DurableEvent {
            version: VersionClock::new(incoming.version.vector_time, sequence_nr),
            ..incoming
        };
        state.version = state.version.merge(&event.version.vector_time);
        state.events.push(event.clone());
        event
    }

    fn written(&self, state: &mut LogState<P>, events: &[DurableEvent<P>]) {
        let closed = state.subscribers.notify(events, None);
        for subscriber in closed {
            state.subscribers = std::mem::take(&mut state.subscribers).unregister(&subscriber);
        }
    }

    fn publish(&self, events: Vec<DurableEvent<P>>) {
        for event in &events {
            // no live queries is fine
            let _ = self.live.send(event.clone());
        }
        if let Some(channel) = &self.channel {
            if let Err(err) = channel.updated(events) {
                warn!(log = %self.id, error = %err, "cannot signal update");
            }
        }
    }

    /// Serve a replication read from a target replica.
    ///
    /// Scans at most `scan_limit` events from `from_sequence_nr`, returning
    /// up to `max` of them that the target has not seen and its filter
    /// accepts.
    pub fn replication_read(
        &self,
        read: ReplicationRead<P, DueHandle>,
    ) -> Result<ReplicationReadSuccess<P>> {
        if let Some(channel) = &self.channel {
            channel.replication_read(read.clone())?;
        }

        let state = self.state.read();
        let start = read.from_sequence_nr.max(1);
        let mut progress = start - 1;
        let mut events = Vec::new();
        for event in state
            .events
            .iter()
            .skip((start - 1) as usize)
            .take(read.scan_limit)
        {
            if events.len() >= read.max {
                break;
            }
            progress = event.version.sequence_nr;
            if event.can_replicate(&read.target_version, read.filter.as_ref()) {
                events.push(event.clone());
            }
        }
        let success = ReplicationReadSuccess {
            correlation_id: read.correlation_id,
            events,
            from_sequence_nr: read.from_sequence_nr,
            progress,
            target_id: read.target_id,
            source_version: state.version.clone(),
        };
        drop(state);

        debug!(
            log = %self.id,
            target = %success.target_id,
            events = success.events.len(),
            progress,
            "replication read served"
        );
        if let Some(channel) = &self.channel {
            channel.replication_read_success(success.clone())?;
        }
        Ok(success)
    }

    /// Store events replicated from other logs, skipping those already
    /// seen. Returns the events actually written.
    pub fn replication_write(&self, write: ReplicationWrite<P>) -> Result<Vec<DurableEvent<P>>> {
        let written = {
            let mut state = self.state.write();
            let mut written = Vec::new();
            for event in &write.events {
                if event.is_before(&state.version) {
                    trace!(log = %self.id, version = %event.version, "skipping replicated duplicate");
                    continue;
                }
                let stored = self.append(&mut state, event.clone());
                written.push(stored);
            }
            self.written(&mut state, &written);
            written
        };

        debug!(log = %self.id, written = written.len(), "replication write");
        self.publish(written.clone());
        if let Some(channel) = &self.channel {
            channel.replication_write(write)?;
        }
        Ok(written)
    }
}

#[async_trait]
impl<P> EventLog<P> for MemoryEventLog<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn query(
        &self,
        from_sequence_nr: u64,
        to_sequence_nr: u64,
        max: usize,
    ) -> BoxStream<'static, DurableEvent<P>> {
        let events: Vec<_> = self
            .state
            .read()
            .events
            .iter()
            .filter(|event| {
                let sequence_nr = event.version.sequence_nr;
                sequence_nr >= from_sequence_nr && sequence_nr <= to_sequence_nr
            })
            .take(max)
            .cloned()
            .collect();
        stream::iter(events).boxed()
    }

    fn live_query(&self, from_sequence_nr: u64) -> BoxStream<'static, DurableEvent<P>> {
        // subscribe before the snapshot so nothing falls in between
        let mut live = self.live.subscribe();
        let history: Vec<_> = self
            .state
            .read()
            .events
            .iter()
            .filter(|event| event.version.sequence_nr >= from_sequence_nr)
            .cloned()
            .collect();
        let id = self.id.clone();
        let state = Arc::clone(&self.state);

        async_stream::stream! {
            let mut last = from_sequence_nr.saturating_sub(1);
            for event in history {
                last = event.version.sequence_nr;
                yield event;
            }
            loop {
                match live.recv().await {
                    Ok(event) if event.version.sequence_nr > last => {
                        last = event.version.sequence_nr;
                        yield event;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        // catch up from the log; what is still buffered
                        // afterwards is filtered by sequence number
                        debug!(log = %id, skipped, "live query lagged, reading from the log");
                        let missed: Vec<_> = state
                            .read()
                            .events
                            .iter()
                            .filter(|event| event.version.sequence_nr > last)
                            .cloned()
                            .collect();
                        for event in missed {
                            last = event.version.sequence_nr;
                            yield event;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        .boxed()
    }

    async fn persist(&self, payload: P, stream_id: Option<String>) -> Result<DurableEvent<P>> {
        let event = {
            let mut state = self.state.write();
            let vector_time = state.version.increment(self.id.clone());
            let event = DurableEvent::new(
                payload,
                self.id.clone(),
                stream_id,
                VersionClock::new(vector_time, 0),
            );
            let event = self.append(&mut state, event);
            self.written(&mut state, std::slice::from_ref(&event));
            event
        };
        trace!(log = %self.id, version = %event.version, "persisted");
        self.publish(vec![event.clone()]);
        Ok(event)
    }
}

/// In-memory snapshot store keeping snapshots as JSON values.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for MemorySnapshotStore
where
    S: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self, id: &str) -> Result<S> {
        let value = self
            .snapshots
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SdkError::SnapshotNotFound(id.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn save(&self, id: &str, state: &S) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.snapshots.write().insert(id.to_string(), value);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.snapshots.write().remove(id).is_some())
    }
}
