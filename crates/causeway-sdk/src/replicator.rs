//! The replicator actor.
//!
//! Wraps the sans-IO [`Replicator`] engine in a tokio task. The task owns
//! the engine, the peer handles and the local subscribers, and reacts to:
//!
//! - its mailbox ([`ReplicatorMessage`])
//! - membership events
//! - the resend timer
//! - termination of watched peers and subscribers
//!
//! Everything runs on one task, so the engine is never shared.

use crate::actor::ActorRef;
use crate::correlation::{CorrelatableRef, Correlated, ReplyTo};
use crate::directory::ReplicatorDirectory;
use crate::error::{Result, SdkError};
use crate::membership::{Member, MemberEvent, MembershipObserver};
use causeway_broadcast::{Deliver, Effect, PeerMessage, Replicator, ReplicatorSettings};
use causeway_core::{ReplicaId, VectorClock};
use futures::future::{abortable, AbortHandle, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::{pending, Future};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Asks which of `versions` every peer has already observed.
#[derive(Debug)]
pub struct StableRequest {
    pub correlation_id: u64,
    pub versions: Vec<VectorClock>,
    pub reply_to: ReplyTo<StableReply>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StableReply {
    pub correlation_id: u64,
    pub versions: Vec<VectorClock>,
}

impl Correlated for StableReply {
    fn correlation_id(&self) -> u64 {
        self.correlation_id
    }
}

/// Mailbox of a replicator actor.
pub enum ReplicatorMessage<T> {
    /// Broadcast a payload from this replica.
    Broadcast(T),
    /// Traffic from another replicator of the same topic.
    Peer(PeerMessage<T>),
    /// A peer announcing itself.
    Invitation {
        replica_id: ReplicaId,
        handle: ActorRef<ReplicatorMessage<T>>,
    },
    Subscribe {
        subscriber: ActorRef<Deliver<T>>,
        ack: Option<oneshot::Sender<()>>,
    },
    Unsubscribe {
        subscriber: ActorRef<Deliver<T>>,
        ack: Option<oneshot::Sender<()>>,
    },
    StableRequest(StableRequest),
    Stop,
}

impl<T> fmt::Debug for ReplicatorMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorMessage::Broadcast(_) => f.write_str("Broadcast"),
            ReplicatorMessage::Peer(PeerMessage::Send(envelope)) => {
                write!(f, "Send({})", envelope.version())
            }
            ReplicatorMessage::Peer(PeerMessage::SendAck(ack)) => {
                write!(f, "SendAck({}, {})", ack.replica_id, ack.version)
            }
            ReplicatorMessage::Invitation { replica_id, .. } => {
                write!(f, "Invitation({})", replica_id)
            }
            ReplicatorMessage::Subscribe { subscriber, .. } => {
                write!(f, "Subscribe({:?})", subscriber)
            }
            ReplicatorMessage::Unsubscribe { subscriber, .. } => {
                write!(f, "Unsubscribe({:?})", subscriber)
            }
            ReplicatorMessage::StableRequest(request) => {
                write!(f, "StableRequest({})", request.correlation_id)
            }
            ReplicatorMessage::Stop => f.write_str("Stop"),
        }
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    handle: ActorRef<Deliver<T>>,
    receiver: mpsc::UnboundedReceiver<Deliver<T>>,
}

impl<T> Subscription<T> {
    pub fn handle(&self) -> &ActorRef<Deliver<T>> {
        &self.handle
    }

    /// Next delivered payload, `None` once the replicator has stopped.
    pub async fn recv(&mut self) -> Option<Deliver<T>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Deliver<T>> {
        self.receiver.try_recv().ok()
    }
}

/// Client handle to a running replicator.
pub struct ReplicatorRef<T> {
    replica_id: ReplicaId,
    topic: Arc<str>,
    handle: ActorRef<ReplicatorMessage<T>>,
    correlations: CorrelatableRef<StableReply>,
    next_correlation_id: Arc<AtomicU64>,
}

impl<T> Clone for ReplicatorRef<T> {
    fn clone(&self) -> Self {
        Self {
            replica_id: self.replica_id.clone(),
            topic: Arc::clone(&self.topic),
            handle: self.handle.clone(),
            correlations: self.correlations.clone(),
            next_correlation_id: Arc::clone(&self.next_correlation_id),
        }
    }
}

impl<T> fmt::Debug for ReplicatorRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorRef")
            .field("replica_id", &self.replica_id)
            .field("topic", &self.topic)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T: Clone + Send + 'static> ReplicatorRef<T> {
    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn handle(&self) -> &ActorRef<ReplicatorMessage<T>> {
        &self.handle
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_closed()
    }

    fn stopped(&self) -> SdkError {
        SdkError::ReplicatorStopped(self.topic.to_string())
    }

    fn tell(&self, message: ReplicatorMessage<T>) -> Result<()> {
        if self.handle.tell(message) {
            Ok(())
        } else {
            Err(self.stopped())
        }
    }

    /// Broadcast `message` to every replica of the topic, this one included.
    pub fn broadcast(&self, message: T) -> Result<()> {
        self.tell(ReplicatorMessage::Broadcast(message))
    }

    /// Subscribe a fresh mailbox to delivered payloads.
    pub async fn subscribe(&self) -> Result<Subscription<T>> {
        let (handle, receiver) = ActorRef::channel();
        self.subscribe_with(handle.clone()).await?;
        Ok(Subscription { handle, receiver })
    }

    /// Subscribe an existing mailbox; resolves once the replicator has
    /// registered it.
    pub async fn subscribe_with(&self, subscriber: ActorRef<Deliver<T>>) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tell(ReplicatorMessage::Subscribe {
            subscriber,
            ack: Some(ack),
        })?;
        done.await.map_err(|_| self.stopped())
    }

    pub async fn unsubscribe(&self, subscriber: &ActorRef<Deliver<T>>) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tell(ReplicatorMessage::Unsubscribe {
            subscriber: subscriber.clone(),
            ack: Some(ack),
        })?;
        done.await.map_err(|_| self.stopped())
    }

    /// The subset of `versions` that every known peer has observed.
    pub async fn stable_versions(&self, versions: Vec<VectorClock>) -> Result<Vec<VectorClock>> {
        self.stable_versions_until(versions, pending()).await
    }

    /// Like [`stable_versions`](Self::stable_versions), giving up when
    /// `cancel` resolves.
    pub async fn stable_versions_until<C>(
        &self,
        versions: Vec<VectorClock>,
        cancel: C,
    ) -> Result<Vec<VectorClock>>
    where
        C: Future<Output = ()>,
    {
        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        let handle = self.handle.clone();
        let reply = self
            .correlations
            .post_and_await(
                correlation_id,
                move |reply_to| {
                    handle.tell(ReplicatorMessage::StableRequest(StableRequest {
                        correlation_id,
                        versions,
                        reply_to,
                    }))
                },
                cancel,
            )
            .await
            .map_err(|err| match err {
                SdkError::ChannelClosed(_) => self.stopped(),
                other => other,
            })?;
        Ok(reply.versions)
    }

    /// Stop the replicator and cancel requests still waiting on it.
    pub fn stop(&self) {
        self.handle.tell(ReplicatorMessage::Stop);
        self.correlations.stop();
    }
}

/// Spawn a replicator for `topic` on the current tokio runtime.
///
/// The replicator runs until it is told to stop, through
/// [`ReplicatorRef::stop`] or a [`ReplicatorMessage::Stop`]. Dropping every
/// `ReplicatorRef` does not end it: the directory, its peers and the actor
/// itself still hold its mailbox.
pub fn spawn_replicator<T>(
    replica_id: ReplicaId,
    topic: impl Into<String>,
    settings: ReplicatorSettings,
    membership: Arc<dyn MembershipObserver>,
    directory: ReplicatorDirectory<T>,
) -> (ReplicatorRef<T>, JoinHandle<()>)
where
    T: Clone + Send + 'static,
{
    let topic = topic.into();
    let (handle, mailbox) = ActorRef::channel();
    directory.register(replica_id.clone(), &topic, handle.clone());

    let actor = ReplicatorActor::new(
        replica_id.clone(),
        topic.clone(),
        settings,
        handle.clone(),
        directory,
    );
    let task = tokio::spawn(actor.run(mailbox, membership));

    let replicator = ReplicatorRef {
        replica_id,
        topic: Arc::from(topic.as_str()),
        handle,
        correlations: CorrelatableRef::new(),
        next_correlation_id: Arc::new(AtomicU64::new(1)),
    };
    (replicator, task)
}

enum Watched<T> {
    Peer { replica_id: ReplicaId, actor_id: u64 },
    Subscriber(ActorRef<Deliver<T>>),
}

struct ReplicatorActor<T> {
    topic: String,
    engine: Replicator<T>,
    self_ref: ActorRef<ReplicatorMessage<T>>,
    peers: HashMap<ReplicaId, ActorRef<ReplicatorMessage<T>>>,
    /// Local subscribers with the handle that stops watching them.
    subscribers: HashMap<ActorRef<Deliver<T>>, AbortHandle>,
    directory: ReplicatorDirectory<T>,
    /// Yields `None` for watches aborted before the target closed.
    watchers: FuturesUnordered<BoxFuture<'static, Option<Watched<T>>>>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl<T: Clone + Send + 'static> ReplicatorActor<T> {
    fn new(
        replica_id: ReplicaId,
        topic: String,
        settings: ReplicatorSettings,
        self_ref: ActorRef<ReplicatorMessage<T>>,
        directory: ReplicatorDirectory<T>,
    ) -> Self {
        Self {
            topic,
            engine: Replicator::new(replica_id, settings),
            self_ref,
            peers: HashMap::new(),
            subscribers: HashMap::new(),
            directory,
            watchers: FuturesUnordered::new(),
        }
    }

    async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<ReplicatorMessage<T>>,
        membership: Arc<dyn MembershipObserver>,
    ) {
        let replica = self.engine.id().clone();
        info!(replica = %replica, topic = %self.topic, "replicator started");

        let mut events = membership.subscribe();
        let mut membership_open = true;
        for member in membership.members() {
            self.member_joined(member);
        }

        let mut resend = tokio::time::interval(self.engine.settings().resend_interval);
        resend.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = mailbox.recv() => match message {
                    Some(ReplicatorMessage::Stop) | None => break,
                    Some(message) => self.handle(message),
                },
                event = events.recv(), if membership_open => match event {
                    Ok(MemberEvent::Joined(member)) => self.member_joined(member),
                    Ok(MemberEvent::Removed(peer)) => self.member_removed(&peer),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(replica = %replica, skipped, "membership events lagged");
                    }
                    Err(RecvError::Closed) => membership_open = false,
                },
                _ = resend.tick() => {
                    let effects = self.engine.resend(now());
                    self.apply(effects);
                }
                Some(watched) = self.watchers.next(), if !self.watchers.is_empty() => {
                    if let Some(watched) = watched {
                        self.terminated(watched);
                    }
                }
            }
        }

        self.directory
            .unregister(&replica, &self.topic, &self.self_ref);
        info!(replica = %replica, topic = %self.topic, "replicator stopped");
    }

    fn handle(&mut self, message: ReplicatorMessage<T>) {
        match message {
            ReplicatorMessage::Broadcast(payload) => {
                let effects = self.engine.broadcast(payload, now());
                self.apply(effects);
            }
            ReplicatorMessage::Peer(message) => {
                let effects = self.engine.handle(message, now());
                self.apply(effects);
            }
            ReplicatorMessage::Invitation { replica_id, handle } => {
                self.invited(replica_id, handle);
            }
            ReplicatorMessage::Subscribe { subscriber, ack } => {
                if !self.subscribers.contains_key(&subscriber) {
                    debug!(replica = %self.engine.id(), subscriber = ?subscriber, "subscribed");
                    let watch =
                        self.watch(Watched::Subscriber(subscriber.clone()), subscriber.closed());
                    self.subscribers.insert(subscriber, watch);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            ReplicatorMessage::Unsubscribe { subscriber, ack } => {
                if let Some(watch) = self.subscribers.remove(&subscriber) {
                    watch.abort();
                    debug!(replica = %self.engine.id(), subscriber = ?subscriber, "unsubscribed");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            ReplicatorMessage::StableRequest(request) => {
                let versions = self.engine.stable(request.versions);
                request.reply_to.tell(StableReply {
                    correlation_id: request.correlation_id,
                    versions,
                });
            }
            // handled by the run loop
            ReplicatorMessage::Stop => {}
        }
    }

    fn member_joined(&mut self, member: Member) {
        if !self.engine.should_invite(&member.id, member.roles()) {
            return;
        }
        match self.directory.resolve(&member.id, &self.topic) {
            Some(peer) => {
                trace!(replica = %self.engine.id(), peer = %member.id, "sending invitation");
                peer.tell(ReplicatorMessage::Invitation {
                    replica_id: self.engine.id().clone(),
                    handle: self.self_ref.clone(),
                });
            }
            None => {
                debug!(
                    replica = %self.engine.id(),
                    peer = %member.id,
                    topic = %self.topic,
                    "no replicator for topic on joined member yet"
                );
            }
        }
    }

    fn member_removed(&mut self, peer: &ReplicaId) {
        self.peers.remove(peer);
        self.engine.remove_member(peer);
    }

    fn invited(&mut self, replica_id: ReplicaId, handle: ActorRef<ReplicatorMessage<T>>) {
        if replica_id == *self.engine.id() || self.peers.get(&replica_id) == Some(&handle) {
            return;
        }
        let newly_known = self.engine.add_member(replica_id.clone());
        self.watch(
            Watched::Peer {
                replica_id: replica_id.clone(),
                actor_id: handle.id(),
            },
            handle.closed(),
        );
        self.peers.insert(replica_id, handle.clone());

        // Answer so the inviter learns about us too; a no-op if it already has.
        if newly_known {
            handle.tell(ReplicatorMessage::Invitation {
                replica_id: self.engine.id().clone(),
                handle: self.self_ref.clone(),
            });
        }
    }

    fn watch<F>(&mut self, watched: Watched<T>, closed: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (closed, abort) = abortable(closed);
        self.watchers
            .push(closed.map(move |result| result.ok().map(|_| watched)).boxed());
        abort
    }

    fn terminated(&mut self, watched: Watched<T>) {
        match watched {
            Watched::Peer {
                replica_id,
                actor_id,
            } => {
                if self.peers.get(&replica_id).map(ActorRef::id) == Some(actor_id) {
                    debug!(replica = %self.engine.id(), peer = %replica_id, "peer terminated");
                    self.peers.remove(&replica_id);
                    self.engine.remove_member(&replica_id);
                }
            }
            Watched::Subscriber(subscriber) => {
                if self.subscribers.remove(&subscriber).is_some() {
                    debug!(replica = %self.engine.id(), subscriber = ?subscriber, "subscriber terminated");
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect<T>>) {
        for effect in effects {
            match effect {
                Effect::Peer { to, message } => match self.peers.get(&to) {
                    Some(peer) => {
                        if !peer.tell(ReplicatorMessage::Peer(message)) {
                            warn!(replica = %self.engine.id(), peer = %to, "peer mailbox closed");
                        }
                    }
                    None => {
                        warn!(replica = %self.engine.id(), peer = %to, "no handle for peer");
                    }
                },
                Effect::Delivered(delivered) => {
                    let closed: Vec<_> = self
                        .subscribers
                        .keys()
                        .filter(|subscriber| !subscriber.tell(delivered.clone()))
                        .cloned()
                        .collect();
                    for subscriber in closed {
                        warn!(replica = %self.engine.id(), subscriber = ?subscriber, "subscriber closed");
                        if let Some(watch) = self.subscribers.remove(&subscriber) {
                            watch.abort();
                        }
                    }
                }
            }
        }
    }
}
