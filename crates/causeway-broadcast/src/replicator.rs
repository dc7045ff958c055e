//! The per-topic replicator engine.
//!
//! # Protocol
//!
//! ```text
//! On broadcast(m):
//!   v := local[self += 1]
//!   ∀j ∈ members: send ⟨origin=self, lastSeenBy=self, (v, m)⟩ to j
//!   pendingAcks += (members, v)
//!
//! On receive ⟨o, s, (v, m)⟩ from s:
//!   if v ≤ local or v ∈ pending: ack and drop
//!   ∀j ∈ members \ {s}: relay ⟨o, self, (v, m)⟩ to j
//!   send ack(v) to s
//!   pending += (o, v, m); deliver
//!
//! On deliver:
//!   while ∃ (o, v, m) ∈ pending with v[o] = local[o] + 1 and ∀k≠o: v[k] ≤ local[k]:
//!     hand m to subscribers; local[o] += 1
//!   remote[o] := remote[o] ⊔ v; stable := ⊓ remote
//! ```
//!
//! The engine performs no I/O. Every operation returns the [`Effect`]s the
//! caller has to carry out: messages for peers and payloads ready for local
//! subscribers. Time is passed in explicitly so retries can be driven by any
//! clock.

use crate::protocol::{Deliver, PeerMessage, SendAck, SendEnvelope};
use crate::settings::ReplicatorSettings;
use crate::state::{PendingAck, ReplicatorState};
use causeway_core::{ReplicaId, VectorClock, Versioned};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, trace};

/// Something the owner of a [`Replicator`] has to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect<T> {
    /// Send `message` to peer `to`.
    Peer { to: ReplicaId, message: PeerMessage<T> },
    /// Hand a causally ready payload to local subscribers.
    Delivered(Deliver<T>),
}

/// Reliable causal broadcast for a single topic.
#[derive(Debug)]
pub struct Replicator<T> {
    id: ReplicaId,
    settings: ReplicatorSettings,
    members: BTreeSet<ReplicaId>,
    state: ReplicatorState<T>,
}

impl<T: Clone> Replicator<T> {
    pub fn new(id: impl Into<ReplicaId>, settings: ReplicatorSettings) -> Self {
        Self {
            id: id.into(),
            settings,
            members: BTreeSet::new(),
            state: ReplicatorState::new(),
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    pub fn settings(&self) -> &ReplicatorSettings {
        &self.settings
    }

    pub fn state(&self) -> &ReplicatorState<T> {
        &self.state
    }

    pub fn local_version(&self) -> &VectorClock {
        self.state.local_version()
    }

    pub fn stable_version(&self) -> &VectorClock {
        self.state.stable_version()
    }

    pub fn members(&self) -> impl Iterator<Item = &ReplicaId> {
        self.members.iter()
    }

    pub fn is_member(&self, replica: &ReplicaId) -> bool {
        self.members.contains(replica)
    }

    /// Whether a newly joined cluster member should receive an invitation.
    pub fn should_invite<'a, I>(&self, peer: &ReplicaId, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        *peer != self.id && self.settings.accepts_roles(roles)
    }

    /// Accept an invitation; returns false if the peer was already known.
    pub fn add_member(&mut self, peer: ReplicaId) -> bool {
        if peer == self.id {
            return false;
        }
        let added = self.members.insert(peer.clone());
        if added {
            debug!(replica = %self.id, peer = %peer, "member added");
        }
        added
    }

    /// Forget a terminated peer. Envelopes it still owes acknowledgements for
    /// stay pending.
    pub fn remove_member(&mut self, peer: &ReplicaId) -> bool {
        let removed = self.members.remove(peer);
        if removed {
            debug!(replica = %self.id, peer = %peer, "member removed");
        }
        removed
    }

    /// Broadcast `message` to every member.
    ///
    /// The message is versioned with the next local event and is delivered
    /// to local subscribers straight away.
    pub fn broadcast(&mut self, message: T, now: Instant) -> Vec<Effect<T>> {
        let version = self.state.local_version().increment(self.id.clone());
        let versioned = Versioned::new(version.clone(), message);
        let envelope = SendEnvelope {
            origin: self.id.clone(),
            last_seen_by: self.id.clone(),
            versioned: versioned.clone(),
        };

        let mut effects: Vec<Effect<T>> = self
            .members
            .iter()
            .map(|member| Effect::Peer {
                to: member.clone(),
                message: PeerMessage::Send(envelope.clone()),
            })
            .collect();
        effects.push(Effect::Delivered(Deliver {
            origin: self.id.clone(),
            versioned: versioned.clone(),
        }));

        trace!(replica = %self.id, version = %version, members = self.members.len(), "broadcast");
        let state = std::mem::take(&mut self.state);
        self.state = state
            .with_pending_ack(PendingAck::new(
                self.members.clone(),
                self.id.clone(),
                versioned,
                now,
            ))
            .with_local_version(version);
        effects
    }

    /// Handle an envelope sent or relayed by a peer.
    pub fn receive(&mut self, envelope: SendEnvelope<T>, now: Instant) -> Vec<Effect<T>> {
        let sender = envelope.last_seen_by.clone();
        let version = envelope.version().clone();
        let ack = Effect::Peer {
            to: sender.clone(),
            message: PeerMessage::SendAck(SendAck {
                replica_id: self.id.clone(),
                version: version.clone(),
            }),
        };

        if version <= *self.state.local_version() || self.state.is_pending_delivery(&version) {
            debug!(replica = %self.id, from = %sender, version = %version, "duplicate envelope dropped");
            return vec![ack];
        }

        let relay_targets: BTreeSet<ReplicaId> = self
            .members
            .iter()
            .filter(|member| **member != sender)
            .cloned()
            .collect();
        let relayed = SendEnvelope {
            origin: envelope.origin.clone(),
            last_seen_by: self.id.clone(),
            versioned: envelope.versioned.clone(),
        };

        let mut effects: Vec<Effect<T>> = relay_targets
            .iter()
            .map(|member| Effect::Peer {
                to: member.clone(),
                message: PeerMessage::Send(relayed.clone()),
            })
            .collect();
        effects.push(ack);
        trace!(
            replica = %self.id,
            from = %sender,
            version = %version,
            relays = relay_targets.len(),
            "envelope received"
        );

        let deliver = Deliver {
            origin: envelope.origin.clone(),
            versioned: envelope.versioned,
        };
        let state = std::mem::take(&mut self.state);
        self.state = state
            .with_pending_delivery(deliver.clone())
            .with_pending_ack(PendingAck::new(
                relay_targets,
                envelope.origin,
                deliver.versioned.clone(),
                now,
            ));

        effects.extend(self.deliver(deliver));
        effects
    }

    /// Run the causal delivery check after `trigger` was queued.
    ///
    /// Every pending envelope is re-examined each time the local version
    /// advances, so envelopes that arrived ahead of their dependencies are
    /// released as soon as those dependencies are delivered.
    pub fn deliver(&mut self, trigger: Deliver<T>) -> Vec<Effect<T>> {
        let mut effects = Vec::new();
        let mut state = std::mem::take(&mut self.state);
        loop {
            let (next, taken) = state.take_deliverable();
            state = next;
            let Some(ready) = taken else { break };
            let local = state.local_version().increment(ready.origin.clone());
            trace!(replica = %self.id, origin = %ready.origin, version = %ready.versioned.version, "delivered");
            state = state.with_local_version(local);
            effects.push(Effect::Delivered(ready));
        }

        if state.is_pending_delivery(&trigger.versioned.version) {
            debug!(
                replica = %self.id,
                origin = %trigger.origin,
                version = %trigger.versioned.version,
                local = %state.local_version(),
                "delivery deferred"
            );
        }
        self.state = state.with_remote_version(trigger.origin, &trigger.versioned.version);
        effects
    }

    /// Handle an acknowledgement from a peer.
    pub fn acknowledge(&mut self, ack: SendAck) {
        trace!(replica = %self.id, from = %ack.replica_id, version = %ack.version, "ack");
        let state = std::mem::take(&mut self.state);
        self.state = state.acknowledge(&ack.version, &ack.replica_id);
    }

    /// Dispatch a peer message.
    pub fn handle(&mut self, message: PeerMessage<T>, now: Instant) -> Vec<Effect<T>> {
        match message {
            PeerMessage::Send(envelope) => self.receive(envelope, now),
            PeerMessage::SendAck(ack) => {
                self.acknowledge(ack);
                Vec::new()
            }
        }
    }

    /// Resend every envelope whose acknowledgement is overdue.
    ///
    /// Only outstanding targets that are still members are contacted. Entries
    /// for peers that left stay around and are retried if they rejoin.
    pub fn resend(&mut self, now: Instant) -> Vec<Effect<T>> {
        let state = std::mem::take(&mut self.state);
        let (state, stale) = state.refresh_stale_acks(now, self.settings.retry_timeout);
        self.state = state;

        let mut effects = Vec::new();
        for pending in stale {
            let envelope = SendEnvelope {
                origin: pending.origin.clone(),
                last_seen_by: self.id.clone(),
                versioned: pending.versioned.clone(),
            };
            for target in pending.targets.iter().filter(|t| self.members.contains(*t)) {
                debug!(replica = %self.id, to = %target, version = %pending.versioned.version, "resend");
                effects.push(Effect::Peer {
                    to: target.clone(),
                    message: PeerMessage::Send(envelope.clone()),
                });
            }
        }
        effects
    }

    /// The subset of `versions` already observed by every tracked peer.
    pub fn stable(&self, versions: Vec<VectorClock>) -> Vec<VectorClock> {
        let stable = self.state.stable_version();
        versions.into_iter().filter(|v| v <= stable).collect()
    }
}
