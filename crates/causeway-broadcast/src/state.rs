//! Replicator protocol state.
//!
//! [`ReplicatorState`] is an immutable aggregate: every transition consumes
//! the old state and returns the next one, so a replicator swaps its state
//! wholesale after each message.

use crate::protocol::Deliver;
use causeway_core::{Meet, ReplicaId, VectorClock, Versioned};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// An envelope some peers have not acknowledged yet.
#[derive(Clone, Debug)]
pub struct PendingAck<T> {
    /// Peers still owing an acknowledgement.
    pub targets: BTreeSet<ReplicaId>,
    /// Replica that broadcast the payload.
    pub origin: ReplicaId,
    pub versioned: Versioned<T>,
    /// When the envelope was last sent.
    pub timestamp: Instant,
}

impl<T> PendingAck<T> {
    pub fn new(
        targets: BTreeSet<ReplicaId>,
        origin: ReplicaId,
        versioned: Versioned<T>,
        timestamp: Instant,
    ) -> Self {
        Self {
            targets,
            origin,
            versioned,
            timestamp,
        }
    }

    pub fn version(&self) -> &VectorClock {
        &self.versioned.version
    }
}

#[derive(Clone, Debug)]
pub struct ReplicatorState<T> {
    local_version: VectorClock,
    stable_version: VectorClock,
    remote_versions: HashMap<ReplicaId, VectorClock>,
    pending_deliveries: Vec<Deliver<T>>,
    pending_acks: HashMap<VectorClock, PendingAck<T>>,
}

impl<T> Default for ReplicatorState<T> {
    fn default() -> Self {
        Self {
            local_version: VectorClock::zero(),
            stable_version: VectorClock::zero(),
            remote_versions: HashMap::new(),
            pending_deliveries: Vec::new(),
            pending_acks: HashMap::new(),
        }
    }
}

impl<T> ReplicatorState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered (or broadcast) by this replica.
    pub fn local_version(&self) -> &VectorClock {
        &self.local_version
    }

    /// Meet of every known remote version, zero when none is known.
    pub fn stable_version(&self) -> &VectorClock {
        &self.stable_version
    }

    pub fn remote_versions(&self) -> &HashMap<ReplicaId, VectorClock> {
        &self.remote_versions
    }

    /// Envelopes received but not yet causally deliverable, in arrival order.
    pub fn pending_deliveries(&self) -> &[Deliver<T>] {
        &self.pending_deliveries
    }

    pub fn pending_acks(&self) -> impl Iterator<Item = &PendingAck<T>> {
        self.pending_acks.values()
    }

    pub fn pending_ack(&self, version: &VectorClock) -> Option<&PendingAck<T>> {
        self.pending_acks.get(version)
    }

    pub fn is_pending_delivery(&self, version: &VectorClock) -> bool {
        self.pending_deliveries
            .iter()
            .any(|pending| pending.versioned.version == *version)
    }

    pub fn with_local_version(self, local_version: VectorClock) -> Self {
        Self {
            local_version,
            ..self
        }
    }

    /// Merge `version` into the clock known for `replica` and recompute the
    /// stable version.
    pub fn with_remote_version(self, replica: ReplicaId, version: &VectorClock) -> Self {
        let mut remote_versions = self.remote_versions;
        let merged = remote_versions
            .get(&replica)
            .map_or_else(|| version.clone(), |known| known.merge(version));
        remote_versions.insert(replica, merged);
        let stable_version = VectorClock::meet_all(remote_versions.values());
        Self {
            remote_versions,
            stable_version,
            ..self
        }
    }

    pub fn with_pending_delivery(self, deliver: Deliver<T>) -> Self {
        let mut pending_deliveries = self.pending_deliveries;
        pending_deliveries.push(deliver);
        Self {
            pending_deliveries,
            ..self
        }
    }

    /// Remove and return the first pending envelope that is deliverable at
    /// the current local version.
    pub fn take_deliverable(self) -> (Self, Option<Deliver<T>>) {
        let mut pending_deliveries = self.pending_deliveries;
        let position = pending_deliveries
            .iter()
            .position(|pending| pending.is_deliverable(&self.local_version));
        let taken = position.map(|idx| pending_deliveries.remove(idx));
        (
            Self {
                pending_deliveries,
                ..self
            },
            taken,
        )
    }

    /// Track an envelope awaiting acknowledgement from `ack.targets`.
    /// Entries without targets are not kept.
    pub fn with_pending_ack(self, ack: PendingAck<T>) -> Self {
        if ack.targets.is_empty() {
            return self;
        }
        let mut pending_acks = self.pending_acks;
        pending_acks.insert(ack.version().clone(), ack);
        Self {
            pending_acks,
            ..self
        }
    }

    /// Record that `replica` acknowledged `version`; the entry is dropped once
    /// nobody owes an acknowledgement.
    pub fn acknowledge(self, version: &VectorClock, replica: &ReplicaId) -> Self {
        let mut pending_acks = self.pending_acks;
        if let Some(pending) = pending_acks.get_mut(version) {
            pending.targets.remove(replica);
            if pending.targets.is_empty() {
                pending_acks.remove(version);
            }
        }
        Self {
            pending_acks,
            ..self
        }
    }

    /// Refresh the send timestamp of every entry older than `timeout` and
    /// return the refreshed entries.
    pub fn refresh_stale_acks(
        self,
        now: Instant,
        timeout: std::time::Duration,
    ) -> (Self, Vec<PendingAck<T>>)
    where
        T: Clone,
    {
        let mut pending_acks = self.pending_acks;
        let mut stale = Vec::new();
        for pending in pending_acks.values_mut() {
            if now.saturating_duration_since(pending.timestamp) >= timeout {
                pending.timestamp = now;
                stale.push(pending.clone());
            }
        }
        (
            Self {
                pending_acks,
                ..self
            },
            stale,
        )
    }
}
