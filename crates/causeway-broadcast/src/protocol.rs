//! Messages exchanged by replicators.

use causeway_core::{ReplicaId, VectorClock, Versioned};
use serde::{Deserialize, Serialize};

/// A broadcast payload travelling between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEnvelope<T> {
    /// Replica that broadcast the payload.
    pub origin: ReplicaId,
    /// Replica that forwarded this copy; acknowledgements go back to it.
    pub last_seen_by: ReplicaId,
    pub versioned: Versioned<T>,
}

impl<T> SendEnvelope<T> {
    pub fn version(&self) -> &VectorClock {
        &self.versioned.version
    }
}

/// Acknowledges receipt of the envelope with `version`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SendAck {
    pub replica_id: ReplicaId,
    pub version: VectorClock,
}

/// An envelope waiting for the causal delivery check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliver<T> {
    pub origin: ReplicaId,
    pub versioned: Versioned<T>,
}

impl<T> Deliver<T> {
    /// Ready when this is the origin's next event and every other dependency
    /// has already been delivered at `local`.
    pub fn is_deliverable(&self, local: &VectorClock) -> bool {
        let remote = &self.versioned.version;
        remote.get(&self.origin) == local.get(&self.origin) + 1
            && remote
                .iter()
                .all(|(replica, time)| *replica == self.origin || time <= local.get(replica))
    }
}

/// Peer-to-peer protocol traffic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage<T> {
    Send(SendEnvelope<T>),
    SendAck(SendAck),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(origin: &str, clock: &[(&str, u64)]) -> Deliver<()> {
        Deliver {
            origin: origin.into(),
            versioned: Versioned::new(
                VectorClock::from_entries(clock.iter().map(|&(r, t)| (r, t))),
                (),
            ),
        }
    }

    #[test]
    fn test_next_event_from_origin_is_deliverable() {
        let local = VectorClock::from_entries([("a", 1), ("b", 2)]);
        assert!(deliver("a", &[("a", 2), ("b", 2)]).is_deliverable(&local));
        assert!(deliver("a", &[("a", 2)]).is_deliverable(&local));
    }

    #[test]
    fn test_gap_from_origin_waits() {
        let local = VectorClock::from_entries([("a", 1)]);
        assert!(!deliver("a", &[("a", 3)]).is_deliverable(&local));
        assert!(!deliver("a", &[("a", 1)]).is_deliverable(&local));
    }

    #[test]
    fn test_missing_third_party_dependency_waits() {
        let local = VectorClock::from_entries([("a", 1)]);
        assert!(!deliver("a", &[("a", 2), ("c", 1)]).is_deliverable(&local));
        let local = local.increment("c");
        assert!(deliver("a", &[("a", 2), ("c", 1)]).is_deliverable(&local));
    }
}
