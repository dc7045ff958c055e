//! Durable events and the clocks that order them in a journal.

use crate::replica::ReplicaId;
use crate::vclock::VectorClock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Vector time plus the sequence number an event got in its local journal.
///
/// The sequence number only breaks ties between concurrent vector times.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionClock {
    pub vector_time: VectorClock,
    pub sequence_nr: u64,
}

impl VersionClock {
    pub fn new(vector_time: VectorClock, sequence_nr: u64) -> Self {
        Self {
            vector_time,
            sequence_nr,
        }
    }

    /// Compare by vector time, then by sequence number for concurrent clocks.
    pub fn compare(&self, other: &VersionClock) -> Ordering {
        self.vector_time
            .partially_compare(&other.vector_time)
            .to_ordering()
            .unwrap_or_else(|| self.sequence_nr.cmp(&other.sequence_nr))
    }

    pub fn merge(&self, other: &VersionClock) -> Self {
        Self {
            vector_time: self.vector_time.merge(&other.vector_time),
            sequence_nr: self.sequence_nr.max(other.sequence_nr),
        }
    }
}

impl fmt::Display for VersionClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionClock({}, {})", self.sequence_nr, self.vector_time)
    }
}

/// An event as stored in a journal and exchanged between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurableEvent<P> {
    /// Application payload.
    pub payload: P,
    /// Replica that emitted the event.
    pub origin: ReplicaId,
    /// Aggregate stream the event belongs to, if any.
    pub stream_id: Option<String>,
    pub version: VersionClock,
}

/// Predicate deciding whether an event should be shipped to a target.
pub type ReplicationFilter<P> = Arc<dyn Fn(&DurableEvent<P>) -> bool + Send + Sync>;

impl<P> DurableEvent<P> {
    pub fn new(
        payload: P,
        origin: impl Into<ReplicaId>,
        stream_id: Option<String>,
        version: VersionClock,
    ) -> Self {
        Self {
            payload,
            origin: origin.into(),
            stream_id,
            version,
        }
    }

    /// True if the event happened before or at `time`.
    pub fn is_before(&self, time: &VectorClock) -> bool {
        self.version.vector_time <= *time
    }

    /// True if a replica at `time` has not seen this event yet and `filter`
    /// (when given) accepts it.
    pub fn can_replicate(&self, time: &VectorClock, filter: Option<&ReplicationFilter<P>>) -> bool {
        !self.is_before(time) && filter.map_or(true, |filter| filter(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(clock: &[(&str, u64)], seq: u64) -> DurableEvent<&'static str> {
        DurableEvent::new(
            "payload",
            "source",
            None,
            VersionClock::new(
                VectorClock::from_entries(clock.iter().map(|&(r, t)| (r, t))),
                seq,
            ),
        )
    }

    #[test]
    fn test_can_replicate_new_event() {
        let e = event(&[("source", 1)], 1);
        let target = VectorClock::from_entries([("t1", 1)]);
        assert!(e.can_replicate(&target, None));
    }

    #[test]
    fn test_cannot_replicate_seen_event() {
        let e = event(&[("t1", 1)], 1);
        let target = VectorClock::from_entries([("t1", 2)]);
        assert!(e.is_before(&target));
        assert!(!e.can_replicate(&target, None));
    }

    #[test]
    fn test_filter_rejects() {
        let e = event(&[("source", 1)], 1);
        let reject: ReplicationFilter<&'static str> = Arc::new(|_: &DurableEvent<&'static str>| false);
        let accept: ReplicationFilter<&'static str> =
            Arc::new(|e: &DurableEvent<&'static str>| e.payload == "payload");
        assert!(!e.can_replicate(&VectorClock::zero(), Some(&reject)));
        assert!(e.can_replicate(&VectorClock::zero(), Some(&accept)));
    }

    #[test]
    fn test_version_clock_tie_break() {
        let a = VersionClock::new(VectorClock::from_entries([("a", 1)]), 7);
        let b = VersionClock::new(VectorClock::from_entries([("b", 1)]), 3);
        assert_eq!(a.compare(&b), Ordering::Greater);

        let merged = a.merge(&b);
        assert_eq!(merged.sequence_nr, 7);
        assert_eq!(merged.vector_time.len(), 2);
        assert_eq!(merged.compare(&a), Ordering::Greater);
    }
}
