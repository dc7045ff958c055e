//! Pull-based replication messages seen by a notification channel.
//!
//! A target replica periodically asks a source for events it has not seen
//! (`ReplicationRead`) and the source answers with a success or failure.
//! Writes in the other direction (`ReplicationWrite`) carry per-source
//! metadata telling how far each source has been replicated.

use causeway_core::{DurableEvent, ReplicaId, ReplicationFilter, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tells a target that it should issue a new replication read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationDue;

/// A target asking for events it has not seen yet.
#[derive(Clone)]
pub struct ReplicationRead<P, H> {
    /// First sequence number to read.
    pub from_sequence_nr: u64,
    /// Maximum number of events to return.
    pub max: usize,
    /// Maximum number of events to scan.
    pub scan_limit: usize,
    pub target_id: ReplicaId,
    pub filter: Option<ReplicationFilter<P>>,
    /// Where `ReplicationDue` notifications for this target go.
    pub replicator: H,
    /// Events the target has already seen.
    pub target_version: VectorClock,
    pub correlation_id: u64,
}

impl<P, H: fmt::Debug> fmt::Debug for ReplicationRead<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationRead")
            .field("from_sequence_nr", &self.from_sequence_nr)
            .field("max", &self.max)
            .field("scan_limit", &self.scan_limit)
            .field("target_id", &self.target_id)
            .field("filtered", &self.filter.is_some())
            .field("replicator", &self.replicator)
            .field("target_version", &self.target_version)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationReadSuccess<P> {
    pub correlation_id: u64,
    pub events: Vec<DurableEvent<P>>,
    pub from_sequence_nr: u64,
    /// Last sequence number scanned.
    pub progress: u64,
    pub target_id: ReplicaId,
    /// Version of the source log at read time.
    pub source_version: VectorClock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationReadFailure {
    pub correlation_id: u64,
    pub cause: String,
    pub target_id: ReplicaId,
}

/// How far a source has been replicated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationMetadata {
    pub progress: u64,
    pub version: VectorClock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationWrite<P> {
    pub events: Vec<DurableEvent<P>>,
    pub metadata: HashMap<ReplicaId, ReplicationMetadata>,
    pub correlation_id: u64,
}

impl<P> ReplicationWrite<P> {
    /// Sources this write carries events for.
    pub fn source_ids(&self) -> impl Iterator<Item = &ReplicaId> {
        self.metadata.keys()
    }
}
