//! Replication readiness notifications.
//!
//! A [`NotificationChannel`] sits next to an event log. Targets register by
//! issuing replication reads; whenever new events are written the channel
//! tells every idle, recently active target that can replicate at least one
//! of them that replication is due. Targets that stay silent longer than
//! the registration expiration stop being notified until they read again.

use crate::protocol::{
    ReplicationDue, ReplicationRead, ReplicationReadFailure, ReplicationReadSuccess, ReplicationWrite,
};
use crate::recipient::Recipient;
use causeway_core::{DurableEvent, ReplicaId, ReplicationFilter, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for a notification channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// How long a registration stays active without a new replication read.
    pub registration_expiration: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            registration_expiration: Duration::from_secs(2),
        }
    }
}

/// What the channel knows about a target.
#[derive(Clone)]
pub struct Registration<P, H> {
    pub replicator: H,
    pub registered_at: Instant,
    /// Last version the target reported or was written up to.
    pub current_version: VectorClock,
    pub filter: Option<ReplicationFilter<P>>,
}

impl<P, H> Registration<P, H> {
    fn is_active(&self, now: Instant, expiration: Duration) -> bool {
        now.saturating_duration_since(self.registered_at) <= expiration
    }
}

pub struct NotificationChannel<P, H> {
    settings: NotificationSettings,
    registry: HashMap<ReplicaId, Registration<P, H>>,
    reading: HashSet<ReplicaId>,
}

impl<P, H> NotificationChannel<P, H>
where
    H: Recipient<ReplicationDue>,
{
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings,
            registry: HashMap::new(),
            reading: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn registration(&self, target_id: &ReplicaId) -> Option<&Registration<P, H>> {
        self.registry.get(target_id)
    }

    pub fn is_reading(&self, target_id: &ReplicaId) -> bool {
        self.reading.contains(target_id)
    }

    /// New events were written to the log.
    ///
    /// Returns the targets that were told replication is due.
    pub fn updated(&mut self, events: &[DurableEvent<P>], now: Instant) -> Vec<ReplicaId> {
        let expiration = self.settings.registration_expiration;
        let mut notified = Vec::new();
        for (target_id, registration) in &self.registry {
            if self.reading.contains(target_id) || !registration.is_active(now, expiration) {
                continue;
            }
            let due = events.iter().any(|event| {
                event.can_replicate(&registration.current_version, registration.filter.as_ref())
            });
            if !due {
                continue;
            }
            if registration.replicator.tell(ReplicationDue) {
                debug!(target = %target_id, "replication due");
                notified.push(target_id.clone());
            } else {
                warn!(target = %target_id, "replication due but target handle is closed");
            }
        }
        notified
    }

    /// A target started reading; (re)register it and hold notifications
    /// until the read completes.
    pub fn replication_read(&mut self, read: ReplicationRead<P, H>, now: Instant) {
        self.reading.insert(read.target_id.clone());
        self.registry.insert(
            read.target_id,
            Registration {
                replicator: read.replicator,
                registered_at: now,
                current_version: read.target_version,
                filter: read.filter,
            },
        );
    }

    /// A read for `target_id` finished, successfully or not.
    pub fn read_completed(&mut self, target_id: &ReplicaId) {
        self.reading.remove(target_id);
    }

    pub fn replication_read_success(&mut self, success: &ReplicationReadSuccess<P>) {
        self.read_completed(&success.target_id);
    }

    pub fn replication_read_failure(&mut self, failure: &ReplicationReadFailure) {
        debug!(target = %failure.target_id, cause = %failure.cause, "replication read failed");
        self.read_completed(&failure.target_id);
    }

    /// Events were written on behalf of other sources; advance what those
    /// sources are known to have seen.
    pub fn replication_write(&mut self, write: &ReplicationWrite<P>) {
        for (source_id, metadata) in &write.metadata {
            if let Some(registration) = self.registry.get_mut(source_id) {
                registration.current_version = metadata.version.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::VersionClock;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct Probe(Arc<Mutex<usize>>);

    impl PartialEq for Probe {
        fn eq(&self, other: &Self) -> bool {
            Arc::ptr_eq(&self.0, &other.0)
        }
    }

    impl Eq for Probe {}

    impl std::hash::Hash for Probe {
        fn hash<S: std::hash::Hasher>(&self, state: &mut S) {
            Arc::as_ptr(&self.0).hash(state);
        }
    }

    impl Recipient<ReplicationDue> for Probe {
        fn tell(&self, _: ReplicationDue) -> bool {
            *self.0.lock() += 1;
            true
        }
    }

    fn read(target: &str, probe: &Probe) -> ReplicationRead<&'static str, Probe> {
        ReplicationRead {
            from_sequence_nr: 1,
            max: 10,
            scan_limit: 100,
            target_id: target.into(),
            filter: None,
            replicator: probe.clone(),
            target_version: VectorClock::zero(),
            correlation_id: 1,
        }
    }

    #[test]
    fn test_reading_target_is_not_notified() {
        let probe = Probe(Arc::new(Mutex::new(0)));
        let mut channel = NotificationChannel::new(NotificationSettings::default());
        let now = Instant::now();
        channel.replication_read(read("t", &probe), now);
        assert!(channel.is_reading(&"t".into()));

        let event = DurableEvent::new(
            "a",
            "s",
            None,
            VersionClock::new(VectorClock::zero().increment("s"), 1),
        );
        assert!(channel.updated(&[event.clone()], now).is_empty());

        channel.read_completed(&"t".into());
        assert_eq!(channel.updated(&[event], now), vec![ReplicaId::from("t")]);
        assert_eq!(*probe.0.lock(), 1);
    }
}
