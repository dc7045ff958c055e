//! Notification channel behaviour
//!
//! A target registers through a replication read and its matching success.
//! Each test then writes events and checks which targets were told that
//! replication is due.

use causeway_core::{DurableEvent, ReplicaId, ReplicationFilter, VectorClock, VersionClock};
use causeway_notify::{
    NotificationChannel, NotificationSettings, Recipient, ReplicationDue, ReplicationMetadata,
    ReplicationRead, ReplicationReadFailure, ReplicationReadSuccess, ReplicationWrite,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SOURCE_ID: &str = "sid";
const TARGET_ID_1: &str = "tid1";
const TARGET_ID_2: &str = "tid2";

/// Counts `ReplicationDue` signals.
#[derive(Clone, Debug, Default)]
struct Probe(Arc<Mutex<usize>>);

impl Probe {
    fn count(&self) -> usize {
        *self.0.lock()
    }
}

impl PartialEq for Probe {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Probe {}

impl Hash for Probe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl Recipient<ReplicationDue> for Probe {
    fn tell(&self, _: ReplicationDue) -> bool {
        *self.0.lock() += 1;
        true
    }
}

struct Fixture {
    channel: NotificationChannel<&'static str, Probe>,
    probe: Probe,
    start: Instant,
}

impl Fixture {
    fn new() -> Self {
        Self {
            channel: NotificationChannel::new(NotificationSettings {
                registration_expiration: Duration::from_millis(400),
            }),
            probe: Probe::default(),
            start: Instant::now(),
        }
    }

    fn at(&self, millis: u64) -> Instant {
        self.start + Duration::from_millis(millis)
    }

    fn read_msg(
        &self,
        target: &str,
        version: VectorClock,
        filter: Option<ReplicationFilter<&'static str>>,
        probe: &Probe,
    ) -> ReplicationRead<&'static str, Probe> {
        ReplicationRead {
            from_sequence_nr: 1,
            max: 10,
            scan_limit: 100,
            target_id: target.into(),
            filter,
            replicator: probe.clone(),
            target_version: version,
            correlation_id: 1,
        }
    }

    /// A complete read round trip.
    fn source_read(&mut self, target: &str, version: VectorClock, millis: u64) {
        let read = self.read_msg(target, version, None, &self.probe);
        self.channel.replication_read(read, self.at(millis));
        self.channel.replication_read_success(&ReplicationReadSuccess {
            correlation_id: 1,
            events: Vec::new(),
            from_sequence_nr: 10,
            progress: 9,
            target_id: target.into(),
            source_version: VectorClock::zero(),
        });
    }

    fn source_update(&mut self, events: &[DurableEvent<&'static str>], millis: u64) -> usize {
        self.channel.updated(events, self.at(millis)).len()
    }
}

fn vtime(source: u64, target1: u64, target2: u64) -> VectorClock {
    VectorClock::from_entries([
        (SOURCE_ID, source),
        (TARGET_ID_1, target1),
        (TARGET_ID_2, target2),
    ])
}

fn event(payload: &'static str, time: VectorClock) -> DurableEvent<&'static str> {
    DurableEvent::new(payload, "emitter", None, VersionClock::new(time, 0))
}

#[test]
fn test_notifies_when_update_is_not_in_causal_past_of_target() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, vtime(0, 1, 0), 0);
    assert_eq!(f.source_update(&[event("a", vtime(1, 0, 0))], 10), 1);
    assert_eq!(f.probe.count(), 1);
}

#[test]
fn test_notifies_when_part_of_update_is_new() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, vtime(0, 1, 0), 0);
    f.source_update(&[event("a", vtime(0, 1, 0)), event("b", vtime(1, 0, 0))], 10);
    assert_eq!(f.probe.count(), 1);
}

#[test]
fn test_silent_when_update_is_in_causal_past_of_target() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, vtime(0, 2, 0), 0);
    f.source_update(&[event("a", vtime(0, 1, 0)), event("b", vtime(0, 2, 0))], 10);
    assert_eq!(f.probe.count(), 0);
}

#[test]
fn test_silent_when_filter_rejects_update() {
    let mut f = Fixture::new();
    let only_a: ReplicationFilter<&'static str> =
        Arc::new(|e: &DurableEvent<&'static str>| e.payload == "a");
    let read = f.read_msg(TARGET_ID_1, vtime(0, 1, 0), Some(only_a), &f.probe);
    f.channel.replication_read(read, f.at(0));
    f.channel.read_completed(&TARGET_ID_1.into());

    f.source_update(&[event("b", vtime(1, 0, 0))], 10);
    assert_eq!(f.probe.count(), 0);
}

#[test]
fn test_silent_while_target_is_reading() {
    let mut f = Fixture::new();
    let read = f.read_msg(TARGET_ID_1, vtime(0, 1, 0), None, &f.probe);
    f.channel.replication_read(read, f.at(0));

    f.source_update(&[event("a", vtime(1, 0, 0)), event("b", vtime(2, 0, 0))], 10);
    assert_eq!(f.probe.count(), 0);
}

#[test]
fn test_read_failure_also_ends_reading() {
    let mut f = Fixture::new();
    let read = f.read_msg(TARGET_ID_1, vtime(0, 1, 0), None, &f.probe);
    f.channel.replication_read(read, f.at(0));
    f.channel.replication_read_failure(&ReplicationReadFailure {
        correlation_id: 1,
        cause: "source log unavailable".into(),
        target_id: TARGET_ID_1.into(),
    });

    f.source_update(&[event("a", vtime(1, 0, 0))], 10);
    assert_eq!(f.probe.count(), 1);
}

#[test]
fn test_applies_target_version_update_from_write() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, vtime(0, 1, 0), 0);
    f.source_update(&[event("a", vtime(0, 2, 0))], 10);
    assert_eq!(f.probe.count(), 1);

    let mut metadata = HashMap::new();
    metadata.insert(
        ReplicaId::from(TARGET_ID_1),
        ReplicationMetadata {
            progress: 10,
            version: vtime(0, 2, 0),
        },
    );
    f.channel.replication_write(&ReplicationWrite {
        events: Vec::new(),
        metadata,
        correlation_id: 1,
    });

    f.source_update(&[event("a", vtime(0, 2, 0))], 20);
    assert_eq!(f.probe.count(), 1);
}

#[test]
fn test_notifies_many_targets() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, vtime(0, 1, 0), 0);
    f.source_read(TARGET_ID_2, vtime(0, 0, 1), 0);
    assert_eq!(f.source_update(&[event("a", vtime(1, 0, 0))], 10), 2);
    assert_eq!(f.probe.count(), 2);
}

#[test]
fn test_silent_after_registration_expired() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, VectorClock::zero(), 0);
    f.source_update(&[event("a", vtime(1, 0, 0))], 5000);
    assert_eq!(f.probe.count(), 0);
}

#[test]
fn test_new_read_renews_expired_registration() {
    let mut f = Fixture::new();
    f.source_read(TARGET_ID_1, VectorClock::zero(), 0);
    f.source_read(TARGET_ID_1, VectorClock::zero(), 500);
    f.source_update(&[event("a", vtime(1, 0, 0))], 500);
    assert_eq!(f.probe.count(), 1);
}
