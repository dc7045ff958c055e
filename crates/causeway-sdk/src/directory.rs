//! In-process address book for replicators.
//!
//! Maps `(replica, topic)` to the mailbox of the replicator serving that
//! topic on that replica. A networked deployment would resolve remote
//! addresses here instead.

use crate::actor::ActorRef;
use crate::replicator::ReplicatorMessage;
use causeway_core::ReplicaId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type Handle<T> = ActorRef<ReplicatorMessage<T>>;

pub struct ReplicatorDirectory<T> {
    entries: Arc<RwLock<HashMap<(ReplicaId, String), Handle<T>>>>,
}

impl<T> Clone for ReplicatorDirectory<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for ReplicatorDirectory<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> ReplicatorDirectory<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, replica: ReplicaId, topic: &str, handle: Handle<T>) {
        self.entries
            .write()
            .insert((replica, topic.to_string()), handle);
    }

    /// Remove the entry only if it still points at `handle`.
    pub fn unregister(&self, replica: &ReplicaId, topic: &str, handle: &Handle<T>) {
        let mut entries = self.entries.write();
        let key = (replica.clone(), topic.to_string());
        if entries.get(&key) == Some(handle) {
            entries.remove(&key);
        }
    }

    pub fn resolve(&self, replica: &ReplicaId, topic: &str) -> Option<Handle<T>> {
        self.entries
            .read()
            .get(&(replica.clone(), topic.to_string()))
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
