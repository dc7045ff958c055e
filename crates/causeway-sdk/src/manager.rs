//! One replicator per topic.

use crate::directory::ReplicatorDirectory;
use crate::membership::MembershipObserver;
use crate::replicator::{spawn_replicator, ReplicatorRef};
use causeway_broadcast::ReplicatorSettings;
use causeway_core::ReplicaId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Creates replicators on first use and hands out the same one afterwards.
pub struct ReplicatorManager<T> {
    replica_id: ReplicaId,
    settings: ReplicatorSettings,
    membership: Arc<dyn MembershipObserver>,
    directory: ReplicatorDirectory<T>,
    replicators: Mutex<HashMap<String, ReplicatorRef<T>>>,
}

impl<T: Clone + Send + 'static> ReplicatorManager<T> {
    pub fn new(
        replica_id: impl Into<ReplicaId>,
        settings: ReplicatorSettings,
        membership: Arc<dyn MembershipObserver>,
        directory: ReplicatorDirectory<T>,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            settings,
            membership,
            directory,
            replicators: Mutex::new(HashMap::new()),
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    /// The replicator for `topic`, spawning it if needed.
    ///
    /// A replicator that has been stopped is replaced by a fresh one.
    /// Must be called from within a tokio runtime.
    pub fn replicator(&self, topic: &str) -> ReplicatorRef<T> {
        let mut replicators = self.replicators.lock();
        if let Some(existing) = replicators.get(topic) {
            if !existing.is_stopped() {
                return existing.clone();
            }
        }
        debug!(replica = %self.replica_id, topic, "spawning replicator");
        let (replicator, _task) = spawn_replicator(
            self.replica_id.clone(),
            topic,
            self.settings.clone(),
            Arc::clone(&self.membership),
            self.directory.clone(),
        );
        replicators.insert(topic.to_string(), replicator.clone());
        replicator
    }

    pub fn topics(&self) -> Vec<String> {
        self.replicators.lock().keys().cloned().collect()
    }

    /// Stop every replicator this manager created.
    pub fn stop(&self) {
        for (_, replicator) in self.replicators.lock().drain() {
            replicator.stop();
        }
    }
}
