//! Cluster membership as seen by replicators.
//!
//! The SDK does not discover nodes itself. A [`MembershipObserver`] reports
//! who is in the cluster and streams join/leave events; [`InMemoryMembership`]
//! is the implementation used for tests and single-process clusters.

use causeway_core::ReplicaId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// A node in the cluster and the roles it carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: ReplicaId,
    pub roles: BTreeSet<String>,
}

impl Member {
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

/// Membership change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberEvent {
    Joined(Member),
    Removed(ReplicaId),
}

/// Source of membership information.
pub trait MembershipObserver: Send + Sync + 'static {
    /// Current members.
    fn members(&self) -> Vec<Member>;

    /// Changes from now on.
    fn subscribe(&self) -> broadcast::Receiver<MemberEvent>;
}

/// In-memory membership for testing and simulation.
#[derive(Clone)]
pub struct InMemoryMembership {
    members: Arc<RwLock<HashMap<ReplicaId, Member>>>,
    events: broadcast::Sender<MemberEvent>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            members: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Add or update a member; returns false if it was already present.
    pub fn join(&self, member: Member) -> bool {
        let added = self
            .members
            .write()
            .insert(member.id.clone(), member.clone())
            .is_none();
        if added {
            debug!(member = %member.id, "member joined");
            let _ = self.events.send(MemberEvent::Joined(member));
        }
        added
    }

    pub fn leave(&self, id: &ReplicaId) -> bool {
        let removed = self.members.write().remove(id).is_some();
        if removed {
            debug!(member = %id, "member left");
            let _ = self.events.send(MemberEvent::Removed(id.clone()));
        }
        removed
    }

    pub fn contains(&self, id: &ReplicaId) -> bool {
        self.members.read().contains_key(id)
    }
}

impl Default for InMemoryMembership {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipObserver for InMemoryMembership {
    fn members(&self) -> Vec<Member> {
        self.members.read().values().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_and_leave_events() {
        let membership = InMemoryMembership::new();
        let mut events = membership.subscribe();

        assert!(membership.join(Member::new("a").with_role("db")));
        assert!(!membership.join(Member::new("a")));
        assert!(membership.contains(&"a".into()));

        match events.recv().await.unwrap() {
            MemberEvent::Joined(member) => {
                assert_eq!(member.id, ReplicaId::from("a"));
                assert_eq!(member.roles().collect::<Vec<_>>(), vec!["db"]);
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(membership.leave(&"a".into()));
        assert!(!membership.leave(&"a".into()));
        assert_eq!(
            events.recv().await.unwrap(),
            MemberEvent::Removed("a".into())
        );
        assert!(membership.members().is_empty());
    }
}
