//! # Causeway SDK
//!
//! Async runtime for Causeway replication on tokio.
//!
//! The protocol engines in `causeway-broadcast` and `causeway-notify` are
//! plain state machines. This crate runs each of them as an actor: a task
//! owning the state and a mailbox, talked to through cheap handles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use causeway_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> causeway_sdk::Result<()> {
//! let membership = Arc::new(InMemoryMembership::new());
//! let directory = ReplicatorDirectory::new();
//!
//! let alice = ReplicatorManager::<String>::new(
//!     "alice",
//!     ReplicatorSettings::default(),
//!     membership.clone(),
//!     directory.clone(),
//! );
//! let chat = alice.replicator("chat");
//! let mut deliveries = chat.subscribe().await?;
//!
//! membership.join(Member::new("alice"));
//! chat.broadcast("hello".to_string())?;
//!
//! let delivered = deliveries.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod correlation;
pub mod directory;
pub mod error;
pub mod failure_detector;
pub mod manager;
pub mod membership;
pub mod notification;
pub mod persistence;
pub mod replicator;

pub use actor::ActorRef;
pub use correlation::{CorrelatableRef, Correlated, ReplyTo};
pub use directory::ReplicatorDirectory;
pub use error::{Result, SdkError};
pub use failure_detector::{AvailabilityEvent, FailureDetector, FailureDetectorSettings};
pub use manager::ReplicatorManager;
pub use membership::{InMemoryMembership, Member, MemberEvent, MembershipObserver};
pub use notification::{
    spawn_notification_channel, DueHandle, NotificationChannelRef, NotificationMessage,
};
pub use persistence::{EventLog, MemoryEventLog, MemorySnapshotStore, SnapshotStore};
pub use replicator::{
    spawn_replicator, ReplicatorMessage, ReplicatorRef, StableReply, StableRequest, Subscription,
};

// Re-export the layers underneath.
pub use causeway_broadcast::{Deliver, ReplicatorSettings, ReplicatorSettingsBuilder};
pub use causeway_core::{DurableEvent, ReplicaId, VectorClock, Versioned};
pub use causeway_notify::{NotificationSettings, ReplicationDue, Written};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::directory::ReplicatorDirectory;
    pub use crate::error::{Result, SdkError};
    pub use crate::failure_detector::{AvailabilityEvent, FailureDetector, FailureDetectorSettings};
    pub use crate::manager::ReplicatorManager;
    pub use crate::membership::{InMemoryMembership, Member, MembershipObserver};
    pub use crate::persistence::{EventLog, MemoryEventLog, MemorySnapshotStore, SnapshotStore};
    pub use crate::replicator::{ReplicatorRef, Subscription};
    pub use causeway_broadcast::{Deliver, ReplicatorSettings};
    pub use causeway_core::{ReplicaId, VectorClock, Versioned};
}
