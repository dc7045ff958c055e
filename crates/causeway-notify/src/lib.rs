//! # Causeway Notify
//!
//! Pull-side replication signalling for event logs.
//!
//! - [`NotificationChannel`]: tells registered targets when newly written
//!   events become causally visible to them
//! - [`Registry`]: multi-value map with a reverse index
//! - [`SubscriberRegistry`]: per-stream and default subscribers receiving
//!   [`Written`] events
//!
//! All types here are plain state machines. Handles are abstracted by the
//! [`Recipient`] trait so an async runtime can plug in its own channels.

pub mod channel;
pub mod protocol;
pub mod recipient;
pub mod registry;
pub mod subscribers;

pub use channel::{NotificationChannel, NotificationSettings, Registration};
pub use protocol::{
    ReplicationDue, ReplicationMetadata, ReplicationRead, ReplicationReadFailure,
    ReplicationReadSuccess, ReplicationWrite,
};
pub use recipient::Recipient;
pub use registry::Registry;
pub use subscribers::{SubscriberRegistry, Written};
