//! # Causeway Core
//!
//! Logical time for the Causeway replication engine.
//!
//! - [`VectorClock`]: per-replica counters with a causal partial order
//! - [`Lattice`] / [`Meet`]: the join/meet algebra clocks obey
//! - [`Versioned`]: a payload tagged with the clock it was produced at
//! - [`Version`] / [`Stamped`]: vector time with wall-clock conflict resolution
//! - [`DurableEvent`] / [`VersionClock`]: journal events and their ordering

pub mod error;
pub mod event;
pub mod lattice;
pub mod replica;
pub mod vclock;
pub mod version;
pub mod versioned;

pub use error::{CoreError, Result};
pub use event::{DurableEvent, ReplicationFilter, VersionClock};
pub use lattice::{Lattice, Meet};
pub use replica::ReplicaId;
pub use vclock::{ClockOrdering, VectorClock};
pub use version::{Stamped, Version};
pub use versioned::Versioned;
