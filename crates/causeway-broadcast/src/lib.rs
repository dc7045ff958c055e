//! Causeway Broadcast - reliable causal broadcast
//!
//! This crate implements the per-topic replication protocol:
//! - Flooding broadcast with per-peer acknowledgements and timed resends
//! - Duplicate suppression using the local vector clock
//! - Causal delivery: a payload reaches subscribers only after everything it
//!   depends on
//! - Stable version tracking (the meet of every peer's known clock)
//!
//! The engine is sans-IO. [`Replicator`] consumes protocol messages and
//! returns [`Effect`]s; an async runtime or the [`BroadcastCluster`]
//! simulator carries them out.
//!
//! # Example
//!
//! ```rust
//! use causeway_broadcast::{BroadcastCluster, Faults, ReplicatorSettings};
//!
//! let mut cluster: BroadcastCluster<&str> =
//!     BroadcastCluster::new(3, ReplicatorSettings::default(), Faults::none());
//!
//! cluster.broadcast(0, "hello");
//! cluster.drain_network();
//!
//! assert!(cluster.is_converged());
//! assert_eq!(cluster.delivered(2)[0].value, "hello");
//! ```

pub mod error;
pub mod protocol;
pub mod replicator;
pub mod settings;
pub mod simulator;
pub mod state;

pub use error::{BroadcastError, Result};
pub use protocol::{Deliver, PeerMessage, SendAck, SendEnvelope};
pub use replicator::{Effect, Replicator};
pub use settings::{ReplicatorSettings, ReplicatorSettingsBuilder};
pub use simulator::{BroadcastCluster, Envelope, Faults, NetworkSimulator};
pub use state::{PendingAck, ReplicatorState};
