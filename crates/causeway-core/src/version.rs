//! Versions combining causal and wall-clock time.
//!
//! Causality decides first. Only when two updates are concurrent does the
//! wall clock break the tie, and identical wall-clock stamps with different
//! payloads are reported as a conflict instead of being resolved arbitrarily.

use crate::error::{CoreError, Result};
use crate::vclock::{ClockOrdering, VectorClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Vector time with a wall-clock fallback for concurrent updates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Wall-clock time of the update on the replica that made it.
    pub system_time: DateTime<Utc>,
    /// Causal time of the update.
    pub vector_time: VectorClock,
}

impl Version {
    pub fn new(system_time: DateTime<Utc>, vector_time: VectorClock) -> Self {
        Self {
            system_time,
            vector_time,
        }
    }

    /// Version of an update made now by `replica` on top of `self`.
    pub fn next(&self, replica: &str) -> Self {
        Self {
            system_time: Utc::now().max(self.system_time),
            vector_time: self.vector_time.increment(replica),
        }
    }

    /// Compare by vector time, falling back to system time when concurrent.
    pub fn compare(&self, other: &Version) -> Ordering {
        self.vector_time
            .partially_compare(&other.vector_time)
            .to_ordering()
            .unwrap_or_else(|| self.system_time.cmp(&other.system_time))
    }

    /// Latest system time and merged vector time.
    pub fn merge(&self, other: &Version) -> Self {
        Self {
            system_time: self.system_time.max(other.system_time),
            vector_time: self.vector_time.merge(&other.vector_time),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self {
            system_time: DateTime::<Utc>::MIN_UTC,
            vector_time: VectorClock::zero(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}, {})", self.system_time.to_rfc3339(), self.vector_time)
    }
}

/// A value carrying a [`Version`], mergeable with other replicas' copies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub version: Version,
    pub value: T,
}

impl<T: Clone + PartialEq + fmt::Debug> Stamped<T> {
    pub fn new(version: Version, value: T) -> Self {
        Self { version, value }
    }

    /// Reconcile two copies of the same value.
    ///
    /// A dominating clock wins outright. Concurrent copies are resolved by
    /// system time, and keep the merged version so the result dominates both.
    pub fn merge(&self, other: &Stamped<T>) -> Result<Stamped<T>> {
        match self.version.vector_time.partially_compare(&other.version.vector_time) {
            ClockOrdering::After | ClockOrdering::Equal => Ok(self.clone()),
            ClockOrdering::Before => Ok(other.clone()),
            ClockOrdering::Concurrent => {
                let version = self.version.merge(&other.version);
                match self.version.system_time.cmp(&other.version.system_time) {
                    Ordering::Greater => Ok(Stamped::new(version, self.value.clone())),
                    Ordering::Less => Ok(Stamped::new(version, other.value.clone())),
                    Ordering::Equal if self.value == other.value => {
                        Ok(Stamped::new(version, self.value.clone()))
                    }
                    Ordering::Equal => Err(CoreError::ConcurrentUpdate {
                        left: format!("{:?} at {}", self.value, self.version),
                        right: format!("{:?} at {}", other.value, other.version),
                    }),
                }
            }
        }
    }
}
