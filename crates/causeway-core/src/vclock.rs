//! Vector clocks.
//!
//! A vector clock maps every replica to the number of events it has
//! produced that the holder of the clock has observed. Absent replicas count
//! as zero, so `{a:1}` and `{a:1; b:0}` are the same clock. Zero entries are
//! never stored, which keeps structural equality and hashing in line with
//! the causal equality of [`VectorClock::partially_compare`].
//!
//! All operations are copy-on-write: they return a new clock and leave the
//! receiver untouched.

use crate::lattice::{Lattice, Meet};
use crate::replica::ReplicaId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Result of partially comparing two vector clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClockOrdering {
    /// Every counter is `<=` and at least one is `<`.
    Before,
    /// All counters match.
    Equal,
    /// Every counter is `>=` and at least one is `>`.
    After,
    /// Counters disagree in direction.
    Concurrent,
}

impl ClockOrdering {
    /// Convert into a standard ordering, `None` for concurrent clocks.
    pub fn to_ordering(self) -> Option<Ordering> {
        match self {
            ClockOrdering::Before => Some(Ordering::Less),
            ClockOrdering::Equal => Some(Ordering::Equal),
            ClockOrdering::After => Some(Ordering::Greater),
            ClockOrdering::Concurrent => None,
        }
    }
}

/// Per-replica logical counters establishing a causal partial order.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ReplicaId, u64>", into = "BTreeMap<ReplicaId, u64>")]
pub struct VectorClock {
    entries: BTreeMap<ReplicaId, u64>,
}

impl VectorClock {
    /// The zero clock: no events observed.
    pub fn zero() -> Self {
        VectorClock {
            entries: BTreeMap::new(),
        }
    }

    /// Build a clock from `(replica, counter)` pairs; zero counters are dropped.
    pub fn from_entries<R, I>(entries: I) -> Self
    where
        R: Into<ReplicaId>,
        I: IntoIterator<Item = (R, u64)>,
    {
        VectorClock {
            entries: entries
                .into_iter()
                .map(|(replica, time)| (replica.into(), time))
                .filter(|(_, time)| *time > 0)
                .collect(),
        }
    }

    /// Counter observed for `replica` (0 when absent).
    pub fn get<Q>(&self, replica: &Q) -> u64
    where
        ReplicaId: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// Return a clock with `replica`'s counter set to `time`.
    pub fn set(&self, replica: impl Into<ReplicaId>, time: u64) -> Self {
        let mut entries = self.entries.clone();
        let replica = replica.into();
        if time == 0 {
            entries.remove(&replica);
        } else {
            entries.insert(replica, time);
        }
        VectorClock { entries }
    }

    /// Return a clock with `replica`'s counter advanced by exactly one.
    pub fn increment(&self, replica: impl Into<ReplicaId>) -> Self {
        let mut entries = self.entries.clone();
        *entries.entry(replica.into()).or_insert(0) += 1;
        VectorClock { entries }
    }

    /// Pointwise maximum (least upper bound).
    pub fn merge(&self, other: &VectorClock) -> Self {
        let mut entries = self.entries.clone();
        for (replica, &time) in &other.entries {
            let current = entries.entry(replica.clone()).or_insert(0);
            *current = (*current).max(time);
        }
        VectorClock { entries }
    }

    /// Pointwise minimum (greatest lower bound).
    ///
    /// A replica missing from either side counts as zero, so only replicas
    /// known to both clocks survive.
    pub fn meet(&self, other: &VectorClock) -> Self {
        VectorClock {
            entries: self
                .entries
                .iter()
                .filter_map(|(replica, &time)| {
                    let min = time.min(other.get(replica));
                    (min > 0).then(|| (replica.clone(), min))
                })
                .collect(),
        }
    }

    /// Drop every entry that `other` has already seen (`self[r] <= other[r]`).
    pub fn subtract(&self, other: &VectorClock) -> Self {
        VectorClock {
            entries: self
                .entries
                .iter()
                .filter_map(|(replica, &time)| {
                    (time > other.get(replica)).then(|| (replica.clone(), time))
                })
                .collect(),
        }
    }

    /// A clock holding only `replica`'s entry.
    pub fn copy_one(&self, replica: &str) -> Self {
        VectorClock {
            entries: self
                .entries
                .get_key_value(replica)
                .map(|(replica, &time)| (replica.clone(), time))
                .into_iter()
                .collect(),
        }
    }

    /// Compare two clocks under the causal partial order.
    ///
    /// Scans the union of replicas keeping an accumulated direction; the
    /// first counter that contradicts it makes the clocks concurrent.
    pub fn partially_compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut current = Ordering::Equal;
        for replica in self.entries.keys().chain(other.entries.keys()) {
            let sign = self.get(replica).cmp(&other.get(replica));
            match (current, sign) {
                (_, Ordering::Equal) => {}
                (Ordering::Equal, _) => current = sign,
                (Ordering::Less, Ordering::Greater) | (Ordering::Greater, Ordering::Less) => {
                    return ClockOrdering::Concurrent;
                }
                _ => {}
            }
        }
        match current {
            Ordering::Less => ClockOrdering::Before,
            Ordering::Equal => ClockOrdering::Equal,
            Ordering::Greater => ClockOrdering::After,
        }
    }

    /// Neither clock happened before the other.
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.partially_compare(other) == ClockOrdering::Concurrent
    }

    /// Iterate over the non-zero entries in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.entries.iter().map(|(replica, &time)| (replica, time))
    }

    /// Replicas with a non-zero counter.
    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaId> {
        self.entries.keys()
    }

    /// Number of replicas with a non-zero counter.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for the zero clock.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.partially_compare(other).to_ordering()
    }
}

impl Lattice for VectorClock {
    fn bottom() -> Self {
        VectorClock::zero()
    }

    fn join(&self, other: &Self) -> Self {
        self.merge(other)
    }

    fn partial_cmp_lattice(&self, other: &Self) -> Option<Ordering> {
        self.partial_cmp(other)
    }
}

impl Meet for VectorClock {
    fn meet(&self, other: &Self) -> Self {
        VectorClock::meet(self, other)
    }
}

impl From<BTreeMap<ReplicaId, u64>> for VectorClock {
    fn from(entries: BTreeMap<ReplicaId, u64>) -> Self {
        VectorClock::from_entries(entries)
    }
}

impl From<VectorClock> for BTreeMap<ReplicaId, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.entries
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (replica, time)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}:{}", replica, time)?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorClock{}", self)
    }
}
