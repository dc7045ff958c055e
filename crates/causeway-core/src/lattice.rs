//! Lattice traits - the algebra behind logical time
//!
//! A join-semilattice (S, ⊔) satisfies:
//! - Commutativity: a ⊔ b = b ⊔ a
//! - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//! - Idempotence:  a ⊔ a = a
//!
//! Vector clocks additionally form a lattice with a meet (⊓), which is what
//! stable-version aggregation relies on.

use std::cmp::Ordering;

/// A join-semilattice with a bottom element.
pub trait Lattice: Clone + PartialEq {
    /// The bottom element (identity for join)
    fn bottom() -> Self;

    /// Join operation (least upper bound)
    /// Must be commutative, associative, and idempotent
    fn join(&self, other: &Self) -> Self;

    /// Partial order derived from join: a ≤ b iff a ⊔ b = b
    fn partial_cmp_lattice(&self, other: &Self) -> Option<Ordering> {
        let joined = self.join(other);
        if &joined == self && &joined == other {
            Some(Ordering::Equal)
        } else if &joined == other {
            Some(Ordering::Less)
        } else if &joined == self {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    /// Check if self ≤ other in the lattice order
    fn leq(&self, other: &Self) -> bool {
        matches!(
            self.partial_cmp_lattice(other),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }

    /// Join-assign: self = self ⊔ other
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}

/// A lattice that also has a greatest lower bound.
pub trait Meet: Lattice {
    /// Meet operation (greatest lower bound)
    fn meet(&self, other: &Self) -> Self;

    /// Meet of every element, or bottom when there is none.
    fn meet_all<'a, I>(items: I) -> Self
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let mut iter = items.into_iter();
        match iter.next() {
            Some(first) => iter.fold(first.clone(), |acc, next| acc.meet(next)),
            None => Self::bottom(),
        }
    }
}
