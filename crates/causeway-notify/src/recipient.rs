//! Handles that notifications are sent to.

use std::hash::Hash;

/// A handle that accepts messages of type `M`.
///
/// Handles are compared and hashed by identity so they can be stored in
/// registries.
pub trait Recipient<M>: Clone + Eq + Hash {
    /// Deliver `message`; returns `false` if the recipient is gone.
    fn tell(&self, message: M) -> bool;
}
