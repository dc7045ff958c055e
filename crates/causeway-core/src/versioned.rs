//! Values tagged with the vector clock they were produced at.

use crate::vclock::VectorClock;
use serde::{Deserialize, Serialize};

/// A payload paired with the vector clock of the event that produced it.
///
/// Two values are equal when their clocks compare `Equal` and their payloads
/// match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: VectorClock,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: VectorClock, value: T) -> Self {
        Self { version, value }
    }

    /// Transform the payload, keeping the version.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            version: self.version,
            value: f(self.value),
        }
    }

    pub fn as_ref(&self) -> Versioned<&T> {
        Versioned {
            version: self.version.clone(),
            value: &self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_uses_clock_and_payload() {
        let v1 = VectorClock::zero().increment("a");
        let left = Versioned::new(v1.clone(), "x");
        assert_eq!(left, Versioned::new(v1.set("b", 0), "x"));
        assert_ne!(left, Versioned::new(v1.clone(), "y"));
        assert_ne!(left, Versioned::new(v1.increment("a"), "x"));
    }

    #[test]
    fn test_map_keeps_version() {
        let v = VectorClock::zero().increment("a");
        let mapped = Versioned::new(v.clone(), 21).map(|x| x * 2);
        assert_eq!(mapped.version, v);
        assert_eq!(mapped.value, 42);
    }
}
